//! ---
//! fab_section: "06-process-choreography"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Step tables for the supplying and production processes."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use fab_common::{MachineKind, ProcessKind};

/// Result code recorded when a process reaches its last step.
pub const PROCESS_COMPLETED: u8 = 1;

/// What the choreographer asks of the ledger when a rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Move the process to this step.
    Advance(u32),
    /// Finish the process with this result code.
    Finish(u8),
}

/// `(machine, task)` completion that moves a process forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanRule {
    /// Machine that finished the task.
    pub machine: MachineKind,
    /// Task type name.
    pub task_name: &'static str,
    /// What to ask of the ledger.
    pub action: StepAction,
}

const fn rule(machine: MachineKind, task_name: &'static str, action: StepAction) -> PlanRule {
    PlanRule {
        machine,
        task_name,
        action,
    }
}

const SUPPLYING_RULES: &[PlanRule] = &[
    rule(MachineKind::Vgr, "GetInfo", StepAction::Advance(2)),
    rule(MachineKind::Hbw, "FetchContainer", StepAction::Advance(3)),
    rule(MachineKind::Vgr, "DropToHBW", StepAction::Advance(4)),
    rule(MachineKind::Hbw, "StoreProduct", StepAction::Finish(PROCESS_COMPLETED)),
];

const PRODUCTION_RULES: &[PlanRule] = &[
    rule(MachineKind::Hbw, "FetchProduct", StepAction::Advance(2)),
    rule(MachineKind::Vgr, "MoveHBW2MPO", StepAction::Advance(3)),
    rule(MachineKind::Mpo, "Processing", StepAction::Advance(4)),
    rule(MachineKind::Sld, "Sorting", StepAction::Advance(5)),
    rule(MachineKind::Vgr, "PickSorted", StepAction::Finish(PROCESS_COMPLETED)),
];

/// Fixed rule table for one process kind bound to its contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessPlan {
    kind: ProcessKind,
    contract: String,
    rules: &'static [PlanRule],
}

impl ProcessPlan {
    /// Plan for `kind` bound to its process contract.
    pub fn for_kind(kind: ProcessKind, contract: impl Into<String>) -> Self {
        let rules = match kind {
            ProcessKind::Supplying => SUPPLYING_RULES,
            ProcessKind::Production => PRODUCTION_RULES,
        };
        Self {
            kind,
            contract: contract.into(),
            rules,
        }
    }

    /// Supplying process plan.
    pub fn supplying(contract: impl Into<String>) -> Self {
        Self::for_kind(ProcessKind::Supplying, contract)
    }

    /// Production process plan.
    pub fn production(contract: impl Into<String>) -> Self {
        Self::for_kind(ProcessKind::Production, contract)
    }

    /// Process kind.
    pub fn kind(&self) -> ProcessKind {
        self.kind
    }

    /// Process contract address.
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Step rules in order.
    pub fn rules(&self) -> &'static [PlanRule] {
        self.rules
    }

    /// Step requested when a process instance starts.
    pub fn first_step(&self) -> u32 {
        1
    }

    /// Action for a successful `(machine, task_name)` completion, if any rule matches.
    pub fn action_for(&self, machine: MachineKind, task_name: &str) -> Option<StepAction> {
        self.rules
            .iter()
            .find(|rule| rule.machine == machine && rule.task_name == task_name)
            .map(|rule| rule.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supplying_table() {
        let plan = ProcessPlan::supplying("0xSupplying");
        assert_eq!(
            plan.action_for(MachineKind::Vgr, "GetInfo"),
            Some(StepAction::Advance(2))
        );
        assert_eq!(
            plan.action_for(MachineKind::Hbw, "StoreProduct"),
            Some(StepAction::Finish(PROCESS_COMPLETED))
        );
        assert_eq!(plan.action_for(MachineKind::Hbw, "GetInfo"), None);
        assert_eq!(plan.action_for(MachineKind::Vgr, "PickSorted"), None);
    }

    #[test]
    fn production_table_advances_in_order() {
        let plan = ProcessPlan::production("0xProduction");
        let steps: Vec<_> = plan
            .rules()
            .iter()
            .filter_map(|rule| match rule.action {
                StepAction::Advance(step) => Some(step),
                StepAction::Finish(_) => None,
            })
            .collect();
        assert_eq!(steps, vec![2, 3, 4, 5]);
        assert_eq!(plan.kind(), ProcessKind::Production);
        assert_eq!(plan.contract(), "0xProduction");
    }

    #[test]
    fn every_rule_names_a_catalog_task() {
        for plan in [ProcessPlan::supplying(""), ProcessPlan::production("")] {
            for rule in plan.rules() {
                assert!(
                    rule.machine.task_type_of(rule.task_name).is_some(),
                    "{} has no task {}",
                    rule.machine,
                    rule.task_name
                );
            }
        }
    }
}
