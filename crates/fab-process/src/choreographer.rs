//! ---
//! fab_section: "06-process-choreography"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Reactive step advancer for one process kind."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use std::sync::Arc;

use fab_ledger::{LedgerEvent, ProcessLedger, ProcessStarted, Receipt, TaskFinished};
use fab_logging::{fab_debug, fab_error, log_transaction, LogContext};

use crate::plan::{ProcessPlan, StepAction};

/// Advances process instances as their machine tasks finish.
///
/// Holds no per-instance state; the ledger records the current step.
pub struct ProcessChoreographer {
    plan: ProcessPlan,
    ledger: Arc<dyn ProcessLedger>,
}

impl ProcessChoreographer {
    /// Choreographer for `plan`, writing through `ledger`.
    pub fn new(plan: ProcessPlan, ledger: Arc<dyn ProcessLedger>) -> Self {
        Self { plan, ledger }
    }

    /// Plan this choreographer follows.
    pub fn plan(&self) -> &ProcessPlan {
        &self.plan
    }

    fn context(&self, process_id: u64) -> LogContext<'_> {
        LogContext::for_client(self.plan.kind().client_name())
            .with_address(self.plan.contract())
            .with_process(process_id)
    }

    /// Dispatch one ledger event.
    pub async fn on_event(&self, event: LedgerEvent) {
        match event {
            LedgerEvent::ProcessStarted(started) => self.on_process_started(&started).await,
            LedgerEvent::TaskFinished(finished) => self.on_task_finished(&finished).await,
            other => fab_debug!(
                context = LogContext::for_client(self.plan.kind().client_name()),
                "Ignoring {} event",
                other.name()
            ),
        }
    }

    /// Request the first step of a new process instance.
    pub async fn on_process_started(&self, event: &ProcessStarted) {
        if event.kind != self.plan.kind() {
            return;
        }
        self.apply(event.process_id, StepAction::Advance(self.plan.first_step()))
            .await;
    }

    /// Advance or finish the process if the finished task matches a plan rule.
    pub async fn on_task_finished(&self, event: &TaskFinished) {
        if event.process_contract != self.plan.contract() {
            return;
        }
        let Some(action) = self.plan.action_for(event.machine, &event.task_name) else {
            fab_debug!(
                context = self.context(event.process_id).with_task(event.task_id),
                "{} {} does not move the process",
                event.machine,
                event.task_name
            );
            return;
        };
        self.apply(event.process_id, action).await;
    }

    async fn apply(&self, process_id: u64, action: StepAction) {
        let kind = self.plan.kind();
        let context = self.context(process_id);
        let (result, description) = match action {
            StepAction::Advance(step) => (
                self.ledger.advance_step(kind, process_id, step).await,
                format!("{} process step {} started", capitalized(kind), step),
            ),
            StepAction::Finish(code) => (
                self.ledger.finish_process(kind, process_id, code).await,
                format!("{} process finished with result {}", capitalized(kind), code),
            ),
        };
        report(&context, &description, result);
    }
}

fn capitalized(kind: fab_common::ProcessKind) -> &'static str {
    match kind {
        fab_common::ProcessKind::Supplying => "Supplying",
        fab_common::ProcessKind::Production => "Production",
    }
}

fn report(context: &LogContext<'_>, description: &str, result: fab_ledger::Result<Receipt>) {
    match result {
        Ok(receipt) => log_transaction(context, description, &receipt.tx_hash, receipt.block),
        Err(err) => fab_error!(context = *context, "{} failed: {}", description, err),
    }
}
