//! ---
//! fab_section: "05-machine-clients"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Vacuum gripper robot command and acknowledgement rules."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
//! Vacuum gripper robot: identification and transfers between stations.

use fab_common::MachineKind;

use super::{input, task_catalog, AckOutcome, MachineProtocol};
use crate::wire::{AckMessage, CommandHeader, TaskCommand};

task_catalog! {
    VgrTask {
        GetInfo => "GetInfo",
        DropToHbw => "DropToHBW",
        MoveHbwToMpo => "MoveHBW2MPO",
        PickSorted => "PickSorted",
    }
}

/// Identification finished; the ack carries the detected workpiece.
const INFO_RESULT: u64 = 1;

/// Vacuum gripper robot.
pub struct Vgr;

impl MachineProtocol for Vgr {
    type Task = VgrTask;

    const KIND: MachineKind = MachineKind::Vgr;

    fn required_inputs(task: VgrTask) -> &'static [&'static str] {
        match task {
            VgrTask::PickSorted => &["color"],
            _ => &[],
        }
    }

    fn build_command(task: VgrTask, header: CommandHeader, inputs: &[String]) -> TaskCommand {
        match task {
            VgrTask::GetInfo => TaskCommand::new(2, header),
            VgrTask::DropToHbw => TaskCommand::new(3, header),
            VgrTask::MoveHbwToMpo => TaskCommand::new(4, header),
            VgrTask::PickSorted => TaskCommand::new(5, header).with_sort_type(input(inputs, 0)),
        }
    }

    fn classify(ack: &AckMessage) -> AckOutcome {
        match ack.code {
            INFO_RESULT => AckOutcome::InfoResult {
                workpiece: ack.workpiece.clone(),
            },
            8 => AckOutcome::Failure {
                note: "Unknown color",
            },
            9 => AckOutcome::Failure { note: "No product" },
            10 => AckOutcome::Failure {
                note: "NFC identification failed",
            },
            _ => AckOutcome::Success,
        }
    }
}
