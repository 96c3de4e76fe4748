//! ---
//! fab_section: "05-machine-clients"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Multi-processing station command and acknowledgement rules."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
//! Multi-processing station: oven, saw and turntable.

use fab_common::MachineKind;

use super::{task_catalog, AckOutcome, MachineProtocol};
use crate::wire::{AckMessage, CommandHeader, TaskCommand};

task_catalog! {
    MpoTask {
        Processing => "Processing",
    }
}

/// Sent when the workpiece enters the station; completion follows.
const STARTED: u64 = 1;

/// Multi-processing station with oven.
pub struct Mpo;

impl MachineProtocol for Mpo {
    type Task = MpoTask;

    const KIND: MachineKind = MachineKind::Mpo;

    fn build_command(task: MpoTask, header: CommandHeader, _inputs: &[String]) -> TaskCommand {
        match task {
            MpoTask::Processing => TaskCommand::new(1, header),
        }
    }

    fn classify(ack: &AckMessage) -> AckOutcome {
        match ack.code {
            STARTED => AckOutcome::Progress,
            _ => AckOutcome::Success,
        }
    }
}
