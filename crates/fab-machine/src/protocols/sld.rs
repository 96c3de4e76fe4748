//! ---
//! fab_section: "05-machine-clients"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Sorting line command and acknowledgement rules."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
//! Sorting line with colour detection.

use fab_common::MachineKind;

use super::{task_catalog, AckOutcome, MachineProtocol};
use crate::wire::{AckMessage, CommandHeader, TaskCommand};

task_catalog! {
    SldTask {
        Sorting => "Sorting",
    }
}

/// Sent when the workpiece enters the station; completion follows.
const STARTED: u64 = 1;

/// Sorting line with colour detection.
pub struct Sld;

impl MachineProtocol for Sld {
    type Task = SldTask;

    const KIND: MachineKind = MachineKind::Sld;

    fn build_command(task: SldTask, header: CommandHeader, _inputs: &[String]) -> TaskCommand {
        match task {
            SldTask::Sorting => TaskCommand::new(1, header),
        }
    }

    fn classify(ack: &AckMessage) -> AckOutcome {
        match ack.code {
            STARTED => AckOutcome::Progress,
            _ => AckOutcome::Success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_ack_is_progress_only() {
        let header = CommandHeader {
            task_id: 3,
            product_did: "P".into(),
            process_id: 2,
        };
        assert_eq!(Sld::build_command(SldTask::Sorting, header, &[]).code, 1);
        let ack = |code: u64| -> AckMessage {
            serde_json::from_value(json!({ "code": code, "taskID": 3, "type": "WHITE" })).unwrap()
        };
        assert_eq!(Sld::classify(&ack(1)), AckOutcome::Progress);
        assert_eq!(Sld::classify(&ack(2)), AckOutcome::Success);
    }
}
