//! ---
//! fab_section: "05-machine-clients"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "High-bay warehouse command and acknowledgement rules."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
//! High-bay warehouse: stores and retrieves containers and products.

use fab_common::MachineKind;

use super::{input, task_catalog, AckOutcome, MachineProtocol};
use crate::wire::{AckMessage, CommandHeader, TaskCommand, Workpiece};

task_catalog! {
    HbwTask {
        FetchContainer => "FetchContainer",
        StoreContainer => "StoreContainer",
        StoreProduct => "StoreProduct",
        FetchProduct => "FetchProduct",
    }
}

const PRODUCT_MISSING: u64 = 5;
const NO_EMPTY_CONTAINER: u64 = 6;

/// High-bay warehouse.
pub struct Hbw;

impl MachineProtocol for Hbw {
    type Task = HbwTask;

    const KIND: MachineKind = MachineKind::Hbw;

    fn required_inputs(task: HbwTask) -> &'static [&'static str] {
        match task {
            HbwTask::StoreProduct => &["color", "id"],
            _ => &[],
        }
    }

    fn build_command(task: HbwTask, header: CommandHeader, inputs: &[String]) -> TaskCommand {
        match task {
            HbwTask::FetchContainer => TaskCommand::new(2, header),
            HbwTask::StoreContainer => TaskCommand::new(5, header),
            HbwTask::StoreProduct => TaskCommand::new(3, header)
                .with_workpiece(Workpiece::raw(input(inputs, 0), input(inputs, 1))),
            HbwTask::FetchProduct => TaskCommand::new(4, header).with_workpiece(Workpiece::empty()),
        }
    }

    fn classify(ack: &AckMessage) -> AckOutcome {
        match ack.code {
            PRODUCT_MISSING => AckOutcome::Failure {
                note: "Product does not exist",
            },
            NO_EMPTY_CONTAINER => AckOutcome::Failure {
                note: "No empty container",
            },
            _ => AckOutcome::Success,
        }
    }
}
