//! ---
//! fab_section: "04-ledger-adapter"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Ledger events and subscription handles."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use fab_common::{MachineKind, ProcessKind};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::types::{ReadingType, TaskId, TaskOutcome};

/// A task was assigned to a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssigned {
    /// Machine the task is assigned to.
    pub machine: MachineKind,
    /// Ledger task id.
    pub task_id: TaskId,
    /// Task type name, as in the machine's task table.
    pub task_name: String,
    /// Product the task works on, empty if none.
    pub product_did: String,
    /// Spawning process instance, zero if none.
    pub process_id: u64,
    /// Contract of the spawning process.
    pub process_contract: String,
}

/// A task reached a final outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFinished {
    /// Machine that ran the task.
    pub machine: MachineKind,
    /// Ledger task id.
    pub task_id: TaskId,
    /// Task type name.
    pub task_name: String,
    /// Spawning process instance, zero if none.
    pub process_id: u64,
    /// Contract of the spawning process.
    pub process_contract: String,
    /// Recorded outcome.
    pub outcome: TaskOutcome,
}

/// The ledger asks a machine to attach a sensor reading to its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingRequest {
    /// Machine asked for the reading.
    pub machine: MachineKind,
    /// Quantity to attach.
    pub reading_type: ReadingType,
}

/// A product operation (colour detection, NFC read, ...) was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOperation {
    /// Machine that performed the operation.
    pub machine: MachineKind,
    /// Task during which it happened.
    pub task_id: TaskId,
    /// Product the operation was recorded on.
    pub product_did: String,
    /// Operation name.
    pub operation: String,
    /// Operation result.
    pub result: String,
}

/// An operator or contract raised an alert for a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Machine that should sound the alert.
    pub machine: MachineKind,
    /// Free-form reason.
    pub reason: String,
}

/// A process instance was started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStarted {
    /// Process type.
    pub kind: ProcessKind,
    /// Instance id within the process contract.
    pub process_id: u64,
    /// Process contract address.
    pub process_contract: String,
    /// Product the process works on.
    pub product_did: String,
}

/// Everything the ledger emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// See [`TaskAssigned`].
    TaskAssigned(TaskAssigned),
    /// See [`ReadingRequest`].
    NewReading(ReadingRequest),
    /// See [`ProductOperation`].
    ProductOperationSaved(ProductOperation),
    /// See [`Alert`].
    NewAlert(Alert),
    /// See [`TaskFinished`].
    TaskFinished(TaskFinished),
    /// See [`ProcessStarted`].
    ProcessStarted(ProcessStarted),
}

impl LedgerEvent {
    /// Event name as emitted by the contracts.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::TaskAssigned(_) => "TaskAssigned",
            LedgerEvent::NewReading(_) => "NewReading",
            LedgerEvent::ProductOperationSaved(_) => "ProductOperationSaved",
            LedgerEvent::NewAlert(_) => "NewAlert",
            LedgerEvent::TaskFinished(_) => "TaskFinished",
            LedgerEvent::ProcessStarted(_) => "ProcessStarted",
        }
    }
}

/// Selects which events a subscription delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Machine-contract events addressed to one machine: assignments,
    /// reading requests, product operations and alerts.
    Machine(MachineKind),
    /// `ProcessStarted` for one process kind plus every `TaskFinished`.
    Process(ProcessKind),
    /// Every event.
    All,
}

impl EventFilter {
    /// True when a subscription with this filter should see `event`.
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        match (self, event) {
            (EventFilter::All, _) => true,
            (EventFilter::Machine(kind), LedgerEvent::TaskAssigned(e)) => e.machine == *kind,
            (EventFilter::Machine(kind), LedgerEvent::NewReading(e)) => e.machine == *kind,
            (EventFilter::Machine(kind), LedgerEvent::ProductOperationSaved(e)) => {
                e.machine == *kind
            }
            (EventFilter::Machine(kind), LedgerEvent::NewAlert(e)) => e.machine == *kind,
            (EventFilter::Process(kind), LedgerEvent::ProcessStarted(e)) => e.kind == *kind,
            (EventFilter::Process(_), LedgerEvent::TaskFinished(_)) => true,
            _ => false,
        }
    }
}

/// Handle returned by [`crate::LedgerEvents::subscribe`].
///
/// Dropping it ends the subscription.
pub struct Subscription {
    filter: EventFilter,
    receiver: broadcast::Receiver<LedgerEvent>,
}

impl Subscription {
    /// Wrap a broadcast receiver behind `filter`.
    pub fn new(filter: EventFilter, receiver: broadcast::Receiver<LedgerEvent>) -> Self {
        Self { filter, receiver }
    }

    /// Filter this subscription applies.
    pub fn filter(&self) -> EventFilter {
        self.filter
    }

    /// Next matching event, or `None` once the ledger side has gone away.
    pub async fn next(&mut self) -> Option<LedgerEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(filter = ?self.filter, skipped, "ledger subscription lagged; events lost");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
