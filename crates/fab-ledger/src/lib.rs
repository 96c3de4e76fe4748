//! ---
//! fab_section: "04-ledger-adapter"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Task ledger adapter interface and reference implementation."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Interface to the workflow authority that assigns, starts and finishes
//! machine tasks, plus a retry wrapper and an in-memory reference ledger.

/// Ledger events and subscriptions.
pub mod events;
/// In-process ledger.
pub mod memory;
/// Retrying ledger decorator.
pub mod retry;
/// Ledger records.
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use fab_common::ProcessKind;
use thiserror::Error;

pub use events::{
    Alert, EventFilter, LedgerEvent, ProcessStarted, ProductOperation, ReadingRequest,
    Subscription, TaskAssigned, TaskFinished,
};
pub use memory::{InMemoryLedger, ProcessRecord, ReadingRecord, TaskRecord};
pub use retry::RetryingLedger;
pub use types::{ReadingType, Receipt, Task, TaskId, TaskOutcome, TaskStatus, NO_TASK};

/// Result alias for ledger calls.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Rejections and failures reported by the ledger.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// No record with that id.
    #[error("{0} not found")]
    NotFound(String),
    /// The task is not in the status the call requires.
    #[error("task {task_id} is {status}")]
    WrongStatus {
        /// Task the call targeted.
        task_id: TaskId,
        /// Status the ledger holds for it.
        status: TaskStatus,
    },
    /// Caller is not the machine the task belongs to.
    #[error("address {0} is not authorized for this call")]
    Unauthorized(String),
    /// Task type unknown to the machine contract.
    #[error("Unknown Task Type. ({machine} type {task_type})")]
    UnknownTaskType {
        /// Machine the task was created for.
        machine: String,
        /// Unrecognised task type name.
        task_type: String,
    },
    /// Process step advanced out of order.
    #[error("process {process_id} expects step {expected}, got {requested}")]
    WrongStep {
        /// Process instance.
        process_id: u64,
        /// Next step the instance accepts.
        expected: u32,
        /// Step that was asked for.
        requested: u32,
    },
    /// Contract reverted the transaction.
    #[error("transaction reverted: {0}")]
    Transaction(String),
    /// Ledger could not be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    /// Only connectivity failures may succeed when repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}

/// Calls a machine client makes against its machine contract.
#[async_trait]
pub trait TaskLedger: Send + Sync {
    /// Authoritative task for an assignment event; fails unless the task is still assigned.
    async fn get_task_with_status(&self, event: &TaskAssigned) -> Result<Task>;

    /// Mark the task started on behalf of `machine_address`.
    async fn start_task(&self, machine_address: &str, event: &TaskAssigned) -> Result<Task>;

    /// Record the final outcome of a started task.
    async fn finish_task(
        &self,
        machine_address: &str,
        task_id: TaskId,
        outcome: TaskOutcome,
        note: Option<&str>,
    ) -> Result<Receipt>;

    /// Finish an identification task, recording the detected workpiece on its product.
    async fn finish_info_task(
        &self,
        machine_address: &str,
        task_id: TaskId,
        workpiece_id: &str,
        workpiece_type: &str,
    ) -> Result<Receipt>;

    /// Values of the named task parameters, in request order.
    async fn get_task_inputs(&self, task_id: TaskId, names: &[&str]) -> Result<Vec<String>>;

    /// Attach a sensor reading to a task. `reading_type` is the ledger index.
    async fn save_reading(
        &self,
        machine_address: &str,
        task_id: TaskId,
        reading_type: u8,
        value: f64,
    ) -> Result<Receipt>;
}

/// Calls a process choreographer makes against its process contract.
#[async_trait]
pub trait ProcessLedger: Send + Sync {
    /// Move a process instance to `step`.
    async fn advance_step(&self, kind: ProcessKind, process_id: u64, step: u32) -> Result<Receipt>;

    /// Close a process instance with `result`.
    async fn finish_process(&self, kind: ProcessKind, process_id: u64, result: u8)
        -> Result<Receipt>;
}

/// Event source. Subscribing never blocks; events arrive on the returned handle.
pub trait LedgerEvents: Send + Sync {
    /// Open a subscription delivering events that pass `filter`.
    fn subscribe(&self, filter: EventFilter) -> Subscription;
}

#[async_trait]
impl<T: TaskLedger + ?Sized> TaskLedger for Arc<T> {
    async fn get_task_with_status(&self, event: &TaskAssigned) -> Result<Task> {
        (**self).get_task_with_status(event).await
    }

    async fn start_task(&self, machine_address: &str, event: &TaskAssigned) -> Result<Task> {
        (**self).start_task(machine_address, event).await
    }

    async fn finish_task(
        &self,
        machine_address: &str,
        task_id: TaskId,
        outcome: TaskOutcome,
        note: Option<&str>,
    ) -> Result<Receipt> {
        (**self)
            .finish_task(machine_address, task_id, outcome, note)
            .await
    }

    async fn finish_info_task(
        &self,
        machine_address: &str,
        task_id: TaskId,
        workpiece_id: &str,
        workpiece_type: &str,
    ) -> Result<Receipt> {
        (**self)
            .finish_info_task(machine_address, task_id, workpiece_id, workpiece_type)
            .await
    }

    async fn get_task_inputs(&self, task_id: TaskId, names: &[&str]) -> Result<Vec<String>> {
        (**self).get_task_inputs(task_id, names).await
    }

    async fn save_reading(
        &self,
        machine_address: &str,
        task_id: TaskId,
        reading_type: u8,
        value: f64,
    ) -> Result<Receipt> {
        (**self)
            .save_reading(machine_address, task_id, reading_type, value)
            .await
    }
}

#[async_trait]
impl<T: ProcessLedger + ?Sized> ProcessLedger for Arc<T> {
    async fn advance_step(&self, kind: ProcessKind, process_id: u64, step: u32) -> Result<Receipt> {
        (**self).advance_step(kind, process_id, step).await
    }

    async fn finish_process(
        &self,
        kind: ProcessKind,
        process_id: u64,
        result: u8,
    ) -> Result<Receipt> {
        (**self).finish_process(kind, process_id, result).await
    }
}

impl<T: LedgerEvents + ?Sized> LedgerEvents for Arc<T> {
    fn subscribe(&self, filter: EventFilter) -> Subscription {
        (**self).subscribe(filter)
    }
}
