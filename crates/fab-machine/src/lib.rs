//! ---
//! fab_section: "05-machine-clients"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Machine client state machines and their runtime."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Machine clients bridge ledger task events and device commands.
//!
//! A client reacts to `TaskAssigned` for its machine by starting the task on
//! the ledger, publishes the device command, and finishes the task when the
//! device acknowledges it. Sensor readings requested by the ledger are served
//! from a local [`ReadingsCache`].

/// Per-machine task lifecycle.
pub mod client;
/// Acknowledgement decoding and matching.
pub mod correlator;
/// Machine-specific task tables and ack interpretation.
pub mod protocols;
/// Latest sensor values.
pub mod readings;
/// Reactor wiring for machine clients.
pub mod runtime;
/// Bus payloads.
pub mod wire;

use fab_ledger::{LedgerError, TaskId};
use fab_msg::BusError;
use thiserror::Error;

pub use client::{ClientPhase, MachineClient};
pub use correlator::{decode_ack, AckInfo, CorrelationError};
pub use protocols::{
    AckOutcome, Hbw, HbwTask, MachineProtocol, Mpo, MpoTask, Sld, SldTask, UnknownTaskName, Vgr,
    VgrTask,
};
pub use readings::{spawn_readings_feed, ReadingsCache};
pub use runtime::{
    launch_machine_client, spawn_machine_client, start_machine_client, ClientWiring,
};
pub use wire::{AckMessage, CommandHeader, SoundCommand, TaskCommand, Workpiece};

/// Errors raised while driving a machine.
#[derive(Debug, Error)]
pub enum MachineError {
    /// Ledger task name has no entry in the machine's task table.
    #[error(transparent)]
    UnknownTask(#[from] UnknownTaskName),
    /// A ledger call was rejected or failed.
    #[error("ledger call failed: {0}")]
    Ledger(#[from] LedgerError),
    /// Publishing or subscribing on the bus failed.
    #[error("bus operation failed: {0}")]
    Bus(#[from] BusError),
    /// An acknowledgement could not be decoded.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    /// The ledger returned fewer task parameters than the task needs.
    #[error("task {task_id} needs {expected} inputs, ledger returned {returned}")]
    MissingInputs {
        /// Task whose parameters were requested.
        task_id: TaskId,
        /// Parameters the task needs.
        expected: usize,
        /// Parameters the ledger returned.
        returned: usize,
    },
    /// A sensor frame did not match its schema.
    #[error("sensor frame on {topic} could not be decoded: {source}")]
    SensorFrame {
        /// Topic the frame arrived on.
        topic: String,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },
}
