//! ---
//! fab_section: "05-machine-clients"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Acknowledgement decoding and task correlation."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
//! Stateless mapping of device acknowledgements back to ledger tasks.
//!
//! No table of outstanding commands is kept: the device echoes the task
//! identity it was given, and that echo is the correlation key.

use fab_ledger::TaskId;
use thiserror::Error;

use crate::wire::{AckMessage, TaskCommand};

/// Failure to turn an ack payload into an [`AckMessage`].
#[derive(Debug, Error)]
pub enum CorrelationError {
    /// The payload is not a valid acknowledgement.
    #[error("malformed acknowledgement: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Task identity and outcome code carried by an acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckInfo {
    /// Task the acknowledgement refers to.
    pub task_id: TaskId,
    /// Product echoed from the command.
    pub product_did: String,
    /// Process instance echoed from the command.
    pub process_id: u64,
    /// Raw outcome code, interpreted per machine.
    pub code: u64,
}

impl AckInfo {
    /// True when this acknowledgement answers `command`.
    pub fn answers(&self, command: &TaskCommand) -> bool {
        self.task_id == command.task_id
            && self.product_did == command.product_did
            && self.process_id == command.process_id
    }
}

impl AckMessage {
    /// Identity and code, without the payload extras.
    pub fn info(&self) -> AckInfo {
        AckInfo {
            task_id: self.task_id,
            product_did: self.product_did.clone(),
            process_id: self.process_id,
            code: self.code,
        }
    }
}

/// Decode an acknowledgement payload.
pub fn decode_ack(payload: &[u8]) -> Result<AckMessage, CorrelationError> {
    Ok(serde_json::from_slice(payload)?)
}
