//! ---
//! fab_section: "02-messaging"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Publish/subscribe bus client and topic registry."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Message bus plumbing shared by machine clients, the simulator, and the daemon.

/// Bus client handle.
pub mod client;
/// Structured logging of bus traffic.
pub mod logging;
/// Topic names per machine.
pub mod topics;
/// Broker transports.
pub mod transport;
/// Message and error types.
pub mod types;

/// Shared result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Failures raised by the bus client and transports.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The broker refused or could not accept a connection.
    #[error("connection to {url} refused")]
    ConnectionRefused {
        /// Broker URL the client attempted to reach.
        url: String,
    },
    /// The connection was closed locally or by the broker.
    #[error("bus connection closed")]
    Disconnected,
    /// A subscription filter is not a valid topic filter.
    #[error("invalid topic filter: {0}")]
    InvalidFilter(String),
    /// Wrapper for JSON serialization or deserialization problems.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BusError {
    /// Whether a later connection attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BusError::ConnectionRefused { .. })
    }
}

pub use client::{BusClient, BusMetrics};
pub use logging::{log_message, MessageDirection};
pub use topics::{MachineTopics, TopicRegistry, BRIGHTNESS_TOPIC, ENVIRONMENT_TOPIC};
pub use transport::{topic_matches, InMemoryBroker, InMemoryConnection, Transport};
pub use types::{BusEvent, BusMessage};
