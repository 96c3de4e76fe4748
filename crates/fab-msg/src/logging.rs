//! ---
//! fab_section: "02-messaging"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Publish/subscribe bus client and topic registry."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use tracing::debug;

use crate::types::BusMessage;

/// Direction of the message movement, used for consistent logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// Message published by this client.
    Outbound,
    /// Message received on one of this client's subscriptions.
    Inbound,
    /// Message the broker refused or the connection could not carry.
    Dropped,
}

/// Emit a structured log entry for bus activity.
pub fn log_message(client_id: &str, direction: MessageDirection, message: &BusMessage) {
    debug!(
        client_id,
        message_id = %message.id,
        timestamp = %message.timestamp,
        topic = %message.topic,
        bytes = message.payload.len(),
        direction = ?direction,
        "bus activity"
    );
}
