//! ---
//! fab_section: "02-messaging"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Publish/subscribe bus client and topic registry."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::Result;

/// A single publication travelling through the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    /// Identifier used to follow the message through the logs.
    pub id: Uuid,
    /// Wire topic the message was published on.
    pub topic: String,
    /// Raw payload bytes (JSON for every topic in this workspace).
    pub payload: Vec<u8>,
    /// Time the message was handed to the broker.
    pub timestamp: DateTime<Utc>,
}

impl BusMessage {
    /// Construct a message for `topic` carrying `payload`.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload: payload.into(),
            timestamp: Utc::now(),
        }
    }

    /// Serialize `value` as JSON into a new message.
    pub fn json<T: Serialize + ?Sized>(topic: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self::new(topic, serde_json::to_vec(value)?))
    }

    /// Decode the payload as JSON.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Payload interpreted as UTF-8, lossy.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Item yielded by a transport receive loop.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// A message matching one of the connection's subscriptions.
    Message(BusMessage),
    /// The established connection was lost. No further events follow.
    Disconnected {
        /// Human-readable cause.
        reason: String,
    },
}
