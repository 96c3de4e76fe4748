//! ---
//! fab_section: "02-messaging"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Publish/subscribe bus client and topic registry."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fab_common::{Retrier, RetryPolicy};
use serde::Serialize;
use tracing::{info, warn};

use crate::logging::{log_message, MessageDirection};
use crate::transport::{InMemoryBroker, Transport};
use crate::types::{BusEvent, BusMessage};
use crate::{BusError, Result};

/// Snapshot of bus activity counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BusMetrics {
    /// Messages handed to the transport.
    pub sent: u64,
    /// Messages received from the transport.
    pub received: u64,
    /// Publications that failed.
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> BusMetrics {
        BusMetrics {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// JSON-speaking wrapper around a [`Transport`] with activity logging and counters.
///
/// Cloning shares the underlying connection.
#[derive(Clone)]
pub struct BusClient {
    client_id: Arc<str>,
    transport: Arc<dyn Transport>,
    counters: Arc<Counters>,
}

impl BusClient {
    /// Wrap an already established transport.
    pub fn new(client_id: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            client_id: Arc::from(client_id.into()),
            transport,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Connect to `broker`, retrying refused attempts under `policy`.
    ///
    /// Only the initial connection is retried. Losing an established
    /// connection is reported once through [`BusEvent::Disconnected`].
    pub async fn connect(
        broker: &InMemoryBroker,
        client_id: impl Into<String>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let client_id = client_id.into();
        let retrier = Retrier::new(policy);
        let connection = retrier
            .run(
                "bus.connect",
                |_| {
                    let attempt_id = client_id.clone();
                    async move { broker.connect(attempt_id) }
                },
                BusError::is_transient,
            )
            .await?;
        info!(client_id = %client_id, url = %broker.url(), "bus client connected");
        Ok(Self::new(client_id, Arc::new(connection)))
    }

    /// Identifier of this client on the bus.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Subscribe to a topic filter.
    pub async fn subscribe(&self, filter: &str) -> Result<()> {
        self.transport.subscribe(filter).await?;
        tracing::debug!(client_id = %self.client_id, filter, "subscribed");
        Ok(())
    }

    /// Publish a prepared message.
    pub async fn publish(&self, message: BusMessage) -> Result<()> {
        match self.transport.publish(message.clone()).await {
            Ok(()) => {
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
                log_message(&self.client_id, MessageDirection::Outbound, &message);
                Ok(())
            }
            Err(err) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                log_message(&self.client_id, MessageDirection::Dropped, &message);
                warn!(
                    client_id = %self.client_id,
                    transport = self.transport.name(),
                    topic = %message.topic,
                    error = %err,
                    "publish failed"
                );
                Err(err)
            }
        }
    }

    /// Serialize `value` as JSON and publish it on `topic`.
    pub async fn publish_json<T: Serialize + ?Sized>(&self, topic: &str, value: &T) -> Result<()> {
        self.publish(BusMessage::json(topic, value)?).await
    }

    /// Wait for the next bus event.
    pub async fn next_event(&self) -> Option<BusEvent> {
        let event = self.transport.recv().await?;
        match &event {
            BusEvent::Message(message) => {
                self.counters.received.fetch_add(1, Ordering::Relaxed);
                log_message(&self.client_id, MessageDirection::Inbound, message);
            }
            BusEvent::Disconnected { reason } => {
                warn!(client_id = %self.client_id, reason = %reason, "bus connection lost");
            }
        }
        Some(event)
    }

    /// Close the underlying connection.
    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
    }

    /// Return the current counters snapshot.
    pub fn metrics(&self) -> BusMetrics {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn fast_retry(attempts: usize) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::ZERO)
    }

    #[tokio::test]
    async fn publish_and_receive_update_counters() {
        let broker = InMemoryBroker::new("memory://test");
        let device = BusClient::connect(&broker, "device", fast_retry(1)).await.unwrap();
        let client = BusClient::connect(&broker, "client", fast_retry(1)).await.unwrap();
        device.subscribe("fl/hbw/do").await.unwrap();

        client
            .publish_json("fl/hbw/do", &json!({ "code": 2, "taskID": 1 }))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), device.next_event())
            .await
            .unwrap()
            .unwrap();
        let BusEvent::Message(message) = event else {
            panic!("expected a message");
        };
        let value: serde_json::Value = message.decode().unwrap();
        assert_eq!(value["taskID"], 1);
        assert_eq!(client.metrics().sent, 1);
        assert_eq!(device.metrics().received, 1);
    }

    #[tokio::test]
    async fn connect_retries_refused_attempts() {
        let broker = InMemoryBroker::new("memory://test");
        broker.refuse_connections(2);
        let client = BusClient::connect(&broker, "retrying", fast_retry(3)).await;
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn connect_gives_up_after_policy_exhausted() {
        let broker = InMemoryBroker::new("memory://test");
        broker.refuse_connections(5);
        let client = BusClient::connect(&broker, "impatient", fast_retry(2)).await;
        assert!(matches!(client, Err(BusError::ConnectionRefused { .. })));
    }

    #[tokio::test]
    async fn failed_publish_counts_as_dropped() {
        let broker = InMemoryBroker::new("memory://test");
        let client = BusClient::connect(&broker, "client", fast_retry(1)).await.unwrap();
        client.disconnect().await;
        assert!(client.publish_json("fl/vgr/do", &json!({})).await.is_err());
        assert_eq!(client.metrics().dropped, 1);
    }
}
