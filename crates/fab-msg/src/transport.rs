//! ---
//! fab_section: "02-messaging"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Publish/subscribe bus client and topic registry."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, warn};

use crate::types::{BusEvent, BusMessage};
use crate::{BusError, Result};

const DEFAULT_CAPACITY: usize = 1024;

/// Transport abstraction used by the bus client.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand a message to the broker.
    async fn publish(&self, message: BusMessage) -> Result<()>;
    /// Start receiving messages whose topic matches `filter`.
    async fn subscribe(&self, filter: &str) -> Result<()>;
    /// Wait for the next event. `None` once the connection has been closed locally.
    async fn recv(&self) -> Option<BusEvent>;
    /// Close the connection.
    async fn disconnect(&self);
    /// Human-readable transport name for logging.
    fn name(&self) -> &'static str;
}

/// MQTT-style filter matching with `+` (one level) and `#` (remaining levels).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(expected), Some(actual)) if expected == actual => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn validate_filter(filter: &str) -> Result<()> {
    let levels: Vec<&str> = filter.split('/').collect();
    let hash_misplaced = levels
        .iter()
        .enumerate()
        .any(|(idx, level)| level.contains('#') && (*level != "#" || idx + 1 != levels.len()));
    let plus_misplaced = levels
        .iter()
        .any(|level| level.contains('+') && *level != "+");
    if filter.is_empty() || hash_misplaced || plus_misplaced {
        return Err(BusError::InvalidFilter(filter.to_owned()));
    }
    Ok(())
}

struct BrokerInner {
    url: String,
    sender: broadcast::Sender<BusMessage>,
    online: watch::Sender<bool>,
    refusals: AtomicUsize,
}

/// Process-local broker fanning every publication out to all connections.
///
/// Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    /// Create a broker reachable under `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_capacity(url, DEFAULT_CAPACITY)
    }

    /// Create a broker whose per-connection backlog holds `capacity` messages.
    pub fn with_capacity(url: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let (online, _) = watch::channel(true);
        Self {
            inner: Arc::new(BrokerInner {
                url: url.into(),
                sender,
                online,
                refusals: AtomicUsize::new(0),
            }),
        }
    }

    /// Broker URL.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Open a connection for `client_id`.
    pub fn connect(&self, client_id: impl Into<String>) -> Result<InMemoryConnection> {
        let client_id = client_id.into();
        let refused = self
            .inner
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused || !*self.inner.online.borrow() {
            debug!(client_id = %client_id, url = %self.inner.url, "connection refused");
            return Err(BusError::ConnectionRefused {
                url: self.inner.url.clone(),
            });
        }
        debug!(client_id = %client_id, url = %self.inner.url, "client connected");
        Ok(InMemoryConnection {
            client_id,
            broker: self.clone(),
            receiver: Mutex::new(self.inner.sender.subscribe()),
            offline: self.inner.online.subscribe(),
            filters: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Refuse the next `count` connection attempts, as an unreachable broker would.
    pub fn refuse_connections(&self, count: usize) {
        self.inner.refusals.store(count, Ordering::SeqCst);
    }

    /// Take the broker offline. Every open connection observes a disconnect.
    pub fn shutdown(&self) {
        self.inner.online.send_replace(false);
    }

    /// Whether the broker accepts connections and deliveries.
    pub fn is_online(&self) -> bool {
        *self.inner.online.borrow()
    }

    fn deliver(&self, message: BusMessage) -> Result<()> {
        if !self.is_online() {
            return Err(BusError::Disconnected);
        }
        // No receivers is not an error: the publication is simply unobserved.
        let _ = self.inner.sender.send(message);
        Ok(())
    }
}

/// A single client's connection to an [`InMemoryBroker`].
pub struct InMemoryConnection {
    client_id: String,
    broker: InMemoryBroker,
    receiver: Mutex<broadcast::Receiver<BusMessage>>,
    offline: watch::Receiver<bool>,
    filters: RwLock<Vec<String>>,
    closed: AtomicBool,
}

impl InMemoryConnection {
    /// Identifier supplied when connecting.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn is_subscribed(&self, topic: &str) -> bool {
        self.filters
            .read()
            .iter()
            .any(|filter| topic_matches(filter, topic))
    }

    fn close(&self, reason: &str) -> BusEvent {
        self.closed.store(true, Ordering::SeqCst);
        BusEvent::Disconnected {
            reason: reason.to_owned(),
        }
    }
}

#[async_trait]
impl Transport for InMemoryConnection {
    async fn publish(&self, message: BusMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Disconnected);
        }
        self.broker.deliver(message)
    }

    async fn subscribe(&self, filter: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Disconnected);
        }
        validate_filter(filter)?;
        let mut filters = self.filters.write();
        if !filters.iter().any(|existing| existing == filter) {
            filters.push(filter.to_owned());
        }
        Ok(())
    }

    async fn recv(&self) -> Option<BusEvent> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let mut receiver = self.receiver.lock().await;
        let mut offline = self.offline.clone();
        loop {
            if !*offline.borrow_and_update() {
                return Some(self.close("broker shut down"));
            }
            tokio::select! {
                changed = offline.changed() => {
                    if changed.is_err() {
                        return Some(self.close("broker dropped"));
                    }
                }
                received = receiver.recv() => match received {
                    Ok(message) => {
                        if self.is_subscribed(&message.topic) {
                            return Some(BusEvent::Message(message));
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(client_id = %self.client_id, skipped, "connection lagged; messages skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Some(self.close("broker dropped"));
                    }
                },
            }
        }
    }

    async fn disconnect(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(client_id = %self.client_id, "client disconnected");
        }
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
