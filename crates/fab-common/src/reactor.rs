//! ---
//! fab_section: "01-core-functionality"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Handle for long-running reactor tasks with a per-task kill switch."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Receiving side of a [`ReactorHandle`] kill switch.
pub struct KillSwitch {
    rx: watch::Receiver<bool>,
}

impl KillSwitch {
    /// Resolves once the switch is flipped or every handle has been dropped.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Cloneable handle to a spawned reactor task.
#[derive(Clone)]
pub struct ReactorHandle {
    name: Arc<str>,
    kill_tx: Arc<watch::Sender<bool>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ReactorHandle {
    /// Spawn `body` on the runtime, handing it the kill switch for this handle.
    pub fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(KillSwitch) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (kill_tx, rx) = watch::channel(false);
        let task = tokio::spawn(body(KillSwitch { rx }));
        Self {
            name: Arc::from(name.into()),
            kill_tx: Arc::new(kill_tx),
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    /// Name given at spawn.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop this reactor without touching any other.
    pub fn kill(&self) {
        let _ = self.kill_tx.send(true);
    }

    /// True once the task ended or was joined.
    pub fn is_finished(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map_or(true, |task| task.is_finished())
    }

    /// Wait for the task to end. Later calls return at once.
    pub async fn join(&self) {
        let handle = self.task.lock().take();
        if let Some(task) = handle {
            if let Err(err) = task.await {
                warn!(reactor = %self.name, error = %err, "reactor join error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn kill_stops_the_task() {
        let handle = ReactorHandle::spawn("idle", |mut kill| async move {
            kill.wait().await;
        });
        assert!(!handle.is_finished());
        handle.kill();
        tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .unwrap();
        assert!(handle.is_finished());
        assert_eq!(handle.name(), "idle");
    }

    #[tokio::test]
    async fn dropping_every_handle_releases_the_task() {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let handle = ReactorHandle::spawn("orphan", |mut kill| async move {
            kill.wait().await;
            let _ = done_tx.send(());
        });
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), done_rx)
            .await
            .unwrap()
            .unwrap();
    }
}
