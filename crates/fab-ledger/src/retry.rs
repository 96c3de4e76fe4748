//! ---
//! fab_section: "04-ledger-adapter"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Retry wrapper for transient ledger failures."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use async_trait::async_trait;
use fab_common::{ProcessKind, Retrier, RetryPolicy};

use crate::events::{EventFilter, Subscription, TaskAssigned};
use crate::types::{Receipt, Task, TaskId, TaskOutcome};
use crate::{LedgerError, LedgerEvents, ProcessLedger, Result, TaskLedger};

/// Wraps a ledger and repeats calls that failed with [`LedgerError::Unavailable`].
///
/// Business rejections pass through on the first attempt. With the default
/// single-attempt policy the wrapper is transparent.
pub struct RetryingLedger<L> {
    inner: L,
    retrier: Retrier,
}

impl<L> RetryingLedger<L> {
    /// Wrap `inner`, retrying transient failures per `policy`.
    pub fn new(inner: L, policy: RetryPolicy) -> Self {
        Self {
            inner,
            retrier: Retrier::new(policy),
        }
    }

    /// The wrapped ledger.
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Backoff in use.
    pub fn policy(&self) -> RetryPolicy {
        self.retrier.policy()
    }
}

#[async_trait]
impl<L: TaskLedger> TaskLedger for RetryingLedger<L> {
    async fn get_task_with_status(&self, event: &TaskAssigned) -> Result<Task> {
        self.retrier
            .run(
                "ledger.get_task_with_status",
                move |_| self.inner.get_task_with_status(event),
                LedgerError::is_transient,
            )
            .await
    }

    async fn start_task(&self, machine_address: &str, event: &TaskAssigned) -> Result<Task> {
        self.retrier
            .run(
                "ledger.start_task",
                move |_| self.inner.start_task(machine_address, event),
                LedgerError::is_transient,
            )
            .await
    }

    async fn finish_task(
        &self,
        machine_address: &str,
        task_id: TaskId,
        outcome: TaskOutcome,
        note: Option<&str>,
    ) -> Result<Receipt> {
        self.retrier
            .run(
                "ledger.finish_task",
                move |_| self.inner.finish_task(machine_address, task_id, outcome, note),
                LedgerError::is_transient,
            )
            .await
    }

    async fn finish_info_task(
        &self,
        machine_address: &str,
        task_id: TaskId,
        workpiece_id: &str,
        workpiece_type: &str,
    ) -> Result<Receipt> {
        self.retrier
            .run(
                "ledger.finish_info_task",
                move |_| {
                    self.inner
                        .finish_info_task(machine_address, task_id, workpiece_id, workpiece_type)
                },
                LedgerError::is_transient,
            )
            .await
    }

    async fn get_task_inputs(&self, task_id: TaskId, names: &[&str]) -> Result<Vec<String>> {
        self.retrier
            .run(
                "ledger.get_task_inputs",
                move |_| self.inner.get_task_inputs(task_id, names),
                LedgerError::is_transient,
            )
            .await
    }

    async fn save_reading(
        &self,
        machine_address: &str,
        task_id: TaskId,
        reading_type: u8,
        value: f64,
    ) -> Result<Receipt> {
        self.retrier
            .run(
                "ledger.save_reading",
                move |_| {
                    self.inner
                        .save_reading(machine_address, task_id, reading_type, value)
                },
                LedgerError::is_transient,
            )
            .await
    }
}

#[async_trait]
impl<L: ProcessLedger> ProcessLedger for RetryingLedger<L> {
    async fn advance_step(&self, kind: ProcessKind, process_id: u64, step: u32) -> Result<Receipt> {
        self.retrier
            .run(
                "ledger.advance_step",
                move |_| self.inner.advance_step(kind, process_id, step),
                LedgerError::is_transient,
            )
            .await
    }

    async fn finish_process(
        &self,
        kind: ProcessKind,
        process_id: u64,
        result: u8,
    ) -> Result<Receipt> {
        self.retrier
            .run(
                "ledger.finish_process",
                move |_| self.inner.finish_process(kind, process_id, result),
                LedgerError::is_transient,
            )
            .await
    }
}

impl<L: LedgerEvents> LedgerEvents for RetryingLedger<L> {
    fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.inner.subscribe(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fab_common::MachineKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails with `Unavailable` a fixed number of times, then with the configured result.
    struct FlakyLedger {
        outages: usize,
        calls: AtomicUsize,
        reject: bool,
    }

    impl FlakyLedger {
        fn new(outages: usize, reject: bool) -> Self {
            Self {
                outages,
                calls: AtomicUsize::new(0),
                reject,
            }
        }

        fn answer(&self) -> Result<Receipt> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.outages {
                return Err(LedgerError::Unavailable("rpc timeout".into()));
            }
            if self.reject {
                return Err(LedgerError::Transaction("already finished".into()));
            }
            Ok(Receipt {
                tx_hash: "0x01".into(),
                block: 1,
            })
        }
    }

    #[async_trait]
    impl TaskLedger for FlakyLedger {
        async fn get_task_with_status(&self, event: &TaskAssigned) -> Result<Task> {
            Err(LedgerError::NotFound(format!("task {}", event.task_id)))
        }

        async fn start_task(&self, _: &str, event: &TaskAssigned) -> Result<Task> {
            Err(LedgerError::NotFound(format!("task {}", event.task_id)))
        }

        async fn finish_task(
            &self,
            _: &str,
            _: TaskId,
            _: TaskOutcome,
            _: Option<&str>,
        ) -> Result<Receipt> {
            self.answer()
        }

        async fn finish_info_task(&self, _: &str, _: TaskId, _: &str, _: &str) -> Result<Receipt> {
            self.answer()
        }

        async fn get_task_inputs(&self, _: TaskId, names: &[&str]) -> Result<Vec<String>> {
            Ok(names.iter().map(|name| name.to_string()).collect())
        }

        async fn save_reading(&self, _: &str, _: TaskId, _: u8, _: f64) -> Result<Receipt> {
            self.answer()
        }
    }

    fn policy(attempts: usize) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::ZERO)
    }

    #[tokio::test]
    async fn transient_failures_are_retried_within_policy() {
        let ledger = RetryingLedger::new(FlakyLedger::new(2, false), policy(3));
        let receipt = ledger
            .finish_task("0xHBW", 4, TaskOutcome::Success, None)
            .await
            .unwrap();
        assert_eq!(receipt.block, 1);
        assert_eq!(ledger.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn default_policy_never_repeats_a_call() {
        let ledger = RetryingLedger::new(FlakyLedger::new(1, false), RetryPolicy::default());
        let err = ledger.save_reading("0xHBW", 9, 0, 23.5).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(ledger.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejections_are_not_retried() {
        let ledger = RetryingLedger::new(FlakyLedger::new(0, true), policy(5));
        let err = ledger
            .finish_info_task("0xVGR", 5, "2222", "green")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Transaction(_)));
        assert_eq!(ledger.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inputs_pass_through() {
        let ledger = RetryingLedger::new(FlakyLedger::new(0, false), policy(1));
        let inputs = ledger.get_task_inputs(7, &["color", "id"]).await.unwrap();
        assert_eq!(inputs, vec!["color", "id"]);
        let event = TaskAssigned {
            machine: MachineKind::Hbw,
            task_id: 7,
            task_name: "StoreProduct".into(),
            product_did: "P1".into(),
            process_id: 0,
            process_contract: String::new(),
        };
        assert!(matches!(
            ledger.get_task_with_status(&event).await,
            Err(LedgerError::NotFound(_))
        ));
    }
}
