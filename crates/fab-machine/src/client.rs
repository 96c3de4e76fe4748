//! ---
//! fab_section: "05-machine-clients"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Generic machine client state machine."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
//! Task lifecycle for one machine: assigned, started, dispatched, finished.
//!
//! Handlers run concurrently. The only shared mutable state is the active
//! task id and the observable phase; the active task id is cleared with a
//! compare-and-swap keyed on the acknowledged task so a late or duplicate
//! acknowledgement never clears a newer task.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fab_common::MachineKind;
use fab_ledger::{
    Alert, LedgerError, LedgerEvent, ProductOperation, ReadingRequest, Receipt, Task, TaskAssigned,
    TaskId, TaskLedger, TaskOutcome, NO_TASK,
};
use fab_logging::{fab_debug, fab_error, fab_info, fab_warn, log_transaction, LogContext};
use fab_msg::{BusClient, BusError, BusMessage, MachineTopics, TopicRegistry};
use parking_lot::Mutex;

use crate::correlator::decode_ack;
use crate::protocols::{AckOutcome, MachineProtocol};
use crate::wire::{AckMessage, CommandHeader, SoundCommand};
use crate::MachineError;

/// Observable position of the client in the task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    /// No task in flight.
    Idle,
    /// Waiting for the ledger to accept `start_task`.
    TaskStarting,
    /// Command published, waiting for the device acknowledgement.
    TaskDispatched,
    /// Outcome known, finishing the task on the ledger.
    AwaitingFinalization,
}

/// Drives one machine: ledger events in, bus commands out, acknowledgements back to the ledger.
///
/// At most one task is in flight at a time.
pub struct MachineClient<P: MachineProtocol> {
    address: String,
    ledger: Arc<dyn TaskLedger>,
    bus: BusClient,
    readings: crate::ReadingsCache,
    topics: MachineTopics,
    subscribe_state: bool,
    current_task: AtomicU64,
    phase: Mutex<ClientPhase>,
    _protocol: PhantomData<fn() -> P>,
}

impl<P: MachineProtocol> MachineClient<P> {
    /// Build an idle client for protocol `P`.
    pub fn new(
        address: impl Into<String>,
        ledger: Arc<dyn TaskLedger>,
        bus: BusClient,
        readings: crate::ReadingsCache,
    ) -> Self {
        Self {
            address: address.into(),
            ledger,
            bus,
            readings,
            topics: TopicRegistry::machine(P::KIND),
            subscribe_state: false,
            current_task: AtomicU64::new(NO_TASK),
            phase: Mutex::new(ClientPhase::Idle),
            _protocol: PhantomData,
        }
    }

    /// Also follow the dashboard state and stock topics.
    pub fn with_state_topics(mut self, enabled: bool) -> Self {
        self.subscribe_state = enabled;
        self
    }

    /// Machine this client drives.
    pub fn kind(&self) -> MachineKind {
        P::KIND
    }

    /// Ledger address used to sign transactions.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Bus handle the client publishes on.
    pub fn bus(&self) -> &BusClient {
        &self.bus
    }

    /// Bus topics of this machine.
    pub fn topics(&self) -> MachineTopics {
        self.topics
    }

    /// Task currently driven by this client, or [`NO_TASK`].
    pub fn current_task_id(&self) -> TaskId {
        self.current_task.load(Ordering::SeqCst)
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ClientPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: ClientPhase) -> ClientPhase {
        std::mem::replace(&mut *self.phase.lock(), phase)
    }

    fn context(&self) -> LogContext<'_> {
        LogContext::for_client(P::KIND.client_name()).with_address(&self.address)
    }

    /// Subscribe to the ack topic, plus state and stock when enabled.
    pub async fn subscribe_topics(&self) -> Result<(), BusError> {
        for topic in self.topics.subscriptions(self.subscribe_state) {
            self.bus.subscribe(topic).await?;
        }
        Ok(())
    }

    /// Route a ledger event to its handler.
    pub async fn on_ledger_event(&self, event: LedgerEvent) {
        match event {
            LedgerEvent::TaskAssigned(assigned) => self.on_task_assigned(&assigned).await,
            LedgerEvent::NewReading(request) => self.on_reading_requested(&request).await,
            LedgerEvent::NewAlert(alert) => self.on_alert_raised(&alert).await,
            LedgerEvent::ProductOperationSaved(operation) => {
                self.on_product_operation_saved(&operation)
            }
            other => fab_debug!(
                context = self.context(),
                "Ignoring {} event",
                other.name()
            ),
        }
    }

    /// Claim the task if idle and ask the ledger to start it.
    ///
    /// Assignments arriving while another task is in flight are dropped.
    pub async fn on_task_assigned(&self, event: &TaskAssigned) {
        let context = self.context().with_task(event.task_id);
        match self.ledger.get_task_with_status(event).await {
            Ok(_) => {}
            Err(err @ (LedgerError::NotFound(_) | LedgerError::WrongStatus { .. })) => {
                fab_warn!(context = context, "Task is not assignable: {}", err);
                return;
            }
            Err(err) => {
                fab_error!(context = context, "Task status lookup failed: {}", err);
                return;
            }
        }

        let previous = self.set_phase(ClientPhase::TaskStarting);
        match self.ledger.start_task(&self.address, event).await {
            Ok(task) => {
                fab_info!(
                    context = context,
                    "Task {} started: {}",
                    task.task_id,
                    task.task_name
                );
                self.on_task_started(task).await;
            }
            Err(err) => {
                self.abandon_start(previous);
                fab_error!(context = context, "Starting task failed: {}", err);
            }
        }
    }

    /// Publish the device command for a started task.
    pub async fn on_task_started(&self, task: Task) {
        self.current_task.store(task.task_id, Ordering::SeqCst);
        if let Err(err) = self.dispatch(&task).await {
            fab_error!(
                context = self.context().with_task(task.task_id),
                "Task {} was not dispatched: {}",
                task.task_name,
                err
            );
        }
    }

    async fn dispatch(&self, task: &Task) -> Result<(), MachineError> {
        let kind: P::Task = task.task_name.parse()?;
        let required = P::required_inputs(kind);
        let inputs = if required.is_empty() {
            Vec::new()
        } else {
            let inputs = self.ledger.get_task_inputs(task.task_id, required).await?;
            if inputs.len() != required.len() {
                return Err(MachineError::MissingInputs {
                    task_id: task.task_id,
                    expected: required.len(),
                    returned: inputs.len(),
                });
            }
            inputs
        };

        let command = P::build_command(kind, CommandHeader::from(task), &inputs);
        fab_info!(
            context = self.context().with_task(task.task_id),
            "Sending {} command (code {}) to {}",
            kind,
            command.code,
            self.topics.command
        );
        self.bus.publish_json(self.topics.command, &command).await?;
        self.set_phase(ClientPhase::TaskDispatched);
        Ok(())
    }

    /// Resolve the in-flight task from a device acknowledgement.
    pub async fn on_ack_received(&self, ack: AckMessage) {
        let info = ack.info();
        let context = self.context().with_task(info.task_id);
        match P::classify(&ack) {
            AckOutcome::Progress => {
                fab_debug!(context = context, "Progress acknowledgement (code {})", info.code);
            }
            AckOutcome::Failure { note } => {
                self.finalizing(info.task_id);
                fab_warn!(context = context, "Task failed on device: {}", note);
                let result = self
                    .ledger
                    .finish_task(&self.address, info.task_id, TaskOutcome::Failure, Some(note))
                    .await;
                self.report_finish(&context, "Task finished with failure", result);
                self.release(info.task_id);
            }
            AckOutcome::Success => {
                self.finalizing(info.task_id);
                let result = self
                    .ledger
                    .finish_task(&self.address, info.task_id, TaskOutcome::Success, None)
                    .await;
                self.report_finish(&context, "Task finished", result);
                self.release(info.task_id);
            }
            AckOutcome::InfoResult {
                workpiece: Some(workpiece),
            } => {
                self.finalizing(info.task_id);
                let result = self
                    .ledger
                    .finish_info_task(&self.address, info.task_id, &workpiece.id, &workpiece.kind)
                    .await;
                let finished = result.is_ok();
                self.report_finish(&context, "Info task finished", result);
                if finished {
                    self.release(info.task_id);
                }
            }
            AckOutcome::InfoResult { workpiece: None } => {
                fab_warn!(
                    context = context,
                    "Identification acknowledgement without workpiece ignored"
                );
            }
        }
    }

    /// Undo `TaskStarting` after a refused start.
    ///
    /// An ack handled while the start was in flight may already have moved
    /// the phase on; in that case it is left alone. Otherwise the phase is
    /// derived from the active task so `Idle` always pairs with [`NO_TASK`].
    fn abandon_start(&self, previous: ClientPhase) {
        let mut phase = self.phase.lock();
        if *phase != ClientPhase::TaskStarting {
            return;
        }
        *phase = if self.current_task_id() == NO_TASK {
            ClientPhase::Idle
        } else {
            previous
        };
    }

    fn finalizing(&self, task_id: TaskId) {
        if self.current_task_id() == task_id {
            self.set_phase(ClientPhase::AwaitingFinalization);
        }
    }

    fn report_finish(&self, context: &LogContext<'_>, description: &str, result: fab_ledger::Result<Receipt>) {
        match result {
            Ok(receipt) => log_transaction(context, description, &receipt.tx_hash, receipt.block),
            Err(err) => fab_error!(context = *context, "Finishing task failed: {}", err),
        }
    }

    /// Clear the active task if it is still `task_id`.
    fn release(&self, task_id: TaskId) {
        match self.current_task.compare_exchange(
            task_id,
            NO_TASK,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                self.set_phase(ClientPhase::Idle);
            }
            Err(active) => fab_debug!(
                context = self.context().with_task(task_id),
                "Stale acknowledgement; active task {} unchanged",
                active
            ),
        }
    }

    /// Attach the latest cached reading to the active task.
    pub async fn on_reading_requested(&self, request: &ReadingRequest) {
        let task_id = self.current_task_id();
        let context = self.context().with_task(task_id);
        let Some(value) = self.readings.latest(request.reading_type) else {
            fab_warn!(
                context = context,
                "No {} reading cached yet; request skipped",
                request.reading_type
            );
            return;
        };

        match self
            .ledger
            .save_reading(&self.address, task_id, request.reading_type.index(), value)
            .await
        {
            Ok(receipt) => log_transaction(
                &context,
                &format!("New {} reading has been saved", request.reading_type),
                &receipt.tx_hash,
                receipt.block,
            ),
            Err(err) => fab_error!(context = context, "Saving reading failed: {}", err),
        }
    }

    /// Play the alert sound on the device.
    pub async fn on_alert_raised(&self, alert: &Alert) {
        let context = self.context();
        fab_info!(context = context, "New alert has been saved: {}", alert.reason);
        if let Err(err) = self
            .bus
            .publish_json(self.topics.command, &SoundCommand::alert())
            .await
        {
            fab_error!(context = context, "Alert sound was not sent: {}", err);
        }
    }

    /// Log a product operation recorded for this machine.
    pub fn on_product_operation_saved(&self, operation: &ProductOperation) {
        fab_debug!(
            context = self.context().with_task(operation.task_id),
            "Product operation {} on {}: {}",
            operation.operation,
            operation.product_did,
            operation.result
        );
    }

    /// Route a bus message by topic.
    pub async fn on_bus_message(&self, message: BusMessage) {
        if message.topic == self.topics.ack {
            match decode_ack(&message.payload) {
                Ok(ack) => {
                    fab_info!(
                        context = self.context().with_task(ack.task_id),
                        "Received Ack message (code {})",
                        ack.code
                    );
                    self.on_ack_received(ack).await;
                }
                Err(err) => fab_warn!(context = self.context(), "{}", err),
            }
        } else if Some(message.topic.as_str()) == self.topics.state
            || Some(message.topic.as_str()) == self.topics.stock
        {
            fab_debug!(
                context = self.context(),
                "{} update: {}",
                message.topic,
                message.payload_str()
            );
        } else {
            fab_debug!(context = self.context(), "Ignoring message on {}", message.topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::Sld;
    use fab_ledger::InMemoryLedger;
    use fab_msg::InMemoryBroker;

    fn client() -> MachineClient<Sld> {
        let broker = InMemoryBroker::new("memory://unit");
        let connection = broker.connect("sld-unit").unwrap();
        let bus = BusClient::new("sld-unit", Arc::new(connection));
        MachineClient::new(
            "0xSLD",
            Arc::new(InMemoryLedger::new()),
            bus,
            crate::ReadingsCache::new(),
        )
    }

    #[test]
    fn release_only_clears_matching_task() {
        let client = client();
        client.current_task.store(9, Ordering::SeqCst);
        client.set_phase(ClientPhase::TaskDispatched);

        client.release(8);
        assert_eq!(client.current_task_id(), 9);
        assert_eq!(client.phase(), ClientPhase::TaskDispatched);

        client.release(9);
        assert_eq!(client.current_task_id(), NO_TASK);
        assert_eq!(client.phase(), ClientPhase::Idle);
    }

    #[test]
    fn finalizing_ignores_other_tasks() {
        let client = client();
        client.current_task.store(4, Ordering::SeqCst);
        client.set_phase(ClientPhase::TaskDispatched);
        client.finalizing(3);
        assert_eq!(client.phase(), ClientPhase::TaskDispatched);
        client.finalizing(4);
        assert_eq!(client.phase(), ClientPhase::AwaitingFinalization);
    }

    #[tokio::test]
    async fn progress_ack_changes_nothing() {
        let client = client();
        client.current_task.store(5, Ordering::SeqCst);
        let ack: AckMessage =
            serde_json::from_value(serde_json::json!({ "code": 1, "taskID": 5 })).unwrap();
        client.on_ack_received(ack).await;
        assert_eq!(client.current_task_id(), 5);
    }
}
