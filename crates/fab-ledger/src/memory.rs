//! ---
//! fab_section: "04-ledger-adapter"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "In-memory reference ledger modelling the machine and process contracts."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
//! Reference ledger used by the daemon in simulation mode and by tests.
//!
//! It models only the contract behaviour the clients observe: task status
//! transitions, task inputs derived from product operations, readings,
//! sequential process steps and the events each write emits. There is no
//! consensus, signing or persistence.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use fab_common::{MachineKind, ProcessKind};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::events::{
    Alert, EventFilter, LedgerEvent, ProcessStarted, ProductOperation, ReadingRequest,
    Subscription, TaskAssigned, TaskFinished,
};
use crate::types::{ReadingType, Receipt, Task, TaskId, TaskOutcome, TaskStatus, NO_TASK};
use crate::{LedgerError, LedgerEvents, ProcessLedger, Result, TaskLedger};

const EVENT_CAPACITY: usize = 256;

/// Product operation written when a workpiece colour is detected.
pub const COLOR_DETECTION: &str = "ColorDetection";
/// Product operation written when a workpiece NFC tag is read.
pub const NFC_TAG_READING: &str = "NFCTagReading";

/// Task each process step assigns, per process kind.
fn planned_task(kind: ProcessKind, step: u32) -> Option<(MachineKind, &'static str)> {
    match (kind, step) {
        (ProcessKind::Supplying, 1) => Some((MachineKind::Vgr, "GetInfo")),
        (ProcessKind::Supplying, 2) => Some((MachineKind::Hbw, "FetchContainer")),
        (ProcessKind::Supplying, 3) => Some((MachineKind::Vgr, "DropToHBW")),
        (ProcessKind::Supplying, 4) => Some((MachineKind::Hbw, "StoreProduct")),
        (ProcessKind::Production, 1) => Some((MachineKind::Hbw, "FetchProduct")),
        (ProcessKind::Production, 2) => Some((MachineKind::Vgr, "MoveHBW2MPO")),
        (ProcessKind::Production, 3) => Some((MachineKind::Mpo, "Processing")),
        (ProcessKind::Production, 4) => Some((MachineKind::Sld, "Sorting")),
        (ProcessKind::Production, 5) => Some((MachineKind::Vgr, "PickSorted")),
        _ => None,
    }
}

/// Task parameters derived from product operations: (input name, operation).
fn derived_inputs(task_name: &str) -> &'static [(&'static str, &'static str)] {
    match task_name {
        "StoreProduct" => &[("color", COLOR_DETECTION), ("id", NFC_TAG_READING)],
        "PickSorted" => &[("color", COLOR_DETECTION)],
        _ => &[],
    }
}

/// Stored task together with its parameters and finishing note.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    /// Current task state.
    pub task: Task,
    /// Task parameters by name.
    pub inputs: IndexMap<String, String>,
    /// Note recorded when the task finished.
    pub note: Option<String>,
}

/// A reading saved against a task.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRecord {
    /// Machine that saved it.
    pub machine: MachineKind,
    /// Task it was attached to.
    pub task_id: TaskId,
    /// Quantity.
    pub reading_type: ReadingType,
    /// Value.
    pub value: f64,
}

/// State of one process instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    /// Process type.
    pub kind: ProcessKind,
    /// Instance id.
    pub process_id: u64,
    /// Product the process works on.
    pub product_did: String,
    /// Last step advanced to; zero before the first step.
    pub step: u32,
    /// Result code once finished.
    pub result: Option<u8>,
}

#[derive(Default)]
struct State {
    next_task_id: TaskId,
    next_process_id: u64,
    block: u64,
    machines: IndexMap<MachineKind, String>,
    process_contracts: IndexMap<ProcessKind, String>,
    tasks: IndexMap<TaskId, TaskRecord>,
    products: IndexMap<String, IndexMap<String, String>>,
    readings: Vec<ReadingRecord>,
    processes: IndexMap<(ProcessKind, u64), ProcessRecord>,
}

impl State {
    fn receipt(&mut self) -> Receipt {
        self.block += 1;
        Receipt {
            tx_hash: format!("0x{}", Uuid::new_v4().simple()),
            block: self.block,
        }
    }

    fn authorize(&self, machine: MachineKind, address: &str) -> Result<()> {
        match self.machines.get(&machine) {
            Some(registered) if registered == address => Ok(()),
            _ => Err(LedgerError::Unauthorized(address.to_owned())),
        }
    }

    fn machine_for_address(&self, address: &str) -> Result<MachineKind> {
        self.machines
            .iter()
            .find(|(_, registered)| registered.as_str() == address)
            .map(|(kind, _)| *kind)
            .ok_or_else(|| LedgerError::Unauthorized(address.to_owned()))
    }

    fn task_mut(&mut self, task_id: TaskId) -> Result<&mut TaskRecord> {
        self.tasks
            .get_mut(&task_id)
            .ok_or_else(|| LedgerError::NotFound(format!("task {}", task_id)))
    }

    fn assign(
        &mut self,
        machine: MachineKind,
        task_name: &'static str,
        product_did: &str,
        process_id: u64,
        process_contract: &str,
    ) -> TaskAssigned {
        self.next_task_id += 1;
        let task_id = self.next_task_id;
        let operations = self.products.get(product_did);
        let inputs = derived_inputs(task_name)
            .iter()
            .map(|(input, operation)| {
                let value = operations
                    .and_then(|ops| ops.get(*operation))
                    .cloned()
                    .unwrap_or_default();
                ((*input).to_owned(), value)
            })
            .collect();
        let task = Task {
            task_id,
            machine,
            task_name: task_name.to_owned(),
            product_did: product_did.to_owned(),
            process_id,
            process_contract: process_contract.to_owned(),
            status: TaskStatus::Assigned,
        };
        self.tasks.insert(
            task_id,
            TaskRecord {
                task,
                inputs,
                note: None,
            },
        );
        debug!(%machine, task_id, task_name, product_did, process_id, "task assigned");
        TaskAssigned {
            machine,
            task_id,
            task_name: task_name.to_owned(),
            product_did: product_did.to_owned(),
            process_id,
            process_contract: process_contract.to_owned(),
        }
    }

    fn record_operation(
        &mut self,
        machine: MachineKind,
        task_id: TaskId,
        product_did: &str,
        operation: &str,
        result: &str,
    ) -> ProductOperation {
        self.products
            .entry(product_did.to_owned())
            .or_default()
            .insert(operation.to_owned(), result.to_owned());
        ProductOperation {
            machine,
            task_id,
            product_did: product_did.to_owned(),
            operation: operation.to_owned(),
            result: result.to_owned(),
        }
    }

    fn finish(
        &mut self,
        machine_address: &str,
        task_id: TaskId,
        outcome: TaskOutcome,
        note: Option<&str>,
    ) -> Result<TaskFinished> {
        let machine = self.task_mut(task_id)?.task.machine;
        self.authorize(machine, machine_address)?;
        let record = self.task_mut(task_id)?;
        if record.task.status != TaskStatus::Started {
            return Err(LedgerError::WrongStatus {
                task_id,
                status: record.task.status,
            });
        }
        record.task.status = TaskStatus::Finished(outcome);
        record.note = note.map(str::to_owned);
        debug!(%machine, task_id, %outcome, note = note.unwrap_or(""), "task finished");
        Ok(TaskFinished {
            machine,
            task_id,
            task_name: record.task.task_name.clone(),
            process_id: record.task.process_id,
            process_contract: record.task.process_contract.clone(),
            outcome,
        })
    }
}

/// Reference ledger holding every contract's state behind one lock.
pub struct InMemoryLedger {
    state: Mutex<State>,
    events: broadcast::Sender<LedgerEvent>,
    outages: AtomicUsize,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(State::default()),
            events,
            outages: AtomicUsize::new(0),
        }
    }

    fn emit(&self, events: impl IntoIterator<Item = LedgerEvent>) {
        for event in events {
            debug!(event = event.name(), "ledger event emitted");
            // Without subscribers the event is simply unobserved.
            let _ = self.events.send(event);
        }
    }

    fn check_available(&self) -> Result<()> {
        let outage = self
            .outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if outage {
            return Err(LedgerError::Unavailable("injected outage".into()));
        }
        Ok(())
    }

    /// Fail the next `count` adapter calls with [`LedgerError::Unavailable`].
    pub fn inject_outages(&self, count: usize) {
        self.outages.store(count, Ordering::SeqCst);
    }

    /// Bind a machine kind to the address allowed to act for it.
    pub fn register_machine(&self, machine: MachineKind, address: impl Into<String>) {
        self.state.lock().machines.insert(machine, address.into());
    }

    /// Bind a process kind to its contract address.
    pub fn register_process_contract(&self, kind: ProcessKind, contract: impl Into<String>) {
        self.state.lock().process_contracts.insert(kind, contract.into());
    }

    /// Assign a task by ledger task type (1-based) and emit `TaskAssigned`.
    pub fn assign_task(
        &self,
        machine: MachineKind,
        task_type: u8,
        product_did: &str,
        process_id: u64,
        process_contract: &str,
    ) -> Result<TaskId> {
        let task_name =
            machine
                .task_type_name(task_type)
                .ok_or_else(|| LedgerError::UnknownTaskType {
                    machine: machine.symbol().to_owned(),
                    task_type: task_type.to_string(),
                })?;
        let event = self.state.lock().assign(
            machine,
            task_name,
            product_did,
            process_id,
            process_contract,
        );
        let task_id = event.task_id;
        self.emit([LedgerEvent::TaskAssigned(event)]);
        Ok(task_id)
    }

    /// Overwrite a task parameter.
    pub fn set_task_input(&self, task_id: TaskId, name: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        state
            .task_mut(task_id)?
            .inputs
            .insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    /// Record a product operation and emit `ProductOperationSaved`.
    pub fn save_product_operation(
        &self,
        machine: MachineKind,
        task_id: TaskId,
        product_did: &str,
        operation: &str,
        result: &str,
    ) -> Receipt {
        let (receipt, saved) = {
            let mut state = self.state.lock();
            let saved = state.record_operation(machine, task_id, product_did, operation, result);
            (state.receipt(), saved)
        };
        self.emit([LedgerEvent::ProductOperationSaved(saved)]);
        receipt
    }

    /// Create a process instance for `product_did` and emit `ProcessStarted`.
    pub fn start_process(&self, kind: ProcessKind, product_did: &str) -> Result<u64> {
        let started = {
            let mut state = self.state.lock();
            let contract = state
                .process_contracts
                .get(&kind)
                .cloned()
                .ok_or_else(|| LedgerError::NotFound(format!("{} process contract", kind)))?;
            state.next_process_id += 1;
            let process_id = state.next_process_id;
            state.processes.insert(
                (kind, process_id),
                ProcessRecord {
                    kind,
                    process_id,
                    product_did: product_did.to_owned(),
                    step: 0,
                    result: None,
                },
            );
            ProcessStarted {
                kind,
                process_id,
                process_contract: contract,
                product_did: product_did.to_owned(),
            }
        };
        let process_id = started.process_id;
        self.emit([LedgerEvent::ProcessStarted(started)]);
        Ok(process_id)
    }

    /// Emit `NewAlert` for a machine.
    pub fn raise_alert(&self, machine: MachineKind, reason: &str) {
        self.emit([LedgerEvent::NewAlert(Alert {
            machine,
            reason: reason.to_owned(),
        })]);
    }

    /// Emit `NewReading`, asking `machine` to attach a reading to its current task.
    pub fn request_reading(&self, machine: MachineKind, reading_type: ReadingType) {
        self.emit([LedgerEvent::NewReading(ReadingRequest {
            machine,
            reading_type,
        })]);
    }

    /// Snapshot of a stored task.
    pub fn task(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.state.lock().tasks.get(&task_id).cloned()
    }

    /// Every task, in assignment order.
    pub fn tasks(&self) -> Vec<TaskRecord> {
        self.state.lock().tasks.values().cloned().collect()
    }

    /// Every saved reading, oldest first.
    pub fn readings(&self) -> Vec<ReadingRecord> {
        self.state.lock().readings.clone()
    }

    /// Snapshot of a process instance.
    pub fn process(&self, kind: ProcessKind, process_id: u64) -> Option<ProcessRecord> {
        self.state.lock().processes.get(&(kind, process_id)).cloned()
    }

    /// Operations recorded on a product, in insertion order.
    pub fn product_operations(&self, product_did: &str) -> IndexMap<String, String> {
        self.state
            .lock()
            .products
            .get(product_did)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TaskLedger for InMemoryLedger {
    async fn get_task_with_status(&self, event: &TaskAssigned) -> Result<Task> {
        self.check_available()?;
        let state = self.state.lock();
        let record = state
            .tasks
            .get(&event.task_id)
            .filter(|record| record.task.machine == event.machine)
            .ok_or_else(|| LedgerError::NotFound(format!("task {}", event.task_id)))?;
        if record.task.status != TaskStatus::Assigned {
            return Err(LedgerError::WrongStatus {
                task_id: event.task_id,
                status: record.task.status,
            });
        }
        Ok(record.task.clone())
    }

    async fn start_task(&self, machine_address: &str, event: &TaskAssigned) -> Result<Task> {
        self.check_available()?;
        let mut state = self.state.lock();
        let machine = state.task_mut(event.task_id)?.task.machine;
        state.authorize(machine, machine_address)?;
        let record = state.task_mut(event.task_id)?;
        if record.task.status != TaskStatus::Assigned {
            return Err(LedgerError::WrongStatus {
                task_id: event.task_id,
                status: record.task.status,
            });
        }
        record.task.status = TaskStatus::Started;
        debug!(%machine, task_id = event.task_id, "task started");
        Ok(record.task.clone())
    }

    async fn finish_task(
        &self,
        machine_address: &str,
        task_id: TaskId,
        outcome: TaskOutcome,
        note: Option<&str>,
    ) -> Result<Receipt> {
        self.check_available()?;
        let (receipt, finished) = {
            let mut state = self.state.lock();
            let finished = state.finish(machine_address, task_id, outcome, note)?;
            (state.receipt(), finished)
        };
        self.emit([LedgerEvent::TaskFinished(finished)]);
        Ok(receipt)
    }

    async fn finish_info_task(
        &self,
        machine_address: &str,
        task_id: TaskId,
        workpiece_id: &str,
        workpiece_type: &str,
    ) -> Result<Receipt> {
        self.check_available()?;
        let (receipt, events) = {
            let mut state = self.state.lock();
            let finished = state.finish(machine_address, task_id, TaskOutcome::Success, None)?;
            let product_did = state.task_mut(task_id)?.task.product_did.clone();
            let mut events = Vec::with_capacity(3);
            if !product_did.is_empty() {
                let machine = finished.machine;
                events.push(LedgerEvent::ProductOperationSaved(state.record_operation(
                    machine,
                    task_id,
                    &product_did,
                    COLOR_DETECTION,
                    workpiece_type,
                )));
                events.push(LedgerEvent::ProductOperationSaved(state.record_operation(
                    machine,
                    task_id,
                    &product_did,
                    NFC_TAG_READING,
                    workpiece_id,
                )));
            }
            events.push(LedgerEvent::TaskFinished(finished));
            (state.receipt(), events)
        };
        self.emit(events);
        Ok(receipt)
    }

    async fn get_task_inputs(&self, task_id: TaskId, names: &[&str]) -> Result<Vec<String>> {
        self.check_available()?;
        let state = self.state.lock();
        let record = state
            .tasks
            .get(&task_id)
            .ok_or_else(|| LedgerError::NotFound(format!("task {}", task_id)))?;
        Ok(names
            .iter()
            .map(|name| record.inputs.get(*name).cloned().unwrap_or_default())
            .collect())
    }

    async fn save_reading(
        &self,
        machine_address: &str,
        task_id: TaskId,
        reading_type: u8,
        value: f64,
    ) -> Result<Receipt> {
        self.check_available()?;
        let mut state = self.state.lock();
        let machine = state.machine_for_address(machine_address)?;
        let reading_type = ReadingType::from_index(reading_type)
            .ok_or_else(|| LedgerError::Transaction(format!("invalid reading type {}", reading_type)))?;
        if task_id != NO_TASK && !state.tasks.contains_key(&task_id) {
            return Err(LedgerError::NotFound(format!("task {}", task_id)));
        }
        state.readings.push(ReadingRecord {
            machine,
            task_id,
            reading_type,
            value,
        });
        debug!(%machine, task_id, %reading_type, value, "reading saved");
        Ok(state.receipt())
    }
}

#[async_trait]
impl ProcessLedger for InMemoryLedger {
    async fn advance_step(&self, kind: ProcessKind, process_id: u64, step: u32) -> Result<Receipt> {
        self.check_available()?;
        let (receipt, assigned) = {
            let mut state = self.state.lock();
            let contract = state
                .process_contracts
                .get(&kind)
                .cloned()
                .unwrap_or_default();
            let record = state
                .processes
                .get_mut(&(kind, process_id))
                .ok_or_else(|| LedgerError::NotFound(format!("{} process {}", kind, process_id)))?;
            if record.result.is_some() {
                return Err(LedgerError::Transaction(format!(
                    "{} process {} already finished",
                    kind, process_id
                )));
            }
            if step != record.step + 1 {
                return Err(LedgerError::WrongStep {
                    process_id,
                    expected: record.step + 1,
                    requested: step,
                });
            }
            let (machine, task_name) = planned_task(kind, step).ok_or_else(|| {
                LedgerError::Transaction(format!("{} process has no step {}", kind, step))
            })?;
            record.step = step;
            let product_did = record.product_did.clone();
            let assigned = state.assign(machine, task_name, &product_did, process_id, &contract);
            debug!(%kind, process_id, step, "process advanced");
            (state.receipt(), assigned)
        };
        self.emit([LedgerEvent::TaskAssigned(assigned)]);
        Ok(receipt)
    }

    async fn finish_process(
        &self,
        kind: ProcessKind,
        process_id: u64,
        result: u8,
    ) -> Result<Receipt> {
        self.check_available()?;
        let mut state = self.state.lock();
        let record = state
            .processes
            .get_mut(&(kind, process_id))
            .ok_or_else(|| LedgerError::NotFound(format!("{} process {}", kind, process_id)))?;
        if record.result.is_some() {
            return Err(LedgerError::Transaction(format!(
                "{} process {} already finished",
                kind, process_id
            )));
        }
        record.result = Some(result);
        debug!(%kind, process_id, result, "process finished");
        Ok(state.receipt())
    }
}

impl LedgerEvents for InMemoryLedger {
    fn subscribe(&self, filter: EventFilter) -> Subscription {
        Subscription::new(filter, self.events.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> InMemoryLedger {
        let ledger = InMemoryLedger::new();
        ledger.register_machine(MachineKind::Hbw, "0xHBW");
        ledger.register_machine(MachineKind::Vgr, "0xVGR");
        ledger.register_process_contract(ProcessKind::Supplying, "0xSupplying");
        ledger
    }

    fn assigned_event(ledger: &InMemoryLedger, task_id: TaskId) -> TaskAssigned {
        let task = ledger.task(task_id).unwrap().task;
        TaskAssigned {
            machine: task.machine,
            task_id,
            task_name: task.task_name,
            product_did: task.product_did,
            process_id: task.process_id,
            process_contract: task.process_contract,
        }
    }

    #[test]
    fn unknown_task_type_is_rejected() {
        let ledger = ledger();
        let err = ledger
            .assign_task(MachineKind::Hbw, 100, "", 0, "")
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownTaskType { .. }));
        assert!(err.to_string().starts_with("Unknown Task Type."));
    }

    #[tokio::test]
    async fn task_lifecycle_enforces_status() {
        let ledger = ledger();
        let task_id = ledger.assign_task(MachineKind::Hbw, 1, "", 0, "").unwrap();
        let event = assigned_event(&ledger, task_id);

        assert_eq!(ledger.get_task_with_status(&event).await.unwrap().task_name, "FetchContainer");
        assert!(matches!(
            ledger.start_task("0xVGR", &event).await,
            Err(LedgerError::Unauthorized(_))
        ));
        ledger.start_task("0xHBW", &event).await.unwrap();
        assert!(matches!(
            ledger.get_task_with_status(&event).await,
            Err(LedgerError::WrongStatus { .. })
        ));

        ledger
            .finish_task("0xHBW", task_id, TaskOutcome::Failure, Some("No empty container"))
            .await
            .unwrap();
        let record = ledger.task(task_id).unwrap();
        assert_eq!(record.task.status, TaskStatus::Finished(TaskOutcome::Failure));
        assert_eq!(record.note.as_deref(), Some("No empty container"));

        assert!(matches!(
            ledger
                .finish_task("0xHBW", task_id, TaskOutcome::Success, None)
                .await,
            Err(LedgerError::WrongStatus { .. })
        ));
    }

    #[tokio::test]
    async fn info_task_records_product_operations_and_feeds_store_inputs() {
        let ledger = ledger();
        let mut events = ledger.subscribe(EventFilter::All);
        let info = ledger.assign_task(MachineKind::Vgr, 1, "P1", 0, "").unwrap();
        ledger
            .start_task("0xVGR", &assigned_event(&ledger, info))
            .await
            .unwrap();
        ledger
            .finish_info_task("0xVGR", info, "123", "orange")
            .await
            .unwrap();

        let ops = ledger.product_operations("P1");
        assert_eq!(ops.get(COLOR_DETECTION).map(String::as_str), Some("orange"));
        assert_eq!(ops.get(NFC_TAG_READING).map(String::as_str), Some("123"));

        let store = ledger.assign_task(MachineKind::Hbw, 3, "P1", 0, "").unwrap();
        let inputs = ledger.get_task_inputs(store, &["color", "id"]).await.unwrap();
        assert_eq!(inputs, vec!["orange", "123"]);

        let names: Vec<&str> = [
            events.next().await.unwrap(),
            events.next().await.unwrap(),
            events.next().await.unwrap(),
            events.next().await.unwrap(),
        ]
        .iter()
        .map(LedgerEvent::name)
        .collect();
        assert_eq!(
            names,
            vec![
                "TaskAssigned",
                "ProductOperationSaved",
                "ProductOperationSaved",
                "TaskFinished"
            ]
        );
    }

    #[tokio::test]
    async fn task_inputs_can_be_overridden() {
        let ledger = ledger();
        let store = ledger.assign_task(MachineKind::Hbw, 3, "P2", 0, "").unwrap();
        assert_eq!(
            ledger.get_task_inputs(store, &["color", "id"]).await.unwrap(),
            vec!["", ""]
        );

        ledger.set_task_input(store, "color", "blue").unwrap();
        ledger.set_task_input(store, "id", "77").unwrap();
        assert_eq!(
            ledger.get_task_inputs(store, &["color", "id"]).await.unwrap(),
            vec!["blue", "77"]
        );
        assert!(matches!(
            ledger.set_task_input(999, "color", "red"),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn readings_accept_task_zero() {
        let ledger = ledger();
        ledger.save_reading("0xHBW", NO_TASK, 0, 21.0).await.unwrap();
        assert!(matches!(
            ledger.save_reading("0xNOBODY", NO_TASK, 0, 21.0).await,
            Err(LedgerError::Unauthorized(_))
        ));
        let readings = ledger.readings();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].reading_type, ReadingType::Temperature);
        assert_eq!(readings[0].task_id, NO_TASK);
    }

    #[tokio::test]
    async fn process_steps_are_sequential() {
        let ledger = ledger();
        let process_id = ledger.start_process(ProcessKind::Supplying, "P9").unwrap();
        assert!(matches!(
            ledger.advance_step(ProcessKind::Supplying, process_id, 2).await,
            Err(LedgerError::WrongStep { expected: 1, .. })
        ));
        ledger
            .advance_step(ProcessKind::Supplying, process_id, 1)
            .await
            .unwrap();
        let assigned = ledger.tasks().pop().unwrap().task;
        assert_eq!(assigned.machine, MachineKind::Vgr);
        assert_eq!(assigned.task_name, "GetInfo");
        assert_eq!(assigned.process_contract, "0xSupplying");
        assert_eq!(assigned.product_did, "P9");

        ledger
            .finish_process(ProcessKind::Supplying, process_id, 1)
            .await
            .unwrap();
        assert_eq!(
            ledger.process(ProcessKind::Supplying, process_id).unwrap().result,
            Some(1)
        );
        assert!(ledger
            .advance_step(ProcessKind::Supplying, process_id, 2)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn injected_outages_are_transient() {
        let ledger = ledger();
        ledger.inject_outages(1);
        let err = ledger.save_reading("0xHBW", NO_TASK, 4, 300.0).await.unwrap_err();
        assert!(err.is_transient());
        ledger.save_reading("0xHBW", NO_TASK, 4, 300.0).await.unwrap();
    }
}
