//! ---
//! fab_section: "05-machine-clients"
//! fab_subsection: "tests"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Shared fixtures for machine client tests."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fab_common::MachineKind;
use fab_ledger::{
    LedgerError, Receipt, Result, Task, TaskAssigned, TaskId, TaskLedger, TaskOutcome, TaskStatus,
};
use fab_machine::{MachineClient, MachineProtocol, ReadingsCache, TaskCommand};
use fab_msg::{BusClient, BusEvent, InMemoryBroker, TopicRegistry};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Ledger call as observed by [`RecordingLedger`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start {
        address: String,
        task_id: TaskId,
    },
    Finish {
        task_id: TaskId,
        outcome: TaskOutcome,
        note: Option<String>,
    },
    FinishInfo {
        task_id: TaskId,
        workpiece_id: String,
        workpiece_type: String,
    },
    Inputs {
        task_id: TaskId,
        names: Vec<String>,
    },
    Reading {
        task_id: TaskId,
        reading_type: u8,
        value: f64,
    },
}

/// Scriptable ledger recording every write a client makes.
#[derive(Default)]
pub struct RecordingLedger {
    calls: Mutex<Vec<Call>>,
    pub status_checks: AtomicUsize,
    pub starts: AtomicUsize,
    unassignable: AtomicBool,
    reject_info: AtomicBool,
    refuse_starts: AtomicBool,
    start_gate: Mutex<Option<Arc<Notify>>>,
    inputs: Mutex<HashMap<String, String>>,
}

impl RecordingLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_input(&self, name: &str, value: &str) {
        self.inputs.lock().insert(name.to_owned(), value.to_owned());
    }

    pub fn mark_unassignable(&self) {
        self.unassignable.store(true, Ordering::SeqCst);
    }

    pub fn reject_info(&self) {
        self.reject_info.store(true, Ordering::SeqCst);
    }

    /// Later `start_task` calls fail with `WrongStatus`.
    pub fn refuse_starts(&self) {
        self.refuse_starts.store(true, Ordering::SeqCst);
    }

    /// Park later `start_task` calls until the returned gate is notified.
    pub fn hold_starts(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.start_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn finishes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Finish { .. } | Call::FinishInfo { .. }))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn receipt(&self) -> Receipt {
        let block = self.calls.lock().len() as u64;
        Receipt {
            tx_hash: format!("0x{:064x}", block),
            block,
        }
    }
}

fn task_from(event: &TaskAssigned, status: TaskStatus) -> Task {
    Task {
        task_id: event.task_id,
        machine: event.machine,
        task_name: event.task_name.clone(),
        product_did: event.product_did.clone(),
        process_id: event.process_id,
        process_contract: event.process_contract.clone(),
        status,
    }
}

#[async_trait]
impl TaskLedger for RecordingLedger {
    async fn get_task_with_status(&self, event: &TaskAssigned) -> Result<Task> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        if self.unassignable.load(Ordering::SeqCst) {
            return Err(LedgerError::WrongStatus {
                task_id: event.task_id,
                status: TaskStatus::Started,
            });
        }
        Ok(task_from(event, TaskStatus::Assigned))
    }

    async fn start_task(&self, machine_address: &str, event: &TaskAssigned) -> Result<Task> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.record(Call::Start {
            address: machine_address.to_owned(),
            task_id: event.task_id,
        });
        let gate = self.start_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.refuse_starts.load(Ordering::SeqCst) {
            return Err(LedgerError::WrongStatus {
                task_id: event.task_id,
                status: TaskStatus::Started,
            });
        }
        Ok(task_from(event, TaskStatus::Started))
    }

    async fn finish_task(
        &self,
        _machine_address: &str,
        task_id: TaskId,
        outcome: TaskOutcome,
        note: Option<&str>,
    ) -> Result<Receipt> {
        self.record(Call::Finish {
            task_id,
            outcome,
            note: note.map(str::to_owned),
        });
        Ok(self.receipt())
    }

    async fn finish_info_task(
        &self,
        _machine_address: &str,
        task_id: TaskId,
        workpiece_id: &str,
        workpiece_type: &str,
    ) -> Result<Receipt> {
        self.record(Call::FinishInfo {
            task_id,
            workpiece_id: workpiece_id.to_owned(),
            workpiece_type: workpiece_type.to_owned(),
        });
        if self.reject_info.load(Ordering::SeqCst) {
            return Err(LedgerError::Transaction("product not found".into()));
        }
        Ok(self.receipt())
    }

    async fn get_task_inputs(&self, task_id: TaskId, names: &[&str]) -> Result<Vec<String>> {
        self.record(Call::Inputs {
            task_id,
            names: names.iter().map(|name| name.to_string()).collect(),
        });
        let inputs = self.inputs.lock();
        Ok(names
            .iter()
            .filter_map(|name| inputs.get(*name).cloned())
            .collect())
    }

    async fn save_reading(
        &self,
        _machine_address: &str,
        task_id: TaskId,
        reading_type: u8,
        value: f64,
    ) -> Result<Receipt> {
        self.record(Call::Reading {
            task_id,
            reading_type,
            value,
        });
        Ok(self.receipt())
    }
}

pub fn assigned(machine: MachineKind, task_id: TaskId, task_name: &str) -> TaskAssigned {
    TaskAssigned {
        machine,
        task_id,
        task_name: task_name.to_owned(),
        product_did: format!("did:fab:{}", task_id),
        process_id: 1,
        process_contract: "0xSupplyingProcess".to_owned(),
    }
}

/// A client wired to `ledger` and a device-side bus handle on its command topic.
pub struct Harness<P: MachineProtocol> {
    pub client: MachineClient<P>,
    pub device: BusClient,
    pub readings: ReadingsCache,
}

pub async fn harness<P: MachineProtocol>(ledger: Arc<RecordingLedger>) -> anyhow::Result<Harness<P>> {
    let broker = InMemoryBroker::new("memory://machine-tests");
    let bus = BusClient::new("client", Arc::new(broker.connect("client")?));
    let device = BusClient::new("device", Arc::new(broker.connect("device")?));
    device
        .subscribe(TopicRegistry::machine(P::KIND).command)
        .await?;
    let readings = ReadingsCache::new();
    let client = MachineClient::<P>::new(
        format!("0x{}Machine", P::KIND.symbol()),
        ledger,
        bus,
        readings.clone(),
    );
    Ok(Harness {
        client,
        device,
        readings,
    })
}

/// Next JSON message the device sees, within a second.
pub async fn next_json(device: &BusClient) -> anyhow::Result<serde_json::Value> {
    match tokio::time::timeout(Duration::from_secs(1), device.next_event()).await? {
        Some(BusEvent::Message(message)) => Ok(message.decode()?),
        other => anyhow::bail!("unexpected bus event {:?}", other),
    }
}

pub async fn next_command(device: &BusClient) -> anyhow::Result<TaskCommand> {
    Ok(serde_json::from_value(next_json(device).await?)?)
}

/// True when nothing reaches the device for a short while.
pub async fn stays_quiet(device: &BusClient) -> bool {
    tokio::time::timeout(Duration::from_millis(100), device.next_event())
        .await
        .is_err()
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> anyhow::Result<()> {
    for _ in 0..200 {
        if condition() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("condition not reached in time")
}
