//! ---
//! fab_section: "07-simulation"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Bus-connected factory simulator."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{Context, Result};
use fab_common::{MachineKind, ReactorHandle, SimulationConfig};
use fab_msg::{BusClient, BusEvent, BusMessage, TopicRegistry};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::devices::DeviceModel;

/// Plays all four devices: listens on the command topics and answers on the
/// ack topics.
pub struct FactorySimulator {
    bus: BusClient,
    model: DeviceModel,
    faults: Mutex<HashMap<MachineKind, VecDeque<u64>>>,
}

impl FactorySimulator {
    /// Simulator publishing through `bus`.
    pub fn new(bus: BusClient, config: &SimulationConfig) -> Self {
        Self {
            bus,
            model: DeviceModel::from(config),
            faults: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to every machine command topic.
    pub async fn subscribe(&self) -> Result<()> {
        for kind in MachineKind::ALL {
            let topic = TopicRegistry::machine(kind).command;
            self.bus
                .subscribe(topic)
                .await
                .with_context(|| format!("subscribing simulator to {}", topic))?;
        }
        Ok(())
    }

    /// Answer the next task command for `kind` with `code` instead of success.
    pub fn inject_fault(&self, kind: MachineKind, code: u64) {
        self.faults.lock().entry(kind).or_default().push_back(code);
    }

    fn take_fault(&self, kind: MachineKind) -> Option<u64> {
        self.faults.lock().get_mut(&kind).and_then(VecDeque::pop_front)
    }

    fn handle_command(&self, message: &BusMessage) {
        let Some(kind) = TopicRegistry::machine_for_command(&message.topic) else {
            return;
        };
        let command: Value = match message.decode() {
            Ok(command) => command,
            Err(err) => {
                warn!(topic = %message.topic, error = %err, "simulator ignored malformed command");
                return;
            }
        };
        info!(machine = %kind, command = %command, "Received task for {}", message.topic);

        let fault = if command.get("taskID").is_some() {
            self.take_fault(kind)
        } else {
            None
        };
        for ack in self.model.respond(kind, &command, fault) {
            let bus = self.bus.clone();
            tokio::spawn(async move {
                tokio::time::sleep(ack.delay).await;
                info!(topic = ack.topic, code = %ack.payload["code"], "Sending ack message");
                if let Err(err) = bus.publish_json(ack.topic, &ack.payload).await {
                    warn!(topic = ack.topic, error = %err, "simulated ack not published");
                }
            });
        }
    }
}

/// Run `simulator` until shutdown, kill or bus loss.
pub fn spawn_factory_simulator(
    simulator: Arc<FactorySimulator>,
    mut shutdown: broadcast::Receiver<()>,
) -> ReactorHandle {
    ReactorHandle::spawn("FactorySimulator", move |mut kill| async move {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = kill.wait() => break,
                event = simulator.bus.next_event() => match event {
                    Some(BusEvent::Message(message)) => simulator.handle_command(&message),
                    Some(BusEvent::Disconnected { .. }) | None => break,
                },
            }
        }
        debug!("factory simulator stopped");
    })
}
