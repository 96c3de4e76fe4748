//! ---
//! fab_section: "05-machine-clients"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Reactor task driving a machine client."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use std::sync::Arc;

use fab_common::{MachineKind, ReactorHandle};
use fab_ledger::{EventFilter, LedgerEvents, Subscription, TaskLedger};
use fab_msg::{BusClient, BusEvent};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::client::MachineClient;
use crate::protocols::{Hbw, MachineProtocol, Mpo, Sld, Vgr};
use crate::readings::ReadingsCache;
use crate::MachineError;

/// Everything a machine client needs besides its protocol.
#[derive(Clone)]
pub struct ClientWiring {
    /// Ledger address of the machine.
    pub address: String,
    /// Machine contract calls.
    pub ledger: Arc<dyn TaskLedger>,
    /// Connected bus handle.
    pub bus: BusClient,
    /// Shared sensor cache.
    pub readings: ReadingsCache,
    /// Also follow the dashboard state topics.
    pub subscribe_state: bool,
}

/// Run `client` until shutdown, kill, bus disconnect or ledger closure.
///
/// Each inbound event is handled on its own task; the reactor never waits
/// for a handler to finish.
pub fn spawn_machine_client<P: MachineProtocol>(
    client: Arc<MachineClient<P>>,
    mut events: Subscription,
    mut shutdown: broadcast::Receiver<()>,
) -> ReactorHandle {
    ReactorHandle::spawn(P::KIND.client_name(), |mut kill| async move {
        let machine = P::KIND;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!(%machine, "machine client shutdown received");
                    break;
                }
                _ = kill.wait() => {
                    warn!(%machine, "machine client kill switch triggered");
                    break;
                }
                event = client.bus().next_event() => {
                    match event {
                        Some(BusEvent::Message(message)) => {
                            let client = Arc::clone(&client);
                            tokio::spawn(async move { client.on_bus_message(message).await });
                        }
                        Some(BusEvent::Disconnected { reason }) => {
                            error!(%machine, %reason, "bus connection lost; machine client stopping");
                            break;
                        }
                        None => break,
                    }
                }
                event = events.next() => {
                    match event {
                        Some(event) => {
                            let client = Arc::clone(&client);
                            tokio::spawn(async move { client.on_ledger_event(event).await });
                        }
                        None => {
                            warn!(%machine, "ledger subscription closed; machine client stopping");
                            break;
                        }
                    }
                }
            }
        }
        debug!(%machine, "machine client reactor exited");
    })
}

/// Build a client for protocol `P`, subscribe it and start its reactor.
pub async fn start_machine_client<P: MachineProtocol>(
    wiring: ClientWiring,
    events: &dyn LedgerEvents,
    shutdown: broadcast::Receiver<()>,
) -> Result<(Arc<MachineClient<P>>, ReactorHandle), MachineError> {
    let client = Arc::new(
        MachineClient::<P>::new(wiring.address, wiring.ledger, wiring.bus, wiring.readings)
            .with_state_topics(wiring.subscribe_state),
    );
    client.subscribe_topics().await?;
    let subscription = events.subscribe(EventFilter::Machine(P::KIND));
    info!(
        machine = %P::KIND,
        client = P::KIND.client_name(),
        address = client.address(),
        "machine client listening"
    );
    let runtime = spawn_machine_client(Arc::clone(&client), subscription, shutdown);
    Ok((client, runtime))
}

/// Start the client for `kind`, selecting its protocol at runtime.
pub async fn launch_machine_client(
    kind: MachineKind,
    wiring: ClientWiring,
    events: &dyn LedgerEvents,
    shutdown: broadcast::Receiver<()>,
) -> Result<ReactorHandle, MachineError> {
    let runtime = match kind {
        MachineKind::Hbw => start_machine_client::<Hbw>(wiring, events, shutdown).await?.1,
        MachineKind::Vgr => start_machine_client::<Vgr>(wiring, events, shutdown).await?.1,
        MachineKind::Sld => start_machine_client::<Sld>(wiring, events, shutdown).await?.1,
        MachineKind::Mpo => start_machine_client::<Mpo>(wiring, events, shutdown).await?.1,
    };
    Ok(runtime)
}
