//! ---
//! fab_section: "06-process-choreography"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Reactor task driving a process choreographer."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use std::sync::Arc;

use fab_common::ReactorHandle;
use fab_ledger::{EventFilter, LedgerEvents, ProcessLedger, Subscription};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::choreographer::ProcessChoreographer;
use crate::plan::ProcessPlan;

/// Run `choreographer` over `events` until shutdown, kill or subscription end.
pub fn spawn_choreographer(
    choreographer: Arc<ProcessChoreographer>,
    mut events: Subscription,
    mut shutdown: broadcast::Receiver<()>,
) -> ReactorHandle {
    let kind = choreographer.plan().kind();
    ReactorHandle::spawn(kind.client_name(), move |mut kill| async move {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!(process = %kind, "choreographer shutdown received");
                    break;
                }
                _ = kill.wait() => {
                    warn!(process = %kind, "choreographer kill switch triggered");
                    break;
                }
                event = events.next() => {
                    match event {
                        Some(event) => {
                            let choreographer = Arc::clone(&choreographer);
                            tokio::spawn(async move { choreographer.on_event(event).await });
                        }
                        None => {
                            warn!(process = %kind, "ledger subscription closed; choreographer stopping");
                            break;
                        }
                    }
                }
            }
        }
        debug!(process = %kind, "choreographer reactor exited");
    })
}

/// Subscribe a choreographer for `plan` and start it.
pub fn launch_choreographer(
    plan: ProcessPlan,
    ledger: Arc<dyn ProcessLedger>,
    events: &dyn LedgerEvents,
    shutdown: broadcast::Receiver<()>,
) -> ReactorHandle {
    let subscription = events.subscribe(EventFilter::Process(plan.kind()));
    info!(
        process = %plan.kind(),
        client = plan.kind().client_name(),
        contract = plan.contract(),
        "process choreographer listening"
    );
    let choreographer = Arc::new(ProcessChoreographer::new(plan, ledger));
    spawn_choreographer(choreographer, subscription, shutdown)
}
