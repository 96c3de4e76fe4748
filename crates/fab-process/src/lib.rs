//! ---
//! fab_section: "06-process-choreography"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Process choreographers for multi-machine workflows."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Supplying and production choreographers.
//!
//! A choreographer reacts to `ProcessStarted` for its kind and to
//! `TaskFinished` events raised under its contract, asking the ledger to
//! advance or close the process according to a fixed rule table.

/// Event handling for one process kind.
pub mod choreographer;
/// Step tables.
pub mod plan;
/// Reactor wiring.
pub mod runtime;

pub use choreographer::ProcessChoreographer;
pub use plan::{PlanRule, ProcessPlan, StepAction, PROCESS_COMPLETED};
pub use runtime::{launch_choreographer, spawn_choreographer};
