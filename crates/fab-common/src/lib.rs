//! ---
//! fab_section: "01-core-functionality"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Shared primitives and utilities for the factory runtime."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Core shared primitives for the factory orchestration workspace.
//! This crate exposes the machine/process catalog, configuration loading,
//! tracing initialisation, the retry policy, and the reactor handle consumed
//! across the workspace.

/// Machines, processes and their topics.
pub mod catalog;
/// Configuration loading.
pub mod config;
/// Subscriber installation.
pub mod logging;
/// Named background tasks.
pub mod reactor;
/// Backoff with jitter.
pub mod retry;

pub use catalog::{MachineKind, ProcessKind};
pub use config::{
    AppConfig, BrokerConfig, LedgerConfig, LoggingConfig, MachineConfig, Mode, ProcessConfig,
    RetryConfig, SimulationConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use reactor::{KillSwitch, ReactorHandle};
pub use retry::{Retrier, RetryPolicy};
