//! ---
//! fab_section: "01-core-functionality"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Shared primitives and utilities for the factory runtime."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

const HBW_TASKS: &[&str] = &[
    "FetchContainer",
    "StoreContainer",
    "StoreProduct",
    "FetchProduct",
];
const VGR_TASKS: &[&str] = &["GetInfo", "DropToHBW", "MoveHBW2MPO", "PickSorted"];
const SLD_TASKS: &[&str] = &["Sorting"];
const MPO_TASKS: &[&str] = &["Processing"];

/// Machine types present on the factory floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineKind {
    /// High-bay warehouse (storage-and-retrieval unit).
    Hbw,
    /// Vacuum gripper robot moving workpieces between stations.
    Vgr,
    /// Sorting line with colour detection.
    Sld,
    /// Multi-processing station with oven.
    Mpo,
}

impl MachineKind {
    /// All machines in start-up order.
    pub const ALL: [MachineKind; 4] = [
        MachineKind::Hbw,
        MachineKind::Vgr,
        MachineKind::Sld,
        MachineKind::Mpo,
    ];

    /// Upper-case symbol used by the ledger contracts.
    pub fn symbol(&self) -> &'static str {
        match self {
            MachineKind::Hbw => "HBW",
            MachineKind::Vgr => "VGR",
            MachineKind::Sld => "SLD",
            MachineKind::Mpo => "MPO",
        }
    }

    /// Name of the client driving this machine, used as the log source.
    pub fn client_name(&self) -> &'static str {
        match self {
            MachineKind::Hbw => "HBWClient",
            MachineKind::Vgr => "VGRClient",
            MachineKind::Sld => "SLDClient",
            MachineKind::Mpo => "MPOClient",
        }
    }

    /// Task names accepted by the machine, ordered by ledger task type (1-based).
    pub fn task_catalog(&self) -> &'static [&'static str] {
        match self {
            MachineKind::Hbw => HBW_TASKS,
            MachineKind::Vgr => VGR_TASKS,
            MachineKind::Sld => SLD_TASKS,
            MachineKind::Mpo => MPO_TASKS,
        }
    }

    /// Resolve a ledger task type number into its task name.
    pub fn task_type_name(&self, task_type: u8) -> Option<&'static str> {
        let index = usize::from(task_type).checked_sub(1)?;
        self.task_catalog().get(index).copied()
    }

    /// Reverse lookup of [`MachineKind::task_type_name`].
    pub fn task_type_of(&self, task_name: &str) -> Option<u8> {
        self.task_catalog()
            .iter()
            .position(|name| *name == task_name)
            .and_then(|index| u8::try_from(index + 1).ok())
    }
}

impl fmt::Display for MachineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl std::str::FromStr for MachineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hbw" => Ok(MachineKind::Hbw),
            "vgr" => Ok(MachineKind::Vgr),
            "sld" => Ok(MachineKind::Sld),
            "mpo" => Ok(MachineKind::Mpo),
            other => Err(format!("unknown machine kind: {}", other)),
        }
    }
}

/// Multi-machine workflows choreographed on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessKind {
    /// Raw workpiece intake: identify, fetch container, drop, store.
    Supplying,
    /// Fetch a stored workpiece, process, sort and pick it.
    Production,
}

impl ProcessKind {
    /// Client name used in logs.
    pub fn client_name(&self) -> &'static str {
        match self {
            ProcessKind::Supplying => "SLPClient",
            ProcessKind::Production => "PLPClient",
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKind::Supplying => f.write_str("supplying"),
            ProcessKind::Production => f.write_str("production"),
        }
    }
}
