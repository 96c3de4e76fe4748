//! ---
//! fab_section: "04-ledger-adapter"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Ledger data model shared by clients and the reference ledger."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use fab_common::MachineKind;
use serde::{Deserialize, Serialize};

/// Ledger-assigned task identifier.
pub type TaskId = u64;

/// Reserved identifier meaning "no active task".
pub const NO_TASK: TaskId = 0;

/// Final outcome recorded for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskOutcome {
    /// Code 2.
    Success,
    /// Code 3.
    Failure,
}

impl TaskOutcome {
    /// Numeric code used by the ledger contracts.
    pub fn code(&self) -> u8 {
        match self {
            TaskOutcome::Success => 2,
            TaskOutcome::Failure => 3,
        }
    }

    /// Inverse of [`TaskOutcome::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            2 => Some(TaskOutcome::Success),
            3 => Some(TaskOutcome::Failure),
            _ => None,
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Success => f.write_str("success"),
            TaskOutcome::Failure => f.write_str("failure"),
        }
    }
}

/// Lifecycle position of a task on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Created, not yet started.
    Assigned,
    /// A machine accepted it.
    Started,
    /// Closed with an outcome.
    Finished(TaskOutcome),
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Assigned => f.write_str("assigned"),
            TaskStatus::Started => f.write_str("started"),
            TaskStatus::Finished(outcome) => write!(f, "finished({})", outcome),
        }
    }
}

/// Authoritative task record as returned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Ledger task id, never [`NO_TASK`].
    pub task_id: TaskId,
    /// Machine that owns the task.
    pub machine: MachineKind,
    /// Task type name.
    pub task_name: String,
    /// Empty when the task is not bound to a product.
    pub product_did: String,
    /// Zero when no process spawned the task.
    pub process_id: u64,
    /// Contract of the spawning process.
    pub process_contract: String,
    /// Lifecycle position.
    pub status: TaskStatus,
}

/// Sensor quantities the ledger can ask a machine to attach to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReadingType {
    /// Degrees Celsius.
    Temperature,
    /// Relative humidity, percent.
    Humidity,
    /// hPa.
    AirPressure,
    /// Ohm.
    GasResistance,
    /// Percent.
    Brightness,
    /// Indoor air quality index.
    AirQuality,
}

impl ReadingType {
    /// All reading types in ledger index order.
    pub const ALL: [ReadingType; 6] = [
        ReadingType::Temperature,
        ReadingType::Humidity,
        ReadingType::AirPressure,
        ReadingType::GasResistance,
        ReadingType::Brightness,
        ReadingType::AirQuality,
    ];

    /// Index used by the ledger's reading type enumeration.
    pub fn index(&self) -> u8 {
        match self {
            ReadingType::Temperature => 0,
            ReadingType::Humidity => 1,
            ReadingType::AirPressure => 2,
            ReadingType::GasResistance => 3,
            ReadingType::Brightness => 4,
            ReadingType::AirQuality => 5,
        }
    }

    /// Inverse of [`ReadingType::index`].
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    /// Snake-case name used in logs and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingType::Temperature => "temperature",
            ReadingType::Humidity => "humidity",
            ReadingType::AirPressure => "air_pressure",
            ReadingType::GasResistance => "gas_resistance",
            ReadingType::Brightness => "brightness",
            ReadingType::AirQuality => "air_quality",
        }
    }
}

impl fmt::Display for ReadingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "temperature" => Ok(ReadingType::Temperature),
            "humidity" => Ok(ReadingType::Humidity),
            "airpressure" => Ok(ReadingType::AirPressure),
            "gasresistance" => Ok(ReadingType::GasResistance),
            "brightness" => Ok(ReadingType::Brightness),
            "airquality" => Ok(ReadingType::AirQuality),
            _ => Err(format!("unknown reading type: {}", s)),
        }
    }
}

/// Confirmation of a ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Transaction hash.
    pub tx_hash: String,
    /// Block the transaction landed in.
    pub block: u64,
}
