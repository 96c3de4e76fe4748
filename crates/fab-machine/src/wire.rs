//! ---
//! fab_section: "05-machine-clients"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Device command and acknowledgement wire formats."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
//! JSON shapes exchanged with the devices on the command and ack topics.
//!
//! Commands echo `taskID`, `productDID` and `processID` so the device can
//! hand them back unchanged in its acknowledgement.

use chrono::{SecondsFormat, Utc};
use fab_ledger::{Task, TaskId};
use serde::de::{Deserializer, Error as _};
use serde::{Deserialize, Serialize};

/// Device sound code played when an alert is raised.
pub const ALERT_SOUND: u8 = 2;

/// ISO-8601 timestamp with millisecond precision, as the devices expect.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Physical unit moved through the factory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workpiece {
    /// Colour of the workpiece (`white`, `red`, `blue`, ...).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Device-side workpiece identifier.
    #[serde(default)]
    pub id: String,
    /// Processing state, `RAW` when freshly delivered.
    #[serde(default)]
    pub status: String,
}

impl Workpiece {
    /// A freshly delivered workpiece about to be stored.
    pub fn raw(color: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: color.into(),
            id: id.into(),
            status: "RAW".to_owned(),
        }
    }

    /// Placeholder sent when the device chooses the workpiece itself.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Task identity echoed through every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHeader {
    /// Ledger task id.
    pub task_id: TaskId,
    /// Product the task works on, empty if none.
    pub product_did: String,
    /// Process instance that spawned the task, zero if none.
    pub process_id: u64,
}

impl From<&Task> for CommandHeader {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id,
            product_did: task.product_did.clone(),
            process_id: task.process_id,
        }
    }
}

/// Message published on a machine's command topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCommand {
    /// Send time.
    pub ts: String,
    /// Device command code.
    pub code: u8,
    /// Ledger task id.
    #[serde(rename = "taskID")]
    pub task_id: TaskId,
    /// Product the task works on.
    #[serde(rename = "productDID")]
    pub product_did: String,
    /// Spawning process instance.
    #[serde(rename = "processID")]
    pub process_id: u64,
    /// Workpiece to handle, for storage and retrieval tasks.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub workpiece: Option<Workpiece>,
    /// Colour the robot should pick after sorting.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub sort_type: Option<String>,
}

impl TaskCommand {
    /// Command `code` for the task in `header`, stamped now.
    pub fn new(code: u8, header: CommandHeader) -> Self {
        Self {
            ts: timestamp(),
            code,
            task_id: header.task_id,
            product_did: header.product_did,
            process_id: header.process_id,
            workpiece: None,
            sort_type: None,
        }
    }

    /// Attach the workpiece to handle.
    pub fn with_workpiece(mut self, workpiece: Workpiece) -> Self {
        self.workpiece = Some(workpiece);
        self
    }

    /// Attach the colour to pick.
    pub fn with_sort_type(mut self, sort_type: impl Into<String>) -> Self {
        self.sort_type = Some(sort_type.into());
        self
    }
}

/// Fixed command asking a device to play an alert sound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundCommand {
    /// Send time.
    pub ts: String,
    /// Sound number to play.
    pub sound: u8,
}

impl SoundCommand {
    /// The standard alert sound.
    pub fn alert() -> Self {
        Self {
            ts: timestamp(),
            sound: ALERT_SOUND,
        }
    }
}

/// Acknowledgement published by a device on its ack topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckMessage {
    /// Device timestamp, when present.
    #[serde(default)]
    pub ts: Option<String>,
    /// Outcome code, interpreted per machine.
    #[serde(deserialize_with = "lenient_u64")]
    pub code: u64,
    /// Task being acknowledged.
    #[serde(rename = "taskID", deserialize_with = "lenient_u64")]
    pub task_id: TaskId,
    /// Product echoed from the command.
    #[serde(rename = "productDID", default, deserialize_with = "lenient_string")]
    pub product_did: String,
    /// Process instance echoed from the command.
    #[serde(rename = "processID", default, deserialize_with = "lenient_u64")]
    pub process_id: u64,
    /// Workpiece reported by the device.
    #[serde(default)]
    pub workpiece: Option<Workpiece>,
    /// Sorting result reported by the sorting line.
    #[serde(rename = "type", default)]
    pub sort_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Integer(u64),
    Float(f64),
    Text(String),
}

/// Numbers, integral floats and numeric strings all decode; `null` becomes zero.
fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Lenient>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Lenient::Integer(value)) => Ok(value),
        Some(Lenient::Float(value)) if value >= 0.0 && value.fract() == 0.0 => Ok(value as u64),
        Some(Lenient::Float(value)) => Err(D::Error::custom(format!(
            "expected a non-negative integer, found {}",
            value
        ))),
        Some(Lenient::Text(text)) => text
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("expected a numeric string, found {:?}", text))),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Lenient>::deserialize(deserializer)? {
        None => String::new(),
        Some(Lenient::Integer(value)) => value.to_string(),
        Some(Lenient::Float(value)) => value.to_string(),
        Some(Lenient::Text(text)) => text,
    })
}
