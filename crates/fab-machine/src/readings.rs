//! ---
//! fab_section: "05-machine-clients"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Latest sensor readings cache and its bus feed."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
//! Latest-value cache for environment sensor readings.

use std::collections::HashMap;
use std::sync::Arc;

use fab_ledger::ReadingType;
use fab_msg::{BusClient, BusEvent, TopicRegistry, BRIGHTNESS_TOPIC, ENVIRONMENT_TOPIC};
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::MachineError;

#[derive(Debug, Default, Deserialize)]
struct EnvironmentFrame {
    t: Option<f64>,
    h: Option<f64>,
    p: Option<f64>,
    gr: Option<f64>,
    iaq: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct BrightnessFrame {
    br: Option<f64>,
}

/// Cheaply cloneable map from reading type to its most recent value.
#[derive(Debug, Clone, Default)]
pub struct ReadingsCache {
    latest: Arc<RwLock<HashMap<ReadingType, f64>>>,
}

impl ReadingsCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the value for `reading_type`.
    pub fn record(&self, reading_type: ReadingType, value: f64) {
        self.latest.write().insert(reading_type, value);
    }

    /// Most recent value, if any frame carried one.
    pub fn latest(&self, reading_type: ReadingType) -> Option<f64> {
        self.latest.read().get(&reading_type).copied()
    }

    /// Copy of every cached value.
    pub fn snapshot(&self) -> HashMap<ReadingType, f64> {
        self.latest.read().clone()
    }

    /// Parse a sensor frame and record every value it carries.
    ///
    /// Returns how many readings were updated. Frames on other topics are
    /// ignored.
    pub fn ingest(&self, topic: &str, payload: &[u8]) -> Result<usize, MachineError> {
        let decode_err = |source| MachineError::SensorFrame {
            topic: topic.to_owned(),
            source,
        };
        let values: Vec<(ReadingType, Option<f64>)> = match topic {
            ENVIRONMENT_TOPIC => {
                let frame: EnvironmentFrame =
                    serde_json::from_slice(payload).map_err(decode_err)?;
                vec![
                    (ReadingType::Temperature, frame.t),
                    (ReadingType::Humidity, frame.h),
                    (ReadingType::AirPressure, frame.p),
                    (ReadingType::GasResistance, frame.gr),
                    (ReadingType::AirQuality, frame.iaq),
                ]
            }
            BRIGHTNESS_TOPIC => {
                let frame: BrightnessFrame = serde_json::from_slice(payload).map_err(decode_err)?;
                vec![(ReadingType::Brightness, frame.br)]
            }
            _ => return Ok(0),
        };

        let mut latest = self.latest.write();
        let mut updated = 0;
        for (reading_type, value) in values {
            if let Some(value) = value {
                latest.insert(reading_type, value);
                updated += 1;
            }
        }
        Ok(updated)
    }
}

/// Subscribe `bus` to the sensor topics and keep `cache` current until
/// shutdown or disconnect.
pub async fn spawn_readings_feed(
    bus: BusClient,
    cache: ReadingsCache,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<JoinHandle<()>, MachineError> {
    for topic in TopicRegistry::sensors() {
        bus.subscribe(topic).await?;
    }

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                event = bus.next_event() => match event {
                    Some(BusEvent::Message(message)) => {
                        match cache.ingest(&message.topic, &message.payload) {
                            Ok(updated) => debug!(topic = %message.topic, updated, "readings updated"),
                            Err(err) => warn!(error = %err, "sensor frame dropped"),
                        }
                    }
                    Some(BusEvent::Disconnected { .. }) | None => break,
                },
            }
        }
        debug!(client_id = bus.client_id(), "readings feed stopped");
    }))
}
