//! ---
//! fab_section: "07-simulation"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Simulated factory devices and sensors."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Stand-ins for the physical line: devices acknowledging commands after a
//! delay, and environment sensors publishing randomized readings.

/// Device acknowledgement model.
pub mod devices;
/// Sensor frame schemas.
pub mod frames;
/// Random sensor values.
pub mod sensors;
/// Bus-facing simulator loop.
pub mod simulator;

pub use devices::{DeviceModel, PlannedAck};
pub use frames::{BrightnessFrame, EnvironmentFrame};
pub use sensors::{spawn_sensor_publisher, SensorGenerator};
pub use simulator::{spawn_factory_simulator, FactorySimulator};

pub(crate) fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
