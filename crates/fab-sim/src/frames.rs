//! ---
//! fab_section: "07-simulation"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Sensor frame shapes published by the simulator."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// BME680 environment sensor frame as published on `i/bme680`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentFrame {
    /// Sample time.
    pub ts: String,
    /// Temperature, degrees Celsius.
    pub t: f64,
    /// Raw temperature.
    pub rt: f64,
    /// Relative humidity, percent.
    pub h: f64,
    /// Raw humidity.
    pub rh: f64,
    /// Air pressure, hPa.
    pub p: u32,
    /// Indoor air quality index.
    pub iaq: u32,
    /// Air quality accuracy, 0 to 3.
    pub aq: u8,
    /// Gas resistance, Ohm.
    pub gr: u32,
}

/// Photoresistor frame as published on `i/ldr`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrightnessFrame {
    /// Sample time.
    pub ts: String,
    /// Brightness, percent.
    pub br: u32,
    /// Raw resistance.
    pub ldr: u32,
}
