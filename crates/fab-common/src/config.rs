//! ---
//! fab_section: "01-core-functionality"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Shared primitives and utilities for the factory runtime."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::catalog::MachineKind;
use crate::logging::LogFormat;

fn default_mode() -> Mode {
    Mode::Simulation
}

fn default_broker_url() -> String {
    "memory://factory".to_owned()
}

fn default_client_prefix() -> String {
    "fab".to_owned()
}

fn default_enabled() -> bool {
    true
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_ack_delay() -> Duration {
    Duration::from_millis(5000)
}

fn default_readings_interval() -> Duration {
    Duration::from_millis(5000)
}

fn default_simulation_seed() -> u64 {
    0xFAB_u64
}

fn default_info_workpiece_id() -> String {
    "2222".to_owned()
}

fn default_info_workpiece_type() -> String {
    "green".to_owned()
}

fn default_sorted_type() -> String {
    "WHITE".to_owned()
}

fn default_supplying_contract() -> String {
    "0xSupplyingProcess".to_owned()
}

fn default_production_contract() -> String {
    "0xProductionProcess".to_owned()
}

fn default_retry_attempts() -> usize {
    1
}

fn default_retry_base_delay() -> Duration {
    Duration::from_millis(250)
}

fn default_retry_jitter() -> Duration {
    Duration::from_millis(50)
}

fn default_connect_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 5,
        base_delay: Duration::from_millis(200),
        jitter: Duration::from_millis(50),
    }
}

fn default_machines() -> IndexMap<MachineKind, MachineConfig> {
    MachineKind::ALL
        .iter()
        .map(|kind| {
            (
                *kind,
                MachineConfig {
                    address: format!("0x{}Machine", kind.symbol()),
                    enabled: true,
                },
            )
        })
        .collect()
}

/// Primary configuration object for the factory runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Live or simulated devices.
    #[serde(default = "default_mode")]
    pub mode: Mode,
    /// Message broker connection.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Per-machine ledger addresses.
    #[serde(default = "default_machines")]
    pub machines: IndexMap<MachineKind, MachineConfig>,
    /// Ledger call behaviour.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Process contract addresses.
    #[serde(default)]
    pub processes: ProcessConfig,
    /// Log sink.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Simulator knobs, used in simulation mode.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    /// Validated configuration.
    pub config: AppConfig,
    /// File it was read from.
    pub source: PathBuf,
}

impl AppConfig {
    /// Environment variable naming the configuration file.
    pub const ENV_CONFIG_PATH: &str = "FAB_CONFIG";

    /// Load configuration from disk, respecting the `FAB_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Machine configuration for `kind` when it is present and enabled.
    pub fn machine(&self, kind: MachineKind) -> Option<&MachineConfig> {
        self.machines.get(&kind).filter(|machine| machine.enabled)
    }

    /// Enabled machines in declaration order.
    pub fn enabled_machines(&self) -> impl Iterator<Item = (MachineKind, &MachineConfig)> {
        self.machines
            .iter()
            .filter(|(_, machine)| machine.enabled)
            .map(|(kind, machine)| (*kind, machine))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.enabled_machines().next().is_none() {
            return Err(anyhow!(
                "configuration must enable at least one machine"
            ));
        }
        let mut seen = HashSet::new();
        for (kind, machine) in &self.machines {
            if machine.address.trim().is_empty() {
                return Err(anyhow!("machine '{}' must declare an address", kind));
            }
            if !seen.insert(machine.address.as_str()) {
                return Err(anyhow!(
                    "machine '{}' reuses address {}",
                    kind,
                    machine.address
                ));
            }
        }
        self.broker.connect_retry.validate("broker.connect_retry")?;
        self.ledger.retry.validate("ledger.retry")?;
        self.processes.validate()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            broker: BrokerConfig::default(),
            machines: default_machines(),
            ledger: LedgerConfig::default(),
            processes: ProcessConfig::default(),
            logging: LoggingConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Operating mode for the daemon.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Devices on the bus are real; no simulator is started.
    Production,
    /// The in-process factory simulator answers commands and publishes readings.
    #[default]
    Simulation,
}

impl Mode {
    /// True when devices are simulated in process.
    pub fn is_simulation(&self) -> bool {
        matches!(self, Mode::Simulation)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Mode::Production),
            "simulation" => Ok(Mode::Simulation),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Message broker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker URL.
    #[serde(default = "default_broker_url")]
    pub url: String,
    /// Prefix for per-client connection ids.
    #[serde(default = "default_client_prefix")]
    pub client_prefix: String,
    /// Subscribe to the dashboard-only state and stock topics.
    #[serde(default)]
    pub subscribe_state: bool,
    /// Backoff for the initial connection.
    #[serde(default = "default_connect_retry")]
    pub connect_retry: RetryConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            client_prefix: default_client_prefix(),
            subscribe_state: false,
            connect_retry: default_connect_retry(),
        }
    }
}

/// Settings of one machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Ledger address the machine signs transactions with.
    pub address: String,
    /// Start a client for this machine.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Ledger call settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LedgerConfig {
    /// Backoff for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Backoff parameters as they appear in configuration files.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts including the first, at least 1.
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: usize,
    /// Delay before the first retry.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "base_delay_ms", default = "default_retry_base_delay")]
    pub base_delay: Duration,
    /// Maximum random jitter per delay.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "jitter_ms", default = "default_retry_jitter")]
    pub jitter: Duration,
}

impl RetryConfig {
    fn validate(&self, section: &str) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("{}.max_attempts must be at least 1", section));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            base_delay: default_retry_base_delay(),
            jitter: default_retry_jitter(),
        }
    }
}

/// Process contract addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Supplying process contract address.
    #[serde(default = "default_supplying_contract")]
    pub supplying_contract: String,
    /// Production process contract address.
    #[serde(default = "default_production_contract")]
    pub production_contract: String,
}

impl ProcessConfig {
    fn validate(&self) -> Result<()> {
        if self.supplying_contract.trim().is_empty() || self.production_contract.trim().is_empty()
        {
            return Err(anyhow!("process contract addresses must not be empty"));
        }
        if self.supplying_contract == self.production_contract {
            return Err(anyhow!(
                "supplying and production processes must use distinct contracts"
            ));
        }
        Ok(())
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            supplying_contract: default_supplying_contract(),
            production_contract: default_production_contract(),
        }
    }
}

/// Log sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for rolling log files.
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    /// Line format.
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// File name prefix, defaults to the binary name.
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

/// Knobs for the in-process factory simulator.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Delay before each simulated acknowledgement.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "ack_delay_ms", default = "default_ack_delay")]
    pub ack_delay: Duration,
    /// Period between sensor frames.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "readings_interval_ms", default = "default_readings_interval")]
    pub readings_interval: Duration,
    /// Seed for sensor values.
    #[serde(default = "default_simulation_seed")]
    pub seed: u64,
    /// Workpiece id reported by identification tasks.
    #[serde(default = "default_info_workpiece_id")]
    pub info_workpiece_id: String,
    /// Workpiece colour reported by identification tasks.
    #[serde(default = "default_info_workpiece_type")]
    pub info_workpiece_type: String,
    /// Colour reported by the sorting line.
    #[serde(default = "default_sorted_type")]
    pub sorted_type: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ack_delay: default_ack_delay(),
            readings_interval: default_readings_interval(),
            seed: default_simulation_seed(),
            info_workpiece_id: default_info_workpiece_id(),
            info_workpiece_type: default_info_workpiece_type(),
            sorted_type: default_sorted_type(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
mode = "production"

[broker]
url = "memory://line-1"
subscribe_state = true

[machines.hbw]
address = "0xA1"

[machines.vgr]
address = "0xA2"

[machines.sld]
address = "0xA3"
enabled = false

[ledger.retry]
max_attempts = 3
base_delay_ms = 10
jitter_ms = 0

[simulation]
ack_delay_ms = 20
info_workpiece_type = "red"
"#;

    #[test]
    fn parses_sample_configuration() {
        let config: AppConfig = SAMPLE.parse().unwrap();
        assert_eq!(config.mode, Mode::Production);
        assert!(config.broker.subscribe_state);
        assert_eq!(config.broker.client_prefix, "fab");
        assert_eq!(config.machines.len(), 3);
        assert!(config.machine(MachineKind::Sld).is_none());
        assert!(config.machine(MachineKind::Mpo).is_none());
        assert_eq!(config.machine(MachineKind::Vgr).unwrap().address, "0xA2");
        assert_eq!(config.ledger.retry.max_attempts, 3);
        assert_eq!(config.ledger.retry.base_delay, Duration::from_millis(10));
        assert_eq!(config.simulation.ack_delay, Duration::from_millis(20));
        assert_eq!(config.simulation.info_workpiece_type, "red");
        assert_eq!(config.simulation.info_workpiece_id, "2222");
    }

    #[test]
    fn default_configuration_is_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.enabled_machines().count(), 4);
        assert_eq!(config.ledger.retry.max_attempts, 1);
    }

    #[test]
    fn rejects_duplicate_addresses() {
        let err = r#"
[machines.hbw]
address = "0xA1"
[machines.vgr]
address = "0xA1"
"#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("reuses address"));
    }

    #[test]
    fn rejects_all_machines_disabled() {
        let err = r#"
[machines.hbw]
address = "0xA1"
enabled = false
"#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("at least one machine"));
    }

    #[test]
    fn rejects_zero_retry_attempts() {
        let err = r#"
[ledger.retry]
max_attempts = 0
"#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn loads_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fabd.toml");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let missing = dir.path().join("missing.toml");
        let loaded = AppConfig::load_with_source(&[missing, path.clone()]).unwrap();
        assert_eq!(loaded.source, path);
        assert_eq!(loaded.config.mode, Mode::Production);
    }
}
