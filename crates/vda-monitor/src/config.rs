//! Monitor Configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `vda-monitor.{toml,json,yaml}` in the working directory or an explicit
//! file, then `VDA_*` environment variables (`VDA_DISPATCH__PERIOD_MS=50`).

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File};
use iso15765::UdsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vda_dispatch::{DispatchConfig, HealthConfig};
use vda_link::SessionSettings;

/// UDS driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdsSettings {
    pub timeout_ms: u64,
    pub target_address: u8,
    pub tester_address: u8,
    pub padding: u8,
    /// Run the identification sweep once the CAN channel is up
    pub identify_on_start: bool,
}

impl Default for UdsSettings {
    fn default() -> Self {
        let defaults = UdsConfig::default();
        Self {
            timeout_ms: defaults.timeout.as_millis() as u64,
            target_address: defaults.target_address,
            tester_address: defaults.tester_address,
            padding: defaults.padding,
            identify_on_start: true,
        }
    }
}

impl UdsSettings {
    pub fn driver_config(&self) -> UdsConfig {
        UdsConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            target_address: self.target_address,
            tester_address: self.tester_address,
            padding: self.padding,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub session: SessionSettings,
    pub dispatch: DispatchConfig,
    pub health: HealthConfig,
    pub uds: UdsSettings,
    /// JSON parameter definition database layered over the built-in set
    pub definitions: Option<PathBuf>,
    pub log_level: String,
    pub json_logs: bool,
    /// Generate engine traffic on the simulated adapter
    pub simulated_traffic: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            session: SessionSettings::default(),
            dispatch: DispatchConfig::default(),
            health: HealthConfig::default(),
            uds: UdsSettings::default(),
            definitions: None,
            log_level: "info".to_string(),
            json_logs: false,
            simulated_traffic: true,
        }
    }
}

impl MonitorConfig {
    /// Load from `path` (required when given) or `vda-monitor.*` if present
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = config::Config::builder();
        let builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name("vda-monitor").required(false)),
        };
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder
            .add_source(
                Environment::with_prefix("VDA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}
