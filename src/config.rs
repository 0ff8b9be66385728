use crate::error::{AvrError, Result};
use crate::protocol::Generation;
use crate::types::Level;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default TCP control port (telnet)
pub const DEFAULT_PORT: u16 = 23;

/// Receiver configuration
///
/// Every field has a default, so `{}` is a valid configuration.
///
/// ```
/// use marantz_avr::ReceiverConfig;
///
/// let config = ReceiverConfig::from_json(r#"{ "enableZone2": true, "rampRepeatIntervalMs": 75 }"#).unwrap();
/// assert!(config.enable_zone2);
/// assert_eq!(config.ramp_interval().as_millis(), 75);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReceiverConfig {
    pub generation: Generation,
    /// Ramp tick; falls back to the generation default
    pub ramp_repeat_interval_ms: Option<u64>,
    /// Fixed master volume ceiling in fine units, ignoring `MVMAX`
    pub max_volume_override: Option<Level>,
    pub enable_zone2: bool,
    /// Use `ZMON`/`ZMOFF` instead of `PWON`/`PWSTANDBY`
    pub use_zone_main_power: bool,
    pub poll_interval_ms: u64,
    /// Gap between the queries of one poll burst
    pub poll_stagger_ms: u64,
    pub warming_time_ms: u64,
    pub cooling_time_ms: u64,
    pub monitor: MonitorConfig,
    pub control: Option<ControlConfig>,
}

/// Communication monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    pub poll_string: String,
    pub poll_interval_ms: u64,
    pub time_to_warning_ms: u64,
    pub time_to_error_ms: u64,
}

/// Network address of the receiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlConfig {
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            generation: Generation::default(),
            ramp_repeat_interval_ms: None,
            max_volume_override: None,
            enable_zone2: false,
            use_zone_main_power: false,
            poll_interval_ms: 2000,
            poll_stagger_ms: 100,
            warming_time_ms: 5000,
            cooling_time_ms: 2000,
            monitor: MonitorConfig::default(),
            control: None,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_string: "PW?".to_string(),
            poll_interval_ms: 300_000,
            time_to_warning_ms: 60_000,
            time_to_error_ms: 120_000,
        }
    }
}

impl ReceiverConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(max) = self.max_volume_override {
            let ceiling = self.generation.default_max_volume();
            if !(0..=ceiling).contains(&max) {
                return Err(AvrError::Config(format!(
                    "maxVolumeOverride {} outside 0..={}",
                    max, ceiling
                )));
            }
        }
        if self.ramp_repeat_interval_ms == Some(0) {
            return Err(AvrError::Config("rampRepeatIntervalMs must be positive".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(AvrError::Config("pollIntervalMs must be positive".to_string()));
        }
        self.monitor.validate()
    }

    pub fn ramp_interval(&self) -> Duration {
        self.ramp_repeat_interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.generation.default_ramp_interval())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_stagger(&self) -> Duration {
        Duration::from_millis(self.poll_stagger_ms)
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_string.trim().is_empty() {
            return Err(AvrError::Config("monitor pollString is empty".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(AvrError::Config("monitor pollIntervalMs must be positive".to_string()));
        }
        if self.time_to_warning_ms == 0 || self.time_to_warning_ms > self.time_to_error_ms {
            return Err(AvrError::Config(
                "monitor timeToWarningMs must be positive and not exceed timeToErrorMs".to_string(),
            ));
        }
        Ok(())
    }
}
