//! Configuration loading: TOML file with environment variable overrides.
//!
//! Reads `thingpin.toml` (or the file given with `--config`). Everything but
//! the things themselves has a default. Environment variables take
//! precedence over file values.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use thingpin_adapter_mqtt::MqttConfig;
use thingpin_app::cost::CostModel;
use thingpin_app::thingpin::Settings;
use thingpin_domain::line::PinMode;
use thingpin_domain::thing::{ThingConfig, ThingSet};

/// Commented configuration written by `create-config`.
pub const SAMPLE: &str = include_str!("../thingpin.sample.toml");

/// Top-level configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `BCM` or `BOARD`.
    pub pin_mode: String,
    /// Heartbeat period; absent or zero disables it.
    pub heartbeat_secs: Option<u64>,
    pub debug: bool,
    pub logging: LoggingConfig,
    pub hardware: HardwareConfig,
    pub cost: CostConfig,
    pub notifier: NotifierConfig,
    pub things: BTreeMap<String, ThingEntry>,
}

/// Logging configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: Option<String>,
}

/// Which line driver to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    #[default]
    Rpi,
    Virtual,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub driver: DriverKind,
}

/// Inputs to the startup cost guesstimate.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub message_unit_cost: f64,
    pub estimated_change_freq: f64,
}

/// Where notifications go.
#[derive(Debug, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifierConfig {
    Mqtt(MqttConfig),
    #[default]
    Log,
}

/// One `[things.<name>]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThingEntry {
    pub pin: Option<u32>,
    pub resistor: Option<String>,
    pub debounce_ms: Option<u64>,
    pub sampling: Option<String>,
    pub sample_ms: Option<u64>,
    pub iot_states: IotStates,
}

/// Payloads published for each level.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IotStates {
    #[serde(rename = "HIGH")]
    pub high: Option<serde_json::Value>,
    #[serde(rename = "LOW")]
    pub low: Option<serde_json::Value>,
}

impl Config {
    /// Load configuration from `path`, then apply environment-variable
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed, or if a thing
    /// definition is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ConfigError::NotFound(path.to_path_buf()))
            }
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("THINGPIN_DEBUG") {
            self.debug = matches!(val.as_str(), "1" | "true" | "yes");
        }
        if let Some(secs) = var("THINGPIN_HEARTBEAT_SECS").and_then(|val| val.parse().ok()) {
            self.heartbeat_secs = Some(secs);
        }
        // The product-specific variable wins over the generic one.
        if let Some(val) = var("THINGPIN_LOG").or_else(|| var("RUST_LOG")) {
            self.logging.filter = Some(val);
        }
        if self.debug
            && let NotifierConfig::Mqtt(mqtt) = &mut self.notifier
        {
            mqtt.debug = true;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.things.is_empty() {
            return Err(ConfigError::Validation(
                "no things configured, add at least one [things.<name>] table".to_string(),
            ));
        }
        self.pin_mode()?;
        ThingSet::new(self.things()?)?;
        Ok(())
    }

    /// Parsed pin numbering mode.
    ///
    /// # Errors
    ///
    /// Returns an error unless the mode is `BCM` or `BOARD`.
    pub fn pin_mode(&self) -> Result<PinMode, ConfigError> {
        Ok(self.pin_mode.parse()?)
    }

    /// Thing definitions, in name order.
    ///
    /// # Errors
    ///
    /// Returns the first invalid thing definition.
    pub fn things(&self) -> Result<Vec<ThingConfig>, ConfigError> {
        self.things
            .iter()
            .map(|(name, entry)| entry.build(name).map_err(ConfigError::from))
            .collect()
    }

    /// Orchestrator settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the pin mode is invalid.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        Ok(Settings {
            pin_mode: self.pin_mode()?,
            heartbeat: self.heartbeat(),
            cost: CostModel {
                message_unit_cost: self.cost.message_unit_cost,
                estimated_change_freq: self.cost.estimated_change_freq,
            },
            ..Settings::default()
        })
    }

    #[must_use]
    pub fn heartbeat(&self) -> Option<Duration> {
        self.heartbeat_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Effective log filter: the configured one, or a default that follows
    /// the debug flag.
    #[must_use]
    pub fn log_filter(&self) -> String {
        match (&self.logging.filter, self.debug) {
            (Some(filter), _) => filter.clone(),
            (None, false) => "thingpin=info,rumqttc=warn".to_string(),
            (None, true) => "thingpin=debug,rumqttc=info".to_string(),
        }
    }
}

impl ThingEntry {
    fn build(&self, name: &str) -> Result<ThingConfig, thingpin_domain::error::ConfigError> {
        let mut builder = ThingConfig::builder(name);
        if let Some(pin) = self.pin {
            builder = builder.line(pin);
        }
        if let Some(resistor) = &self.resistor {
            builder = builder.resistor(resistor.clone());
        }
        if let Some(ms) = self.debounce_ms {
            builder = builder.debounce(Duration::from_millis(ms));
        }
        if let Some(sampling) = &self.sampling {
            builder = builder.sampling(sampling.clone());
        }
        if let Some(ms) = self.sample_ms {
            builder = builder.sample_interval(Duration::from_millis(ms));
        }
        if let Some(high) = &self.iot_states.high {
            builder = builder.high(high.clone());
        }
        if let Some(low) = &self.iot_states.low {
            builder = builder.low(low.clone());
        }
        builder.build()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pin_mode: PinMode::default().to_string(),
            heartbeat_secs: None,
            debug: false,
            logging: LoggingConfig::default(),
            hardware: HardwareConfig::default(),
            cost: CostConfig::default(),
            notifier: NotifierConfig::default(),
            things: BTreeMap::new(),
        }
    }
}

impl Default for CostConfig {
    fn default() -> Self {
        let model = CostModel::default();
        Self {
            message_unit_cost: model.message_unit_cost,
            estimated_change_freq: model.estimated_change_freq,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// The config file does not exist.
    #[error("config file {} not found, create one with `thingpind create-config`", .0.display())]
    NotFound(PathBuf),
    /// A thing or the pin mode is invalid.
    #[error("invalid thing configuration")]
    Thing(#[from] thingpin_domain::error::ConfigError),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
