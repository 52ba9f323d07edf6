//! Thing — a named domain object backed by one input line.
//!
//! A thing maps the two electrical levels of its line onto opaque payloads
//! that are published to the notification sink, e.g. a reed switch on line 21
//! reported as `{"state": "open"}` / `{"state": "closed"}` under the name
//! `door`.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ConfigError;
use crate::level::Level;
use crate::line::{LineId, Resistor};

/// Poll interval used when a thing does not specify one.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

/// Payloads published for each level of a line.
#[derive(Debug, Clone, PartialEq)]
pub struct StateMap {
    pub high: serde_json::Value,
    pub low: serde_json::Value,
}

impl StateMap {
    #[must_use]
    pub fn payload(&self, level: Level) -> &serde_json::Value {
        match level {
            Level::High => &self.high,
            Level::Low => &self.low,
        }
    }
}

/// How a line is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampling {
    /// Read the line every `interval`.
    Poll { interval: Duration },
    /// Block until the line changes, then read it.
    Edge,
}

impl Default for Sampling {
    fn default() -> Self {
        Self::Poll {
            interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }
}

/// Static configuration of one thing.
#[derive(Debug, Clone, PartialEq)]
pub struct ThingConfig {
    pub name: String,
    pub line: LineId,
    pub resistor: Resistor,
    pub states: StateMap,
    pub debounce: Duration,
    pub sampling: Sampling,
}

impl ThingConfig {
    /// Create a builder for the thing called `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ThingConfigBuilder {
        ThingConfigBuilder {
            name: name.into(),
            ..ThingConfigBuilder::default()
        }
    }
}

/// Step-by-step builder for [`ThingConfig`].
///
/// Resistor and sampling settings are taken as raw strings so validation
/// errors can name the offending thing and value.
#[derive(Debug, Default)]
pub struct ThingConfigBuilder {
    name: String,
    line: Option<LineId>,
    resistor: Option<String>,
    high: Option<serde_json::Value>,
    low: Option<serde_json::Value>,
    debounce: Option<Duration>,
    sampling: Option<String>,
    sample_interval: Option<Duration>,
}

impl ThingConfigBuilder {
    #[must_use]
    pub fn line(mut self, number: u32) -> Self {
        self.line = Some(LineId::new(number));
        self
    }

    #[must_use]
    pub fn resistor(mut self, resistor: impl Into<String>) -> Self {
        self.resistor = Some(resistor.into());
        self
    }

    #[must_use]
    pub fn high(mut self, payload: serde_json::Value) -> Self {
        self.high = Some(payload);
        self
    }

    #[must_use]
    pub fn low(mut self, payload: serde_json::Value) -> Self {
        self.low = Some(payload);
        self
    }

    #[must_use]
    pub fn debounce(mut self, delay: Duration) -> Self {
        self.debounce = Some(delay);
        self
    }

    /// `"poll"` or `"edge"`.
    #[must_use]
    pub fn sampling(mut self, sampling: impl Into<String>) -> Self {
        self.sampling = Some(sampling.into());
        self
    }

    #[must_use]
    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = Some(interval);
        self
    }

    /// Consume the builder, validate, and return a [`ThingConfig`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the thing when the name is empty, the
    /// line or a payload is missing, the resistor/sampling value is unknown,
    /// or a polled thing has a zero sample interval.
    pub fn build(self) -> Result<ThingConfig, ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        let missing = |field| ConfigError::MissingField {
            thing: self.name.clone(),
            field,
        };

        let line = self.line.ok_or_else(|| missing("pin"))?;
        let high = self.high.clone().ok_or_else(|| missing("iot_states.HIGH"))?;
        let low = self.low.clone().ok_or_else(|| missing("iot_states.LOW"))?;

        let resistor = match self.resistor.as_deref() {
            None => Resistor::default(),
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidResistor {
                thing: self.name.clone(),
                value: value.to_string(),
            })?,
        };

        let sampling = match self.sampling.as_deref() {
            None | Some("poll") => {
                let interval = self.sample_interval.unwrap_or(DEFAULT_SAMPLE_INTERVAL);
                if interval.is_zero() {
                    return Err(ConfigError::InvalidSampleInterval {
                        thing: self.name.clone(),
                    });
                }
                Sampling::Poll { interval }
            }
            Some("edge") => Sampling::Edge,
            Some(other) => {
                return Err(ConfigError::InvalidSampling {
                    thing: self.name.clone(),
                    value: other.to_string(),
                });
            }
        };

        Ok(ThingConfig {
            name: self.name,
            line,
            resistor,
            states: StateMap { high, low },
            debounce: self.debounce.unwrap_or_default(),
            sampling,
        })
    }
}

/// A validated set of things: unique names, one thing per line.
#[derive(Debug, Clone, Default)]
pub struct ThingSet {
    things: BTreeMap<LineId, ThingConfig>,
}

impl ThingSet {
    /// Validate and index `things` by line.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateLine`] when two things share a line and
    /// [`ConfigError::DuplicateName`] when two things share a name.
    pub fn new(things: impl IntoIterator<Item = ThingConfig>) -> Result<Self, ConfigError> {
        let mut by_line: BTreeMap<LineId, ThingConfig> = BTreeMap::new();
        for thing in things {
            if by_line.values().any(|t| t.name == thing.name) {
                return Err(ConfigError::DuplicateName(thing.name));
            }
            if let Some(existing) = by_line.get(&thing.line) {
                return Err(ConfigError::DuplicateLine {
                    line: thing.line,
                    first: existing.name.clone(),
                    second: thing.name,
                });
            }
            by_line.insert(thing.line, thing);
        }
        Ok(Self { things: by_line })
    }
}

impl IntoIterator for ThingSet {
    type Item = ThingConfig;
    type IntoIter = std::collections::btree_map::IntoValues<LineId, ThingConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.things.into_values()
    }
}
