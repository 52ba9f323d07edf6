//! Line identity and electrical configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Logical number of an input line under the active [`PinMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(u32);

impl LineId {
    #[must_use]
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    #[must_use]
    pub const fn number(self) -> u32 {
        self.0
    }
}

impl From<u32> for LineId {
    fn from(number: u32) -> Self {
        Self(number)
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A string did not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value {0:?}")]
pub struct UnknownVariant(pub String);

/// Internal resistor configuration of an input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resistor {
    PullUp,
    PullDown,
    /// No internal resistor; the line floats unless wired externally.
    #[default]
    Float,
}

impl FromStr for Resistor {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pull_up" => Ok(Self::PullUp),
            "pull_down" => Ok(Self::PullDown),
            "float" => Ok(Self::Float),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl fmt::Display for Resistor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PullUp => f.write_str("pull_up"),
            Self::PullDown => f.write_str("pull_down"),
            Self::Float => f.write_str("float"),
        }
    }
}

/// How line numbers in the configuration map onto the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PinMode {
    /// Broadcom SoC channel numbers.
    #[default]
    Bcm,
    /// Physical pin numbers on the 40-pin header.
    Board,
}

impl FromStr for PinMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BCM" => Ok(Self::Bcm),
            "BOARD" => Ok(Self::Board),
            other => Err(ConfigError::InvalidPinMode(other.to_string())),
        }
    }
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bcm => f.write_str("BCM"),
            Self::Board => f.write_str("BOARD"),
        }
    }
}
