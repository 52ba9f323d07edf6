//! Raspberry Pi adapter error types.

use thingpin_domain::error::HardwareError;
use thingpin_domain::line::{LineId, PinMode};

/// Errors specific to the GPIO adapter.
#[derive(Debug, thiserror::Error)]
pub enum RpiError {
    /// The GPIO peripheral could not be opened.
    #[error("unable to access GPIO")]
    Open(#[source] rppal::gpio::Error),

    /// A line was configured before the numbering mode was set.
    #[error("GPIO numbering mode not set")]
    NoNumbering(LineId),

    /// The line number does not name a GPIO under the numbering mode.
    #[error("line {line} is not a GPIO in {mode} numbering")]
    NotAGpio { line: LineId, mode: PinMode },

    /// Claiming or configuring the pin failed.
    #[error("unable to set up GPIO {bcm} for line {line}")]
    Setup {
        line: LineId,
        bcm: u8,
        #[source]
        source: rppal::gpio::Error,
    },

    /// The line has not been configured.
    #[error("line {0} is not configured")]
    NotConfigured(LineId),

    /// Arming or polling the edge interrupt failed.
    #[error("edge interrupt failed on line {line}")]
    Interrupt {
        line: LineId,
        #[source]
        source: rppal::gpio::Error,
    },

    /// The blocking interrupt poll did not complete.
    #[error("edge wait on line {line} was aborted")]
    Blocking {
        line: LineId,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl RpiError {
    /// Convert into a [`HardwareError`] for propagation across port
    /// boundaries.
    #[must_use]
    pub fn into_domain(self) -> HardwareError {
        match self {
            Self::Open(_) => HardwareError::Numbering(Box::new(self)),
            Self::NotConfigured(line) => HardwareError::NotConfigured(line),
            Self::NoNumbering(line) | Self::NotAGpio { line, .. } | Self::Setup { line, .. } => {
                HardwareError::Configure {
                    line,
                    source: Box::new(self),
                }
            }
            Self::Interrupt { line, .. } | Self::Blocking { line, .. } => {
                HardwareError::EdgeWait {
                    line,
                    source: Box::new(self),
                }
            }
        }
    }
}

impl From<RpiError> for HardwareError {
    fn from(err: RpiError) -> Self {
        err.into_domain()
    }
}
