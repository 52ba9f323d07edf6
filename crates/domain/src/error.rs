//! Error types shared across the workspace.
//!
//! Each failure class has its own enum so callers can tell a bad config file
//! apart from a flaky line or an unreachable broker:
//!
//! - [`ConfigError`] — fatal at startup
//! - [`HardwareError`] — fatal to a single line watcher
//! - [`PublishError`] — logged and dropped for a single notification

use crate::line::LineId;

/// Boxed error used to carry adapter-specific causes across port boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Static configuration is invalid.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A thing was declared with an empty name.
    #[error("thing name must not be empty")]
    EmptyName,

    /// A required field is missing from a thing definition.
    #[error("thing {thing:?} is missing required field {field:?}")]
    MissingField {
        thing: String,
        field: &'static str,
    },

    /// The resistor setting is not one of `pull_up`, `pull_down`, `float`.
    #[error("thing {thing:?} has invalid resistor setting {value:?}")]
    InvalidResistor { thing: String, value: String },

    /// The sampling setting is not one of `poll`, `edge`.
    #[error("thing {thing:?} has invalid sampling setting {value:?}")]
    InvalidSampling { thing: String, value: String },

    /// A polled thing asks for a zero sample interval.
    #[error("thing {thing:?} must sample at a non-zero interval")]
    InvalidSampleInterval { thing: String },

    /// The pin numbering mode is not one of `BCM`, `BOARD`.
    #[error("invalid pin mode {0:?}, expected \"BCM\" or \"BOARD\"")]
    InvalidPinMode(String),

    /// Two things share a name.
    #[error("thing {0:?} is defined more than once")]
    DuplicateName(String),

    /// Two things are wired to the same physical line.
    #[error("line {line} is assigned to both {first:?} and {second:?}")]
    DuplicateLine {
        line: LineId,
        first: String,
        second: String,
    },
}

/// The hardware line abstraction failed.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The line was never configured (or has been released).
    #[error("line {0} is not configured")]
    NotConfigured(LineId),

    /// Setting the pin numbering mode failed.
    #[error("failed to set pin numbering mode")]
    Numbering(#[source] BoxError),

    /// Configuring the line as an input failed.
    #[error("failed to configure line {line}")]
    Configure {
        line: LineId,
        #[source]
        source: BoxError,
    },

    /// Reading the line level failed.
    #[error("failed to read line {line}")]
    Read {
        line: LineId,
        #[source]
        source: BoxError,
    },

    /// Waiting for an edge on the line failed.
    #[error("failed to wait for edge on line {line}")]
    EdgeWait {
        line: LineId,
        #[source]
        source: BoxError,
    },
}

impl HardwareError {
    /// The line this error relates to, if any.
    #[must_use]
    pub fn line(&self) -> Option<LineId> {
        match self {
            Self::NotConfigured(line)
            | Self::Configure { line, .. }
            | Self::Read { line, .. }
            | Self::EdgeWait { line, .. } => Some(*line),
            Self::Numbering(_) => None,
        }
    }
}

/// The notification sink rejected or failed an operation.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// `notify` was called before `connect` (or after `disconnect`).
    #[error("publisher not connected")]
    NotConnected,

    /// Establishing the connection failed.
    #[error("failed to connect publisher")]
    Connect(#[source] BoxError),

    /// Sending a single notification failed.
    #[error("failed to publish state of {thing:?}")]
    Send {
        thing: String,
        #[source]
        source: BoxError,
    },
}
