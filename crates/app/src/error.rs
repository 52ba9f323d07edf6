//! Orchestrator error type.

use thingpin_domain::error::{ConfigError, HardwareError, PublishError};

/// Errors that stop the orchestrator from starting.
///
/// Per-line hardware failures and individual send failures after startup are
/// logged instead of surfacing here.
#[derive(Debug, thiserror::Error)]
pub enum ThingpinError {
    /// The thing configuration is invalid.
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    /// A process-wide hardware operation failed (e.g. pin numbering).
    #[error("hardware error")]
    Hardware(#[from] HardwareError),

    /// The publisher could not be connected.
    #[error("publisher error")]
    Publish(#[from] PublishError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn should_keep_config_error_as_source() {
        let err: ThingpinError = ConfigError::EmptyName.into();
        assert_eq!(err.to_string(), "invalid configuration");
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "thing name must not be empty");
    }

    #[test]
    fn should_wrap_publish_error() {
        let err: ThingpinError = PublishError::NotConnected.into();
        assert!(matches!(err, ThingpinError::Publish(PublishError::NotConnected)));
    }
}
