//! MQTT adapter error types.

use std::path::PathBuf;

use thingpin_domain::error::PublishError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The MQTT client has not been connected yet.
    #[error("MQTT client not connected")]
    NotConnected,

    /// A TLS certificate or key file could not be read.
    #[error("failed to read {}", path.display())]
    Certificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The broker could not be reached or refused the connection.
    #[error("MQTT connection error")]
    Connection(#[source] rumqttc::ConnectionError),

    /// The broker did not acknowledge the connection in time.
    #[error("MQTT broker did not acknowledge the connection within {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// The event loop ended before the broker acknowledged the connection.
    #[error("MQTT event loop stopped while connecting")]
    EventLoopStopped,

    /// The rumqttc client refused a request.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// Publishing the state of a thing failed.
    #[error("failed to publish state of {thing:?}")]
    Publish {
        thing: String,
        #[source]
        source: rumqttc::ClientError,
    },

    /// The payload cannot be encoded for the configured flavour.
    #[error("payload of {thing:?} has no \"state\" field")]
    MissingState { thing: String },

    /// The payload could not be serialized.
    #[error("failed to encode payload of {thing:?}")]
    Encode {
        thing: String,
        #[source]
        source: serde_json::Error,
    },
}

impl MqttError {
    /// Convert into a [`PublishError`] for propagation across the port
    /// boundary.
    #[must_use]
    pub fn into_domain(self) -> PublishError {
        let thing = match &self {
            Self::NotConnected => return PublishError::NotConnected,
            Self::Publish { thing, .. } | Self::MissingState { thing } | Self::Encode { thing, .. } => {
                Some(thing.clone())
            }
            _ => None,
        };
        match thing {
            Some(thing) => PublishError::Send {
                thing,
                source: Box::new(self),
            },
            None => PublishError::Connect(Box::new(self)),
        }
    }
}

impl From<MqttError> for PublishError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}
