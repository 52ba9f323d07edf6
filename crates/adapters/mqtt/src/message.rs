//! Topic and payload encoding per flavour.

use serde_json::{Value, json};

use crate::config::{Flavor, MqttConfig};
use crate::error::MqttError;

/// An encoded MQTT message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Build the message publishing `payload` as the state of thing `name`.
///
/// # Errors
///
/// Returns [`MqttError::MissingState`] when an Adafruit payload is an object
/// without a `state` field, and [`MqttError::Encode`] if JSON serialization
/// fails.
pub fn encode(config: &MqttConfig, name: &str, payload: &Value) -> Result<Message, MqttError> {
    match config.flavor {
        Flavor::AwsIot => Ok(Message {
            topic: format!("$aws/things/{name}/shadow/update"),
            payload: to_json(name, &json!({ "state": { "reported": payload } }))?,
        }),
        Flavor::Adafruit => {
            let username = config.username.as_deref().unwrap_or_default();
            Ok(Message {
                topic: format!("{username}/feeds/{name}"),
                payload: feed_value(name, payload)?.into_bytes(),
            })
        }
        Flavor::Plain => Ok(Message {
            topic: format!("{}/{name}", config.base_topic.trim_end_matches('/')),
            payload: to_json(name, payload)?,
        }),
    }
}

fn to_json(name: &str, value: &Value) -> Result<Vec<u8>, MqttError> {
    serde_json::to_vec(value).map_err(|source| MqttError::Encode {
        thing: name.to_string(),
        source,
    })
}

/// Adafruit feeds take a bare value.
fn feed_value(name: &str, payload: &Value) -> Result<String, MqttError> {
    let value = match payload {
        Value::Object(fields) => fields.get("state").ok_or_else(|| MqttError::MissingState {
            thing: name.to_string(),
        })?,
        other => other,
    };
    Ok(match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    })
}
