//! MQTT publisher configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Topic layout and payload encoding expected by the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    /// AWS IoT device shadow: `$aws/things/{name}/shadow/update`, payload
    /// wrapped in `{"state": {"reported": ...}}`.
    AwsIot,
    /// Adafruit IO feed: `{username}/feeds/{name}`, payload is the `state`
    /// field as text.
    Adafruit,
    /// `{base_topic}/{name}` with the JSON payload as-is.
    #[default]
    Plain,
}

/// Configuration for the MQTT publisher.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub flavor: Flavor,
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier (the thing name for AWS IoT).
    pub client_id: String,
    /// Topic prefix for the plain flavour.
    pub base_topic: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// How long to wait for the broker to acknowledge the connection.
    pub connect_timeout_secs: u16,
    /// Broker user name (the Adafruit IO user name).
    pub username: Option<String>,
    /// Broker password (the Adafruit IO key).
    pub password: Option<String>,
    /// CA certificate; setting it enables TLS.
    pub ca_cert: Option<PathBuf>,
    /// Client certificate for mutual TLS.
    pub client_cert: Option<PathBuf>,
    /// Private key matching `client_cert`.
    pub private_key: Option<PathBuf>,
    /// Log every MQTT packet at info level.
    pub debug: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            flavor: Flavor::default(),
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "thingpin".to_string(),
            base_topic: "thingpin".to_string(),
            keep_alive_secs: 30,
            connect_timeout_secs: 10,
            username: None,
            password: None,
            ca_cert: None,
            client_cert: None,
            private_key: None,
            debug: false,
        }
    }
}

impl MqttConfig {
    #[must_use]
    pub fn uses_tls(&self) -> bool {
        self.ca_cert.is_some()
    }
}

/// Expand a leading `~` to the user's home directory.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}
