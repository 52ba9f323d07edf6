//! # thingpin-adapter-mqtt
//!
//! MQTT adapter — publishes thing states to a broker with rumqttc.
//!
//! ## Flavours
//!
//! | Flavour | Topic | Payload |
//! |---------|-------|---------|
//! | `aws_iot` | `$aws/things/{name}/shadow/update` | `{"state": {"reported": <payload>}}` |
//! | `adafruit` | `{username}/feeds/{name}` | the `state` field as text |
//! | `plain` | `{base_topic}/{name}` | `<payload>` as JSON |
//!
//! TLS is enabled by configuring a CA certificate; AWS IoT additionally needs
//! the client certificate and private key for mutual authentication.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `thingpin-app` and `thingpin-domain`.

mod config;
mod error;
pub mod message;

pub use config::{Flavor, MqttConfig, expand_home};
pub use error::MqttError;

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use thingpin_app::ports::Publisher;
use thingpin_domain::error::PublishError;

/// Pause between reconnection attempts after the connection drops.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// How long `disconnect` waits for the event loop to flush.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);
/// Capacity of the rumqttc request queue; publishes beyond it fail fast.
const REQUEST_CAPACITY: usize = 16;

struct Session {
    client: AsyncClient,
    event_loop: JoinHandle<()>,
}

/// [`Publisher`] that sends every notification to an MQTT broker.
pub struct MqttPublisher {
    config: MqttConfig,
    session: Mutex<Option<Session>>,
}

impl MqttPublisher {
    #[must_use]
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    async fn options(&self) -> Result<MqttOptions, MqttError> {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.broker_host.clone(),
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(u64::from(
            self.config.keep_alive_secs.max(1),
        )));
        if let Some(username) = &self.config.username {
            options.set_credentials(
                username.clone(),
                self.config.password.clone().unwrap_or_default(),
            );
        }
        if let Some(ca_cert) = &self.config.ca_cert {
            let ca = read_pem(ca_cert).await?;
            let client_auth = match (&self.config.client_cert, &self.config.private_key) {
                (Some(cert), Some(key)) => Some((read_pem(cert).await?, read_pem(key).await?)),
                _ => None,
            };
            options.set_transport(rumqttc::Transport::tls(ca, client_auth, None));
        }
        Ok(options)
    }

    async fn open(&self) -> Result<(), MqttError> {
        if self.lock().is_some() {
            return Ok(());
        }

        let options = self.options().await?;
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let event_loop = tokio::spawn(drive(event_loop, ready_tx, self.config.debug));

        let timeout = Duration::from_secs(u64::from(self.config.connect_timeout_secs));
        let outcome = match tokio::time::timeout(timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => Err(MqttError::Connection(err)),
            Ok(Err(_)) => Err(MqttError::EventLoopStopped),
            Err(_) => Err(MqttError::ConnectTimeout(timeout)),
        };
        if let Err(err) = outcome {
            event_loop.abort();
            return Err(err);
        }

        tracing::info!(
            host = %self.config.broker_host,
            port = self.config.broker_port,
            client_id = %self.config.client_id,
            flavor = ?self.config.flavor,
            tls = self.config.uses_tls(),
            "MQTT publisher connected"
        );
        *self.lock() = Some(Session { client, event_loop });
        Ok(())
    }

    async fn send(&self, name: &str, payload: &serde_json::Value) -> Result<(), MqttError> {
        let client = self
            .lock()
            .as_ref()
            .map(|session| session.client.clone())
            .ok_or(MqttError::NotConnected)?;
        let message = message::encode(&self.config, name, payload)?;
        if self.config.debug {
            tracing::info!(
                topic = %message.topic,
                payload = %String::from_utf8_lossy(&message.payload),
                "MQTT publish"
            );
        }
        // Never wait on the request queue: it stops draining while the
        // event loop is reconnecting.
        client
            .try_publish(message.topic, QoS::AtLeastOnce, false, message.payload)
            .map_err(|source| MqttError::Publish {
                thing: name.to_string(),
                source,
            })
    }

    async fn close(&self) -> Result<(), MqttError> {
        let Some(Session {
            client,
            mut event_loop,
        }) = self.lock().take()
        else {
            return Ok(());
        };
        let result = client.try_disconnect().map_err(MqttError::Client);
        let flushed = result.is_ok()
            && tokio::time::timeout(DISCONNECT_GRACE, &mut event_loop)
                .await
                .is_ok();
        if !flushed {
            event_loop.abort();
        }
        tracing::info!(flushed, "MQTT publisher disconnected");
        result
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Publisher for MqttPublisher {
    async fn connect(&self) -> Result<(), PublishError> {
        self.open().await.map_err(MqttError::into_domain)
    }

    async fn notify(&self, name: &str, payload: &serde_json::Value) -> Result<(), PublishError> {
        self.send(name, payload).await.map_err(MqttError::into_domain)
    }

    async fn disconnect(&self) -> Result<(), PublishError> {
        self.close().await.map_err(MqttError::into_domain)
    }
}

async fn read_pem(path: &Path) -> Result<Vec<u8>, MqttError> {
    let path = expand_home(path);
    tokio::fs::read(&path)
        .await
        .map_err(|source| MqttError::Certificate { path, source })
}

/// Poll the rumqttc event loop until the client disconnects.
///
/// The first connection outcome is reported through `ready`; after that,
/// connection errors are logged and the loop keeps reconnecting.
async fn drive(
    mut event_loop: EventLoop,
    ready: oneshot::Sender<Result<(), ConnectionError>>,
    debug: bool,
) {
    let mut ready = Some(ready);
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                tracing::debug!(code = ?ack.code, "MQTT connection acknowledged");
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Ok(()));
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT event loop stopped");
                return;
            }
            Ok(event) if debug => tracing::info!(?event, "MQTT event"),
            Ok(event) => tracing::trace!(?event, "MQTT event"),
            Err(error) => {
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Err(error));
                    return;
                }
                tracing::warn!(%error, "MQTT connection lost, reconnecting");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn should_refuse_notify_before_connect() {
        let publisher = MqttPublisher::new(MqttConfig::default());
        let result = publisher.notify("door", &serde_json::json!("open")).await;
        assert!(matches!(result, Err(PublishError::NotConnected)));
    }

    #[tokio::test]
    async fn should_allow_disconnect_before_connect() {
        let publisher = MqttPublisher::new(MqttConfig::default());
        assert!(publisher.disconnect().await.is_ok());
    }

    /// Broker that acknowledges one connection, then hangs up.
    async fn flaky_broker() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut connect = [0u8; 256];
            let _ = socket.read(&mut connect).await.unwrap();
            socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
            socket.flush().await.unwrap();
            drop(socket);
            // Refuse reconnection attempts by never accepting again.
            std::future::pending::<()>().await;
        });
        port
    }

    #[tokio::test]
    async fn should_not_block_when_broker_drops_connection() {
        let port = flaky_broker().await;
        let publisher = MqttPublisher::new(MqttConfig {
            broker_host: "127.0.0.1".to_string(),
            broker_port: port,
            connect_timeout_secs: 5,
            ..MqttConfig::default()
        });
        publisher.connect().await.unwrap();
        // Let the event loop notice the hang-up and back off.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut dropped = 0;
        for _ in 0..(REQUEST_CAPACITY * 3) {
            let outcome = tokio::time::timeout(
                Duration::from_secs(1),
                publisher.notify("door", &serde_json::json!({"state": "open"})),
            )
            .await
            .expect("notify must not block");
            if let Err(error) = outcome {
                assert!(matches!(error, PublishError::Send { ref thing, .. } if thing == "door"));
                dropped += 1;
            }
        }
        assert!(dropped >= REQUEST_CAPACITY);

        let closed = tokio::time::timeout(Duration::from_secs(1), publisher.disconnect()).await;
        assert!(closed.is_ok(), "disconnect must not block");
    }

    #[tokio::test]
    async fn should_fail_connect_when_certificate_is_missing() {
        let publisher = MqttPublisher::new(MqttConfig {
            ca_cert: Some(PathBuf::from("/definitely/not/here/root-CA.pem")),
            ..MqttConfig::default()
        });
        let source = match publisher.connect().await {
            Err(PublishError::Connect(source)) => source,
            other => panic!("expected a connect error, got {other:?}"),
        };
        assert_eq!(
            source.to_string(),
            "failed to read /definitely/not/here/root-CA.pem"
        );
    }
}
