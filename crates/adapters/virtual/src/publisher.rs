//! Publisher that writes notifications to the log and keeps them in memory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thingpin_app::ports::Publisher;
use thingpin_domain::error::PublishError;

/// A published notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub name: String,
    pub payload: serde_json::Value,
}

/// [`Publisher`] for dry runs: every notification is logged at info level
/// and recorded.
#[derive(Debug, Default)]
pub struct LogPublisher {
    connected: AtomicBool,
    sent: Mutex<Vec<Notification>>,
}

impl LogPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Everything published so far, in order.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.sent().clone()
    }

    fn sent(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Publisher for LogPublisher {
    async fn connect(&self) -> Result<(), PublishError> {
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("log publisher connected");
        Ok(())
    }

    async fn notify(&self, name: &str, payload: &serde_json::Value) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::NotConnected);
        }
        tracing::info!(thing = name, %payload, "notify");
        self.sent().push(Notification {
            name: name.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), PublishError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::info!("log publisher disconnected");
        }
        Ok(())
    }
}
