//! Publisher port — the remote sink that receives thing states.

use std::future::Future;
use std::sync::Arc;

use thingpin_domain::error::PublishError;

/// Delivers `(thing name, payload)` notifications to a remote sink.
///
/// The payload is whatever structured value the thing configuration supplies
/// for the current level; publishers pass it through without interpreting it
/// beyond their own wire encoding.
pub trait Publisher: Send + Sync {
    /// Open the connection. Called once by the orchestrator.
    fn connect(&self) -> impl Future<Output = Result<(), PublishError>> + Send;

    /// Publish the state of one thing.
    fn notify(
        &self,
        name: &str,
        payload: &serde_json::Value,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;

    /// Close the connection.
    fn disconnect(&self) -> impl Future<Output = Result<(), PublishError>> + Send;
}

impl<T: Publisher> Publisher for Arc<T> {
    fn connect(&self) -> impl Future<Output = Result<(), PublishError>> + Send {
        (**self).connect()
    }

    fn notify(
        &self,
        name: &str,
        payload: &serde_json::Value,
    ) -> impl Future<Output = Result<(), PublishError>> + Send {
        (**self).notify(name, payload)
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), PublishError>> + Send {
        (**self).disconnect()
    }
}
