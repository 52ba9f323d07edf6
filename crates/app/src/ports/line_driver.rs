//! Line driver port — access to the digital input hardware.
//!
//! The core assumes boolean readings with no third state. A driver owns every
//! line it has configured until [`release_all`](LineDriver::release_all) is
//! called; no two watchers are ever pointed at the same line.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thingpin_domain::error::HardwareError;
use thingpin_domain::level::Level;
use thingpin_domain::line::{LineId, PinMode, Resistor};

/// Outcome of [`LineDriver::wait_for_edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeWait {
    /// The line changed level.
    Edge,
    /// The timeout elapsed without a change.
    Timeout,
    /// The line will never change again (released, or a finite script ran out).
    Closed,
}

/// Hardware abstraction for digital input lines.
pub trait LineDriver: Send + Sync {
    /// Select how line numbers map onto the hardware. Called once, before
    /// any line is configured.
    fn set_numbering(
        &self,
        mode: PinMode,
    ) -> impl Future<Output = Result<(), HardwareError>> + Send;

    /// Configure `line` as an input with the given internal resistor.
    fn configure(
        &self,
        line: LineId,
        resistor: Resistor,
    ) -> impl Future<Output = Result<(), HardwareError>> + Send;

    /// Read the current level of a configured line.
    fn sample(&self, line: LineId) -> impl Future<Output = Result<Level, HardwareError>> + Send;

    /// Block until the line changes level, `timeout` elapses, or the line closes.
    ///
    /// `None` waits without a timeout.
    fn wait_for_edge(
        &self,
        line: LineId,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<EdgeWait, HardwareError>> + Send;

    /// Reset every configured line to an unconfigured state.
    ///
    /// Must be idempotent and safe to call when nothing was configured.
    fn release_all(&self) -> impl Future<Output = ()> + Send;
}

impl<T: LineDriver> LineDriver for Arc<T> {
    fn set_numbering(
        &self,
        mode: PinMode,
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        (**self).set_numbering(mode)
    }

    fn configure(
        &self,
        line: LineId,
        resistor: Resistor,
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        (**self).configure(line, resistor)
    }

    fn sample(&self, line: LineId) -> impl Future<Output = Result<Level, HardwareError>> + Send {
        (**self).sample(line)
    }

    fn wait_for_edge(
        &self,
        line: LineId,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<EdgeWait, HardwareError>> + Send {
        (**self).wait_for_edge(line, timeout)
    }

    fn release_all(&self) -> impl Future<Output = ()> + Send {
        (**self).release_all()
    }
}
