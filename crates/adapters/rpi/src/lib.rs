//! # thingpin-adapter-rpi
//!
//! Raspberry Pi GPIO adapter — implements [`LineDriver`] with rppal.
//!
//! Lines are numbered either by BCM GPIO number or by physical header pin
//! (`BOARD`); both are translated to BCM before touching the hardware.
//! Edge waits arm a both-edges interrupt and poll it on the blocking thread
//! pool in short slices, so a cancelled wait frees its thread quickly.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `thingpin-app` and `thingpin-domain`.

mod error;
pub mod numbering;

pub use error::RpiError;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, Trigger};
use tokio::time::Instant;

use thingpin_app::ports::{EdgeWait, LineDriver};
use thingpin_domain::error::HardwareError;
use thingpin_domain::level::Level;
use thingpin_domain::line::{LineId, PinMode, Resistor};

/// Longest single blocking interrupt poll.
const WAIT_SLICE: Duration = Duration::from_millis(250);

type SharedPin = Arc<Mutex<InputPin>>;

#[derive(Default)]
struct State {
    gpio: Option<Gpio>,
    mode: Option<PinMode>,
    pins: HashMap<LineId, SharedPin>,
}

/// [`LineDriver`] backed by the Raspberry Pi GPIO peripheral.
#[derive(Default)]
pub struct RpiDriver {
    state: Mutex<State>,
}

impl RpiDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pin(&self, line: LineId) -> Option<SharedPin> {
        self.state().pins.get(&line).cloned()
    }

    fn open(&self, mode: PinMode) -> Result<(), RpiError> {
        let mut state = self.state();
        if state.gpio.is_none() {
            state.gpio = Some(Gpio::new().map_err(RpiError::Open)?);
        }
        state.mode = Some(mode);
        Ok(())
    }

    fn claim(&self, line: LineId, resistor: Resistor) -> Result<(), RpiError> {
        let mut state = self.state();
        let mode = state.mode.ok_or(RpiError::NoNumbering(line))?;
        let gpio = state.gpio.as_ref().ok_or(RpiError::NoNumbering(line))?;
        let bcm = numbering::to_bcm(mode, line).ok_or(RpiError::NotAGpio { line, mode })?;

        let setup = |source| RpiError::Setup { line, bcm, source };
        let pin = gpio.get(bcm).map_err(setup)?;
        let mut input = match resistor {
            Resistor::PullUp => pin.into_input_pullup(),
            Resistor::PullDown => pin.into_input_pulldown(),
            Resistor::Float => pin.into_input(),
        };
        input.set_interrupt(Trigger::Both, None).map_err(setup)?;

        tracing::debug!(%line, bcm, %resistor, "GPIO claimed");
        state.pins.insert(line, Arc::new(Mutex::new(input)));
        Ok(())
    }

    fn read(&self, line: LineId) -> Result<Level, RpiError> {
        let pin = self.pin(line).ok_or(RpiError::NotConfigured(line))?;
        let pin = pin.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Level::from(pin.is_high()))
    }

    async fn wait(&self, line: LineId, timeout: Option<Duration>) -> Result<EdgeWait, RpiError> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        if self.pin(line).is_none() {
            return Err(RpiError::NotConfigured(line));
        }
        loop {
            let slice = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Ok(EdgeWait::Timeout);
                    }
                    left.min(WAIT_SLICE)
                }
                None => WAIT_SLICE,
            };
            // A released line stops the watcher instead of failing it.
            let Some(pin) = self.pin(line) else {
                return Ok(EdgeWait::Closed);
            };
            let event = tokio::task::spawn_blocking(move || {
                let mut pin = pin.lock().unwrap_or_else(PoisonError::into_inner);
                pin.poll_interrupt(false, Some(slice))
            })
            .await
            .map_err(|source| RpiError::Blocking { line, source })?
            .map_err(|source| RpiError::Interrupt { line, source })?;
            if event.is_some() {
                return Ok(EdgeWait::Edge);
            }
        }
    }
}

impl LineDriver for RpiDriver {
    async fn set_numbering(&self, mode: PinMode) -> Result<(), HardwareError> {
        self.open(mode).map_err(RpiError::into_domain)?;
        tracing::info!(%mode, "GPIO numbering set");
        Ok(())
    }

    async fn configure(&self, line: LineId, resistor: Resistor) -> Result<(), HardwareError> {
        self.claim(line, resistor).map_err(RpiError::into_domain)
    }

    async fn sample(&self, line: LineId) -> Result<Level, HardwareError> {
        self.read(line).map_err(RpiError::into_domain)
    }

    async fn wait_for_edge(
        &self,
        line: LineId,
        timeout: Option<Duration>,
    ) -> Result<EdgeWait, HardwareError> {
        self.wait(line, timeout).await.map_err(RpiError::into_domain)
    }

    async fn release_all(&self) {
        let released = {
            let mut state = self.state();
            state.mode = None;
            std::mem::take(&mut state.pins)
        };
        if !released.is_empty() {
            // Dropping an InputPin resets it to its original mode.
            tracing::info!(count = released.len(), "GPIO lines released");
        }
    }
}
