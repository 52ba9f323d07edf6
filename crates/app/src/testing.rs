//! In-memory port implementations for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use thingpin_domain::error::{HardwareError, PublishError};
use thingpin_domain::level::Level;
use thingpin_domain::line::{LineId, PinMode, Resistor};

use crate::ports::{EdgeWait, LineDriver, Publisher};

struct Step {
    remaining: Duration,
    level: Level,
}

#[derive(Default)]
struct FakeLine {
    level: Option<Level>,
    steps: VecDeque<Step>,
    reads: VecDeque<Level>,
    fail_after: Option<usize>,
    samples: usize,
    waits: usize,
}

/// Line driver whose lines follow a script.
///
/// Edge lines consume one `(delay_ms, level)` step per wait; once the script
/// is exhausted every wait returns [`EdgeWait::Closed`]. Polled lines pop one
/// queued reading per sample, then keep returning the last level.
#[derive(Default)]
pub(crate) struct FakeDriver {
    lines: Mutex<HashMap<LineId, FakeLine>>,
    numbering: Mutex<Option<PinMode>>,
    fail_configure: Mutex<HashSet<LineId>>,
    configures: AtomicUsize,
    releases: AtomicUsize,
}

impl FakeDriver {
    fn with_line<T>(&self, line: LineId, f: impl FnOnce(&mut FakeLine) -> T) -> T {
        let mut lines = self.lines.lock().unwrap();
        f(lines.entry(line).or_default())
    }

    pub(crate) fn script(&self, line: LineId, steps: &[(u64, Level)]) {
        self.with_line(line, |l| {
            l.steps.extend(steps.iter().map(|&(delay, level)| Step {
                remaining: Duration::from_millis(delay),
                level,
            }));
        });
    }

    pub(crate) fn reads(&self, line: LineId, levels: &[Level]) {
        self.with_line(line, |l| l.reads.extend(levels.iter().copied()));
    }

    pub(crate) fn constant(&self, line: LineId, level: Level) {
        self.with_line(line, |l| l.level = Some(level));
    }

    pub(crate) fn fail_reads(&self, line: LineId) {
        self.fail_reads_after(line, 0);
    }

    /// Let `ok` samples succeed, then fail every read.
    pub(crate) fn fail_reads_after(&self, line: LineId, ok: usize) {
        self.with_line(line, |l| l.fail_after = Some(ok));
    }

    pub(crate) fn fail_configure(&self, line: LineId) {
        self.fail_configure.lock().unwrap().insert(line);
    }

    pub(crate) fn samples(&self, line: LineId) -> usize {
        self.with_line(line, |l| l.samples)
    }

    pub(crate) fn waits(&self, line: LineId) -> usize {
        self.with_line(line, |l| l.waits)
    }

    pub(crate) fn configures(&self) -> usize {
        self.configures.load(Ordering::SeqCst)
    }

    pub(crate) fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub(crate) fn numbering(&self) -> Option<PinMode> {
        *self.numbering.lock().unwrap()
    }
}

impl LineDriver for FakeDriver {
    async fn set_numbering(&self, mode: PinMode) -> Result<(), HardwareError> {
        *self.numbering.lock().unwrap() = Some(mode);
        Ok(())
    }

    async fn configure(&self, line: LineId, _resistor: Resistor) -> Result<(), HardwareError> {
        self.configures.fetch_add(1, Ordering::SeqCst);
        if self.fail_configure.lock().unwrap().contains(&line) {
            return Err(HardwareError::Configure {
                line,
                source: "fake configure failure".into(),
            });
        }
        self.with_line(line, |_| ());
        Ok(())
    }

    async fn sample(&self, line: LineId) -> Result<Level, HardwareError> {
        self.with_line(line, |l| {
            l.samples += 1;
            if l.fail_after.is_some_and(|ok| l.samples > ok) {
                return Err(HardwareError::Read {
                    line,
                    source: "fake read failure".into(),
                });
            }
            if let Some(level) = l.reads.pop_front() {
                l.level = Some(level);
            }
            Ok(l.level.unwrap_or(Level::Low))
        })
    }

    async fn wait_for_edge(
        &self,
        line: LineId,
        timeout: Option<Duration>,
    ) -> Result<EdgeWait, HardwareError> {
        let planned = self.with_line(line, |l| {
            l.waits += 1;
            let step = l.steps.front_mut()?;
            Some(match timeout {
                Some(timeout) if timeout < step.remaining => {
                    step.remaining -= timeout;
                    (timeout, EdgeWait::Timeout)
                }
                _ => (step.remaining, EdgeWait::Edge),
            })
        });
        let Some((delay, outcome)) = planned else {
            return Ok(EdgeWait::Closed);
        };

        tokio::time::sleep(delay).await;

        if outcome == EdgeWait::Edge {
            self.with_line(line, |l| {
                if let Some(step) = l.steps.pop_front() {
                    l.level = Some(step.level);
                }
            });
        }
        Ok(outcome)
    }

    async fn release_all(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Publisher that records every notification.
#[derive(Default)]
pub(crate) struct RecordingPublisher {
    messages: Mutex<Vec<(String, serde_json::Value)>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    attempts: AtomicUsize,
    fail_sends: AtomicBool,
    fail_connect: AtomicBool,
}

impl RecordingPublisher {
    pub(crate) fn messages(&self) -> Vec<(String, serde_json::Value)> {
        self.messages.lock().unwrap().clone()
    }

    pub(crate) fn messages_for(&self, name: &str) -> Vec<serde_json::Value> {
        self.messages()
            .into_iter()
            .filter(|(n, _)| n == name)
            .map(|(_, payload)| payload)
            .collect()
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }
}

impl Publisher for RecordingPublisher {
    async fn connect(&self) -> Result<(), PublishError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(PublishError::Connect("fake connect failure".into()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn notify(&self, name: &str, payload: &serde_json::Value) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(PublishError::Send {
                thing: name.to_string(),
                source: "fake send failure".into(),
            });
        }
        self.messages
            .lock()
            .unwrap()
            .push((name.to_string(), payload.clone()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), PublishError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
