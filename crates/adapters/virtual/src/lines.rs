//! Virtual input lines.
//!
//! A line is either *scripted* (a finite list of `(delay, level)` steps, each
//! consumed by one edge wait, after which the line reports
//! [`EdgeWait::Closed`]) or *live* (changed from outside with
//! [`VirtualLines::set_level`], waking any pending edge wait).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use thingpin_app::ports::{EdgeWait, LineDriver};
use thingpin_domain::error::HardwareError;
use thingpin_domain::level::Level;
use thingpin_domain::line::{LineId, PinMode, Resistor};

#[derive(Debug)]
struct Step {
    remaining: Duration,
    level: Level,
}

#[derive(Debug)]
struct VirtualLine {
    level: watch::Sender<Level>,
    steps: VecDeque<Step>,
    scripted: bool,
    configured: bool,
    fail_reads: bool,
    samples: usize,
    waits: usize,
}

impl VirtualLine {
    fn new(level: Level) -> Self {
        Self {
            level: watch::Sender::new(level),
            steps: VecDeque::new(),
            scripted: false,
            configured: false,
            fail_reads: false,
            samples: 0,
            waits: 0,
        }
    }
}

enum Plan {
    Sleep(Duration, EdgeWait),
    Watch(watch::Receiver<Level>),
    Closed,
}

/// In-memory [`LineDriver`].
#[derive(Debug, Default)]
pub struct VirtualLines {
    lines: Mutex<HashMap<LineId, VirtualLine>>,
    numbering: Mutex<Option<PinMode>>,
    releases: AtomicUsize,
}

impl VirtualLines {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lines(&self) -> MutexGuard<'_, HashMap<LineId, VirtualLine>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_line<T>(&self, line: LineId, f: impl FnOnce(&mut VirtualLine) -> T) -> T {
        let mut lines = self.lines();
        f(lines
            .entry(line)
            .or_insert_with(|| VirtualLine::new(Level::Low)))
    }

    /// Append `(delay, level)` steps to the script of `line`.
    pub fn script(&self, line: LineId, steps: impl IntoIterator<Item = (Duration, Level)>) {
        self.with_line(line, |l| {
            l.scripted = true;
            l.steps.extend(
                steps
                    .into_iter()
                    .map(|(remaining, level)| Step { remaining, level }),
            );
        });
    }

    /// Drive a live line to `level`, waking edge waits if it changed.
    pub fn set_level(&self, line: LineId, level: Level) {
        self.with_line(line, |l| {
            l.level.send_if_modified(|current| {
                let changed = *current != level;
                *current = level;
                changed
            });
        });
    }

    /// Make every subsequent read of `line` fail.
    pub fn fail_reads(&self, line: LineId) {
        self.with_line(line, |l| l.fail_reads = true);
    }

    #[must_use]
    pub fn level(&self, line: LineId) -> Option<Level> {
        self.lines().get(&line).map(|l| *l.level.borrow())
    }

    #[must_use]
    pub fn samples(&self, line: LineId) -> usize {
        self.lines().get(&line).map_or(0, |l| l.samples)
    }

    #[must_use]
    pub fn waits(&self, line: LineId) -> usize {
        self.lines().get(&line).map_or(0, |l| l.waits)
    }

    #[must_use]
    pub fn numbering(&self) -> Option<PinMode> {
        *self
            .numbering
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn plan(&self, line: LineId, timeout: Option<Duration>) -> Result<Plan, HardwareError> {
        let mut lines = self.lines();
        let l = lines
            .get_mut(&line)
            .filter(|l| l.configured)
            .ok_or(HardwareError::NotConfigured(line))?;
        l.waits += 1;
        if !l.scripted {
            return Ok(Plan::Watch(l.level.subscribe()));
        }
        let Some(step) = l.steps.front_mut() else {
            return Ok(Plan::Closed);
        };
        Ok(match timeout {
            Some(timeout) if timeout < step.remaining => {
                step.remaining -= timeout;
                Plan::Sleep(timeout, EdgeWait::Timeout)
            }
            _ => Plan::Sleep(step.remaining, EdgeWait::Edge),
        })
    }
}

impl LineDriver for VirtualLines {
    async fn set_numbering(&self, mode: PinMode) -> Result<(), HardwareError> {
        *self
            .numbering
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(mode);
        Ok(())
    }

    async fn configure(&self, line: LineId, resistor: Resistor) -> Result<(), HardwareError> {
        let idle = match resistor {
            Resistor::PullUp => Level::High,
            Resistor::PullDown | Resistor::Float => Level::Low,
        };
        let mut lines = self.lines();
        lines
            .entry(line)
            .or_insert_with(|| VirtualLine::new(idle))
            .configured = true;
        tracing::debug!(%line, %resistor, "virtual line configured");
        Ok(())
    }

    async fn sample(&self, line: LineId) -> Result<Level, HardwareError> {
        let mut lines = self.lines();
        let l = lines
            .get_mut(&line)
            .filter(|l| l.configured)
            .ok_or(HardwareError::NotConfigured(line))?;
        l.samples += 1;
        if l.fail_reads {
            return Err(HardwareError::Read {
                line,
                source: "virtual read failure".into(),
            });
        }
        Ok(*l.level.borrow())
    }

    async fn wait_for_edge(
        &self,
        line: LineId,
        timeout: Option<Duration>,
    ) -> Result<EdgeWait, HardwareError> {
        match self.plan(line, timeout)? {
            Plan::Closed => Ok(EdgeWait::Closed),
            Plan::Sleep(delay, outcome) => {
                tokio::time::sleep(delay).await;
                if outcome == EdgeWait::Edge {
                    let mut lines = self.lines();
                    let Some(l) = lines.get_mut(&line) else {
                        return Ok(EdgeWait::Closed);
                    };
                    if let Some(step) = l.steps.pop_front() {
                        l.level.send_replace(step.level);
                    }
                }
                Ok(outcome)
            }
            Plan::Watch(mut level) => {
                let changed = match timeout {
                    Some(timeout) => match tokio::time::timeout(timeout, level.changed()).await {
                        Ok(changed) => changed,
                        Err(_) => return Ok(EdgeWait::Timeout),
                    },
                    None => level.changed().await,
                };
                Ok(match changed {
                    Ok(()) => EdgeWait::Edge,
                    // The line was released.
                    Err(_) => EdgeWait::Closed,
                })
            }
        }
    }

    async fn release_all(&self) {
        let released = std::mem::take(&mut *self.lines());
        self.releases.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(count = released.len(), "virtual lines released");
    }
}
