//! Debounce — turns a noisy stream of raw samples into accepted transitions.
//!
//! The [`Debouncer`] is a pure state machine: it is fed a raw [`Level`] and
//! the monotonic time it was read, and answers with a [`Transition`] when the
//! sample completes a genuine change.
//!
//! ## Rules
//!
//! 1. The very first sample is always accepted and reported as an *initial*
//!    transition (`old == None`). This establishes a baseline for every line,
//!    even when the debounce delay is zero.
//! 2. Every raw flip restarts the candidate window. Bounce noise therefore
//!    keeps resetting the window instead of accumulating toward acceptance.
//! 3. A sample is accepted when the line had been quiet (no raw flip) for at
//!    least the debounce delay *before* it was read, and it differs from the
//!    currently accepted level.
//!
//! The hold time in rule 3 is measured up to the incoming sample, before the
//! window restarts. A clean edge after a quiet period is accepted at once;
//! bounces following it within the delay are absorbed; a value that settles
//! after bouncing is accepted by the first sample read a full delay after the
//! last flip.

use std::time::{Duration, Instant};

use crate::level::Level;

/// An accepted, de-noised state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Previously accepted level; `None` for the initial reading.
    pub old: Option<Level>,
    /// Newly accepted level.
    pub new: Level,
    /// Time since the previous accepted transition; `None` for the initial reading.
    pub elapsed: Option<Duration>,
}

impl Transition {
    /// The first reading of a line.
    #[must_use]
    pub fn initial(level: Level) -> Self {
        Self {
            old: None,
            new: level,
            elapsed: None,
        }
    }

    #[must_use]
    pub fn is_initial(&self) -> bool {
        self.old.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
struct DebounceState {
    accepted: Level,
    candidate: Level,
    candidate_since: Instant,
    last_transition: Instant,
}

/// Per-line debounce state machine.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    state: Option<DebounceState>,
}

impl Debouncer {
    /// Create a debouncer requiring `delay` of quiet before accepting a change.
    ///
    /// A zero delay accepts every raw flip.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay, state: None }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Last accepted level, `None` before the first sample.
    #[must_use]
    pub fn accepted(&self) -> Option<Level> {
        self.state.map(|s| s.accepted)
    }

    /// Whether the last raw sample differs from the accepted level.
    ///
    /// While settling, another sample taken one delay later may complete
    /// the change even if the line does not move again.
    #[must_use]
    pub fn is_settling(&self) -> bool {
        self.state.is_some_and(|s| s.candidate != s.accepted)
    }

    /// Feed one raw sample taken at `now`.
    ///
    /// Timestamps must be non-decreasing; an earlier timestamp is treated as
    /// zero elapsed time.
    pub fn observe(&mut self, raw: Level, now: Instant) -> Option<Transition> {
        let Some(state) = self.state.as_mut() else {
            self.state = Some(DebounceState {
                accepted: raw,
                candidate: raw,
                candidate_since: now,
                last_transition: now,
            });
            return Some(Transition::initial(raw));
        };

        let held = now.saturating_duration_since(state.candidate_since);
        if raw != state.candidate {
            state.candidate = raw;
            state.candidate_since = now;
        }

        if held < self.delay || state.candidate == state.accepted {
            return None;
        }

        let old = state.accepted;
        state.accepted = state.candidate;
        let elapsed = now.saturating_duration_since(state.last_transition);
        state.last_transition = now;

        Some(Transition {
            old: Some(old),
            new: state.accepted,
            elapsed: Some(elapsed),
        })
    }
}
