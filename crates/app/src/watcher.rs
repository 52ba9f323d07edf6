//! Line watcher — samples one input line and reports accepted transitions.
//!
//! Each watcher runs as its own tokio task. It waits according to its
//! [`SamplingStrategy`], reads the line, feeds the reading to a
//! [`Debouncer`], and sends every accepted [`Transition`] to the orchestrator
//! as a [`WatcherEvent`]. The send completes before the next sample is taken,
//! so transitions of one line arrive in order.
//!
//! Stop requests are only observed while waiting: a sample that has been
//! taken is always delivered.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use thingpin_domain::debounce::{Debouncer, Transition};
use thingpin_domain::error::HardwareError;
use thingpin_domain::line::LineId;
use thingpin_domain::thing::Sampling;

use crate::ports::{EdgeWait, LineDriver};

/// Wait cadence for polled lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollSchedule {
    /// Wait the same interval forever.
    Every(Duration),
    /// Wait each interval in turn, then stop.
    Sequence(Vec<Duration>),
}

impl PollSchedule {
    fn intervals(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        match self {
            Self::Every(interval) => Box::new(std::iter::repeat(*interval)),
            Self::Sequence(intervals) => Box::new(intervals.clone().into_iter()),
        }
    }
}

/// How a watcher decides when to take the next sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamplingStrategy {
    /// Sleep per the schedule, then sample.
    Poll(PollSchedule),
    /// Wait for the driver to report an edge, then sample.
    ///
    /// The first wait has a zero timeout so the line is read right away.
    /// While the debouncer is settling the wait is bounded by the debounce
    /// delay, so a value that stops bouncing is picked up without another edge.
    Edge,
}

impl From<Sampling> for SamplingStrategy {
    fn from(sampling: Sampling) -> Self {
        match sampling {
            Sampling::Poll { interval } => Self::Poll(PollSchedule::Every(interval)),
            Sampling::Edge => Self::Edge,
        }
    }
}

/// Message from a watcher to the orchestrator.
#[derive(Debug)]
pub enum WatcherEvent {
    /// The debouncer accepted a transition.
    Transition { line: LineId, transition: Transition },
    /// The watcher ended normally (stopped, schedule exhausted, line closed).
    Finished { line: LineId },
    /// The watcher ended because the hardware failed.
    Failed { line: LineId, error: HardwareError },
}

enum Wake {
    Sample,
    Stop,
}

/// Samples a single line until stopped.
pub struct LineWatcher<D> {
    line: LineId,
    driver: Arc<D>,
    strategy: SamplingStrategy,
    debouncer: Debouncer,
    events: mpsc::Sender<WatcherEvent>,
    span: tracing::Span,
}

impl<D: LineDriver + 'static> LineWatcher<D> {
    /// Create a watcher for `line`. Nothing runs until [`start`](Self::start).
    pub fn new(
        line: LineId,
        driver: Arc<D>,
        strategy: SamplingStrategy,
        debounce: Duration,
        events: mpsc::Sender<WatcherEvent>,
    ) -> Self {
        Self {
            line,
            driver,
            strategy,
            debouncer: Debouncer::new(debounce),
            events,
            span: tracing::info_span!("line_watcher", %line),
        }
    }

    /// Use `span` for everything this watcher logs.
    #[must_use]
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    #[must_use]
    pub fn line(&self) -> LineId {
        self.line
    }

    /// Spawn the sampling task.
    #[must_use]
    pub fn start(self) -> WatcherHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let line = self.line;
        let span = self.span.clone();
        let task = tokio::spawn(self.run(stop_rx).instrument(span));
        WatcherHandle {
            line,
            stop: stop_tx,
            task,
        }
    }

    async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let line = self.line;
        let event = match self.sample_loop(&mut stop).await {
            Ok(()) => {
                tracing::debug!("line watcher finished");
                WatcherEvent::Finished { line }
            }
            Err(error) => {
                tracing::error!(%error, "line watcher terminated");
                WatcherEvent::Failed { line, error }
            }
        };
        // Nobody left to tell when the orchestrator is gone.
        let _ = self.events.send(event).await;
    }

    async fn sample_loop(&mut self, stop: &mut watch::Receiver<bool>) -> Result<(), HardwareError> {
        let mut intervals = match &self.strategy {
            SamplingStrategy::Poll(schedule) => Some(schedule.intervals()),
            SamplingStrategy::Edge => None,
        };

        loop {
            if *stop.borrow() {
                return Ok(());
            }
            let wake = match intervals.as_mut() {
                Some(intervals) => {
                    let Some(interval) = intervals.next() else {
                        return Ok(());
                    };
                    wait_interval(interval, stop).await
                }
                None => self.wait_edge(stop).await?,
            };
            if matches!(wake, Wake::Stop) {
                return Ok(());
            }

            let level = self.driver.sample(self.line).await?;
            let now = Instant::now().into_std();
            if let Some(transition) = self.debouncer.observe(level, now) {
                tracing::debug!(
                    initial = transition.is_initial(),
                    old = ?transition.old,
                    new = %transition.new,
                    elapsed = ?transition.elapsed,
                    "transition accepted"
                );
                let event = WatcherEvent::Transition {
                    line: self.line,
                    transition,
                };
                if self.events.send(event).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    async fn wait_edge(&self, stop: &mut watch::Receiver<bool>) -> Result<Wake, HardwareError> {
        // The baseline reading is taken at once, edge or not.
        let timeout = if self.debouncer.accepted().is_none() {
            Some(Duration::ZERO)
        } else {
            self.debouncer.is_settling().then(|| self.debouncer.delay())
        };
        tokio::select! {
            biased;
            _ = stop.changed() => Ok(Wake::Stop),
            outcome = self.driver.wait_for_edge(self.line, timeout) => match outcome? {
                EdgeWait::Edge | EdgeWait::Timeout => Ok(Wake::Sample),
                EdgeWait::Closed => Ok(Wake::Stop),
            },
        }
    }
}

async fn wait_interval(interval: Duration, stop: &mut watch::Receiver<bool>) -> Wake {
    tokio::select! {
        biased;
        // A dropped handle counts as a stop request too.
        _ = stop.changed() => Wake::Stop,
        () = tokio::time::sleep(interval) => Wake::Sample,
    }
}

/// Control handle for a running [`LineWatcher`].
///
/// Dropping the handle stops the watcher.
pub struct WatcherHandle {
    line: LineId,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    #[must_use]
    pub fn line(&self) -> LineId {
        self.line
    }

    /// Ask the watcher to stop; takes effect within one wait.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Wait for the watcher task to end.
    pub async fn join(self) {
        let line = self.line;
        let Self { stop, task, .. } = self;
        if let Err(err) = task.await {
            tracing::error!(%line, %err, "line watcher task panicked");
        }
        drop(stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDriver;
    use thingpin_domain::level::Level::{self, High, Low};

    const LINE: LineId = LineId::new(19);

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    /// Run a watcher to completion and return every event it sent.
    async fn run_to_end(
        driver: &Arc<FakeDriver>,
        strategy: SamplingStrategy,
        debounce: Duration,
    ) -> Vec<WatcherEvent> {
        let (tx, mut rx) = mpsc::channel(16);
        let handle = LineWatcher::new(LINE, driver.clone(), strategy, debounce, tx).start();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let done = !matches!(event, WatcherEvent::Transition { .. });
            events.push(event);
            if done {
                break;
            }
        }
        handle.join().await;
        events
    }

    fn accepted(events: &[WatcherEvent]) -> Vec<Level> {
        events
            .iter()
            .filter_map(|e| match e {
                WatcherEvent::Transition { transition, .. } => Some(transition.new),
                _ => None,
            })
            .collect()
    }

    struct UseCase {
        debounce: u64,
        readings: &'static [(u64, Level)],
        expected: &'static [Level],
    }

    const USE_CASES: &[UseCase] = &[
        UseCase {
            debounce: 0,
            readings: &[(0, High)],
            expected: &[High],
        },
        UseCase {
            debounce: 0,
            readings: &[(0, Low), (0, High)],
            expected: &[Low, High],
        },
        UseCase {
            debounce: 100,
            readings: &[(0, Low), (50, High)],
            expected: &[Low],
        },
        UseCase {
            debounce: 100,
            readings: &[(0, Low), (110, High)],
            expected: &[Low, High],
        },
        UseCase {
            debounce: 3000,
            readings: &[(0, Low), (2000, High), (2000, High), (1000, High)],
            expected: &[Low, High],
        },
        UseCase {
            debounce: 10_000,
            readings: &[(0, Low), (1000, High), (1000, Low), (9000, High)],
            expected: &[Low],
        },
        UseCase {
            debounce: 3000,
            readings: &[(0, Low), (5000, High), (0, Low), (1000, Low), (2000, Low)],
            expected: &[Low, High, Low],
        },
        UseCase {
            debounce: 1000,
            readings: &[(0, Low), (5000, Low), (0, Low), (1000, Low), (2000, Low)],
            expected: &[Low],
        },
    ];

    #[tokio::test(start_paused = true)]
    async fn should_match_every_edge_use_case() {
        for (index, case) in USE_CASES.iter().enumerate() {
            let driver = Arc::new(FakeDriver::default());
            driver.script(LINE, case.readings);

            let events = run_to_end(&driver, SamplingStrategy::Edge, ms(case.debounce)).await;

            assert_eq!(accepted(&events), case.expected, "use case {index}");
            assert_eq!(driver.waits(LINE), case.readings.len() + 1, "use case {index}");
            assert_eq!(driver.samples(LINE), case.readings.len(), "use case {index}");
            assert!(matches!(events.last(), Some(WatcherEvent::Finished { .. })));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn should_resample_after_debounce_window_on_edge_lines() {
        let driver = Arc::new(FakeDriver::default());
        driver.script(LINE, &[(0, Low), (50, High), (1000, Low)]);

        let events = run_to_end(&driver, SamplingStrategy::Edge, ms(100)).await;

        assert_eq!(accepted(&events), vec![Low, High, Low]);
        assert_eq!(driver.samples(LINE), 4);
        assert_eq!(driver.waits(LINE), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn should_read_baseline_before_first_edge() {
        let driver = Arc::new(FakeDriver::default());
        driver.constant(LINE, High);
        driver.script(LINE, &[(5000, Low)]);

        let events = run_to_end(&driver, SamplingStrategy::Edge, ms(100)).await;

        assert_eq!(accepted(&events), vec![High, Low]);
        let WatcherEvent::Transition { transition, .. } = &events[1] else {
            panic!("expected a transition, got {:?}", events[1]);
        };
        assert_eq!(transition.elapsed, Some(ms(5000)));
        assert_eq!(driver.samples(LINE), 2);
        assert_eq!(driver.waits(LINE), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn should_poll_until_sequence_is_exhausted() {
        let driver = Arc::new(FakeDriver::default());
        driver.reads(LINE, &[Low, Low, High]);
        let schedule = PollSchedule::Sequence(vec![ms(0), ms(0), ms(0)]);

        let events = run_to_end(&driver, SamplingStrategy::Poll(schedule), Duration::ZERO).await;

        assert_eq!(accepted(&events), vec![Low, High]);
        assert_eq!(driver.samples(LINE), 3);
        assert_eq!(driver.waits(LINE), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_absorb_quick_flip_when_polling() {
        let driver = Arc::new(FakeDriver::default());
        driver.reads(LINE, &[Low, High]);
        let schedule = PollSchedule::Sequence(vec![ms(0), ms(50)]);

        let events = run_to_end(&driver, SamplingStrategy::Poll(schedule), ms(100)).await;

        assert_eq!(accepted(&events), vec![Low]);
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_elapsed_time_between_transitions() {
        let driver = Arc::new(FakeDriver::default());
        driver.reads(LINE, &[Low, High]);
        let schedule = PollSchedule::Sequence(vec![ms(0), ms(250)]);

        let events = run_to_end(&driver, SamplingStrategy::Poll(schedule), Duration::ZERO).await;

        let WatcherEvent::Transition { transition, .. } = &events[1] else {
            panic!("expected a transition, got {:?}", events[1]);
        };
        assert_eq!(transition.old, Some(Low));
        assert_eq!(transition.elapsed, Some(ms(250)));
    }

    #[tokio::test(start_paused = true)]
    async fn should_stop_polling_on_request() {
        let driver = Arc::new(FakeDriver::default());
        driver.constant(LINE, High);
        let (tx, mut rx) = mpsc::channel(16);
        let handle = LineWatcher::new(
            LINE,
            driver.clone(),
            SamplingStrategy::Poll(PollSchedule::Every(ms(10))),
            Duration::ZERO,
            tx,
        )
        .start();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, WatcherEvent::Transition { .. }));
        tokio::time::sleep(ms(1000)).await;
        handle.stop();

        let last = rx.recv().await.unwrap();
        assert!(matches!(last, WatcherEvent::Finished { line } if line == LINE));
        handle.join().await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn should_stop_edge_wait_on_request() {
        let driver = Arc::new(FakeDriver::default());
        driver.script(LINE, &[(0, Low), (60_000, High)]);
        let (tx, mut rx) = mpsc::channel(16);
        let handle =
            LineWatcher::new(LINE, driver.clone(), SamplingStrategy::Edge, Duration::ZERO, tx)
                .start();

        assert!(matches!(rx.recv().await, Some(WatcherEvent::Transition { .. })));
        handle.stop();

        assert!(matches!(rx.recv().await, Some(WatcherEvent::Finished { .. })));
        handle.join().await;
        assert_eq!(driver.samples(LINE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_read_failure_and_terminate() {
        let driver = Arc::new(FakeDriver::default());
        driver.constant(LINE, Low);
        driver.fail_reads(LINE);

        let events = run_to_end(
            &driver,
            SamplingStrategy::Poll(PollSchedule::Every(ms(10))),
            Duration::ZERO,
        )
        .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            WatcherEvent::Failed { line, error: HardwareError::Read { .. } } if *line == LINE
        ));
    }

    #[test]
    fn should_build_strategy_from_sampling_config() {
        assert_eq!(
            SamplingStrategy::from(Sampling::Poll { interval: ms(20) }),
            SamplingStrategy::Poll(PollSchedule::Every(ms(20)))
        );
        assert_eq!(SamplingStrategy::from(Sampling::Edge), SamplingStrategy::Edge);
    }
}
