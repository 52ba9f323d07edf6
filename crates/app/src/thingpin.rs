//! Thingpin orchestrator — owns the line registry and the publisher.
//!
//! Watchers send their accepted transitions over a single channel; the
//! orchestrator is the only caller of [`Publisher::notify`], so publishing is
//! serialized no matter how many lines are watched.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::Instrument;

use thingpin_domain::debounce::Transition;
use thingpin_domain::level::Level;
use thingpin_domain::line::{LineId, PinMode};
use thingpin_domain::thing::{ThingConfig, ThingSet};

use crate::cost::{CostModel, guess_monthly_cost};
use crate::error::ThingpinError;
use crate::ports::{LineDriver, Publisher};
use crate::watcher::{LineWatcher, SamplingStrategy, WatcherEvent, WatcherHandle};

/// Process-wide orchestrator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub pin_mode: PinMode,
    /// Re-publish every known state this often; `None` disables the heartbeat.
    pub heartbeat: Option<Duration>,
    pub cost: CostModel,
    /// Capacity of the watcher → orchestrator channel.
    pub channel_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pin_mode: PinMode::default(),
            heartbeat: None,
            cost: CostModel::default(),
            channel_capacity: 64,
        }
    }
}

/// Lifecycle of a line's watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// Configured, watcher not started yet.
    Idle,
    Running,
    /// The watcher ended on its own or was stopped.
    Finished,
    /// Configuring or reading the line failed; it no longer reports.
    Failed,
}

#[derive(Debug)]
struct LineEntry {
    thing: ThingConfig,
    current: Option<Level>,
    status: LineStatus,
}

/// Drives every configured line and publishes their debounced states.
pub struct Thingpin<P, D> {
    publisher: P,
    driver: Arc<D>,
    settings: Settings,
    things: Vec<ThingConfig>,
    lines: BTreeMap<LineId, LineEntry>,
    pending: Vec<LineWatcher<D>>,
    handles: Vec<WatcherHandle>,
    events: Option<mpsc::Receiver<WatcherEvent>>,
    initialized: bool,
    connected: bool,
    claimed: bool,
    span: tracing::Span,
}

impl<P, D> Thingpin<P, D>
where
    P: Publisher,
    D: LineDriver + 'static,
{
    /// Create an orchestrator. Nothing touches the hardware or the network
    /// until [`initialize`](Self::initialize).
    pub fn new(publisher: P, driver: Arc<D>, settings: Settings, things: Vec<ThingConfig>) -> Self {
        Self {
            publisher,
            driver,
            settings,
            things,
            lines: BTreeMap::new(),
            pending: Vec::new(),
            handles: Vec::new(),
            events: None,
            initialized: false,
            connected: false,
            claimed: false,
            span: tracing::info_span!("thingpin"),
        }
    }

    /// Use `span` as the parent of everything the orchestrator and its
    /// watchers log.
    #[must_use]
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Last accepted level of `line`, if it has reported one.
    #[must_use]
    pub fn current_state(&self, line: LineId) -> Option<Level> {
        self.lines.get(&line).and_then(|entry| entry.current)
    }

    #[must_use]
    pub fn status(&self, line: LineId) -> Option<LineStatus> {
        self.lines.get(&line).map(|entry| entry.status)
    }

    /// Validate the things, connect the publisher and configure every line.
    ///
    /// Calling it again after success does nothing. A line that cannot be
    /// configured is marked [`LineStatus::Failed`] and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ThingpinError::Config`] for an invalid thing set (before any
    /// IO), [`ThingpinError::Hardware`] when the pin numbering cannot be set,
    /// and [`ThingpinError::Publish`] when the publisher cannot connect.
    pub async fn initialize(&mut self) -> Result<(), ThingpinError> {
        let span = self.span.clone();
        self.initialize_inner().instrument(span).await
    }

    async fn initialize_inner(&mut self) -> Result<(), ThingpinError> {
        if self.initialized {
            return Ok(());
        }
        let things = ThingSet::new(self.things.iter().cloned())?;

        self.driver.set_numbering(self.settings.pin_mode).await?;
        self.claimed = true;
        if !self.connected {
            self.publisher.connect().await?;
            self.connected = true;
        }

        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        for thing in things {
            let line = thing.line;
            let status = match self.driver.configure(line, thing.resistor).await {
                Ok(()) => {
                    let span = tracing::info_span!(
                        parent: &self.span,
                        "line",
                        thing = %thing.name,
                        %line
                    );
                    let watcher = LineWatcher::new(
                        line,
                        self.driver.clone(),
                        SamplingStrategy::from(thing.sampling),
                        thing.debounce,
                        tx.clone(),
                    )
                    .with_span(span);
                    self.pending.push(watcher);
                    LineStatus::Idle
                }
                Err(error) => {
                    tracing::error!(thing = %thing.name, %line, %error, "unable to configure line");
                    LineStatus::Failed
                }
            };
            tracing::debug!(
                thing = %thing.name,
                %line,
                resistor = %thing.resistor,
                debounce = ?thing.debounce,
                sampling = ?thing.sampling,
                "line registered"
            );
            self.lines.insert(
                line,
                LineEntry {
                    thing,
                    current: None,
                    status,
                },
            );
        }
        self.events = Some(rx);
        self.initialized = true;

        let watched = self.pending.len();
        tracing::info!(
            pin_mode = %self.settings.pin_mode,
            lines = self.lines.len(),
            watched,
            heartbeat = ?self.settings.heartbeat,
            "thingpin initialized"
        );
        let cost = guess_monthly_cost(&self.settings.cost, watched, self.settings.heartbeat);
        tracing::info!(
            monthly_cost = cost,
            "messaging cost guesstimate, don't take it too seriously"
        );
        Ok(())
    }

    /// Record an accepted transition of `line` and publish the mapped payload.
    ///
    /// Publish failures are logged and dropped.
    pub async fn update(&mut self, line: LineId, transition: &Transition) {
        let Some(entry) = self.lines.get_mut(&line) else {
            tracing::warn!(%line, "transition for unknown line ignored");
            return;
        };
        entry.current = Some(transition.new);
        let name = entry.thing.name.as_str();
        let payload = entry.thing.states.payload(transition.new);
        tracing::info!(
            thing = name,
            %line,
            initial = transition.is_initial(),
            level = %transition.new,
            elapsed = ?transition.elapsed,
            %payload,
            "state changed"
        );
        if let Err(error) = self.publisher.notify(name, payload).await {
            tracing::warn!(thing = name, %error, "state notification dropped");
        }
    }

    /// Re-publish the current state of every line that has one.
    ///
    /// Lines whose watcher failed are skipped so a stale state does not mask
    /// the failure.
    pub async fn heartbeat(&self) {
        for (line, entry) in &self.lines {
            let Some(level) = entry.current else {
                continue;
            };
            if entry.status == LineStatus::Failed {
                continue;
            }
            let name = entry.thing.name.as_str();
            tracing::debug!(thing = name, %line, %level, "heartbeat");
            if let Err(error) = self
                .publisher
                .notify(name, entry.thing.states.payload(level))
                .await
            {
                tracing::warn!(thing = name, %error, "heartbeat notification dropped");
            }
        }
    }

    /// Initialize, start every watcher and publish until `shutdown` resolves,
    /// then stop the watchers, publish whatever they still had in flight and
    /// clean up.
    ///
    /// # Errors
    ///
    /// Returns the [`initialize`](Self::initialize) error, after releasing
    /// whatever was claimed; nothing fails once the watchers are running.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<(), ThingpinError> {
        let span = self.span.clone();
        self.run_inner(shutdown).instrument(span).await
    }

    async fn run_inner(&mut self, shutdown: impl Future<Output = ()>) -> Result<(), ThingpinError> {
        if let Err(error) = self.initialize_inner().await {
            self.cleanup_inner().await;
            return Err(error);
        }
        self.start_watchers();

        let Some(mut events) = self.events.take() else {
            tracing::warn!("thingpin is already running");
            return Ok(());
        };
        let mut ticker = self.settings.heartbeat.filter(|h| !h.is_zero()).map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        tokio::pin!(shutdown);
        let mut open = true;
        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                event = events.recv(), if open => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        tracing::info!("every line watcher has ended");
                        open = false;
                    }
                },
                () = tick(ticker.as_mut()) => self.heartbeat().await,
            }
        }

        for handle in &self.handles {
            handle.stop();
        }
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        for handle in std::mem::take(&mut self.handles) {
            handle.join().await;
        }
        self.cleanup_inner().await;
        Ok(())
    }

    fn start_watchers(&mut self) {
        for watcher in std::mem::take(&mut self.pending) {
            if let Some(entry) = self.lines.get_mut(&watcher.line()) {
                entry.status = LineStatus::Running;
            }
            self.handles.push(watcher.start());
        }
    }

    async fn handle_event(&mut self, event: WatcherEvent) {
        match event {
            WatcherEvent::Transition { line, transition } => {
                self.update(line, &transition).await;
            }
            WatcherEvent::Finished { line } => self.set_status(line, LineStatus::Finished),
            WatcherEvent::Failed { line, error } => {
                tracing::warn!(%line, %error, "line stopped reporting");
                self.set_status(line, LineStatus::Failed);
            }
        }
    }

    fn set_status(&mut self, line: LineId, status: LineStatus) {
        if let Some(entry) = self.lines.get_mut(&line) {
            entry.status = status;
        }
    }

    /// Disconnect the publisher and release every line.
    ///
    /// Safe to call before [`initialize`](Self::initialize) and more than once.
    pub async fn cleanup(&mut self) {
        let span = self.span.clone();
        self.cleanup_inner().instrument(span).await;
    }

    async fn cleanup_inner(&mut self) {
        for handle in &self.handles {
            handle.stop();
        }
        // Unstarted watchers hold the channel sender and the driver.
        self.pending.clear();

        if self.connected {
            if let Err(error) = self.publisher.disconnect().await {
                tracing::warn!(%error, "unable to disconnect publisher");
            }
            self.connected = false;
        }
        if self.claimed {
            self.driver.release_all().await;
            self.claimed = false;
            tracing::info!("lines released");
        }
    }
}

async fn tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
