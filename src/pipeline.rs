//! Alert pipeline supervisor.
//!
//! Wires the producers to the evaluator:
//!
//! ```text
//!   PreferencePoller ──watch──┐
//!                             ├──> consumer ──> AlertEvaluator ──> Notifier
//!   StreamReader ──┐          │
//!   CurrentAqi ────┴──queue───┘
//! ```
//!
//! The consumer is the only place that decides whether the alert stream
//! should be running. It re-checks that on every preference snapshot and
//! evaluates every event against the snapshot it holds at the moment the
//! event is dequeued, so the window in which stale preferences apply is
//! bounded by the poll interval.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::alert::notifier::Notifier;
use crate::alert::{AlertEvaluator, staleness};
use crate::config::ServiceConfig;
use crate::ingest::preferences::{PreferencePoller, PreferenceSnapshot, SnapshotReceiver};
use crate::ingest::telemetry::CurrentAqiPoller;
use crate::ingest::{AlertBackend, PipelineEvent, TaskGuard, stream};
use crate::logging::{self, Component};
use crate::model::{ForecastFrame, Preferences};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub preferences_interval: Duration,
    pub telemetry_interval: Duration,
    /// Station for the current-AQI poller; `None` disables it.
    pub device_id: Option<String>,
    pub reopen_finished_stream: bool,
    pub queue_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            preferences_interval: Duration::from_secs(10),
            telemetry_interval: Duration::from_secs(60),
            device_id: None,
            reopen_finished_stream: false,
            queue_capacity: 64,
        }
    }
}

impl From<&ServiceConfig> for PipelineSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            preferences_interval: Duration::from_secs(config.polling.preferences_interval_secs),
            telemetry_interval: Duration::from_secs(config.polling.telemetry_interval_secs),
            device_id: config.polling.device_id.clone(),
            reopen_finished_stream: config.stream.reopen_finished_stream,
            queue_capacity: config.stream.queue_capacity,
        }
    }
}

impl PipelineSettings {
    /// A snapshot older than three poll intervals means at least two
    /// consecutive fetches have failed.
    pub fn stale_after_secs(&self) -> u64 {
        self.preferences_interval.as_secs().max(1) * 3
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Source of "now" for snapshot staleness checks.
pub type Clock = fn() -> DateTime<Utc>;

pub struct AlertPipeline<B, N> {
    backend: B,
    notifier: N,
    settings: PipelineSettings,
    clock: Clock,
}

impl<B: AlertBackend, N: Notifier> AlertPipeline<B, N> {
    pub fn new(backend: B, notifier: N, settings: PipelineSettings) -> Self {
        Self { backend, notifier, settings, clock: Utc::now }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Spawn the poller(s) and the consumer. Everything stops when the
    /// returned handle is dropped.
    pub fn start(self) -> PipelineHandle {
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (events_tx, events_rx) = mpsc::channel(self.settings.queue_capacity.max(1));
        let (forecast_tx, forecast_rx) = watch::channel(None);
        let (active_tx, active_rx) = watch::channel(false);
        let (stale_tx, stale_rx) = watch::channel(false);

        let poller = PreferencePoller::new(self.backend.clone(), self.settings.preferences_interval)
            .spawn(snapshot_tx);

        let telemetry = self.settings.device_id.clone().map(|device_id| {
            CurrentAqiPoller::new(self.backend.clone(), device_id, self.settings.telemetry_interval)
                .spawn(events_tx.clone())
        });

        let consumer = Consumer {
            backend: self.backend,
            evaluator: AlertEvaluator::new(self.notifier),
            settings: self.settings,
            snapshots: snapshot_rx.clone(),
            events: events_rx,
            events_tx: events_tx.clone(),
            forecast_tx,
            active_tx,
            stale_tx,
            clock: self.clock,
            stream: None,
            next_session: 1,
            gate_open: false,
        };
        let consumer = TaskGuard::spawn(consumer.run());

        logging::info(Component::System, None, "alert pipeline started");

        PipelineHandle {
            events: events_tx,
            snapshots: snapshot_rx,
            forecast: forecast_rx,
            stream_active: active_rx,
            preferences_stale: stale_rx,
            _poller: poller,
            _telemetry: telemetry,
            _consumer: consumer,
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Host-side view of a running pipeline. Dropping it (or calling
/// `shutdown`) cancels the poller, the stream and the consumer.
pub struct PipelineHandle {
    events: mpsc::Sender<PipelineEvent>,
    snapshots: SnapshotReceiver,
    forecast: watch::Receiver<Option<ForecastFrame>>,
    stream_active: watch::Receiver<bool>,
    preferences_stale: watch::Receiver<bool>,
    _poller: TaskGuard,
    _telemetry: Option<TaskGuard>,
    _consumer: TaskGuard,
}

impl PipelineHandle {
    /// Feed a current AQI reading to the instantaneous rule. Returns `false`
    /// once the pipeline has stopped.
    pub async fn report_current_aqi(&self, aqi: f64) -> bool {
        self.events.send(PipelineEvent::CurrentAqi(aqi)).await.is_ok()
    }

    pub fn preferences(&self) -> Option<PreferenceSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn latest_forecast(&self) -> Option<ForecastFrame> {
        self.forecast.borrow().clone()
    }

    pub fn is_streaming(&self) -> bool {
        *self.stream_active.borrow()
    }

    /// Whether the last evaluation ran against a snapshot older than three
    /// poll intervals.
    pub fn preferences_stale(&self) -> bool {
        *self.preferences_stale.borrow()
    }

    pub fn watch_forecast(&self) -> watch::Receiver<Option<ForecastFrame>> {
        self.forecast.clone()
    }

    pub fn watch_stream_active(&self) -> watch::Receiver<bool> {
        self.stream_active.clone()
    }

    pub fn shutdown(self) {
        logging::info(Component::System, None, "alert pipeline stopping");
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

struct ActiveStream {
    session: u64,
    _task: TaskGuard,
}

struct Consumer<B, N> {
    backend: B,
    evaluator: AlertEvaluator<N>,
    settings: PipelineSettings,
    snapshots: SnapshotReceiver,
    events: mpsc::Receiver<PipelineEvent>,
    /// Handed to each stream task it spawns.
    events_tx: mpsc::Sender<PipelineEvent>,
    forecast_tx: watch::Sender<Option<ForecastFrame>>,
    active_tx: watch::Sender<bool>,
    stale_tx: watch::Sender<bool>,
    clock: Clock,
    stream: Option<ActiveStream>,
    next_session: u64,
    /// Activation condition as of the previous snapshot.
    gate_open: bool,
}

impl<B: AlertBackend, N: Notifier> Consumer<B, N> {
    async fn run(mut self) {
        loop {
            tokio::select! {
                changed = self.snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.on_snapshot();
                }
                event = self.events.recv() => match event {
                    Some(event) => self.on_event(event),
                    None => break,
                },
            }
        }
        self.stop_stream("pipeline stopped");
    }

    fn on_snapshot(&mut self) {
        let gate = self
            .snapshots
            .borrow_and_update()
            .as_ref()
            .map(|s| s.preferences.wants_immediate_alerts())
            .unwrap_or(false);
        let was_open = self.gate_open;
        self.gate_open = gate;

        if !gate {
            if self.stream.is_some() {
                self.stop_stream("immediate pollution alerts disabled");
            }
            return;
        }

        // A stream that ended on its own is only reopened on a fresh
        // activation unless the deployment opted into reopening.
        if self.stream.is_none() && (!was_open || self.settings.reopen_finished_stream) {
            self.open_stream();
        }
    }

    fn on_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Forecast { session, frame } => {
                if !self.is_current(session) {
                    logging::debug(
                        Component::Stream,
                        Some(&format!("session {}", session)),
                        "discarding frame from cancelled stream",
                    );
                    return;
                }
                self.forecast_tx.send_replace(Some(frame.clone()));
                if let Some(prefs) = self.current_preferences() {
                    self.evaluator.evaluate_forecast(&frame.forecast, &prefs);
                }
            }
            PipelineEvent::StreamClosed { session, error, .. } => {
                if !self.is_current(session) {
                    return;
                }
                self.stream = None;
                self.active_tx.send_replace(false);
                let context = format!("session {}", session);
                match error {
                    Some(e) => logging::warn(Component::Stream, Some(&context), &format!("alert stream ended: {}", e)),
                    None => logging::info(Component::Stream, Some(&context), "alert stream ended"),
                }
            }
            PipelineEvent::CurrentAqi(aqi) => match self.current_preferences() {
                Some(prefs) => {
                    self.evaluator.evaluate_current(aqi, &prefs);
                }
                None => logging::debug(
                    Component::Evaluator,
                    None,
                    &format!("current AQI {} ignored: no preferences fetched yet", aqi),
                ),
            },
        }
    }

    fn is_current(&self, session: u64) -> bool {
        self.stream.as_ref().is_some_and(|s| s.session == session)
    }

    fn current_preferences(&self) -> Option<Preferences> {
        let snapshot = self.snapshots.borrow().clone()?;
        let now = (self.clock)();
        let stale = staleness::is_stale_at(&snapshot, self.settings.stale_after_secs(), now);
        if stale {
            logging::warn(
                Component::Evaluator,
                None,
                &format!(
                    "evaluating against preferences fetched {}s ago",
                    staleness::snapshot_age_secs(&snapshot, now)
                ),
            );
        }
        self.stale_tx.send_replace(stale);
        Some(snapshot.preferences)
    }

    fn open_stream(&mut self) {
        let session = self.next_session;
        self.next_session += 1;

        let task = TaskGuard::spawn(stream::open_and_run(
            self.backend.clone(),
            session,
            self.events_tx.clone(),
        ));
        self.stream = Some(ActiveStream { session, _task: task });
        self.active_tx.send_replace(true);
    }

    fn stop_stream(&mut self, reason: &str) {
        if let Some(active) = self.stream.take() {
            logging::info(
                Component::Stream,
                Some(&format!("session {}", active.session)),
                &format!("closing alert stream: {}", reason),
            );
            drop(active);
            self.active_tx.send_replace(false);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
