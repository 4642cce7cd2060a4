// ── Live session loop ──
//
// One task per active session owns every mutable tracker: supervisor,
// pending frame, rate history and traffic series. All inputs (fetch
// results, stream events, timers, visibility and view changes, refresh
// requests) funnel into a single `select!` loop, so nothing is shared
// mutably and readers only ever see whole published values.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use proxyscope_api::{EventStreamHandle, StreamEvent};

use crate::aggregate::aggregate;
use crate::config::stale_after;
use crate::frame::{FrameScheduler, Pacer};
use crate::model::{
    ConnectionsView, RateMaps, Snapshot, StreamStatus, TrafficPoint, ViewState, Visibility,
};
use crate::normalize::normalize_text;
use crate::rate::RateCalculator;
use crate::source::SnapshotSource;
use crate::supervisor::{Delivery, TransportSupervisor};
use crate::window::TrafficWindow;

const FETCH_CHANNEL_CAPACITY: usize = 4;

// ── Read surfaces ────────────────────────────────────────────────────

/// Everything consumers can observe. Written only by the session task
/// (and by the facade while no session runs).
pub(crate) struct Published {
    pub(crate) snapshot: watch::Sender<Arc<Snapshot>>,
    pub(crate) status: watch::Sender<StreamStatus>,
    pub(crate) view: watch::Sender<Arc<ConnectionsView>>,
    pub(crate) traffic: watch::Sender<Arc<Vec<TrafficPoint>>>,
    pub(crate) rates: ArcSwap<RateMaps>,
}

impl Published {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Snapshot::default()));
        let (status, _) = watch::channel(StreamStatus::Idle);
        let (view, _) = watch::channel(Arc::new(ConnectionsView::default()));
        let (traffic, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            snapshot,
            status,
            view,
            traffic,
            rates: ArcSwap::from_pointee(RateMaps::default()),
        }
    }

    pub(crate) fn set_status(&self, next: StreamStatus) {
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Re-derive view rows from the current canonical snapshot. Rate
    /// history is left alone.
    pub(crate) fn regroup(&self, state: ViewState) {
        if !state.active {
            return;
        }
        let snapshot = Arc::clone(&self.snapshot.borrow());
        let rows = aggregate(&snapshot.connections, state.mode);
        debug!(mode = %state.mode, rows = rows.len(), "regrouped connections view");
        self.view.send_replace(Arc::new(ConnectionsView {
            mode: state.mode,
            rows,
        }));
    }

    pub(crate) fn clear_rates(&self) {
        self.rates.store(Arc::new(RateMaps::default()));
    }
}

// ── Session ──────────────────────────────────────────────────────────

/// Wall-clock timestamps derived from the runtime clock, so rates and
/// traffic samples follow the same time base as the timers.
#[derive(Debug, Clone, Copy)]
struct SessionClock {
    origin: Instant,
    wall: DateTime<Utc>,
}

impl SessionClock {
    fn start() -> Self {
        Self {
            origin: Instant::now(),
            wall: Utc::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.origin.elapsed()).unwrap_or(TimeDelta::MAX);
        self.wall
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Inputs for one session task. Built by the facade, consumed by `run`.
pub(crate) struct Session<S> {
    pub(crate) source: Arc<S>,
    pub(crate) published: Arc<Published>,
    pub(crate) pacer: Arc<dyn Pacer>,
    pub(crate) visibility: watch::Receiver<Visibility>,
    pub(crate) view: watch::Receiver<ViewState>,
    pub(crate) refresh_rx: mpsc::Receiver<()>,
    pub(crate) refresh_interval: Duration,
    pub(crate) traffic_window: Duration,
    pub(crate) traffic_points: usize,
    pub(crate) cancel: CancellationToken,
}

/// Mutable per-session state, touched only by the loop in `Session::run`.
struct Tracker<S> {
    source: Arc<S>,
    published: Arc<Published>,
    pacer: Arc<dyn Pacer>,
    supervisor: TransportSupervisor,
    frames: FrameScheduler,
    rates: RateCalculator,
    window: TrafficWindow,
    clock: SessionClock,
    view_state: ViewState,
    fetch_tx: mpsc::Sender<Result<String, proxyscope_api::Error>>,
    cancel: CancellationToken,
}

impl<S: SnapshotSource> Session<S> {
    pub(crate) async fn run(self) {
        let Session {
            source,
            published,
            pacer,
            mut visibility,
            mut view,
            mut refresh_rx,
            refresh_interval,
            traffic_window,
            traffic_points,
            cancel,
        } = self;

        let stale = stale_after(refresh_interval);
        let started = Instant::now();
        let (fetch_tx, mut fetch_rx) = mpsc::channel(FETCH_CHANNEL_CAPACITY);

        let mut tracker = Tracker {
            source,
            published,
            pacer,
            supervisor: TransportSupervisor::new(stale, started),
            frames: FrameScheduler::new(),
            rates: RateCalculator::new(),
            window: TrafficWindow::new(traffic_window, traffic_points),
            clock: SessionClock::start(),
            view_state: *view.borrow_and_update(),
            fetch_tx,
            cancel: cancel.clone(),
        };

        tracker.supervisor.on_activate(started);
        tracker.publish_status();
        tracker.force_fetch("activation");

        let stream_cancel = cancel.child_token();
        let mut stream = Some(
            tracker
                .source
                .subscribe(refresh_interval, stream_cancel.clone()),
        );

        let mut watchdog = tokio::time::interval_at(started + stale, stale);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut was_hidden = visibility.borrow_and_update().is_hidden();

        info!(
            refresh_ms = refresh_interval.as_millis(),
            stale_ms = stale.as_millis(),
            "telemetry session started"
        );

        loop {
            let flush_at = tracker.frames.deadline();
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = sleep_until(flush_at) => tracker.flush(),
                Some(result) = fetch_rx.recv() => tracker.on_fetch(result),
                event = next_event(&mut stream) => {
                    if !tracker.on_stream_event(event) {
                        stream = None;
                    }
                }
                _ = watchdog.tick() => {
                    if tracker.supervisor.is_stale(Instant::now()) {
                        tracker.force_fetch("stale");
                    }
                }
                Ok(()) = visibility.changed() => {
                    let hidden = visibility.borrow_and_update().is_hidden();
                    if was_hidden && !hidden {
                        tracker.request_fetch("visible");
                    }
                    was_hidden = hidden;
                }
                Ok(()) = view.changed() => {
                    let next = *view.borrow_and_update();
                    tracker.on_view_change(next);
                }
                Some(()) = refresh_rx.recv() => tracker.request_fetch("requested"),
            }
            tracker.publish_status();
        }

        stream_cancel.cancel();
        drop(stream);
        tracker.frames.cancel();
        debug!("telemetry session stopped");
    }
}

impl<S: SnapshotSource> Tracker<S> {
    fn publish_status(&self) {
        self.published.set_status(self.supervisor.status());
    }

    /// Spawn one fallback fetch unless one is already outstanding.
    fn force_fetch(&mut self, reason: &'static str) {
        if !self.supervisor.begin_fetch() {
            debug!(reason, "fallback fetch already in flight");
            return;
        }
        debug!(reason, "fallback fetch");

        let source = Arc::clone(&self.source);
        let tx = self.fetch_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                result = source.fetch() => {
                    let _ = tx.send(result).await;
                }
            }
        });
    }

    /// Fetch for a state change the outstanding fetch may predate. When
    /// one is in flight, another is issued as soon as it lands.
    fn request_fetch(&mut self, reason: &'static str) {
        if self.supervisor.fetch_in_flight() {
            debug!(reason, "fallback fetch queued behind in-flight fetch");
            self.supervisor.queue_refetch();
            return;
        }
        self.force_fetch(reason);
    }

    fn on_fetch(&mut self, result: Result<String, proxyscope_api::Error>) {
        let refetch = self.supervisor.end_fetch();
        match result {
            Ok(raw) => self.accept(&raw, Delivery::Fallback),
            Err(e) => warn!(error = %e, "fallback fetch failed"),
        }
        if refetch {
            self.force_fetch("queued");
        }
    }

    /// Returns `false` once the stream handle is exhausted.
    fn on_stream_event(&mut self, event: Option<StreamEvent>) -> bool {
        match event {
            Some(StreamEvent::Open) => {
                self.supervisor.on_open();
                true
            }
            Some(StreamEvent::Message(raw)) => {
                self.accept(&raw, Delivery::Push);
                true
            }
            Some(StreamEvent::Error(reason)) => {
                warn!(%reason, "event stream error");
                self.supervisor.on_stream_error();
                true
            }
            None => {
                warn!("event stream ended");
                self.supervisor.on_stream_error();
                false
            }
        }
    }

    fn accept(&mut self, raw: &str, via: Delivery) {
        let Some(snapshot) = normalize_text(raw) else {
            return;
        };
        let now = Instant::now();
        self.supervisor.on_accepted(now, via);
        if !self.frames.offer(snapshot, self.pacer.as_ref(), now) {
            trace!(?via, "coalesced snapshot into pending frame");
        }
    }

    fn flush(&mut self) {
        if let Some(snapshot) = self.frames.flush() {
            self.apply(snapshot);
        }
    }

    /// Make `snapshot` canonical and derive view rows, rates and traffic.
    fn apply(&mut self, snapshot: Snapshot) {
        let now = self.clock.now();
        let snapshot = Arc::new(snapshot);
        self.published.snapshot.send_replace(Arc::clone(&snapshot));

        let state = self.view_state;
        if state.active {
            let rows = aggregate(&snapshot.connections, state.mode);
            let maps = self.rates.update(&rows, now);
            self.published.rates.store(Arc::new(maps));
            self.published.view.send_replace(Arc::new(ConnectionsView {
                mode: state.mode,
                rows,
            }));
        }

        let point = self.window.record(&snapshot, now);
        self.published
            .traffic
            .send_replace(Arc::new(self.window.points()));

        trace!(
            connections = snapshot.connections.len(),
            up = point.up,
            down = point.down,
            "applied snapshot"
        );
    }

    fn on_view_change(&mut self, next: ViewState) {
        let prev = std::mem::replace(&mut self.view_state, next);
        if !next.active {
            if prev.active {
                self.rates.reset();
                self.published.clear_rates();
            }
            return;
        }
        if prev != next {
            self.published.regroup(next);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_event(stream: &mut Option<EventStreamHandle>) -> Option<StreamEvent> {
    match stream {
        Some(handle) => handle.recv().await,
        None => std::future::pending().await,
    }
}
