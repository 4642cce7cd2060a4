// ── Telemetry facade ──
//
// Owns at most one live session and the read surfaces consumers observe.
// Lifecycle calls (activate / pause / resume / deactivate, interval
// changes) are serialized through the session mutex so teardown and
// restart never interleave.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use proxyscope_api::{ConnectionsClient, decorator_for};

use crate::config::{MIN_REFRESH_INTERVAL, TelemetryConfig};
use crate::error::CoreError;
use crate::frame::{Pacer, VisibilityPacer};
use crate::model::{
    ConnectionsView, RateMaps, Snapshot, StreamStatus, TrafficPoint, ViewMode, ViewState,
    Visibility,
};
use crate::normalize::normalize_text;
use crate::session::{Published, Session};
use crate::source::SnapshotSource;
use crate::store::{ConfigStore, MemoryStore, REFRESH_INTERVAL_KEY, VIEW_MODE_KEY};

/// Handle to the running session task.
struct SessionHandle {
    cancel: CancellationToken,
    refresh_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "telemetry session task failed");
        }
    }
}

/// Live connection telemetry for one control plane.
///
/// Cheaply cloneable; clones share the session and all read surfaces.
pub struct Telemetry<S: SnapshotSource = ConnectionsClient> {
    inner: Arc<TelemetryInner<S>>,
}

impl<S: SnapshotSource> Clone for Telemetry<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct TelemetryInner<S> {
    source: Arc<S>,
    published: Arc<Published>,
    visibility: watch::Sender<Visibility>,
    view: watch::Sender<ViewState>,
    store: Arc<dyn ConfigStore>,
    pacer: Arc<dyn Pacer>,
    config: Mutex<TelemetryConfig>,
    session: Mutex<Option<SessionHandle>>,
    cancel: CancellationToken,
}

impl<S> Drop for TelemetryInner<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Assembles a [`Telemetry`] with optional injected collaborators.
pub struct TelemetryBuilder<S> {
    config: TelemetryConfig,
    source: S,
    store: Option<Arc<dyn ConfigStore>>,
    pacer: Option<Arc<dyn Pacer>>,
}

impl<S: SnapshotSource> TelemetryBuilder<S> {
    /// Persist view state somewhere other than process memory.
    pub fn store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the visibility-driven frame pacer.
    pub fn pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = Some(pacer);
        self
    }

    pub fn build(self) -> Telemetry<S> {
        let Self {
            mut config,
            source,
            store,
            pacer,
        } = self;

        let store = store.unwrap_or_else(|| Arc::new(MemoryStore::new()));

        let mode = store
            .get(VIEW_MODE_KEY)
            .and_then(|raw| raw.parse::<ViewMode>().ok())
            .unwrap_or_default();
        if let Some(ms) = store
            .get(REFRESH_INTERVAL_KEY)
            .and_then(|raw| raw.parse::<u64>().ok())
        {
            config.refresh_interval = Duration::from_millis(ms).max(MIN_REFRESH_INTERVAL);
        }

        let (visibility, visibility_rx) = watch::channel(Visibility::Visible);
        let (view, _) = watch::channel(ViewState {
            active: false,
            mode,
        });

        let pacer = pacer.unwrap_or_else(|| {
            Arc::new(
                VisibilityPacer::new(visibility_rx, config.frame_interval)
                    .with_delays(config.short_flush_delay, config.hidden_flush_delay),
            )
        });

        Telemetry {
            inner: Arc::new(TelemetryInner {
                source: Arc::new(source),
                published: Arc::new(Published::new()),
                visibility,
                view,
                store,
                pacer,
                config: Mutex::new(config),
                session: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }
}

impl Telemetry {
    /// Build a facade talking to the control plane over HTTP. Does not
    /// connect: call [`activate`](Self::activate) to start streaming.
    pub fn new(config: TelemetryConfig) -> Result<Self, CoreError> {
        let client = ConnectionsClient::new(
            config.api.clone(),
            &config.transport(),
            decorator_for(config.access_key.clone()),
        )?;
        Ok(Self::builder(config, client).build())
    }
}

impl<S: SnapshotSource> Telemetry<S> {
    pub fn builder(config: TelemetryConfig, source: S) -> TelemetryBuilder<S> {
        TelemetryBuilder {
            config,
            source,
            store: None,
            pacer: None,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start a session: immediate fallback fetch, then the push stream
    /// and the staleness watchdog. No-op while a session is running.
    pub async fn activate(&self) {
        let mut session = self.inner.session.lock().await;
        if session.as_ref().is_some_and(|s| !s.task.is_finished()) {
            debug!("telemetry already active");
            return;
        }
        let config = self.inner.config.lock().await.clone();
        *session = Some(self.spawn_session(&config));
    }

    /// Tear the session down and report `paused`.
    pub async fn pause(&self) {
        self.teardown(StreamStatus::Paused).await;
        info!("telemetry paused");
    }

    pub async fn resume(&self) {
        self.activate().await;
    }

    /// Tear the session down and report `idle`.
    pub async fn deactivate(&self) {
        self.teardown(StreamStatus::Idle).await;
    }

    pub async fn is_active(&self) -> bool {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }

    async fn teardown(&self, status: StreamStatus) {
        let mut session = self.inner.session.lock().await;
        if let Some(handle) = session.take() {
            handle.stop().await;
        }
        self.inner.published.set_status(status);
    }

    fn spawn_session(&self, config: &TelemetryConfig) -> SessionHandle {
        let cancel = self.inner.cancel.child_token();
        let (refresh_tx, refresh_rx) = mpsc::channel(1);

        let session = Session {
            source: Arc::clone(&self.inner.source),
            published: Arc::clone(&self.inner.published),
            pacer: Arc::clone(&self.inner.pacer),
            visibility: self.inner.visibility.subscribe(),
            view: self.inner.view.subscribe(),
            refresh_rx,
            refresh_interval: config.refresh_interval,
            traffic_window: config.traffic_window,
            traffic_points: config.traffic_points,
            cancel: cancel.clone(),
        };

        SessionHandle {
            cancel,
            refresh_tx,
            task: tokio::spawn(session.run()),
        }
    }

    /// Change the push cadence. A running session is restarted with the
    /// new interval; the value is persisted either way.
    pub async fn set_refresh_interval(&self, interval: Duration) {
        let interval = interval.max(MIN_REFRESH_INTERVAL);
        let config = {
            let mut config = self.inner.config.lock().await;
            config.refresh_interval = interval;
            config.clone()
        };
        self.inner
            .store
            .set(REFRESH_INTERVAL_KEY, interval.as_millis().to_string());

        let mut session = self.inner.session.lock().await;
        if let Some(handle) = session.take() {
            info!(
                refresh_ms = interval.as_millis(),
                "restarting telemetry session"
            );
            handle.stop().await;
            *session = Some(self.spawn_session(&config));
        }
    }

    pub async fn refresh_interval(&self) -> Duration {
        self.inner.config.lock().await.refresh_interval
    }

    // ── Consumer state ───────────────────────────────────────────────

    /// Hidden sessions flush less often; becoming visible again forces a
    /// fallback fetch.
    pub fn set_visibility(&self, visibility: Visibility) {
        self.inner.visibility.send_replace(visibility);
    }

    /// Gate per-entity rate computation on whether the view is shown.
    pub async fn set_view_active(&self, active: bool) {
        self.update_view(|state| state.active = active).await;
    }

    /// Switch grouping; re-aggregates current state immediately.
    pub async fn set_view_mode(&self, mode: ViewMode) {
        self.inner.store.set(VIEW_MODE_KEY, mode.to_string());
        self.update_view(|state| state.mode = mode).await;
    }

    pub fn view_state(&self) -> ViewState {
        *self.inner.view.borrow()
    }

    async fn update_view(&self, change: impl FnOnce(&mut ViewState)) {
        // Held so a session cannot start between the check and the update.
        let session = self.inner.session.lock().await;
        let prev = *self.inner.view.borrow();
        self.inner.view.send_modify(change);
        let next = *self.inner.view.borrow();

        if session.is_some() || prev == next {
            return;
        }
        if next.active {
            self.inner.published.regroup(next);
        } else {
            self.inner.published.clear_rates();
        }
    }

    // ── Explicit operations ──────────────────────────────────────────

    /// Ask the running session for one out-of-band fallback fetch.
    pub async fn request_refresh(&self) -> Result<(), CoreError> {
        let session = self.inner.session.lock().await;
        let Some(handle) = session.as_ref() else {
            return Err(CoreError::Inactive);
        };
        match handle.refresh_tx.try_send(()) {
            // A queued request already covers this one.
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Closed(())) => Err(CoreError::Inactive),
        }
    }

    /// Close specific flows, then refresh canonical state if streaming.
    pub async fn close_connections(&self, ids: &[u64]) -> Result<(), CoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.inner.source.close(ids).await?;
        info!(count = ids.len(), "closed connections");

        if self.request_refresh().await.is_err() {
            debug!("no active session to refresh after close");
        }
        Ok(())
    }

    /// One fallback fetch outside any session. Does not touch canonical state.
    pub async fn fetch_once(&self) -> Result<Snapshot, CoreError> {
        let raw = self.inner.source.fetch().await?;
        normalize_text(&raw).ok_or(CoreError::MalformedSnapshot)
    }

    // ── Read surfaces ────────────────────────────────────────────────

    /// Current canonical snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.inner.published.snapshot.borrow())
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.published.snapshot.subscribe()
    }

    pub fn status(&self) -> watch::Receiver<StreamStatus> {
        self.inner.published.status.subscribe()
    }

    pub fn current_status(&self) -> StreamStatus {
        *self.inner.published.status.borrow()
    }

    /// Rates from the latest tick; replaced wholesale every tick.
    pub fn rates(&self) -> Arc<RateMaps> {
        self.inner.published.rates.load_full()
    }

    pub fn view(&self) -> watch::Receiver<Arc<ConnectionsView>> {
        self.inner.published.view.subscribe()
    }

    pub fn traffic(&self) -> watch::Receiver<Arc<Vec<TrafficPoint>>> {
        self.inner.published.traffic.subscribe()
    }

    pub async fn config(&self) -> TelemetryConfig {
        self.inner.config.lock().await.clone()
    }
}
