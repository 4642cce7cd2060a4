#![allow(clippy::unwrap_used)]
// Session-level tests for `Telemetry` driven by a fake snapshot source on
// paused tokio time.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use proxyscope_api::{EventStreamHandle, StreamEvent};
use proxyscope_core::store::{REFRESH_INTERVAL_KEY, VIEW_MODE_KEY};
use proxyscope_core::{
    ConfigStore, CoreError, MemoryStore, SnapshotSource, StreamStatus, Telemetry,
    TelemetryConfig, ViewMode, Visibility,
};

// ── Fake source ─────────────────────────────────────────────────────

#[derive(Default)]
struct FakeSource {
    fetches: AtomicUsize,
    subscribes: AtomicUsize,
    /// Queued fetch responses; an empty queue answers with an error.
    responses: Mutex<VecDeque<String>>,
    /// How long each fetch takes to answer.
    fetch_delay: Mutex<Duration>,
    stream_tx: Mutex<Option<mpsc::Sender<StreamEvent>>>,
    closed: Mutex<Vec<u64>>,
}

impl FakeSource {
    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn slow_fetches(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    fn queue(&self, body: String) {
        self.responses.lock().unwrap().push_back(body);
    }

    async fn push(&self, event: StreamEvent) {
        let tx = self.stream_tx.lock().unwrap().clone().unwrap();
        tx.send(event).await.unwrap();
    }
}

/// Shared handle so tests keep a view of the fake the facade owns.
struct Shared(Arc<FakeSource>);

impl SnapshotSource for Shared {
    fn fetch(&self) -> impl Future<Output = Result<String, proxyscope_api::Error>> + Send {
        self.0.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.0.responses.lock().unwrap().pop_front();
        let delay = *self.0.fetch_delay.lock().unwrap();
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            next.ok_or_else(|| proxyscope_api::Error::Http {
                status: 503,
                body: "unavailable".into(),
            })
        }
    }

    fn subscribe(&self, _interval: Duration, cancel: CancellationToken) -> EventStreamHandle {
        self.0.subscribes.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(16);
        *self.0.stream_tx.lock().unwrap() = Some(tx);
        EventStreamHandle::from_receiver(rx, cancel)
    }

    fn close(&self, ids: &[u64]) -> impl Future<Output = Result<(), proxyscope_api::Error>> + Send {
        self.0.closed.lock().unwrap().extend_from_slice(ids);
        async { Ok(()) }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn config() -> TelemetryConfig {
    TelemetryConfig::new(Url::parse("http://127.0.0.1:9090").unwrap())
}

fn setup() -> (Arc<FakeSource>, Telemetry<Shared>) {
    let source = Arc::new(FakeSource::default());
    let telemetry = Telemetry::builder(config(), Shared(Arc::clone(&source))).build();
    (source, telemetry)
}

fn payload(upload_total: u64, connections: &serde_json::Value) -> String {
    json!({
        "uploadTotal": upload_total,
        "downloadTotal": 0,
        "connections": connections,
    })
    .to_string()
}

fn flow(id: &str, host: &str, download: u64) -> serde_json::Value {
    json!({
        "id": id,
        "download": download,
        "metadata": { "host": host, "sourceIP": "10.0.0.2" },
        "details": [{ "id": format!("{id}-d"), "download": download }]
    })
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn activation_fetches_subscribes_and_goes_live_on_open() {
    let (source, telemetry) = setup();
    source.queue(payload(7, &json!([])));

    telemetry.activate().await;
    settle().await;

    assert_eq!(source.fetches(), 1);
    assert_eq!(source.subscribes.load(Ordering::SeqCst), 1);
    assert_eq!(telemetry.current_status(), StreamStatus::Connecting);
    assert_eq!(telemetry.snapshot().upload_total, 7);

    source.push(StreamEvent::Open).await;
    settle().await;
    assert_eq!(telemetry.current_status(), StreamStatus::Live);
}

#[tokio::test(start_paused = true)]
async fn push_message_is_applied_and_goes_live() {
    let (source, telemetry) = setup();
    telemetry.activate().await;
    settle().await;

    source
        .push(StreamEvent::Message(payload(42, &json!([flow("1", "a.com", 10)]))))
        .await;
    settle().await;

    assert_eq!(telemetry.current_status(), StreamStatus::Live);
    let snapshot = telemetry.snapshot();
    assert_eq!(snapshot.upload_total, 42);
    assert_eq!(snapshot.connections.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stream_error_reports_reconnecting_without_resubscribing() {
    let (source, telemetry) = setup();
    telemetry.activate().await;
    settle().await;

    source.push(StreamEvent::Open).await;
    source.push(StreamEvent::Error("reset by peer".into())).await;
    settle().await;

    assert_eq!(telemetry.current_status(), StreamStatus::Reconnecting);
    assert_eq!(source.subscribes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_payload_keeps_previous_state() {
    let (source, telemetry) = setup();
    telemetry.activate().await;
    settle().await;

    source.push(StreamEvent::Message(payload(5, &json!([])))).await;
    settle().await;
    source.push(StreamEvent::Message("{not json".into())).await;
    source
        .push(StreamEvent::Message(r#"{"connections": 3}"#.into()))
        .await;
    settle().await;

    assert_eq!(telemetry.snapshot().upload_total, 5);
}

#[tokio::test(start_paused = true)]
async fn burst_before_flush_applies_only_last() {
    let (source, telemetry) = setup();
    telemetry.activate().await;
    settle().await;

    let mut rx = telemetry.subscribe_snapshot();
    rx.borrow_and_update();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let collector = {
        let seen = Arc::clone(&seen);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let total = rx.borrow_and_update().upload_total;
                seen.lock().unwrap().push(total);
            }
        })
    };

    source.push(StreamEvent::Message(payload(1, &json!([])))).await;
    source.push(StreamEvent::Message(payload(2, &json!([])))).await;
    settle().await;

    assert_eq!(*seen.lock().unwrap(), vec![2]);
    collector.abort();
}

#[tokio::test(start_paused = true)]
async fn pause_discards_unflushed_snapshot() {
    let (source, telemetry) = setup();
    telemetry.activate().await;
    settle().await;
    source.push(StreamEvent::Message(payload(5, &json!([])))).await;
    settle().await;
    assert_eq!(telemetry.snapshot().upload_total, 5);

    // Offered to the frame scheduler, but the 16ms flush has not fired.
    source.push(StreamEvent::Message(payload(9, &json!([])))).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    telemetry.pause().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(telemetry.snapshot().upload_total, 5);

    telemetry.resume().await;
    settle().await;
    assert_eq!(telemetry.snapshot().upload_total, 5);
}

#[tokio::test(start_paused = true)]
async fn interval_change_discards_unflushed_snapshot() {
    let (source, telemetry) = setup();
    telemetry.activate().await;
    settle().await;
    source.push(StreamEvent::Message(payload(5, &json!([])))).await;
    settle().await;

    source.push(StreamEvent::Message(payload(9, &json!([])))).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    telemetry
        .set_refresh_interval(Duration::from_millis(2000))
        .await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(source.subscribes.load(Ordering::SeqCst), 2);
    assert_eq!(telemetry.snapshot().upload_total, 5);
}

// ── Watchdog and visibility ─────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn watchdog_forces_one_fetch_per_breach() {
    let (source, telemetry) = setup();
    source.queue(payload(0, &json!([])));
    telemetry.activate().await;
    settle().await;
    source.push(StreamEvent::Open).await;
    settle().await;
    assert_eq!(telemetry.current_status(), StreamStatus::Live);
    assert_eq!(source.fetches(), 1);

    // refresh 1000ms -> threshold 4000ms; the transport claims live but is silent.
    tokio::time::sleep(Duration::from_millis(4100)).await;
    assert_eq!(source.fetches(), 2);

    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(source.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn steady_pushes_keep_watchdog_quiet() {
    let (source, telemetry) = setup();
    telemetry.activate().await;
    settle().await;

    for i in 0..10 {
        source.push(StreamEvent::Message(payload(i, &json!([])))).await;
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
    assert_eq!(source.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn becoming_visible_forces_fetch() {
    let (source, telemetry) = setup();
    telemetry.activate().await;
    settle().await;
    assert_eq!(source.fetches(), 1);

    telemetry.set_visibility(Visibility::Hidden);
    settle().await;
    assert_eq!(source.fetches(), 1);

    telemetry.set_visibility(Visibility::Visible);
    settle().await;
    assert_eq!(source.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn hidden_session_applies_after_hidden_delay() {
    let (source, telemetry) = setup();
    telemetry.activate().await;
    settle().await;

    telemetry.set_visibility(Visibility::Hidden);
    settle().await;
    source.push(StreamEvent::Message(payload(3, &json!([])))).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(telemetry.snapshot().upload_total, 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(telemetry.snapshot().upload_total, 3);
}

#[tokio::test(start_paused = true)]
async fn becoming_visible_during_fetch_fetches_again() {
    let (source, telemetry) = setup();
    telemetry.set_visibility(Visibility::Hidden);
    source.slow_fetches(Duration::from_millis(500));
    telemetry.activate().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    telemetry.set_visibility(Visibility::Visible);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(source.fetches(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(source.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn pause_stops_all_requests_and_resume_restarts() {
    let (source, telemetry) = setup();
    telemetry.activate().await;
    settle().await;

    telemetry.pause().await;
    assert_eq!(telemetry.current_status(), StreamStatus::Paused);
    assert!(!telemetry.is_active().await);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(source.fetches(), 1);

    // Idempotent teardown.
    telemetry.pause().await;
    telemetry.deactivate().await;
    assert_eq!(telemetry.current_status(), StreamStatus::Idle);

    telemetry.resume().await;
    settle().await;
    assert_eq!(telemetry.current_status(), StreamStatus::Connecting);
    assert_eq!(source.fetches(), 2);
    assert_eq!(source.subscribes.load(Ordering::SeqCst), 2);
}

// ── Derived state ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn rates_only_computed_while_view_active() {
    let (source, telemetry) = setup();
    telemetry.activate().await;
    settle().await;

    source
        .push(StreamEvent::Message(payload(0, &json!([flow("1", "a.com", 1000)]))))
        .await;
    tokio::time::sleep(Duration::from_millis(1000)).await;
    source
        .push(StreamEvent::Message(payload(0, &json!([flow("1", "a.com", 1500)]))))
        .await;
    settle().await;
    assert!(telemetry.rates().connections.is_empty());

    telemetry.set_view_active(true).await;
    settle().await;
    source
        .push(StreamEvent::Message(payload(0, &json!([flow("1", "a.com", 2000)]))))
        .await;
    tokio::time::sleep(Duration::from_millis(1000)).await;
    source
        .push(StreamEvent::Message(payload(0, &json!([flow("1", "a.com", 2500)]))))
        .await;
    settle().await;

    let rates = telemetry.rates();
    let down = rates.connection("1").download;
    assert!((down - 500.0).abs() < 1.0, "download rate {down}");
    assert!(rates.details.contains_key("1-d"));

    telemetry.set_view_active(false).await;
    settle().await;
    assert!(telemetry.rates().connections.is_empty());
}

#[tokio::test(start_paused = true)]
async fn mode_change_regroups_and_persists() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(FakeSource::default());
    let telemetry = Telemetry::builder(config(), Shared(Arc::clone(&source)))
        .store(Arc::clone(&store) as Arc<dyn ConfigStore>)
        .build();

    telemetry.set_view_active(true).await;
    telemetry.activate().await;
    settle().await;
    source
        .push(StreamEvent::Message(payload(
            0,
            &json!([flow("1", "example.com", 10), flow("2", "example.com", 20)]),
        )))
        .await;
    settle().await;
    assert_eq!(telemetry.view().borrow().rows.len(), 2);

    telemetry.set_view_mode(ViewMode::Destination).await;
    settle().await;

    let view = telemetry.view().borrow().clone();
    assert_eq!(view.mode, ViewMode::Destination);
    assert_eq!(view.rows.len(), 1);
    assert_eq!(view.rows[0].id, "destination:example.com");
    assert_eq!(view.rows[0].connection_count, 2);
    assert_eq!(view.rows[0].download, 30);
    assert_eq!(store.get(VIEW_MODE_KEY).as_deref(), Some("destination"));
}

#[tokio::test(start_paused = true)]
async fn traffic_series_grows_per_applied_snapshot() {
    let (source, telemetry) = setup();
    telemetry.activate().await;
    settle().await;

    for i in 0..3u64 {
        source
            .push(StreamEvent::Message(payload(i * 1000, &json!([]))))
            .await;
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }

    let traffic = telemetry.traffic().borrow().clone();
    assert_eq!(traffic.len(), 3);
    assert!(traffic[0].up.abs() < f64::EPSILON);
    assert!((traffic[2].up - 1000.0).abs() < 1.0);
}

// ── Explicit operations ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn close_triggers_one_refresh() {
    let (source, telemetry) = setup();
    telemetry.activate().await;
    settle().await;
    assert_eq!(source.fetches(), 1);

    telemetry.close_connections(&[3, 9]).await.unwrap();
    settle().await;

    assert_eq!(*source.closed.lock().unwrap(), vec![3, 9]);
    assert_eq!(source.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn close_during_fetch_still_refreshes_afterwards() {
    let (source, telemetry) = setup();
    source.slow_fetches(Duration::from_millis(500));
    telemetry.activate().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(source.fetches(), 1);

    telemetry.close_connections(&[7]).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(*source.closed.lock().unwrap(), vec![7]);
    assert_eq!(source.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn refresh_requests_during_fetch_coalesce_into_one() {
    let (source, telemetry) = setup();
    source.slow_fetches(Duration::from_millis(500));
    telemetry.activate().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    for _ in 0..3 {
        telemetry.request_refresh().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(source.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn refresh_requires_active_session() {
    let (_source, telemetry) = setup();
    assert!(matches!(
        telemetry.request_refresh().await,
        Err(CoreError::Inactive)
    ));
}

#[tokio::test(start_paused = true)]
async fn interval_change_restarts_session_and_persists() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(FakeSource::default());
    let telemetry = Telemetry::builder(config(), Shared(Arc::clone(&source)))
        .store(Arc::clone(&store) as Arc<dyn ConfigStore>)
        .build();

    telemetry.activate().await;
    settle().await;
    telemetry
        .set_refresh_interval(Duration::from_millis(2000))
        .await;
    settle().await;

    assert_eq!(source.subscribes.load(Ordering::SeqCst), 2);
    assert_eq!(source.fetches(), 2);
    assert_eq!(
        telemetry.refresh_interval().await,
        Duration::from_millis(2000)
    );
    assert_eq!(store.get(REFRESH_INTERVAL_KEY).as_deref(), Some("2000"));
}

#[tokio::test]
async fn fetch_once_rejects_malformed_payload() {
    let (source, telemetry) = setup();
    source.queue("[]".into());
    assert!(matches!(
        telemetry.fetch_once().await,
        Err(CoreError::MalformedSnapshot)
    ));

    source.queue(payload(9, &json!([])));
    assert_eq!(telemetry.fetch_once().await.unwrap().upload_total, 9);
}
