//! Server-sent event stream with auto-reconnect.
//!
//! Connects to the control plane's `connections/stream` endpoint and
//! forwards each event's data payload through an [`mpsc`] channel. Like a
//! browser event source, the stream owns its own retry policy: consumers
//! observe [`StreamEvent::Open`] / [`StreamEvent::Error`] transitions but
//! never re-open the connection themselves.
//!
//! # Example
//!
//! ```rust,ignore
//! use proxyscope_api::sse::{EventStreamHandle, ReconnectConfig, StreamEvent};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let mut handle = EventStreamHandle::connect(&client, interval, ReconnectConfig::default(), cancel.clone());
//!
//! while let Some(event) = handle.recv().await {
//!     if let StreamEvent::Message(data) = event {
//!         println!("{} bytes", data.len());
//!     }
//! }
//! ```

use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, pin_mut};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::{ConnectionsClient, check_status};
use crate::error::Error;

// ── Channel capacity ─────────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 64;

// ── StreamEvent ──────────────────────────────────────────────────────

/// What the push transport reports to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Response headers accepted; the stream is flowing.
    Open,
    /// Data payload of one `message` event (multi-line data joined by `\n`).
    Message(String),
    /// The connection failed or ended. The stream will retry on its own.
    Error(String),
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for stream reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    /// A server-sent `retry:` field replaces it.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── EventStreamHandle ────────────────────────────────────────────────

/// Handle to a running event stream.
///
/// Dropping the handle closes the channel, which also stops the
/// background task at its next send. [`shutdown`](Self::shutdown) stops it
/// immediately.
pub struct EventStreamHandle {
    event_rx: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
}

impl EventStreamHandle {
    /// Spawn the reconnection loop for `client`'s stream endpoint.
    ///
    /// Returns immediately; the first connection attempt happens
    /// asynchronously and is reported as [`StreamEvent::Open`] or
    /// [`StreamEvent::Error`].
    pub fn connect(
        client: &ConnectionsClient,
        interval: Duration,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let client = client.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            stream_loop(client, interval, event_tx, reconnect, task_cancel).await;
        });

        Self { event_rx, cancel }
    }

    /// Wrap an existing event channel, for sources that are not backed by
    /// an HTTP stream.
    pub fn from_receiver(event_rx: mpsc::Receiver<StreamEvent>, cancel: CancellationToken) -> Self {
        Self { event_rx, cancel }
    }

    /// Whether the owning session has torn this stream down.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Receive the next transport event. `None` once the loop has exited.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.event_rx.recv().await
    }

    /// Signal the background task to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EventStreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on end/error, backoff → reconnect.
async fn stream_loop(
    client: ConnectionsClient,
    interval: Duration,
    event_tx: mpsc::Sender<StreamEvent>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new(reconnect);
    let mut session = SessionState::default();

    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&client, interval, &event_tx, &mut session) => result,
        };

        if let Some(retry) = session.retry.take() {
            backoff.config.initial_delay = retry;
        }

        let reason = match result {
            Ok(()) => {
                tracing::info!("event stream ended, reconnecting");
                "stream ended".to_owned()
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt = backoff.attempt, "event stream error");
                e.to_string()
            }
        };

        if event_tx.send(StreamEvent::Error(reason)).await.is_err() {
            break;
        }

        let Some(delay) = backoff.next_delay(std::mem::take(&mut session.opened)) else {
            tracing::error!(
                max_retries = ?backoff.config.max_retries,
                "event stream retry limit reached, giving up"
            );
            break;
        };
        tracing::debug!(
            delay_ms = delay.as_millis(),
            attempt = backoff.attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!("event stream loop exiting");
}

/// Consecutive-failure counter behind the reconnect delay. A connection
/// that reached [`StreamEvent::Open`] starts the count over.
#[derive(Debug)]
struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl Backoff {
    fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay before the next connection attempt, or `None` once the
    /// retry limit is spent.
    fn next_delay(&mut self, opened: bool) -> Option<Duration> {
        if opened {
            self.attempt = 0;
        }
        if self.config.max_retries.is_some_and(|max| self.attempt >= max) {
            return None;
        }
        let delay = calculate_backoff(self.attempt, &self.config);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }
}

/// Carried across reconnects within one handle.
#[derive(Debug, Default)]
struct SessionState {
    last_event_id: Option<String>,
    retry: Option<Duration>,
    /// Set once the current connection reported `Open`.
    opened: bool,
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Open one stream connection and forward messages until it drops.
async fn connect_and_read(
    client: &ConnectionsClient,
    interval: Duration,
    event_tx: &mpsc::Sender<StreamEvent>,
    session: &mut SessionState,
) -> Result<(), Error> {
    let url: Url = client.stream_url(interval)?;
    tracing::info!(url = %redacted(&url), "connecting event stream");

    let mut request = client
        .stream_http()
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .header(reqwest::header::CACHE_CONTROL, "no-cache");
    if let Some(ref id) = session.last_event_id {
        request = request.header("Last-Event-ID", id.as_str());
    }

    let resp = check_status(request.send().await?).await?;

    if event_tx.send(StreamEvent::Open).await.is_err() {
        return Ok(());
    }
    session.opened = true;
    tracing::info!("event stream open");

    let frames = sse_frames(resp.bytes_stream());
    pin_mut!(frames);

    while let Some(frame) = frames.next().await {
        match frame? {
            SseFrame::Event { id, name, data } => {
                if id.is_some() {
                    session.last_event_id = id;
                }
                if name.as_deref().is_some_and(|n| n != "message") {
                    tracing::trace!(event = ?name, "skipping named event");
                    continue;
                }
                if event_tx.send(StreamEvent::Message(data)).await.is_err() {
                    return Ok(());
                }
            }
            SseFrame::Retry(delay) => session.retry = Some(delay),
        }
    }

    Ok(())
}

/// Strip credentials from a URL before logging it.
fn redacted(url: &Url) -> Url {
    let mut clean = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != crate::transport::ACCESS_KEY_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    clean.query_pairs_mut().clear().extend_pairs(pairs);
    clean
}

// ── Frame decoding ───────────────────────────────────────────────────

/// One decoded unit of the `text/event-stream` format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Event {
        id: Option<String>,
        name: Option<String>,
        data: String,
    },
    Retry(Duration),
}

/// Turn a body byte stream into decoded frames.
fn sse_frames<S>(body: S) -> impl Stream<Item = Result<SseFrame, Error>>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>>,
{
    async_stream::try_stream! {
        let mut decoder = SseDecoder::default();
        pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::Stream(e.to_string()))?;
            for frame in decoder.feed(&chunk) {
                yield frame;
            }
        }
    }
}

/// Longest line the decoder buffers before dropping the event it belongs to.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Incremental `text/event-stream` line parser.
///
/// Buffers raw bytes so multi-byte UTF-8 sequences split across chunks are
/// decoded whole. Handles `\n`, `\r\n` line endings, comments, `data`,
/// `event`, `id` and `retry` fields. A line longer than the limit is
/// skipped along with the rest of its event.
#[derive(Debug)]
pub struct SseDecoder {
    buf: Vec<u8>,
    /// Bytes of `buf` already searched for a line end.
    scanned: usize,
    max_line: usize,
    /// Inside an oversized line; bytes are dropped until its end.
    skipping_line: bool,
    /// The event being assembled lost a line and will not be dispatched.
    truncated: bool,
    data: Vec<String>,
    name: Option<String>,
    id: Option<String>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_line,
            skipping_line: false,
            truncated: false,
            data: Vec::new(),
            name: None,
            id: None,
        }
    }

    /// Feed a chunk; return every frame completed by it.
    pub fn feed(&mut self, mut chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        if self.skipping_line {
            let Some(pos) = chunk.iter().position(|&b| b == b'\n') else {
                return frames;
            };
            self.skipping_line = false;
            chunk = &chunk[pos + 1..];
        }
        self.buf.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + offset;
            let raw = &self.buf[start..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = String::from_utf8_lossy(raw).into_owned();
            start = end + 1;
            self.scanned = start;
            if let Some(frame) = self.line(&line) {
                frames.push(frame);
            }
        }
        self.buf.drain(..start);
        self.scanned = self.buf.len();

        if self.buf.len() > self.max_line {
            tracing::warn!(
                bytes = self.buf.len(),
                limit = self.max_line,
                "event stream line too long, dropping event"
            );
            self.buf.clear();
            self.scanned = 0;
            self.skipping_line = true;
            self.truncated = true;
        }

        frames
    }

    fn line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_owned()),
            "event" => self.name = Some(value.to_owned()),
            "id" if !value.contains('\0') => self.id = Some(value.to_owned()),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    return Some(SseFrame::Retry(Duration::from_millis(ms)));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let name = self.name.take();
        let id = self.id.take();
        if std::mem::take(&mut self.truncated) {
            self.data.clear();
            return None;
        }
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame::Event { id, name, data })
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple clients.
#[allow(
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::cast_lossless,
    clippy::as_conversions
)]
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exp = attempt.min(16) as i32;
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exp);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
