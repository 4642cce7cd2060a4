// ── Frame pacing ──
//
// Coalesces snapshot arrivals into at most one application per flush.
// The scheduler only tracks the pending slot and its deadline; the session
// loop sleeps until `deadline()` and then calls `flush()`.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::model::{Snapshot, Visibility};

/// Flush delay when no frame cadence is available.
pub const SHORT_FLUSH_DELAY: Duration = Duration::from_millis(16);
/// Flush delay while the consumer is hidden.
pub const HIDDEN_FLUSH_DELAY: Duration = Duration::from_millis(250);

/// Timing capability injected into a session.
pub trait Pacer: Send + Sync + fmt::Debug {
    fn is_hidden(&self) -> bool;

    /// Render cadence of the consumer, if it has one.
    fn frame_interval(&self) -> Option<Duration>;

    fn short_delay(&self) -> Duration {
        SHORT_FLUSH_DELAY
    }

    fn hidden_delay(&self) -> Duration {
        HIDDEN_FLUSH_DELAY
    }
}

/// How long to wait before the next flush given the pacer's state.
pub fn flush_delay(pacer: &dyn Pacer) -> Duration {
    if pacer.is_hidden() {
        pacer.hidden_delay()
    } else {
        pacer.frame_interval().unwrap_or_else(|| pacer.short_delay())
    }
}

/// Pacer driven by the facade's visibility channel.
#[derive(Debug, Clone)]
pub struct VisibilityPacer {
    visibility: watch::Receiver<Visibility>,
    frame_interval: Option<Duration>,
    short_delay: Duration,
    hidden_delay: Duration,
}

impl VisibilityPacer {
    pub fn new(visibility: watch::Receiver<Visibility>, frame_interval: Option<Duration>) -> Self {
        Self {
            visibility,
            frame_interval,
            short_delay: SHORT_FLUSH_DELAY,
            hidden_delay: HIDDEN_FLUSH_DELAY,
        }
    }

    pub fn with_delays(mut self, short: Duration, hidden: Duration) -> Self {
        self.short_delay = short;
        self.hidden_delay = hidden;
        self
    }
}

impl Pacer for VisibilityPacer {
    fn is_hidden(&self) -> bool {
        self.visibility.borrow().is_hidden()
    }

    fn frame_interval(&self) -> Option<Duration> {
        self.frame_interval
    }

    fn short_delay(&self) -> Duration {
        self.short_delay
    }

    fn hidden_delay(&self) -> Duration {
        self.hidden_delay
    }
}

/// Zero-or-one pending snapshot plus the instant it is due.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    pending: Option<Snapshot>,
    due: Option<Instant>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending snapshot. A flush is scheduled only if none is
    /// already outstanding; returns `true` when this call scheduled it.
    pub fn offer(&mut self, snapshot: Snapshot, pacer: &dyn Pacer, now: Instant) -> bool {
        self.pending = Some(snapshot);
        if self.due.is_some() {
            return false;
        }
        self.due = Some(now + flush_delay(pacer));
        true
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.due
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the pending snapshot and clear the schedule.
    pub fn flush(&mut self) -> Option<Snapshot> {
        self.due = None;
        self.pending.take()
    }

    /// Drop the pending snapshot and its schedule. Safe to repeat.
    pub fn cancel(&mut self) {
        self.due = None;
        self.pending = None;
    }
}
