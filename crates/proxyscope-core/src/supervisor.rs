// ── Transport supervision ──
//
// Pure lifecycle bookkeeping for one session: stream status, the time of
// the last accepted snapshot, and the single in-flight fallback fetch
// (plus at most one queued behind it).
// The session loop feeds it events and asks it whether to fetch.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::model::StreamStatus;

/// Which path delivered a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Push,
    Fallback,
}

#[derive(Debug)]
pub struct TransportSupervisor {
    status: StreamStatus,
    stale_after: Duration,
    activated_at: Instant,
    last_accepted: Option<Instant>,
    fetch_in_flight: bool,
    refetch_pending: bool,
}

impl TransportSupervisor {
    pub fn new(stale_after: Duration, now: Instant) -> Self {
        Self {
            status: StreamStatus::Idle,
            stale_after,
            activated_at: now,
            last_accepted: None,
            fetch_in_flight: false,
            refetch_pending: false,
        }
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Session start: nothing accepted yet, stream about to open.
    pub fn on_activate(&mut self, now: Instant) {
        self.activated_at = now;
        self.last_accepted = None;
        self.fetch_in_flight = false;
        self.refetch_pending = false;
        self.transition(StreamStatus::Connecting);
    }

    pub fn on_open(&mut self) {
        self.transition(StreamStatus::Live);
    }

    /// The stream client retries on its own; this only reports it.
    pub fn on_stream_error(&mut self) {
        self.transition(StreamStatus::Reconnecting);
    }

    /// A snapshot passed normalization. Push deliveries prove the stream
    /// is alive; fallback fetches say nothing about it.
    pub fn on_accepted(&mut self, now: Instant, via: Delivery) {
        self.last_accepted = Some(now);
        if via == Delivery::Push {
            self.transition(StreamStatus::Live);
        }
    }

    /// No snapshot accepted for at least the threshold, counting from
    /// activation when nothing was ever accepted.
    pub fn is_stale(&self, now: Instant) -> bool {
        let since = self.last_accepted.unwrap_or(self.activated_at);
        now.saturating_duration_since(since) >= self.stale_after
    }

    /// Claim the fetch slot. `false` while another fetch is outstanding.
    pub fn begin_fetch(&mut self) -> bool {
        if self.fetch_in_flight {
            return false;
        }
        self.fetch_in_flight = true;
        true
    }

    /// Ask for one more fetch once the outstanding one completes.
    pub fn queue_refetch(&mut self) {
        self.refetch_pending = true;
    }

    /// Release the fetch slot. Returns `true` when a refetch was queued
    /// meanwhile; the flag is consumed.
    pub fn end_fetch(&mut self) -> bool {
        self.fetch_in_flight = false;
        std::mem::take(&mut self.refetch_pending)
    }

    pub fn fetch_in_flight(&self) -> bool {
        self.fetch_in_flight
    }

    pub fn on_teardown(&mut self, status: StreamStatus) {
        self.fetch_in_flight = false;
        self.refetch_pending = false;
        self.last_accepted = None;
        self.transition(status);
    }

    fn transition(&mut self, next: StreamStatus) {
        if self.status == next {
            return;
        }
        match next {
            StreamStatus::Live | StreamStatus::Paused | StreamStatus::Idle => {
                info!(from = %self.status, to = %next, "stream status");
            }
            _ => debug!(from = %self.status, to = %next, "stream status"),
        }
        self.status = next;
    }
}
