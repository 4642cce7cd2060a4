// ── Traffic time-series ──
//
// Bounded by both age and count: after every record the series holds at
// most `capacity + 1` points, none older than `window` relative to the
// newest sample.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::model::{Snapshot, TrafficPoint};
use crate::rate::rate;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_CAPACITY: usize = 60;

#[derive(Debug, Clone, Copy)]
struct LastTotals {
    upload: u64,
    download: u64,
    at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct TrafficWindow {
    points: VecDeque<TrafficPoint>,
    last: Option<LastTotals>,
    window: TimeDelta,
    capacity: usize,
}

impl Default for TrafficWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_CAPACITY)
    }
}

impl TrafficWindow {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity.saturating_add(1)),
            last: None,
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            capacity,
        }
    }

    /// Append one sample derived from `snapshot`'s cumulative totals and prune.
    pub fn record(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> TrafficPoint {
        let (up, down) = match self.last {
            Some(last) => {
                let elapsed = (now - last.at).num_milliseconds();
                #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
                let secs = elapsed as f64 / 1000.0;
                (
                    rate(last.upload, snapshot.upload_total, secs),
                    rate(last.download, snapshot.download_total, secs),
                )
            }
            None => (0.0, 0.0),
        };

        self.last = Some(LastTotals {
            upload: snapshot.upload_total,
            download: snapshot.download_total,
            at: now,
        });

        let point = TrafficPoint {
            time: now,
            up,
            down,
            total_up: snapshot.upload_total,
            total_down: snapshot.download_total,
            sessions: snapshot.sessions(),
        };
        self.points.push_back(point.clone());
        self.prune(now);
        point
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now.checked_sub_signed(self.window);
        if let Some(cutoff) = cutoff {
            while self.points.front().is_some_and(|p| p.time < cutoff) {
                self.points.pop_front();
            }
        }
        let max = self.capacity.saturating_add(1);
        while self.points.len() > max {
            self.points.pop_front();
        }
    }

    pub fn points(&self) -> Vec<TrafficPoint> {
        self.points.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&TrafficPoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.last = None;
    }
}
