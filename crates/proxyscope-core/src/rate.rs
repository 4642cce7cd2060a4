// ── Per-entity rate calculation ──
//
// Keeps the previous cumulative totals per connection (or aggregate) id and
// per detail key. Each update rebuilds both maps from the current rows, so
// entities that disappeared are forgotten on the next tick.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{ConnectionRecord, RateMaps, RateSample};

#[derive(Debug, Clone, Copy)]
struct Totals {
    upload: u64,
    download: u64,
    at: DateTime<Utc>,
}

/// Bytes/sec between two cumulative readings. Counter resets and
/// non-positive intervals read as 0.
#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
pub fn rate(prev: u64, curr: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 || !elapsed_secs.is_finite() {
        return 0.0;
    }
    curr.saturating_sub(prev) as f64 / elapsed_secs
}

fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    let millis = (later - earlier).num_milliseconds() as f64;
    millis / 1000.0
}

#[derive(Debug, Default)]
pub struct RateCalculator {
    connections: HashMap<String, Totals>,
    details: HashMap<String, Totals>,
}

impl RateCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute rates for `rows` observed at `now` and remember their totals.
    pub fn update(&mut self, rows: &[ConnectionRecord], now: DateTime<Utc>) -> RateMaps {
        let mut maps = RateMaps::default();
        let mut next_connections = HashMap::with_capacity(rows.len());
        let mut next_details = HashMap::new();

        for row in rows {
            let conn_rate = sample(self.connections.get(&row.id), row.upload, row.download, now);
            maps.connections.insert(row.id.clone(), conn_rate);
            next_connections.insert(
                row.id.clone(),
                Totals {
                    upload: row.upload,
                    download: row.download,
                    at: now,
                },
            );

            for detail in &row.details {
                let detail_rate = sample(
                    self.details.get(&detail.key),
                    detail.upload,
                    detail.download,
                    now,
                );
                maps.details.insert(detail.key.clone(), detail_rate);
                next_details.insert(
                    detail.key.clone(),
                    Totals {
                        upload: detail.upload,
                        download: detail.download,
                        at: now,
                    },
                );
            }
        }

        self.connections = next_connections;
        self.details = next_details;
        maps
    }

    /// Forget all history; the next update reports zero everywhere.
    pub fn reset(&mut self) {
        self.connections.clear();
        self.details.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty() && self.details.is_empty()
    }
}

fn sample(prev: Option<&Totals>, upload: u64, download: u64, now: DateTime<Utc>) -> RateSample {
    let Some(prev) = prev else {
        return RateSample::default();
    };
    let elapsed = seconds_between(prev.at, now);
    RateSample {
        upload: rate(prev.upload, upload, elapsed),
        download: rate(prev.download, download, elapsed),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::model::DetailRecord;
    use chrono::TimeDelta;

    fn row(id: &str, up: u64, down: u64, details: &[(&str, u64)]) -> ConnectionRecord {
        ConnectionRecord {
            id: id.into(),
            upload: up,
            download: down,
            details: details
                .iter()
                .map(|(key, down)| DetailRecord {
                    key: (*key).into(),
                    download: *down,
                    ..DetailRecord::default()
                })
                .collect(),
            ..ConnectionRecord::default()
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_767_225_600, 0).unwrap()
    }

    #[test]
    fn first_observation_is_zero() {
        let mut calc = RateCalculator::new();
        let maps = calc.update(&[row("a", 100, 1000, &[("a-0", 50)])], t0());
        assert_eq!(maps.connection("a"), RateSample::default());
        assert_eq!(maps.detail("a-0"), RateSample::default());
    }

    #[test]
    fn download_rate_then_counter_reset() {
        let mut calc = RateCalculator::new();
        calc.update(&[row("a", 0, 1000, &[])], t0());

        let maps = calc.update(&[row("a", 0, 1500, &[])], t0() + TimeDelta::seconds(1));
        assert_eq!(maps.connection("a").download, 500.0);

        let maps = calc.update(&[row("a", 0, 200, &[])], t0() + TimeDelta::seconds(2));
        assert_eq!(maps.connection("a").download, 0.0);
    }

    #[test]
    fn detail_rates_use_elapsed_time() {
        let mut calc = RateCalculator::new();
        calc.update(&[row("a", 0, 0, &[("d", 0)])], t0());
        let maps = calc.update(
            &[row("a", 0, 0, &[("d", 1000)])],
            t0() + TimeDelta::milliseconds(500),
        );
        assert_eq!(maps.detail("d").download, 2000.0);
    }

    #[test]
    fn connection_and_detail_rates_in_one_update() {
        let mut calc = RateCalculator::new();
        calc.update(&[row("a", 100, 1000, &[("a-0", 400)])], t0());
        let maps = calc.update(
            &[row("a", 300, 1500, &[("a-0", 700)])],
            t0() + TimeDelta::seconds(1),
        );
        assert_eq!(maps.connection("a").upload, 200.0);
        assert_eq!(maps.connection("a").download, 500.0);
        assert_eq!(maps.detail("a-0").download, 300.0);
    }

    #[test]
    fn zero_elapsed_reads_zero() {
        let mut calc = RateCalculator::new();
        calc.update(&[row("a", 0, 0, &[])], t0());
        let maps = calc.update(&[row("a", 0, 9999, &[])], t0());
        assert_eq!(maps.connection("a").download, 0.0);
    }

    #[test]
    fn vanished_entities_are_forgotten() {
        let mut calc = RateCalculator::new();
        calc.update(&[row("a", 0, 100, &[])], t0());
        calc.update(&[row("b", 0, 100, &[])], t0() + TimeDelta::seconds(1));

        // "a" returns after being absent for a tick: no history.
        let maps = calc.update(&[row("a", 0, 900, &[])], t0() + TimeDelta::seconds(2));
        assert_eq!(maps.connection("a").download, 0.0);
        assert!(!maps.connections.contains_key("b"));
    }

    #[test]
    fn reset_clears_history() {
        let mut calc = RateCalculator::new();
        calc.update(&[row("a", 0, 100, &[])], t0());
        calc.reset();
        assert!(calc.is_empty());
        let maps = calc.update(&[row("a", 0, 500, &[])], t0() + TimeDelta::seconds(1));
        assert_eq!(maps.connection("a").download, 0.0);
    }

    #[test]
    fn rate_never_negative() {
        assert_eq!(rate(500, 100, 1.0), 0.0);
        assert_eq!(rate(100, 500, -1.0), 0.0);
        assert_eq!(rate(100, 300, 2.0), 100.0);
    }
}
