// ── View aggregation ──
//
// Regroups canonical connection records into the current / source /
// destination views. Pure: the same input in any detail order yields the
// same groups, sums, merged labels and row order.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{ConnectionRecord, DetailRecord, FlowMetadata, ViewMode};

/// Collapsed value for labels that disagree across a group.
pub const MIXED: &str = "mixed";

/// Label used when a detail carries no usable address.
pub const UNKNOWN: &str = "unknown";

/// Recognized domain-source values, in precedence order.
const DOMAIN_SOURCES: [&str; 4] = ["dns", "sni", "sniff", MIXED];

/// Group `connections` for `mode`. `Current` returns the input unchanged.
pub fn aggregate(connections: &[ConnectionRecord], mode: ViewMode) -> Vec<ConnectionRecord> {
    if mode == ViewMode::Current {
        return connections.to_vec();
    }

    let mut groups: HashMap<String, ConnectionRecord> = HashMap::new();

    for conn in connections {
        for detail in &conn.details {
            let source = source_label(detail, conn);
            let destination = destination_label(detail, conn);
            let (label, peer) = match mode {
                ViewMode::Source => (source, destination),
                _ => (destination, source),
            };

            let key = format!("{mode}:{label}");
            let group = groups
                .entry(key)
                .or_insert_with_key(|key| empty_group(key, mode, &label));

            group.upload = group.upload.saturating_add(detail.upload);
            group.download = group.download.saturating_add(detail.download);
            group.connection_count = group.connection_count.saturating_add(1);
            group.start = earliest(group.start, detail.start.or(conn.start));
            group.last_seen = latest(group.last_seen, detail.last_seen.or(conn.last_seen));

            let meta = &mut group.metadata;
            match mode {
                ViewMode::Source => meta.host = merge_label(&meta.host, &peer),
                _ => meta.source_ip = merge_label(&meta.source_ip, &peer),
            }
            let domain_source = normalize_domain_source(if detail.metadata.domain_source.is_empty() {
                &conn.metadata.domain_source
            } else {
                &detail.metadata.domain_source
            });
            meta.domain_source = merge_label(&meta.domain_source, domain_source);

            let mut member = detail.clone();
            if member.last_seen.is_none() {
                member.last_seen = conn.last_seen;
            }
            group.details.push(member);
        }
    }

    let mut rows: Vec<ConnectionRecord> = groups.into_values().collect();
    for row in &mut rows {
        row.details.sort_by(by_detail_recency);
    }
    rows.sort_by(by_group_recency);
    rows
}

fn empty_group(key: &str, mode: ViewMode, label: &str) -> ConnectionRecord {
    let mut metadata = FlowMetadata::default();
    match mode {
        ViewMode::Source => metadata.source_ip = label.to_owned(),
        _ => metadata.host = label.to_owned(),
    }
    ConnectionRecord {
        id: key.to_owned(),
        metadata,
        ..ConnectionRecord::default()
    }
}

// ── Labels ──────────────────────────────────────────────────────────

/// Source address of a detail, falling back to its connection's.
pub fn source_label(detail: &DetailRecord, conn: &ConnectionRecord) -> String {
    first_non_empty(&[&detail.metadata.source_ip, &conn.metadata.source_ip])
}

/// Destination host (or address) of a detail, falling back to its connection's.
pub fn destination_label(detail: &DetailRecord, conn: &ConnectionRecord) -> String {
    first_non_empty(&[
        &detail.metadata.host,
        &detail.metadata.destination_ip,
        &conn.metadata.host,
        &conn.metadata.destination_ip,
    ])
}

fn first_non_empty(candidates: &[&str]) -> String {
    candidates
        .iter()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .unwrap_or(UNKNOWN)
        .to_owned()
}

/// Three-valued merge: empty/unknown yields the other side, equal values
/// pass through, anything else collapses to [`MIXED`].
pub fn merge_label(current: &str, incoming: &str) -> String {
    let blank = |s: &str| s.is_empty() || s == UNKNOWN;
    if blank(current) {
        incoming.to_owned()
    } else if blank(incoming) || current == incoming {
        current.to_owned()
    } else {
        MIXED.to_owned()
    }
}

/// Case-insensitive match against the fixed vocabulary; anything else is empty.
pub fn normalize_domain_source(raw: &str) -> &'static str {
    let lowered = raw.trim().to_ascii_lowercase();
    DOMAIN_SOURCES
        .iter()
        .find(|candidate| **candidate == lowered)
        .copied()
        .unwrap_or("")
}

// ── Ordering ────────────────────────────────────────────────────────

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    a.max(b)
}

/// Most recent first; undated last; key breaks ties.
fn by_detail_recency(a: &DetailRecord, b: &DetailRecord) -> Ordering {
    b.last_seen.cmp(&a.last_seen).then_with(|| a.key.cmp(&b.key))
}

fn by_group_recency(a: &ConnectionRecord, b: &ConnectionRecord) -> Ordering {
    b.last_seen.cmp(&a.last_seen).then_with(|| a.id.cmp(&b.id))
}
