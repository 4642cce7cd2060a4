// ── Snapshot normalization ──
//
// Validates one raw payload and reshapes it into a canonical `Snapshot`.
// A `None` result means "skip this tick": the caller keeps its prior state.
// Numeric fields are coerced leniently because the control plane is not
// consistent about numbers vs numeric strings.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::model::{ConnectionRecord, DetailRecord, FlowMetadata, Snapshot};

/// Metadata keys lifted into typed fields; everything else lands in `extra`.
const KNOWN_METADATA: &[&str] = &[
    "host",
    "sourceIP",
    "sourcePort",
    "destinationIP",
    "destinationPort",
    "network",
    "outbound",
    "domainSource",
];

/// Parse a text payload (push event data or fetch body).
pub fn normalize_text(raw: &str) -> Option<Snapshot> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => normalize_value(&value),
        Err(e) => {
            debug!(error = %e, "snapshot payload is not JSON, skipping tick");
            None
        }
    }
}

/// Validate an already-parsed payload.
pub fn normalize_value(value: &Value) -> Option<Snapshot> {
    let Some(obj) = value.as_object() else {
        debug!("snapshot payload is not an object, skipping tick");
        return None;
    };

    let connections = match obj.get("connections") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| connection_from_value(index, item))
            .collect(),
        Some(_) => {
            debug!("snapshot connections is not a list, skipping tick");
            return None;
        }
    };

    Some(Snapshot {
        upload_total: coerce_u64(obj.get("uploadTotal")),
        download_total: coerce_u64(obj.get("downloadTotal")),
        connections,
    })
}

/// Build one connection record. Entries without an id are keyed by their
/// position in the list, so their bytes still show up in every view.
fn connection_from_value(index: usize, value: &Value) -> Option<ConnectionRecord> {
    let obj = value.as_object()?;
    let id = id_string(obj.get("id")).unwrap_or_else(|| {
        debug!(index, "connection without id, using positional key");
        format!("idx-{index}")
    });

    let details: Vec<DetailRecord> = match obj.get("details") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| detail_from_value(&id, index, item))
            .collect(),
        _ => Vec::new(),
    };

    let connection_count = match obj.get("connectionCount") {
        Some(v) if !v.is_null() => saturating_u32(coerce_u64(Some(v))),
        _ => saturating_u32(u64::try_from(details.len().max(1)).unwrap_or(u64::MAX)),
    };

    Some(ConnectionRecord {
        metadata: metadata_from_value(obj.get("metadata")),
        upload: coerce_u64(obj.get("upload")),
        download: coerce_u64(obj.get("download")),
        connection_count,
        details,
        start: coerce_time(obj.get("start")),
        last_seen: coerce_time(obj.get("lastSeen")),
        id,
    })
}

fn detail_from_value(conn_id: &str, index: usize, value: &Value) -> Option<DetailRecord> {
    let obj = value.as_object()?;
    let id = id_string(obj.get("id"));
    let key = id.clone().unwrap_or_else(|| format!("{conn_id}-{index}"));

    Some(DetailRecord {
        id,
        key,
        metadata: metadata_from_value(obj.get("metadata")),
        upload: coerce_u64(obj.get("upload")),
        download: coerce_u64(obj.get("download")),
        start: coerce_time(obj.get("start")),
        last_seen: coerce_time(obj.get("lastSeen")),
    })
}

fn metadata_from_value(value: Option<&Value>) -> FlowMetadata {
    let Some(obj) = value.and_then(Value::as_object) else {
        return FlowMetadata::default();
    };

    let extra: Map<String, Value> = obj
        .iter()
        .filter(|(k, _)| !KNOWN_METADATA.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    FlowMetadata {
        host: coerce_string(obj.get("host")),
        source_ip: coerce_string(obj.get("sourceIP")),
        source_port: coerce_string(obj.get("sourcePort")),
        destination_ip: coerce_string(obj.get("destinationIP")),
        destination_port: coerce_string(obj.get("destinationPort")),
        network: coerce_string(obj.get("network")),
        outbound: coerce_string(obj.get("outbound")),
        domain_source: coerce_string(obj.get("domainSource")),
        extra,
    }
}

// ── Coercion helpers ────────────────────────────────────────────────

/// Ids arrive as strings or numbers; empty strings count as absent.
fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn coerce_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Missing, negative, non-finite or non-numeric values become 0.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::as_conversions
)]
pub(crate) fn coerce_u64(value: Option<&Value>) -> u64 {
    let float = |f: f64| {
        if f.is_finite() && f > 0.0 {
            // Saturates at u64::MAX.
            f.floor() as u64
        } else {
            0
        }
    };

    match value {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(float)).unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(float))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

fn saturating_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// RFC 3339 strings or epoch milliseconds.
fn coerce_time(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}
