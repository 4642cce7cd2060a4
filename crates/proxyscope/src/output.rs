//! Output formatting: table and JSON.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde.

use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use proxyscope_core::{ConnectionRecord, RateMaps, StreamStatus, TrafficPoint, ViewMode};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

pub fn paint_status(status: StreamStatus, color: bool) -> String {
    let text = status.to_string();
    if !color {
        return text;
    }
    match status {
        StreamStatus::Live => text.green().bold().to_string(),
        StreamStatus::Connecting => text.cyan().to_string(),
        StreamStatus::Reconnecting => text.yellow().to_string(),
        StreamStatus::Paused | StreamStatus::Idle => text.dimmed().to_string(),
    }
}

// ── Human formatting ─────────────────────────────────────────────────

/// Format a byte count compactly (e.g. "512B", "1.5KB", "245.0MB").
#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
pub fn fmt_bytes(bytes: u64) -> String {
    fmt_scaled(bytes as f64, "")
}

/// Format a rate in bytes/sec (e.g. "1.2MB/s").
pub fn fmt_rate(bytes_per_sec: f64) -> String {
    if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
        return "0B/s".into();
    }
    fmt_scaled(bytes_per_sec, "/s")
}

fn fmt_scaled(value: f64, suffix: &str) -> String {
    if value >= 1_000_000_000.0 {
        format!("{:.1}GB{suffix}", value / 1_000_000_000.0)
    } else if value >= 1_000_000.0 {
        format!("{:.1}MB{suffix}", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("{:.1}KB{suffix}", value / 1_000.0)
    } else {
        format!("{value:.0}B{suffix}")
    }
}

/// Seconds since `at`, compactly ("42s", "3m", "2h").
pub fn fmt_age(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "-".into();
    };
    let secs = (now - at).num_seconds().max(0);
    if secs >= 3600 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

// ── Connection rows ──────────────────────────────────────────────────

/// Display label of a row: the host for reported connections, the group
/// label for aggregates.
pub fn row_label(row: &ConnectionRecord, mode: ViewMode) -> String {
    match mode {
        ViewMode::Current => {
            let meta = &row.metadata;
            if !meta.host.is_empty() {
                meta.host.clone()
            } else if !meta.destination_ip.is_empty() {
                format!("{}:{}", meta.destination_ip, meta.destination_port)
            } else {
                row.id.clone()
            }
        }
        ViewMode::Source | ViewMode::Destination => row
            .id
            .split_once(':')
            .map_or_else(|| row.id.clone(), |(_, label)| label.to_owned()),
    }
}

#[derive(Tabled)]
struct ConnectionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Network")]
    network: String,
    #[tabled(rename = "Outbound")]
    outbound: String,
    #[tabled(rename = "Conns")]
    count: u32,
    #[tabled(rename = "Up")]
    upload: String,
    #[tabled(rename = "Down")]
    download: String,
    #[tabled(rename = "Up/s")]
    up_rate: String,
    #[tabled(rename = "Down/s")]
    down_rate: String,
    #[tabled(rename = "Seen")]
    seen: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionJson<'a> {
    #[serde(flatten)]
    record: &'a ConnectionRecord,
    label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    upload_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    download_rate: Option<f64>,
}

/// Render connection rows. `rates` is omitted when none were computed.
pub fn render_connections(
    format: OutputFormat,
    rows: &[ConnectionRecord],
    mode: ViewMode,
    rates: Option<&RateMaps>,
    now: DateTime<Utc>,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => {
            let table_rows: Vec<ConnectionRow> = rows
                .iter()
                .map(|row| {
                    let rate = rates.map(|r| r.connection(&row.id)).unwrap_or_default();
                    ConnectionRow {
                        id: row.id.clone(),
                        label: row_label(row, mode),
                        network: row.metadata.network.clone(),
                        outbound: row.metadata.outbound.clone(),
                        count: row.connection_count,
                        upload: fmt_bytes(row.upload),
                        download: fmt_bytes(row.download),
                        up_rate: rates.map_or_else(|| "-".into(), |_| fmt_rate(rate.upload)),
                        down_rate: rates.map_or_else(|| "-".into(), |_| fmt_rate(rate.download)),
                        seen: fmt_age(row.last_seen, now),
                    }
                })
                .collect();
            Ok(render_table(&table_rows))
        }
        OutputFormat::Json | OutputFormat::JsonCompact => {
            let json: Vec<ConnectionJson<'_>> = rows
                .iter()
                .map(|row| {
                    let rate = rates.map(|r| r.connection(&row.id));
                    ConnectionJson {
                        record: row,
                        label: row_label(row, mode),
                        upload_rate: rate.map(|r| r.upload),
                        download_rate: rate.map(|r| r.download),
                    }
                })
                .collect();
            render_json(&json, matches!(format, OutputFormat::JsonCompact))
        }
    }
}

/// One-line summary of a traffic sample.
pub fn render_traffic_line(point: &TrafficPoint) -> String {
    format!(
        "up {} down {} | total up {} down {} | {} sessions",
        fmt_rate(point.up),
        fmt_rate(point.down),
        fmt_bytes(point.total_up),
        fmt_bytes(point.total_down),
        point.sessions,
    )
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn render_json<T: Serialize + ?Sized>(data: &T, compact: bool) -> Result<String, CliError> {
    let rendered = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(rendered)
}
