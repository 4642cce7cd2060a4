//! `watch`: run a live session and print each applied update.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use proxyscope_core::config::MIN_REFRESH_INTERVAL;
use proxyscope_core::{
    ConnectionRecord, RateMaps, StreamStatus, Telemetry, TelemetryConfig, TrafficPoint, ViewMode,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

/// One applied update, as emitted in JSON output.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Frame<'a> {
    tick: u64,
    status: StreamStatus,
    mode: ViewMode,
    traffic: Option<&'a TrafficPoint>,
    rates: &'a RateMaps,
    rows: &'a [ConnectionRecord],
}

pub async fn handle(
    mut config: TelemetryConfig,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if let Some(ms) = args.interval {
        config.refresh_interval = interval_override(ms);
    }
    let telemetry = Telemetry::new(config)?;
    let mode = ViewMode::from(args.mode);
    telemetry.set_view_mode(mode).await;
    telemetry.set_view_active(true).await;

    let color = output::should_color(global.color);
    let mut status_rx = telemetry.status();
    let mut traffic_rx = telemetry.traffic();
    let view_rx = telemetry.view();

    telemetry.activate().await;
    let refresh = telemetry.refresh_interval().await;
    info!(
        refresh_ms = refresh.as_millis(),
        %mode,
        "watching connections"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut ticks: u64 = 0;
    let result = loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("interrupted");
                break Ok(());
            }

            changed = status_rx.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let status = *status_rx.borrow_and_update();
                if !global.quiet && matches!(global.output, OutputFormat::Table) {
                    eprintln!("status: {}", output::paint_status(status, color));
                }
            }

            // Traffic is published last on every applied snapshot.
            changed = traffic_rx.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                ticks += 1;
                let traffic = traffic_rx.borrow_and_update().clone();
                let view = view_rx.borrow().clone();
                let rates = telemetry.rates();
                let rows = &view.rows[..view.rows.len().min(args.limit)];

                let rendered = match global.output {
                    OutputFormat::Table => render_table_frame(
                        telemetry.current_status(),
                        traffic.last(),
                        rows,
                        view.mode,
                        &rates,
                        color,
                    ),
                    OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(
                        &Frame {
                            tick: ticks,
                            status: telemetry.current_status(),
                            mode: view.mode,
                            traffic: traffic.last(),
                            rates: &rates,
                            rows,
                        },
                        matches!(global.output, OutputFormat::JsonCompact),
                    ),
                };
                match rendered {
                    Ok(text) => output::print_output(&text, global.quiet),
                    Err(e) => break Err(e),
                }

                if args.ticks.is_some_and(|limit| ticks >= limit) {
                    break Ok(());
                }
            }
        }
    };

    telemetry.deactivate().await;
    result
}

/// `--interval` honours the same floor as the persisted setting.
fn interval_override(ms: u64) -> Duration {
    Duration::from_millis(ms).max(MIN_REFRESH_INTERVAL)
}

fn render_table_frame(
    status: StreamStatus,
    traffic: Option<&TrafficPoint>,
    rows: &[ConnectionRecord],
    mode: ViewMode,
    rates: &RateMaps,
    color: bool,
) -> Result<String, CliError> {
    let header = traffic.map_or_else(
        || format!("[{}]", output::paint_status(status, color)),
        |point| {
            format!(
                "[{}] {}",
                output::paint_status(status, color),
                output::render_traffic_line(point)
            )
        },
    );
    let table =
        output::render_connections(OutputFormat::Table, rows, mode, Some(rates), Utc::now())?;
    Ok(format!("{header}\n{table}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_flag_is_clamped_to_floor() {
        assert_eq!(interval_override(0), MIN_REFRESH_INTERVAL);
        assert_eq!(interval_override(50), MIN_REFRESH_INTERVAL);
        assert_eq!(interval_override(2500), Duration::from_millis(2500));
    }
}
