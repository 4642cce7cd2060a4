//! `snapshot`: one fallback fetch, regroup, print.

use chrono::Utc;
use tracing::debug;

use proxyscope_core::{SnapshotSource, Telemetry, ViewMode, aggregate};

use crate::cli::{GlobalOpts, OutputFormat, SnapshotArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle<S: SnapshotSource>(
    telemetry: &Telemetry<S>,
    args: &SnapshotArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let snapshot = telemetry.fetch_once().await?;
    let mode = ViewMode::from(args.mode);

    let mut rows = aggregate(&snapshot.connections, mode);
    debug!(
        connections = snapshot.connections.len(),
        rows = rows.len(),
        %mode,
        "fetched snapshot"
    );
    if let Some(limit) = args.limit {
        rows.truncate(limit);
    }

    let rendered = output::render_connections(global.output, &rows, mode, None, Utc::now())?;
    output::print_output(&rendered, global.quiet);

    if matches!(global.output, OutputFormat::Table) {
        output::print_output(
            &format!(
                "{} connections, {} sessions | total up {} down {}",
                snapshot.connections.len(),
                snapshot.sessions(),
                output::fmt_bytes(snapshot.upload_total),
                output::fmt_bytes(snapshot.download_total),
            ),
            global.quiet,
        );
    }
    Ok(())
}
