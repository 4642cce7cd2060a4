//! `close`: terminate flows by id.

use proxyscope_core::{SnapshotSource, Telemetry};

use crate::cli::{CloseArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub async fn handle<S: SnapshotSource>(
    telemetry: &Telemetry<S>,
    args: &CloseArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    telemetry.close_connections(&args.ids).await?;
    let noun = if args.ids.len() == 1 {
        "connection"
    } else {
        "connections"
    };
    output::print_output(&format!("Closed {} {noun}", args.ids.len()), global.quiet);
    Ok(())
}
