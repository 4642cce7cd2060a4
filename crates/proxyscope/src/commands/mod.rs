//! Command dispatch: bridges CLI args -> telemetry facade -> output formatting.

pub mod close;
pub mod config_cmd;
pub mod snapshot;
pub mod watch;

use proxyscope_core::{Telemetry, TelemetryConfig};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a control-plane-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    config: TelemetryConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Snapshot(args) => snapshot::handle(&Telemetry::new(config)?, &args, global).await,
        Command::Watch(args) => watch::handle(config, &args, global).await,
        Command::Close(args) => close::handle(&Telemetry::new(config)?, &args, global).await,
        Command::Config(args) => config_cmd::handle(&args, global),
    }
}
