//! Clap derive structures for the `proxyscope` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

use proxyscope_core::ViewMode;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// proxyscope -- live connection telemetry for proxy control planes
#[derive(Debug, Parser)]
#[command(
    name = "proxyscope",
    version,
    about = "Watch live proxy connections and traffic from the command line",
    long_about = "Inspect the connections table of a proxy control plane.\n\n\
        Streams full connection snapshots over server-sent events, falls back\n\
        to polling when the stream goes quiet, and derives per-connection\n\
        rates and a rolling traffic series.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Control-plane profile to use
    #[arg(long, short = 'p', env = "PROXYSCOPE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Control-plane API base URL (overrides profile)
    #[arg(long, env = "PROXYSCOPE_API", global = true)]
    pub api: Option<String>,

    /// Access key sent with every request
    #[arg(long, env = "PROXYSCOPE_ACCESS_KEY", global = true, hide_env = true)]
    pub access_key: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "PROXYSCOPE_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "PROXYSCOPE_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "PROXYSCOPE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

/// Row grouping for connection tables.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ModeArg {
    /// Connections as reported
    #[default]
    Current,
    /// Group by source address or process
    Source,
    /// Group by destination host or address
    Destination,
}

impl From<ModeArg> for ViewMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Current => ViewMode::Current,
            ModeArg::Source => ViewMode::Source,
            ModeArg::Destination => ViewMode::Destination,
        }
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the connections table once and print it
    #[command(alias = "snap")]
    Snapshot(SnapshotArgs),

    /// Stream live updates with rates and traffic totals
    Watch(WatchArgs),

    /// Close connections by id
    Close(CloseArgs),

    /// Inspect configuration
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Row grouping
    #[arg(long, short = 'm', value_enum, default_value_t = ModeArg::Current)]
    pub mode: ModeArg,

    /// Show at most this many rows
    #[arg(long, short = 'l')]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Row grouping
    #[arg(long, short = 'm', value_enum, default_value_t = ModeArg::Current)]
    pub mode: ModeArg,

    /// Push interval in milliseconds (overrides profile)
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,

    /// Stop after this many applied updates (default: run until Ctrl-C)
    #[arg(long, short = 'n')]
    pub ticks: Option<u64>,

    /// Rows shown per update
    #[arg(long, short = 'l', default_value = "10")]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct CloseArgs {
    /// Connection ids to close
    #[arg(required = true, num_args = 1..)]
    pub ids: Vec<u64>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the resolved configuration (access keys redacted)
    Show,
}
