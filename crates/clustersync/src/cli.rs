//! Clap derive structures for the `clustersync` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// clustersync -- headless host for the cluster snapshot cache and alert channel
#[derive(Debug, Parser)]
#[command(
    name = "clustersync",
    version,
    about = "Mirror virtualization cluster state and stream live alerts",
    long_about = "Fetches cluster snapshots through the dashboard aggregator and \
        follows the live alert channel.\n\n\
        Profiles live in the config file; flags and CLUSTERSYNC_* variables override them.",
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
    /// Cluster profile to use
    #[arg(long, short = 'p', env = "CLUSTERSYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Aggregator snapshot endpoint (overrides profile)
    #[arg(long, env = "CLUSTERSYNC_AGGREGATOR", global = true)]
    pub aggregator: Option<String>,

    /// Cluster API address (overrides profile)
    #[arg(long, env = "CLUSTERSYNC_CLUSTER", global = true)]
    pub cluster: Option<String>,

    /// Live alert channel address (overrides profile)
    #[arg(long, env = "CLUSTERSYNC_LIVE", global = true)]
    pub live: Option<String>,

    /// Session token
    #[arg(long, env = "CLUSTERSYNC_TOKEN", global = true, hide_env = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "CLUSTERSYNC_OUTPUT",
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
    #[arg(long, short = 'k', env = "CLUSTERSYNC_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "CLUSTERSYNC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load the cluster snapshot and print it
    #[command(alias = "snap", alias = "s")]
    Snapshot(SnapshotArgs),

    /// Follow the live alert channel and print bus events
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Snapshot ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Resource kind to list (omit for a summary)
    #[arg(value_enum)]
    pub resource: Option<ResourceKind>,

    /// Only show entries on this node
    #[arg(long, short = 'n')]
    pub node: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceKind {
    Nodes,
    Vms,
    Containers,
    Storage,
    Network,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this long (e.g. "10m", "1h 30m")
    #[arg(long, short = 'd')]
    pub duration: Option<humantime::Duration>,

    /// Also refresh the snapshot on the profile's poll interval
    #[arg(long)]
    pub poll: bool,

    /// Keep running after the channel gives up instead of exiting
    #[arg(long)]
    pub keep_going: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current configuration (tokens redacted)
    Show,

    /// Print the config file location
    Path,

    /// List configured profiles
    Profiles,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
