//! Clap derive structures for the `tripwire` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.
//! Also compiled by `build.rs` for man page generation, so it may only
//! depend on clap, clap_complete and humantime.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Widest `ledger daily` range. Equal to `tripwire_core::MAX_DAILY_DAYS`.
pub const MAX_DAILY_DAYS: u32 = 3660;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// tripwire -- network, CPU, battery and thermal anomaly monitor
#[derive(Debug, Parser)]
#[command(
    name = "tripwire",
    version,
    about = "Watch for suspicious network, CPU, battery and thermal activity",
    long_about = "Samples network throughput, CPU load, battery drain and thermal state,\n\
        scores them against configurable thresholds and records incidents.\n\n\
        Traffic is accounted per day, week and month across restarts.",
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
    /// Config file path
    #[arg(long, env = "TRIPWIRE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding ledger, incident and session state
    #[arg(long, env = "TRIPWIRE_STATE_DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "TRIPWIRE_OUTPUT",
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

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
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
    /// Monitor in the foreground until interrupted
    Run(RunArgs),

    /// Sample once and print the scored snapshot
    #[command(alias = "snap")]
    Snapshot(SnapshotArgs),

    /// Traffic accounting per window and per day
    Ledger(LedgerArgs),

    /// List, acknowledge and resolve incidents
    #[command(alias = "inc")]
    Incidents(IncidentsArgs),

    /// Finished sleep sessions
    Sessions(SessionsArgs),

    /// Show the effective threat thresholds
    Thresholds,

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Run / Snapshot ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Stop after this long (e.g. "30s", "8h")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Record the run as a sleep session
    #[arg(long)]
    pub sleep: bool,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Time between the baseline and the scored sample
    #[arg(long, default_value = "3s", value_parser = humantime::parse_duration)]
    pub warmup: Duration,
}

// ── Ledger ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LedgerArgs {
    #[command(subcommand)]
    pub command: LedgerCommand,
}

#[derive(Debug, Subcommand)]
pub enum LedgerCommand {
    /// Totals per window and link class
    Show,

    /// Per-day usage, oldest first
    Daily {
        /// Number of days, today included (at most 3660)
        #[arg(
            long,
            short = 'd',
            default_value = "7",
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_DAILY_DAYS))
        )]
        days: u32,
    },

    /// Zero every accumulator and delete the traffic log
    Reset,
}

// ── Incidents ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct IncidentsArgs {
    #[command(subcommand)]
    pub command: IncidentsCommand,
}

#[derive(Debug, Subcommand)]
pub enum IncidentsCommand {
    /// List incidents, newest first
    #[command(alias = "ls")]
    List {
        /// Only unresolved incidents
        #[arg(long)]
        open: bool,

        /// Filter by kind (e.g. cpuAnomaly, dataExfiltration)
        #[arg(long, short = 'k')]
        kind: Option<String>,

        /// Maximum number of incidents
        #[arg(long, short = 'l')]
        limit: Option<usize>,
    },

    /// Acknowledge an incident without resolving it
    Ack {
        /// Incident ID or unique prefix
        id: String,
    },

    /// Resolve an incident
    Resolve {
        /// Incident ID or unique prefix
        id: String,
    },
}

// ── Sessions ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SessionsArgs {
    #[command(subcommand)]
    pub command: SessionsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SessionsCommand {
    /// Finished sessions, newest first
    #[command(alias = "ls")]
    List {
        /// Maximum number of sessions
        #[arg(long, short = 'l')]
        limit: Option<usize>,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a commented default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration (file + environment)
    Show,

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
