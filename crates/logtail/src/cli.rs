//! Clap derive structures for the `logtail` CLI.
//!
//! Also compiled by `build.rs` for man pages, so this module depends on
//! nothing but clap and clap_complete.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// logtail -- stream API request logs to your terminal
#[derive(Debug, Parser)]
#[command(
    name = "logtail",
    version,
    about = "Stream API request logs to your terminal in real time",
    long_about = "Opens an authorized streaming session and prints every API request \
        logged against your account as it happens.\n\n\
        Sessions reconnect automatically when the connection drops. Press ^C to stop.",
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
    /// Configuration profile to use
    #[arg(long, short = 'p', env = "LOGTAIL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// API base URL (overrides profile)
    #[arg(long, env = "LOGTAIL_API_BASE", global = true)]
    pub api_base: Option<String>,

    /// API key (overrides profile and keyring)
    #[arg(long, env = "LOGTAIL_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress status messages and warnings
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Write diagnostic logs to this file instead of stderr
    #[arg(long, env = "LOGTAIL_LOG_FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Session request timeout in seconds (default: no timeout)
    #[arg(long, env = "LOGTAIL_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One summary line per request
    Human,
    /// Full payload as pretty-printed JSON
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
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
    /// Stream request logs until interrupted
    #[command(alias = "listen")]
    Tail(TailArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Tail ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TailArgs {
    /// Output format (overrides profile)
    #[arg(long, short = 'f')]
    pub format: Option<OutputFormat>,

    /// Feature to request for the session
    #[arg(long)]
    pub feature: Option<String>,

    /// Device name reported to the API (default: hostname)
    #[arg(long, env = "LOGTAIL_DEVICE_NAME")]
    pub device_name: Option<String>,

    /// Connect over ws:// even when the session endpoint is wss://
    #[arg(long)]
    pub no_wss: bool,
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

    /// Display current configuration (secrets masked)
    Show,

    /// Set a value on the active profile
    Set {
        /// Profile key (e.g., "api_base", "device_name", "output")
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store the active profile's API key in the system keyring
    SetKey,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
