//! Clap derive structures for the `skeyd` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// skeyd -- scan-key dispatcher for network scanners
#[derive(Debug, Parser)]
#[command(
    name = "skeyd",
    version,
    about = "Run local scripts when a network scanner's scan button is pressed",
    long_about = "Registers scan-menu entries with network scanners and listens for\n\
        their button notifications. Each press runs the configured command with\n\
        the device identifier as its first argument.\n\n\
        skeyd stays in the foreground; run it under a service manager.",
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
    /// Configuration file [default: /etc/skeyd/config.toml, then the user config dir]
    #[arg(long, short = 'c', env = "SKEYD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs to this file instead of stderr
    #[arg(long, env = "SKEYD_LOG_FILE", global = true)]
    pub log_file: Option<PathBuf>,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the dispatcher until SIGTERM
    Run,

    /// Validate the configuration and show what would be served
    Check,

    /// Print a commented example configuration
    ExampleConfig(ExampleConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct ExampleConfigArgs {
    /// Write to this file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
