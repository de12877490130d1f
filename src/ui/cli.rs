//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Leafscan: RedLeaves-family implant detection and config extraction
#[derive(Parser, Debug)]
#[command(name = "leafscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text", global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine processing
    Json,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect implant signatures in process memory
    Detect {
        /// Scan only this process ID
        #[arg(short, long, conflicts_with = "name")]
        pid: Option<u32>,

        /// Scan only processes whose name contains this string
        #[arg(short, long, conflicts_with = "pid")]
        name: Option<String>,

        /// Export results to file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Detect implants and decode their embedded configuration
    Extract {
        /// Scan only this process ID
        #[arg(short, long, conflicts_with = "name")]
        pid: Option<u32>,

        /// Scan only processes whose name contains this string
        #[arg(short, long, conflicts_with = "pid")]
        name: Option<String>,

        /// Export results to file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the built-in signature rules
    Rules,

    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show application information
    Info,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the configuration file location
    Path,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
