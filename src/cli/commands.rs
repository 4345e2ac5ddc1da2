//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// infra-reconcile - Declarative reconciliation of cloud resources.
#[derive(Parser, Debug)]
#[command(name = "infra-reconcile")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the resource manifest.
    #[arg(short, long, global = true, env = "INFRA_RECONCILE_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Path to the state file.
    #[arg(short, long, global = true, env = "INFRA_RECONCILE_STATE")]
    pub state: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the manifest without contacting the provider.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Create or update every resource in the manifest.
    Sync {
        /// Continue with later resources after a failure.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Delete every resource in the manifest, honoring deletion policies.
    Delete {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Continue with earlier resources after a failure.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Show recorded resources and run history.
    Show,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
