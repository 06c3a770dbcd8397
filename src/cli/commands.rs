//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand, ValueEnum};

/// Lakeward - declarative bundle deployment.
#[derive(Parser, Debug)]
#[command(name = "lakeward")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Target to deploy against (defaults to the target marked `default`).
    #[arg(short, long, global = true, env = "LAKEWARD_TARGET")]
    pub target: Option<String>,

    /// Variable override, `NAME=value`. May be given multiple times.
    #[arg(long = "var", global = true, value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load and validate the configuration without touching the workspace.
    Validate,

    /// Print the JSON schema of the configuration format.
    Schema,

    /// Show a summary of the configured resources and derived paths.
    Summary,

    /// Build artifacts, sync files and apply the configuration.
    Deploy {
        /// Steal an existing deployment lock.
        #[arg(long)]
        force_lock: bool,

        /// Skip confirmation prompts.
        #[arg(long)]
        auto_approve: bool,
    },

    /// Destroy all deployed resources and remote files.
    Destroy {
        /// Confirm the destruction.
        #[arg(long)]
        auto_approve: bool,

        /// Steal an existing deployment lock.
        #[arg(long)]
        force_lock: bool,
    },

    /// Sync the local source tree into the remote file area.
    Sync {
        /// Keep syncing until interrupted.
        #[arg(long)]
        watch: bool,

        /// Polling interval in seconds for watch mode.
        #[arg(long, default_value = "1")]
        interval: u64,
    },
}

/// Output format of diagnostics and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable, colored.
    Text,
    /// One JSON document on stderr.
    Json,
}
