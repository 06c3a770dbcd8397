//! CLI module for the Lakeward deployment tool.
//!
//! This module provides the command-line interface for managing bundle
//! deployments.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
