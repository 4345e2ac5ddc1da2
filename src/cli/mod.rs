//! CLI module for the infra-reconcile tool.
//!
//! This module provides the command-line interface for validating,
//! syncing and deleting the resources of a manifest.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat};
pub use output::OutputFormatter;
