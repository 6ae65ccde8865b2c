//! CLI module for vmfleet
//!
//! This module provides the command-line interface for vmfleet, including
//! argument parsing, configuration loading, and subcommand handling.

pub mod commands;
pub mod completions;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// vmfleet - Fleet management for private Azure VMs
///
/// Discovers VMs and Bastion hosts through the az CLI and runs SSH
/// commands across the fleet over pooled Bastion tunnels.
#[derive(Parser, Debug, Clone)]
#[command(name = "vmfleet")]
#[command(author = "Vmfleet Contributors")]
#[command(version)]
#[command(about = "Fleet management for private Azure VMs", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Resource group to operate on
    #[arg(short = 'g', long, global = true, env = "VMFLEET_RESOURCE_GROUP")]
    pub resource_group: Option<String>,

    /// Azure subscription to use
    #[arg(long, global = true, env = "VMFLEET_SUBSCRIPTION")]
    pub subscription: Option<String>,

    /// Bastion host to tunnel through (default: the sole Bastion in the group)
    #[arg(short = 'b', long, global = true)]
    pub bastion: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "VMFLEET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Effective verbosity level
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }

    /// Whether JSON output was requested
    pub fn is_json(&self) -> bool {
        self.output == OutputFormat::Json
    }
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    Human,
    /// JSON output for scripting
    Json,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Human
    }
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List fleet VMs
    List(commands::list::ListArgs),

    /// Run a command on every targeted VM through pooled tunnels
    Run(commands::run::RunArgs),

    /// Open an interactive SSH session to one VM
    Ssh(commands::ssh::SshArgs),

    /// Keep a tunnel to one VM open in the foreground
    Tunnel(commands::tunnel::TunnelArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the completions subcommand
#[derive(clap::Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
