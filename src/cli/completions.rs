//! Shell completions module for vmfleet
//!
//! Provides shell completion scripts for bash, zsh, fish, powershell, and
//! elvish.

use clap::CommandFactory;
use clap_complete::{generate, Shell};
use std::io;

use crate::cli::Cli;

/// Generate shell completions and write to stdout
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "vmfleet", &mut io::stdout());
}
