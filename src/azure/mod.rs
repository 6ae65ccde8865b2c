//! Thin wrapper around the Azure CLI.
//!
//! Everything vmfleet knows about the cloud comes from shelling out to `az`
//! with `-o json` and decoding the result. There is deliberately no SDK
//! dependency: the `az` CLI already handles authentication, token refresh,
//! and subscription selection, and the tool inherits whatever login state
//! the operator has.

/// Bastion host discovery.
pub mod bastion;

/// Virtual machine discovery.
pub mod vm;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use once_cell::sync::Lazy;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, trace};

pub use bastion::BastionHost;
pub use vm::{PowerState, VmInstance};

/// Location of the `az` binary, resolved once per process.
static AZ_BINARY: Lazy<Option<PathBuf>> = Lazy::new(|| which::which("az").ok());

/// Resolve the `az` binary on PATH.
pub fn az_binary() -> AzResult<&'static Path> {
    AZ_BINARY.as_deref().ok_or(AzError::CliNotFound)
}

/// Errors that can occur when invoking the `az` CLI.
#[derive(Error, Debug)]
pub enum AzError {
    /// The `az` binary is not installed or not on PATH.
    #[error("The 'az' CLI was not found on PATH; install the Azure CLI and run 'az login'")]
    CliNotFound,

    /// `az` exited with a non-zero status.
    #[error("'az {command}' failed (exit code {code}): {stderr}")]
    CommandFailed {
        /// The az subcommand that failed
        command: String,
        /// Exit code reported by az
        code: i32,
        /// Captured standard error
        stderr: String,
    },

    /// `az` produced output that is not the expected JSON.
    #[error("Failed to decode output of 'az {command}': {source}")]
    MalformedJson {
        /// The az subcommand whose output failed to decode
        command: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// No Bastion host could be found.
    #[error("No Bastion host found in resource group '{0}'")]
    NoBastion(String),

    /// The named VM does not exist.
    #[error("VM '{0}' not found")]
    VmNotFound(String),

    /// I/O error while spawning or reading from az.
    #[error("IO error running az: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Azure CLI operations.
pub type AzResult<T> = Result<T, AzError>;

/// Invoker for `az` subcommands with JSON output.
///
/// Cheap to clone; carries only the subscription override.
#[derive(Debug, Clone, Default)]
pub struct AzCli {
    subscription: Option<String>,
}

impl AzCli {
    /// Create a new invoker using the CLI's default subscription
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new invoker pinned to a subscription
    pub fn with_subscription(subscription: Option<String>) -> Self {
        Self { subscription }
    }

    /// Run an `az` subcommand and decode its JSON output.
    pub async fn run(&self, args: &[&str]) -> AzResult<serde_json::Value> {
        let command = args.join(" ");
        let stdout = self.output(args).await?;

        trace!(command = %command, bytes = stdout.len(), "az output captured");

        serde_json::from_str(&stdout).map_err(|source| AzError::MalformedJson { command, source })
    }

    /// Run an `az` subcommand and return its raw stdout.
    async fn output(&self, args: &[&str]) -> AzResult<String> {
        let az = az_binary()?;
        let command = args.join(" ");

        let mut cmd = Command::new(az);
        cmd.args(args).args(["-o", "json"]);
        if let Some(sub) = &self.subscription {
            cmd.args(["--subscription", sub]);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(command = %command, "Invoking az");

        let output = cmd.output().await?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(AzError::CommandFailed {
                command,
                code,
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
