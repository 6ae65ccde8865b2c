//! Error types for vmfleet.
//!
//! This module defines the crate-level error type. The tunnel and azure
//! layers carry their own error enums ([`crate::tunnel::TunnelError`],
//! [`crate::azure::AzError`]) which are wrapped here at the application
//! boundary.

use thiserror::Error;

/// Result type alias for vmfleet operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for vmfleet.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration is invalid or incomplete.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required setting was not provided on the CLI or in configuration.
    #[error("Missing setting '{0}': pass it on the command line or set it in vmfleet.toml")]
    MissingSetting(&'static str),

    // ========================================================================
    // Cloud CLI Errors
    // ========================================================================
    /// Error from the `az` CLI wrapper.
    #[error(transparent)]
    Azure(#[from] crate::azure::AzError),

    // ========================================================================
    // Tunnel Errors
    // ========================================================================
    /// Error from the tunnel layer (pool or provider).
    #[error(transparent)]
    Tunnel(#[from] crate::tunnel::TunnelError),

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// A remote command could not be started at all.
    #[error("Failed to execute command on '{host}': {message}")]
    ExecFailed {
        /// Target VM name
        host: String,
        /// Error message
        message: String,
    },

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
