//! Configuration module for vmfleet
//!
//! Handles loading configuration from the standard locations:
//! - System configuration (/etc/vmfleet/config.toml)
//! - User configuration (~/.config/vmfleet/config.toml)
//! - Project configuration (./vmfleet.toml)
//! - Environment variables
//! - Command-line arguments
//!
//! Later sources take precedence over earlier ones.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default settings
    pub defaults: Defaults,

    /// Tunnel pool settings
    pub tunnel: TunnelSettings,

    /// SSH settings
    pub ssh: SshSettings,

    /// Output settings
    pub output: OutputSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: Defaults::default(),
            tunnel: TunnelSettings::default(),
            ssh: SshSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

/// Default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Default resource group for VM and Bastion discovery
    pub resource_group: Option<String>,

    /// Default Azure subscription
    pub subscription: Option<String>,

    /// Preferred Bastion host name
    pub bastion: Option<String>,

    /// Default remote user for SSH sessions
    pub user: String,

    /// Default number of parallel host operations
    pub forks: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            resource_group: None,
            subscription: None,
            bastion: None,
            user: "azureuser".to_string(),
            forks: 5,
        }
    }
}

/// Tunnel pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    /// Maximum number of concurrently pooled tunnels (0 = unbounded)
    pub max_tunnels: usize,

    /// How long an unused tunnel may stay in the pool
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// How often the cleanup daemon sweeps for idle tunnels
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,

    /// How long to wait for a new tunnel to accept connections
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            max_tunnels: 16,
            idle_timeout: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// SSH settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    /// Remote SSH port on the target VM
    pub port: u16,

    /// Path to the private key passed to ssh with -i
    pub identity_file: Option<PathBuf>,

    /// Whether ssh should verify host keys (tunnels terminate on localhost,
    /// so the key changes with every local port)
    pub strict_host_key_checking: bool,

    /// SSH connect timeout in seconds
    pub connect_timeout: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            port: 22,
            identity_file: None,
            strict_host_key_checking: false,
            connect_timeout: 10,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Use colored output when writing to a terminal
    pub color: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self { color: true }
    }
}

impl Config {
    /// Load configuration, checking the standard locations in order.
    ///
    /// An explicit path (from `--config` or `VMFLEET_CONFIG`) takes priority
    /// and must exist; the standard locations are optional.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        for path in Self::config_paths(config_path) {
            if path.exists() {
                config = Self::load_from_file(&path)?;
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// The list of configuration file paths to check, lowest priority first
    fn config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        if let Some(path) = explicit_path {
            return vec![path.clone()];
        }

        let mut paths = Vec::new();

        // System-wide config
        paths.push(PathBuf::from("/etc/vmfleet/config.toml"));

        // User config
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("vmfleet/config.toml"));
        }

        // Project config (current directory)
        paths.push(PathBuf::from("vmfleet.toml"));

        // Environment variable
        if let Ok(env_config) = std::env::var("VMFLEET_CONFIG") {
            paths.push(PathBuf::from(env_config));
        }

        paths
    }

    /// Parse a configuration file. Missing sections fall back to defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(rg) = std::env::var("VMFLEET_RESOURCE_GROUP") {
            self.defaults.resource_group = Some(rg);
        }
        if let Ok(sub) = std::env::var("VMFLEET_SUBSCRIPTION") {
            self.defaults.subscription = Some(sub);
        }
        if let Ok(user) = std::env::var("VMFLEET_USER") {
            self.defaults.user = user;
        }
        if let Ok(bastion) = std::env::var("VMFLEET_BASTION") {
            self.defaults.bastion = Some(bastion);
        }
    }
}
