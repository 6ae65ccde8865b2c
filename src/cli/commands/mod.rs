//! Subcommands module for vmfleet CLI
//!
//! This module contains all the subcommand implementations.

pub mod list;
pub mod run;
pub mod ssh;
pub mod tunnel;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use vmfleet::azure::AzCli;
use vmfleet::config::Config;
use vmfleet::exec::SshOptions;
use vmfleet::tunnel::{BastionTunnelProvider, PoolConfig, TunnelPool, TunnelProvider};

use crate::cli::output::OutputFormatter;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Resource group from the CLI (overrides config)
    pub resource_group: Option<String>,
    /// Subscription from the CLI (overrides config)
    pub subscription: Option<String>,
    /// Bastion name from the CLI (overrides config)
    pub bastion: Option<String>,
    /// Verbosity level
    pub verbosity: u8,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, config: Config) -> Self {
        let output = OutputFormatter::new(
            config.output.color && !cli.no_color,
            cli.is_json(),
            cli.verbosity(),
        );

        Self {
            output,
            resource_group: cli.resource_group.clone(),
            subscription: cli.subscription.clone(),
            bastion: cli.bastion.clone(),
            verbosity: cli.verbosity(),
            config,
        }
    }

    /// Azure CLI invoker with the effective subscription
    pub fn az(&self) -> AzCli {
        let subscription = self
            .subscription
            .clone()
            .or_else(|| self.config.defaults.subscription.clone());
        AzCli::with_subscription(subscription)
    }

    /// Effective resource group: CLI flag, then config
    pub fn resource_group(&self) -> Result<String> {
        match self
            .resource_group
            .clone()
            .or_else(|| self.config.defaults.resource_group.clone())
        {
            Some(rg) => Ok(rg),
            None => bail!(
                "no resource group given: pass -g/--resource-group or set defaults.resource_group in vmfleet.toml"
            ),
        }
    }

    /// Preferred Bastion name: CLI flag, then config
    pub fn preferred_bastion(&self) -> Option<String> {
        self.bastion
            .clone()
            .or_else(|| self.config.defaults.bastion.clone())
    }

    /// Build the production tunnel pool from the configuration
    pub fn build_pool(&self) -> Result<Arc<TunnelPool>> {
        let az = vmfleet::azure::az_binary()?;
        let provider: Arc<dyn TunnelProvider> = Arc::new(BastionTunnelProvider::new(
            az.to_path_buf(),
            self.config.tunnel.connect_timeout,
        ));

        let pool_config = PoolConfig::new()
            .max_tunnels(self.config.tunnel.max_tunnels)
            .idle_timeout(self.config.tunnel.idle_timeout);

        Ok(Arc::new(TunnelPool::with_config(provider, pool_config)))
    }

    /// SSH options merged from config and per-command overrides
    pub fn ssh_options(
        &self,
        user: Option<&str>,
        port: Option<u16>,
        identity_file: Option<&std::path::Path>,
    ) -> SshOptions {
        SshOptions {
            user: user
                .map(str::to_string)
                .unwrap_or_else(|| self.config.defaults.user.clone()),
            port: port.unwrap_or(self.config.ssh.port),
            identity_file: identity_file
                .map(|p| p.to_path_buf())
                .or_else(|| self.config.ssh.identity_file.clone()),
            strict_host_key_checking: self.config.ssh.strict_host_key_checking,
            connect_timeout: self.config.ssh.connect_timeout,
        }
    }

    /// Cleanup interval from configuration
    pub fn cleanup_interval(&self) -> Duration {
        self.config.tunnel.cleanup_interval
    }
}
