//! # vmfleet - Fleet Management for Private Azure VMs
//!
//! vmfleet operates a fleet of Azure virtual machines that have no public
//! IP addresses. Discovery and tunnel establishment are thin orchestration
//! over the `az` CLI; the heart of the crate is the tunnel connection pool,
//! which makes fan-out SSH across dozens of VMs affordable by caching the
//! expensive Bastion tunnels between commands.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      CLI Interface                       │
//! │               (clap-based command parsing)               │
//! └─────────────────────────────────────────────────────────┘
//!                             │
//!            ┌────────────────┼────────────────┐
//!            ▼                ▼                ▼
//! ┌──────────────────┐ ┌─────────────┐ ┌──────────────────┐
//! │  Azure CLI       │ │  Fleet      │ │  Tunnel Pool     │
//! │  wrapper (az vm, │ │  Executor   │ │  + Cleanup       │
//! │  az network      │ │  (ssh fan-  │ │  Daemon          │
//! │  bastion ...)    │ │  out)       │ │                  │
//! └──────────────────┘ └─────────────┘ └──────────────────┘
//!                             │                │
//!                             ▼                ▼
//!                      ┌──────────────────────────────┐
//!                      │  az network bastion tunnel   │
//!                      │  subprocesses (one per route)│
//!                      └──────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use vmfleet::prelude::*;
//!
//! let az = AzCli::new();
//! let vms = az.list_vms(Some("fleet-rg")).await?;
//! let bastion = az.pick_bastion(Some("fleet-rg"), None).await?;
//!
//! let provider = Arc::new(BastionTunnelProvider::new(az_path, connect_timeout));
//! let pool = Arc::new(TunnelPool::new(provider));
//!
//! let executor = FleetExecutor::new(Arc::clone(&pool), &bastion.name, ssh_options, 10);
//! let reports = executor.run(&vms, "uptime", None).await;
//!
//! pool.close_all().await;
//! ```

/// Azure CLI wrapper: VM and Bastion discovery.
pub mod azure;

/// Configuration loading and merging.
pub mod config;

/// Crate-level error types.
pub mod error;

/// Fan-out command execution.
pub mod exec;

/// Tunnel provider, pool, and cleanup daemon.
pub mod tunnel;

pub use error::{Error, Result};

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use crate::azure::{AzCli, BastionHost, PowerState, VmInstance};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::exec::{ExecReport, ExecSummary, FleetExecutor, SshOptions};
    pub use crate::tunnel::{
        BastionTunnelProvider, CleanupDaemon, PoolConfig, PoolKey, PooledTunnel, TunnelPool,
        TunnelProvider,
    };
}
