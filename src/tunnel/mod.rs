//! Tunnel layer for reaching private VMs through Azure Bastion.
//!
//! Establishing a Bastion tunnel means spawning an `az network bastion
//! tunnel` subprocess and waiting for it to start listening on a local
//! port: several seconds of work that must not be repeated for every
//! command sent to the same VM. This module provides:
//!
//! - [`TunnelProvider`]: the transport boundary (create, close, health
//!   check, local port allocation), with [`BastionTunnelProvider`] as the
//!   production implementation.
//! - [`TunnelPool`]: a concurrency-safe cache of established tunnels with
//!   reuse, per-entry health verification, and capacity-bounded LRU
//!   eviction.
//! - [`CleanupDaemon`]: a background task that periodically reaps tunnels
//!   nobody has used recently.
//!
//! # Example
//!
//! ```rust,ignore
//! use vmfleet::tunnel::{BastionTunnelProvider, CleanupDaemon, PoolConfig, TunnelPool};
//!
//! let provider = Arc::new(BastionTunnelProvider::new(az_path, connect_timeout));
//! let pool = Arc::new(TunnelPool::with_config(provider, PoolConfig::default()));
//!
//! let mut daemon = CleanupDaemon::new(Arc::clone(&pool));
//! daemon.start(Duration::from_secs(60));
//!
//! let tunnel = pool.get_or_create("fleet-bastion", "fleet-rg", vm_id, 22).await?;
//! // ssh to 127.0.0.1:{tunnel.local_port()} ...
//!
//! daemon.stop().await;
//! pool.close_all().await;
//! ```

/// Background reaper for idle pooled tunnels.
pub mod daemon;

/// Tunnel caching and reuse.
pub mod pool;

/// Tunnel transport boundary and the Bastion implementation.
pub mod provider;

use thiserror::Error;

pub use daemon::CleanupDaemon;
pub use pool::{PoolConfig, PoolKey, PoolStats, PooledTunnel, TunnelPool};
pub use provider::{BastionTunnelProvider, TunnelHandle, TunnelProvider};

/// Errors that can occur while establishing or operating tunnels.
///
/// Only creation-path errors ever reach callers of the pool; close and
/// health-check failures are absorbed and logged there.
#[derive(Error, Debug)]
pub enum TunnelError {
    /// The tunnel process could not be spawned.
    #[error("Failed to spawn tunnel process: {0}")]
    SpawnFailed(String),

    /// The tunnel process started but never accepted connections.
    #[error("Tunnel did not become ready within {0} seconds")]
    NotReady(u64),

    /// The tunnel process exited before the tunnel was usable.
    #[error("Tunnel process exited during startup: {0}")]
    ExitedEarly(String),

    /// No local port could be allocated for the tunnel listener.
    #[error("No local port available: {0}")]
    PortAllocation(String),

    /// Generic creation failure reported by the provider.
    #[error("Failed to establish tunnel: {0}")]
    CreationFailed(String),

    /// I/O error during tunnel operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tunnel operations.
pub type TunnelResult<T> = Result<T, TunnelError>;
