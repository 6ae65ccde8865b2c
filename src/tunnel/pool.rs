//! Connection pool for Bastion tunnels.
//!
//! The pool guarantees at most one live tunnel per route, transparently
//! creating, reusing, health-checking, and evicting entries. A single lock
//! covers the whole of [`TunnelPool::get_or_create`], provider calls
//! included, so pool operations are serialized globally and exactly one
//! `create` runs per route under contention: callers racing on the same
//! key all receive the one entry the winner created.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::provider::{TunnelHandle, TunnelProvider};
use super::TunnelResult;

/// Reference instant for computing elapsed time atomically
static POOL_START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Get nanoseconds since the pool start reference point
#[inline(always)]
fn nanos_since_start() -> u64 {
    let start = POOL_START_TIME.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}

/// Key identifying one reusable tunnel route.
///
/// The resource group is deliberately not part of the key: Bastion and
/// target identity already disambiguate the route, so callers passing
/// inconsistent resource groups for the same key share a tunnel and the
/// value used at creation time wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolKey {
    /// Bastion host the tunnel goes through
    pub bastion_name: String,
    /// Azure resource ID of the target VM
    pub target_resource_id: String,
    /// Port on the target the tunnel forwards to
    pub remote_port: u16,
}

impl PoolKey {
    /// Create a new pool key
    pub fn new(
        bastion_name: impl Into<String>,
        target_resource_id: impl Into<String>,
        remote_port: u16,
    ) -> Self {
        Self {
            bastion_name: bastion_name.into(),
            target_resource_id: target_resource_id.into(),
            remote_port,
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bastion://{}/{}:{}",
            self.bastion_name, self.target_resource_id, self.remote_port
        )
    }
}

/// A pooled tunnel with usage metadata.
///
/// Handed out as `Arc<PooledTunnel>`; callers only read from it. All
/// metadata mutation happens inside the pool while its lock is held.
pub struct PooledTunnel {
    /// The established tunnel
    handle: TunnelHandle,
    /// When the tunnel was created
    created_at: Instant,
    /// When the tunnel was last used (as nanos since pool start)
    last_used_nanos: AtomicU64,
    /// Number of successful reuses after creation
    use_count: AtomicU64,
    /// Idle timeout captured from the pool config at creation time
    idle_timeout: Duration,
}

impl PooledTunnel {
    fn new(handle: TunnelHandle, idle_timeout: Duration) -> Self {
        Self {
            handle,
            created_at: Instant::now(),
            last_used_nanos: AtomicU64::new(nanos_since_start()),
            use_count: AtomicU64::new(0),
            idle_timeout,
        }
    }

    /// The underlying tunnel handle
    pub fn handle(&self) -> &TunnelHandle {
        &self.handle
    }

    /// Local port the tunnel listens on
    pub fn local_port(&self) -> u16 {
        self.handle.local_port()
    }

    /// How many times this tunnel has been reused after creation
    pub fn use_count(&self) -> u64 {
        self.use_count.load(Ordering::Relaxed)
    }

    /// Time since the tunnel was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the tunnel was last used
    pub fn idle_for(&self) -> Duration {
        let last_used = self.last_used_nanos.load(Ordering::Relaxed);
        Duration::from_nanos(nanos_since_start().saturating_sub(last_used))
    }

    /// Idle timeout this tunnel was created with
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Record a successful reuse. `fetch_max` keeps `last_used`
    /// monotonically non-decreasing.
    fn touch(&self) {
        self.last_used_nanos
            .fetch_max(nanos_since_start(), Ordering::Relaxed);
        self.use_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether the tunnel has been idle longer than its timeout
    fn is_expired(&self) -> bool {
        self.idle_for() > self.idle_timeout
    }

    fn last_used_nanos(&self) -> u64 {
        self.last_used_nanos.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn backdate(&self, by: Duration) {
        let last = self.last_used_nanos.load(Ordering::Relaxed);
        self.last_used_nanos
            .store(last.saturating_sub(by.as_nanos() as u64), Ordering::Relaxed);
    }
}

impl fmt::Debug for PooledTunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledTunnel")
            .field("handle", &self.handle)
            .field("age", &self.age())
            .field("idle_for", &self.idle_for())
            .field("use_count", &self.use_count())
            .finish()
    }
}

/// Configuration for the tunnel pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of pooled tunnels (0 = unbounded)
    pub max_tunnels: usize,
    /// Idle timeout applied to newly created tunnels
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_tunnels: 16,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of pooled tunnels (0 = unbounded)
    pub fn max_tunnels(mut self, max: usize) -> Self {
        self.max_tunnels = max;
        self
    }

    /// Set the idle timeout for newly created tunnels
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// Statistics for the tunnel pool
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of requests served from the pool
    pub hits: u64,
    /// Number of requests that created a new tunnel
    pub misses: u64,
    /// Number of tunnels evicted to stay under capacity
    pub evictions: u64,
    /// Number of tunnels replaced after a failed health check
    pub health_replacements: u64,
    /// Number of tunnels removed by idle sweeps
    pub idle_reaped: u64,
    /// Number of failed tunnel creations
    pub failures: u64,
}

/// Thread-safe pool of established Bastion tunnels.
///
/// One instance per provider, living for the whole process unless
/// explicitly closed with [`TunnelPool::close_all`].
pub struct TunnelPool {
    config: PoolConfig,
    provider: Arc<dyn TunnelProvider>,
    /// Pooled tunnels by route key. The mutex is held for entire
    /// operations, provider calls included.
    entries: Mutex<HashMap<PoolKey, Arc<PooledTunnel>>>,
    stats: parking_lot::RwLock<PoolStats>,
}

impl TunnelPool {
    /// Create a pool with default configuration
    pub fn new(provider: Arc<dyn TunnelProvider>) -> Self {
        Self::with_config(provider, PoolConfig::default())
    }

    /// Create a pool with custom configuration
    pub fn with_config(provider: Arc<dyn TunnelProvider>, config: PoolConfig) -> Self {
        debug!(
            max_tunnels = config.max_tunnels,
            idle_timeout = ?config.idle_timeout,
            "Creating tunnel pool"
        );
        Self {
            config,
            provider,
            entries: Mutex::new(HashMap::new()),
            stats: parking_lot::RwLock::new(PoolStats::default()),
        }
    }

    /// Get the pooled tunnel for a route, creating it if necessary.
    ///
    /// An existing entry is health-checked before reuse; an unhealthy one is
    /// closed and replaced in the same critical section. When the pool is at
    /// capacity the least-recently-used entry is evicted first. Creation
    /// failures are returned to the caller and nothing is inserted; the pool
    /// never retries on its own.
    ///
    /// `resource_group` is only forwarded to tunnel creation and is not part
    /// of the route key.
    pub async fn get_or_create(
        &self,
        bastion_name: &str,
        resource_group: &str,
        target_resource_id: &str,
        remote_port: u16,
    ) -> TunnelResult<Arc<PooledTunnel>> {
        let key = PoolKey::new(bastion_name, target_resource_id, remote_port);
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get(&key).cloned() {
            if self.provider.check_health(entry.handle()).await {
                entry.touch();
                self.stats.write().hits += 1;
                debug!(key = %key, uses = entry.use_count(), "Reusing pooled tunnel");
                return Ok(entry);
            }

            warn!(key = %key, "Pooled tunnel failed health check, replacing");
            if let Err(e) = self.provider.close(entry.handle()).await {
                warn!(key = %key, error = %e, "Error closing unhealthy tunnel");
            }
            entries.remove(&key);
            self.stats.write().health_replacements += 1;
        }

        if self.config.max_tunnels > 0 && entries.len() >= self.config.max_tunnels {
            self.evict_lru(&mut entries).await;
        }

        let local_port = self.provider.allocate_port().await.map_err(|e| {
            self.stats.write().failures += 1;
            e
        })?;

        debug!(key = %key, local_port, "Creating new Bastion tunnel");

        let handle = self
            .provider
            .create(
                bastion_name,
                resource_group,
                target_resource_id,
                local_port,
                remote_port,
            )
            .await
            .map_err(|e| {
                self.stats.write().failures += 1;
                e
            })?;

        let entry = Arc::new(PooledTunnel::new(handle, self.config.idle_timeout));
        entries.insert(key.clone(), Arc::clone(&entry));
        self.stats.write().misses += 1;

        info!(key = %key, local_port, "Tunnel established and pooled");
        Ok(entry)
    }

    /// Evict the least-recently-used entry. Ties on `last_used` break by key
    /// ordering so eviction is deterministic.
    async fn evict_lru(&self, entries: &mut HashMap<PoolKey, Arc<PooledTunnel>>) {
        let victim_key = entries
            .iter()
            .min_by(|(ka, a), (kb, b)| {
                a.last_used_nanos()
                    .cmp(&b.last_used_nanos())
                    .then_with(|| ka.cmp(kb))
            })
            .map(|(k, _)| k.clone());

        if let Some(key) = victim_key {
            if let Some(victim) = entries.remove(&key) {
                debug!(key = %key, idle = ?victim.idle_for(), "Evicting least-recently-used tunnel");
                if let Err(e) = self.provider.close(victim.handle()).await {
                    warn!(key = %key, error = %e, "Error closing evicted tunnel");
                }
                self.stats.write().evictions += 1;
            }
        }
    }

    /// Remove and close every entry whose idle time exceeds its timeout.
    ///
    /// Called by the cleanup daemon; close failures are logged and the sweep
    /// continues. Returns the number of entries removed.
    pub async fn reap_idle(&self) -> usize {
        let mut entries = self.entries.lock().await;

        let expired: Vec<PoolKey> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        let mut reaped = 0;
        for key in expired {
            if let Some(entry) = entries.remove(&key) {
                debug!(key = %key, idle = ?entry.idle_for(), "Reaping idle tunnel");
                if let Err(e) = self.provider.close(entry.handle()).await {
                    warn!(key = %key, error = %e, "Error closing idle tunnel");
                }
                reaped += 1;
            }
        }

        if reaped > 0 {
            self.stats.write().idle_reaped += reaped as u64;
        }
        reaped
    }

    /// Close every pooled tunnel and empty the pool.
    ///
    /// Close failures are logged per entry; one failure does not stop the
    /// rest from being closed.
    pub async fn close_all(&self) {
        let mut entries = self.entries.lock().await;
        let drained: Vec<(PoolKey, Arc<PooledTunnel>)> = entries.drain().collect();

        if drained.is_empty() {
            return;
        }

        info!(count = drained.len(), "Closing all pooled tunnels");
        for (key, entry) in drained {
            if let Err(e) = self.provider.close(entry.handle()).await {
                warn!(key = %key, error = %e, "Error closing tunnel");
            }
        }
    }

    /// Number of pooled tunnels
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the pool is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Whether a route currently has a pooled tunnel
    pub async fn contains(&self, key: &PoolKey) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> PoolStats {
        self.stats.read().clone()
    }

    #[cfg(test)]
    async fn backdate(&self, key: &PoolKey, by: Duration) {
        let entries = self.entries.lock().await;
        if let Some(entry) = entries.get(key) {
            entry.backdate(by);
        }
    }
}

impl fmt::Debug for TunnelPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelPool")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
