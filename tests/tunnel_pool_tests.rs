//! Tunnel Pool Contract Tests
//!
//! This test suite validates the tunnel pool and its cleanup daemon against
//! a scripted provider double:
//!
//! 1. Single creation under same-key contention
//! 2. Reuse counting and metadata
//! 3. Capacity bounds and LRU eviction
//! 4. Health-check-triggered replacement
//! 5. Idle reaping by the cleanup daemon
//! 6. Shutdown completeness

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use uuid::Uuid;

use vmfleet::tunnel::{
    CleanupDaemon, PoolConfig, PoolKey, TunnelError, TunnelHandle, TunnelPool, TunnelProvider,
    TunnelResult,
};

// ============================================================================
// Provider double
// ============================================================================

/// Scripted tunnel provider recording every call.
struct MockTunnelProvider {
    create_calls: AtomicUsize,
    close_calls: AtomicUsize,
    health_calls: AtomicUsize,
    /// Handle ids passed to close, in order
    closed: Mutex<Vec<Uuid>>,
    /// Health verdict returned for every entry
    healthy: AtomicBool,
    /// Make create fail with an injected error
    fail_create: AtomicBool,
    /// Make close return an error (the handle is still recorded)
    fail_close: AtomicBool,
    /// Delay inside create, to widen race windows
    create_delay_ms: AtomicU64,
    next_port: AtomicU64,
}

impl MockTunnelProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            create_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            closed: Mutex::new(Vec::new()),
            healthy: AtomicBool::new(true),
            fail_create: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            create_delay_ms: AtomicU64::new(0),
            next_port: AtomicU64::new(40000),
        })
    }

    fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn closed_ids(&self) -> Vec<Uuid> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl TunnelProvider for MockTunnelProvider {
    async fn create(
        &self,
        _bastion_name: &str,
        _resource_group: &str,
        target_resource_id: &str,
        local_port: u16,
        remote_port: u16,
    ) -> TunnelResult<TunnelHandle> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.fail_create.load(Ordering::SeqCst) {
            return Err(TunnelError::CreationFailed("injected failure".to_string()));
        }

        Ok(TunnelHandle::detached(
            local_port,
            format!("{}:{}", target_resource_id, remote_port),
        ))
    }

    async fn close(&self, handle: &TunnelHandle) -> TunnelResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.lock().unwrap().push(handle.id());

        if self.fail_close.load(Ordering::SeqCst) {
            return Err(TunnelError::CreationFailed("close refused".to_string()));
        }
        Ok(())
    }

    async fn check_health(&self, _handle: &TunnelHandle) -> bool {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        self.healthy.load(Ordering::SeqCst)
    }

    async fn allocate_port(&self) -> TunnelResult<u16> {
        Ok(self.next_port.fetch_add(1, Ordering::SeqCst) as u16)
    }
}

fn pool_with(provider: &Arc<MockTunnelProvider>, config: PoolConfig) -> Arc<TunnelPool> {
    Arc::new(TunnelPool::with_config(
        Arc::clone(provider) as Arc<dyn TunnelProvider>,
        config,
    ))
}

// ============================================================================
// Single creation under contention
// ============================================================================

#[tokio::test]
async fn concurrent_requests_for_same_key_create_once() {
    let provider = MockTunnelProvider::new();
    provider.create_delay_ms.store(50, Ordering::SeqCst);
    let pool = pool_with(&provider, PoolConfig::default());

    const CALLERS: usize = 8;
    let mut tasks = Vec::with_capacity(CALLERS);
    for _ in 0..CALLERS {
        let pool = Arc::clone(&pool);
        tasks.push(tokio::spawn(async move {
            pool.get_or_create("bastion", "rg", "/vm/shared", 22).await
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        let entry = task.await.unwrap().unwrap();
        ids.push(entry.handle().id());
    }

    assert_eq!(provider.create_calls(), 1);
    ids.dedup();
    assert_eq!(ids.len(), 1, "all callers must share one entry");
    assert_eq!(pool.len().await, 1);

    // One caller created (use_count 0), the other seven reused; this ninth
    // call is the eighth reuse
    let entry = pool
        .get_or_create("bastion", "rg", "/vm/shared", 22)
        .await
        .unwrap();
    assert_eq!(entry.use_count() as usize, CALLERS);
}

#[tokio::test]
async fn concurrent_requests_all_observe_creation_failure() {
    let provider = MockTunnelProvider::new();
    provider.fail_create.store(true, Ordering::SeqCst);
    let pool = pool_with(&provider, PoolConfig::default());

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let pool = Arc::clone(&pool);
        tasks.push(tokio::spawn(async move {
            pool.get_or_create("bastion", "rg", "/vm/shared", 22).await
        }));
    }

    for task in tasks {
        assert!(task.await.unwrap().is_err());
    }
    assert!(pool.is_empty().await, "failed creation must insert nothing");
}

// ============================================================================
// Reuse semantics
// ============================================================================

#[tokio::test]
async fn use_count_increments_per_reuse() {
    let provider = MockTunnelProvider::new();
    let pool = pool_with(&provider, PoolConfig::default());

    let first = pool
        .get_or_create("bastion", "rg", "/vm/a", 22)
        .await
        .unwrap();
    assert_eq!(first.use_count(), 0, "creating call does not count as reuse");

    for expected in 1..=5u64 {
        let entry = pool
            .get_or_create("bastion", "rg", "/vm/a", 22)
            .await
            .unwrap();
        assert_eq!(entry.use_count(), expected);
    }

    assert_eq!(provider.create_calls(), 1);
}

#[tokio::test]
async fn reuse_refreshes_idle_clock() {
    let provider = MockTunnelProvider::new();
    let pool = pool_with(&provider, PoolConfig::default());

    let entry = pool
        .get_or_create("bastion", "rg", "/vm/a", 22)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let before = entry.idle_for();

    pool.get_or_create("bastion", "rg", "/vm/a", 22)
        .await
        .unwrap();
    let after = entry.idle_for();

    assert!(
        after < before,
        "reuse must refresh last_used ({:?} -> {:?})",
        before,
        after
    );
}

// ============================================================================
// Capacity and LRU eviction
// ============================================================================

#[tokio::test]
async fn pool_never_exceeds_capacity() {
    let provider = MockTunnelProvider::new();
    let pool = pool_with(&provider, PoolConfig::new().max_tunnels(3));

    for i in 0..10 {
        pool.get_or_create("bastion", "rg", &format!("/vm/{}", i), 22)
            .await
            .unwrap();
        assert!(pool.len().await <= 3);
    }

    assert_eq!(pool.len().await, 3);
    assert_eq!(provider.close_calls(), 7);
}

#[tokio::test]
async fn insert_at_capacity_evicts_least_recently_used() {
    let provider = MockTunnelProvider::new();
    let pool = pool_with(&provider, PoolConfig::new().max_tunnels(2));

    // A becomes the oldest entry, B the fresher one
    let a = pool
        .get_or_create("bastion", "rg", "/vm/a", 22)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.get_or_create("bastion", "rg", "/vm/b", 22)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    pool.get_or_create("bastion", "rg", "/vm/c", 22)
        .await
        .unwrap();

    assert_eq!(pool.len().await, 2);
    assert!(!pool.contains(&PoolKey::new("bastion", "/vm/a", 22)).await);
    assert!(pool.contains(&PoolKey::new("bastion", "/vm/b", 22)).await);
    assert!(pool.contains(&PoolKey::new("bastion", "/vm/c", 22)).await);
    assert_eq!(provider.closed_ids(), vec![a.handle().id()]);
}

#[tokio::test]
async fn recently_reused_entry_survives_eviction() {
    let provider = MockTunnelProvider::new();
    let pool = pool_with(&provider, PoolConfig::new().max_tunnels(2));

    pool.get_or_create("bastion", "rg", "/vm/a", 22)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let b = pool
        .get_or_create("bastion", "rg", "/vm/b", 22)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Reusing A makes B the least recently used
    pool.get_or_create("bastion", "rg", "/vm/a", 22)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    pool.get_or_create("bastion", "rg", "/vm/c", 22)
        .await
        .unwrap();

    assert!(pool.contains(&PoolKey::new("bastion", "/vm/a", 22)).await);
    assert!(!pool.contains(&PoolKey::new("bastion", "/vm/b", 22)).await);
    assert_eq!(provider.closed_ids(), vec![b.handle().id()]);
}

// ============================================================================
// Health-triggered replacement
// ============================================================================

#[tokio::test]
async fn unhealthy_entry_is_closed_and_recreated() {
    let provider = MockTunnelProvider::new();
    let pool = pool_with(&provider, PoolConfig::default());

    let old = pool
        .get_or_create("bastion", "rg", "/vm/a", 22)
        .await
        .unwrap();
    provider.healthy.store(false, Ordering::SeqCst);

    let new = pool
        .get_or_create("bastion", "rg", "/vm/a", 22)
        .await
        .unwrap();

    assert_ne!(old.handle().id(), new.handle().id());
    assert_eq!(new.use_count(), 0, "replacement starts fresh");
    assert_eq!(provider.create_calls(), 2);
    assert_eq!(provider.closed_ids(), vec![old.handle().id()]);
    assert_eq!(pool.len().await, 1);
    assert!(provider.health_calls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn close_failure_during_replacement_still_replaces() {
    let provider = MockTunnelProvider::new();
    let pool = pool_with(&provider, PoolConfig::default());

    pool.get_or_create("bastion", "rg", "/vm/a", 22)
        .await
        .unwrap();
    provider.healthy.store(false, Ordering::SeqCst);
    provider.fail_close.store(true, Ordering::SeqCst);

    let entry = pool.get_or_create("bastion", "rg", "/vm/a", 22).await;
    assert!(entry.is_ok(), "close failure must not propagate");
    assert_eq!(provider.create_calls(), 2);
    assert_eq!(pool.len().await, 1);
}

// ============================================================================
// Idle reaping
// ============================================================================

#[tokio::test]
async fn daemon_reaps_idle_entry_within_two_sweeps() {
    let provider = MockTunnelProvider::new();
    let pool = pool_with(
        &provider,
        PoolConfig::new().idle_timeout(Duration::from_millis(50)),
    );

    let entry = pool
        .get_or_create("bastion", "rg", "/vm/idle", 22)
        .await
        .unwrap();

    // Let the entry age past its timeout before the daemon starts
    tokio::time::sleep(Duration::from_millis(120)).await;

    let mut daemon = CleanupDaemon::new(Arc::clone(&pool));
    daemon.start(Duration::from_millis(40));
    tokio::time::sleep(Duration::from_millis(150)).await;
    daemon.stop().await;

    assert!(pool.is_empty().await);
    assert_eq!(provider.closed_ids(), vec![entry.handle().id()]);
}

#[tokio::test]
async fn fresh_entry_survives_sweep() {
    let provider = MockTunnelProvider::new();
    let pool = pool_with(
        &provider,
        PoolConfig::new().idle_timeout(Duration::from_secs(60)),
    );

    pool.get_or_create("bastion", "rg", "/vm/fresh", 22)
        .await
        .unwrap();

    let reaped = pool.reap_idle().await;

    assert_eq!(reaped, 0);
    assert_eq!(pool.len().await, 1);
    assert_eq!(provider.close_calls(), 0);
}

#[tokio::test]
async fn sweep_continues_past_close_failure() {
    let provider = MockTunnelProvider::new();
    provider.fail_close.store(true, Ordering::SeqCst);
    let pool = pool_with(
        &provider,
        PoolConfig::new().idle_timeout(Duration::from_millis(10)),
    );

    pool.get_or_create("bastion", "rg", "/vm/a", 22)
        .await
        .unwrap();
    pool.get_or_create("bastion", "rg", "/vm/b", 22)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;

    let reaped = pool.reap_idle().await;

    assert_eq!(reaped, 2, "failing closes must not stop the sweep");
    assert!(pool.is_empty().await);
    assert_eq!(provider.close_calls(), 2);
}

#[tokio::test]
async fn stop_leaves_no_background_activity() {
    let provider = MockTunnelProvider::new();
    let pool = pool_with(
        &provider,
        PoolConfig::new().idle_timeout(Duration::from_millis(10)),
    );

    let mut daemon = CleanupDaemon::new(Arc::clone(&pool));
    daemon.start(Duration::from_millis(20));
    daemon.stop().await;

    // An entry going idle after stop() must never be reaped
    pool.get_or_create("bastion", "rg", "/vm/late", 22)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(pool.len().await, 1);
    assert_eq!(provider.close_calls(), 0);
}

// ============================================================================
// Shutdown completeness
// ============================================================================

#[tokio::test]
async fn close_all_closes_every_handle_exactly_once() {
    let provider = MockTunnelProvider::new();
    let pool = pool_with(&provider, PoolConfig::default());

    let mut ids = Vec::new();
    for i in 0..5 {
        let entry = pool
            .get_or_create("bastion", "rg", &format!("/vm/{}", i), 22)
            .await
            .unwrap();
        ids.push(entry.handle().id());
    }

    pool.close_all().await;

    assert!(pool.is_empty().await);
    assert_eq!(provider.close_calls(), 5);

    let mut closed = provider.closed_ids();
    closed.sort();
    ids.sort();
    assert_eq!(closed, ids, "each handle closed exactly once");
}

#[tokio::test]
async fn close_all_on_empty_pool_is_noop() {
    let provider = MockTunnelProvider::new();
    let pool = pool_with(&provider, PoolConfig::default());

    pool.close_all().await;

    assert_eq!(provider.close_calls(), 0);
}
