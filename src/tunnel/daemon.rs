//! Background reaper for idle pooled tunnels.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::pool::TunnelPool;

/// Interval-driven task that removes idle entries from a [`TunnelPool`].
///
/// Lifecycle is Stopped -> Running -> Stopped: [`CleanupDaemon::start`]
/// spawns the sweep loop, [`CleanupDaemon::stop`] cancels it and waits for
/// the task to exit before returning, so no background activity survives a
/// `stop()`. A sweep already in progress completes normally; the loop
/// observes the cancellation before sleeping again.
pub struct CleanupDaemon {
    pool: Arc<TunnelPool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CleanupDaemon {
    /// Create a daemon for the given pool (not yet running)
    pub fn new(pool: Arc<TunnelPool>) -> Self {
        Self {
            pool,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Spawn the sweep loop. Calling `start` while already running is a
    /// no-op.
    pub fn start(&mut self, interval: Duration) {
        if self.task.is_some() {
            return;
        }

        self.cancel = CancellationToken::new();
        let cancel = self.cancel.clone();
        let pool = Arc::clone(&self.pool);

        info!(interval = ?interval, "Starting tunnel cleanup daemon");

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately;
            // consume it so sweeps start one interval from now.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let reaped = pool.reap_idle().await;
                        if reaped > 0 {
                            debug!(reaped, "Cleanup sweep removed idle tunnels");
                        } else {
                            trace!("Cleanup sweep found no idle tunnels");
                        }
                    }
                }
            }

            debug!("Tunnel cleanup daemon exited");
        }));
    }

    /// Whether the daemon has been started and not yet stopped
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Signal the loop to stop and wait for it to exit.
    ///
    /// Safe to call at any time, including when the daemon was never
    /// started.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            self.cancel.cancel();
            if let Err(e) = task.await {
                warn!(error = %e, "Cleanup daemon task did not shut down cleanly");
            }
            info!("Tunnel cleanup daemon stopped");
        }
    }
}

impl Drop for CleanupDaemon {
    fn drop(&mut self) {
        // Best effort if stop() was never awaited; the loop exits on its
        // next select.
        self.cancel.cancel();
    }
}
