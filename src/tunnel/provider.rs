//! Tunnel transport boundary.
//!
//! [`TunnelProvider`] is the capability the pool consumes: create a tunnel,
//! close it, probe its health, allocate a local port. The production
//! implementation spawns `az network bastion tunnel` subprocesses; the test
//! suites substitute scripted doubles.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::{TunnelError, TunnelResult};

/// How often to re-probe the local port while a tunnel is starting up
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound on a single health probe
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Opaque reference to an established tunnel.
///
/// A handle is exclusively owned by whichever component currently tracks it
/// (normally a pool entry). Once it has been passed to
/// [`TunnelProvider::close`] it must not be handed out again.
#[derive(Debug)]
pub struct TunnelHandle {
    id: Uuid,
    local_port: u16,
    target: String,
    /// The `az` child keeping the tunnel open; `None` for detached handles
    child: Mutex<Option<Child>>,
}

impl TunnelHandle {
    fn with_child(local_port: u16, target: String, child: Child) -> Self {
        Self {
            id: Uuid::new_v4(),
            local_port,
            target,
            child: Mutex::new(Some(child)),
        }
    }

    /// Create a handle with no backing process.
    ///
    /// Used by provider test doubles; [`BastionTunnelProvider`] never
    /// produces these.
    pub fn detached(local_port: u16, target: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            local_port,
            target: target.into(),
            child: Mutex::new(None),
        }
    }

    /// Unique id of this handle
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Local port the tunnel listens on
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Human-readable description of the tunnel target
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Display for TunnelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> 127.0.0.1:{}", self.target, self.local_port)
    }
}

/// Capability used by the pool to manage tunnel lifecycles.
#[async_trait]
pub trait TunnelProvider: Send + Sync {
    /// Establish a tunnel to `target_resource_id` through the named Bastion,
    /// listening on `local_port` and forwarding to `remote_port`.
    async fn create(
        &self,
        bastion_name: &str,
        resource_group: &str,
        target_resource_id: &str,
        local_port: u16,
        remote_port: u16,
    ) -> TunnelResult<TunnelHandle>;

    /// Tear down a tunnel. Safe to call once per handle; behavior on a
    /// second call for the same handle is unspecified.
    async fn close(&self, handle: &TunnelHandle) -> TunnelResult<()>;

    /// Probe whether the tunnel still accepts connections. No side effects.
    async fn check_health(&self, handle: &TunnelHandle) -> bool;

    /// Allocate a local port for the next tunnel.
    async fn allocate_port(&self) -> TunnelResult<u16>;
}

/// Production provider spawning `az network bastion tunnel` subprocesses.
pub struct BastionTunnelProvider {
    az: PathBuf,
    connect_timeout: Duration,
}

impl BastionTunnelProvider {
    /// Create a provider using the given `az` binary.
    pub fn new(az: PathBuf, connect_timeout: Duration) -> Self {
        Self {
            az,
            connect_timeout,
        }
    }

    /// Wait until the local port accepts connections or the child dies.
    async fn wait_ready(&self, child: &mut Child, local_port: u16) -> TunnelResult<()> {
        let deadline = Instant::now() + self.connect_timeout;

        loop {
            if TcpStream::connect(("127.0.0.1", local_port)).await.is_ok() {
                return Ok(());
            }

            if let Ok(Some(status)) = child.try_wait() {
                return Err(TunnelError::ExitedEarly(format!(
                    "az network bastion tunnel exited with {}",
                    status
                )));
            }

            if Instant::now() >= deadline {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(TunnelError::NotReady(self.connect_timeout.as_secs()));
            }

            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl TunnelProvider for BastionTunnelProvider {
    async fn create(
        &self,
        bastion_name: &str,
        resource_group: &str,
        target_resource_id: &str,
        local_port: u16,
        remote_port: u16,
    ) -> TunnelResult<TunnelHandle> {
        let mut cmd = Command::new(&self.az);
        cmd.args(["network", "bastion", "tunnel"])
            .args(["--name", bastion_name])
            .args(["--resource-group", resource_group])
            .args(["--target-resource-id", target_resource_id])
            .arg("--resource-port")
            .arg(remote_port.to_string())
            .arg("--port")
            .arg(local_port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        debug!(
            bastion = %bastion_name,
            target = %target_resource_id,
            local_port,
            remote_port,
            "Spawning Bastion tunnel"
        );

        let mut child = cmd
            .spawn()
            .map_err(|e| TunnelError::SpawnFailed(e.to_string()))?;

        self.wait_ready(&mut child, local_port).await?;

        let target = format!("{}:{}", target_resource_id, remote_port);
        debug!(target = %target, local_port, "Bastion tunnel ready");

        Ok(TunnelHandle::with_child(local_port, target, child))
    }

    async fn close(&self, handle: &TunnelHandle) -> TunnelResult<()> {
        let mut guard = handle.child.lock().await;

        if let Some(mut child) = guard.take() {
            trace!(handle = %handle, "Killing tunnel process");
            match child.start_kill() {
                Ok(()) => {}
                // Already exited on its own
                Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
                Err(e) => {
                    warn!(handle = %handle, error = %e, "Failed to signal tunnel process");
                    return Err(TunnelError::Io(e));
                }
            }
            let _ = child.wait().await?;
        }

        Ok(())
    }

    async fn check_health(&self, handle: &TunnelHandle) -> bool {
        {
            let mut guard = handle.child.lock().await;
            if let Some(child) = guard.as_mut() {
                match child.try_wait() {
                    Ok(None) => {}
                    // Exited, or the process state is unreadable
                    _ => return false,
                }
            }
        }

        matches!(
            tokio::time::timeout(
                HEALTH_PROBE_TIMEOUT,
                TcpStream::connect(("127.0.0.1", handle.local_port)),
            )
            .await,
            Ok(Ok(_))
        )
    }

    async fn allocate_port(&self) -> TunnelResult<u16> {
        // Bind port 0 to let the OS pick; the listener is released before
        // the tunnel child binds the port itself.
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| TunnelError::PortAllocation(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| TunnelError::PortAllocation(e.to_string()))?
            .port();

        trace!(port, "Allocated local tunnel port");
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_handle_accessors() {
        let handle = TunnelHandle::detached(50022, "vm-01:22");
        assert_eq!(handle.local_port(), 50022);
        assert_eq!(handle.target(), "vm-01:22");
        assert_eq!(handle.to_string(), "vm-01:22 -> 127.0.0.1:50022");
    }

    #[test]
    fn test_handle_ids_are_unique() {
        let a = TunnelHandle::detached(1, "a");
        let b = TunnelHandle::detached(1, "a");
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_allocate_port_returns_usable_port() {
        let provider =
            BastionTunnelProvider::new(PathBuf::from("az"), Duration::from_secs(1));
        let port = provider.allocate_port().await.unwrap();
        assert!(port > 0);

        // The port must be free again once allocation returns
        let listener = TcpListener::bind(("127.0.0.1", port)).await;
        assert!(listener.is_ok());
    }

    #[tokio::test]
    async fn test_health_check_fails_for_unbound_port() {
        let provider =
            BastionTunnelProvider::new(PathBuf::from("az"), Duration::from_secs(1));
        // Allocate-and-release guarantees nothing is listening there
        let port = provider.allocate_port().await.unwrap();
        let handle = TunnelHandle::detached(port, "vm-01:22");
        assert!(!provider.check_health(&handle).await);
    }

    #[tokio::test]
    async fn test_health_check_succeeds_for_listening_port() {
        let provider =
            BastionTunnelProvider::new(PathBuf::from("az"), Duration::from_secs(1));
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = TunnelHandle::detached(port, "vm-01:22");
        assert!(provider.check_health(&handle).await);
    }
}
