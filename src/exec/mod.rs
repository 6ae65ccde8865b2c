//! Fan-out command execution across the fleet.
//!
//! Each targeted VM gets its own task: obtain a pooled tunnel for the
//! route, then run `ssh` against the tunnel's local port. Concurrency is
//! bounded by a semaphore sized to the configured fork count. One VM
//! failing (tunnel creation included) never aborts the others.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::azure::VmInstance;
use crate::tunnel::TunnelPool;

/// SSH invocation options shared by every host task
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Remote user
    pub user: String,
    /// SSH port on the target VM (the tunnel's remote port)
    pub port: u16,
    /// Private key passed with -i
    pub identity_file: Option<PathBuf>,
    /// Host key verification; off by default since tunnels terminate on
    /// ever-changing localhost ports
    pub strict_host_key_checking: bool,
    /// ConnectTimeout in seconds
    pub connect_timeout: u64,
}

impl SshOptions {
    /// Common argument prefix for every ssh invocation
    fn base_args(&self, local_port: u16) -> Vec<String> {
        let mut args = vec!["-p".to_string(), local_port.to_string()];

        if self.strict_host_key_checking {
            args.extend(["-o".to_string(), "StrictHostKeyChecking=yes".to_string()]);
        } else {
            args.extend([
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
                "-o".to_string(),
                "UserKnownHostsFile=/dev/null".to_string(),
            ]);
        }

        args.extend([
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
        ]);

        if let Some(identity) = &self.identity_file {
            args.extend(["-i".to_string(), identity.display().to_string()]);
        }

        args
    }

    /// Destination argument (the tunnel terminates on localhost)
    fn destination(&self) -> String {
        format!("{}@127.0.0.1", self.user)
    }
}

/// Outcome of running a command on one VM
#[derive(Debug, Clone, Serialize)]
pub struct ExecReport {
    /// VM name
    pub host: String,
    /// Exit code of the remote command (-1 when it never ran)
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Wall-clock duration of the host task
    pub duration: Duration,
    /// Failure that prevented execution (tunnel or spawn error)
    pub error: Option<String>,
}

impl ExecReport {
    /// Whether the remote command ran and exited zero
    pub fn success(&self) -> bool {
        self.error.is_none() && self.exit_code == 0
    }

    fn unreachable(host: String, duration: Duration, error: String) -> Self {
        Self {
            host,
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            duration,
            error: Some(error),
        }
    }
}

/// Aggregate counts over a fan-out run
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ExecSummary {
    /// Hosts where the command exited zero
    pub ok: usize,
    /// Hosts where the command exited non-zero
    pub failed: usize,
    /// Hosts that could not be reached at all
    pub unreachable: usize,
}

impl ExecSummary {
    /// Tally reports into a summary
    pub fn from_reports(reports: &[ExecReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            if report.error.is_some() {
                summary.unreachable += 1;
            } else if report.exit_code == 0 {
                summary.ok += 1;
            } else {
                summary.failed += 1;
            }
        }
        summary
    }

    /// Whether every host succeeded
    pub fn all_ok(&self) -> bool {
        self.failed == 0 && self.unreachable == 0
    }
}

/// Runs one command on many VMs through pooled tunnels.
pub struct FleetExecutor {
    pool: Arc<TunnelPool>,
    bastion_name: String,
    ssh: SshOptions,
    forks: usize,
}

impl FleetExecutor {
    /// Create an executor tunneling through the named Bastion
    pub fn new(
        pool: Arc<TunnelPool>,
        bastion_name: impl Into<String>,
        ssh: SshOptions,
        forks: usize,
    ) -> Self {
        Self {
            pool,
            bastion_name: bastion_name.into(),
            ssh,
            forks: forks.max(1),
        }
    }

    /// Run `command` on every VM, at most `forks` hosts at a time.
    ///
    /// Reports come back in the same order as `vms`. The optional
    /// `on_done` callback fires as each host finishes (progress display).
    pub async fn run(
        &self,
        vms: &[VmInstance],
        command: &str,
        on_done: Option<&(dyn Fn(&ExecReport) + Sync)>,
    ) -> Vec<ExecReport> {
        let semaphore = Arc::new(Semaphore::new(self.forks));

        let tasks = vms.iter().map(|vm| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let report = match semaphore.acquire().await {
                    Ok(_permit) => self.run_one(vm, command).await,
                    Err(_) => ExecReport::unreachable(
                        vm.name.clone(),
                        Duration::ZERO,
                        "executor semaphore closed".to_string(),
                    ),
                };
                if let Some(callback) = on_done {
                    callback(&report);
                }
                report
            }
        });

        join_all(tasks).await
    }

    /// Run the command on a single VM through a pooled tunnel
    async fn run_one(&self, vm: &VmInstance, command: &str) -> ExecReport {
        let started = Instant::now();

        let tunnel = match self
            .pool
            .get_or_create(&self.bastion_name, &vm.resource_group, &vm.id, self.ssh.port)
            .await
        {
            Ok(tunnel) => tunnel,
            Err(e) => {
                warn!(host = %vm.name, error = %e, "Could not obtain tunnel");
                return ExecReport::unreachable(vm.name.clone(), started.elapsed(), e.to_string());
            }
        };

        debug!(host = %vm.name, local_port = tunnel.local_port(), "Executing remote command");

        let mut cmd = Command::new("ssh");
        cmd.args(self.ssh.base_args(tunnel.local_port()))
            .args(["-o", "BatchMode=yes"])
            .arg(self.ssh.destination())
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) => {
                return ExecReport::unreachable(
                    vm.name.clone(),
                    started.elapsed(),
                    format!("failed to spawn ssh: {}", e),
                );
            }
        };

        ExecReport {
            host: vm.name.clone(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
            error: None,
        }
    }

    /// Spawn an interactive ssh session to one VM, inheriting the terminal.
    pub async fn interactive(&self, vm: &VmInstance) -> crate::error::Result<i32> {
        let tunnel = self
            .pool
            .get_or_create(&self.bastion_name, &vm.resource_group, &vm.id, self.ssh.port)
            .await?;

        let mut cmd = Command::new("ssh");
        cmd.args(self.ssh.base_args(tunnel.local_port()))
            .arg(self.ssh.destination())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let status = cmd.status().await.map_err(|e| crate::error::Error::ExecFailed {
            host: vm.name.clone(),
            message: format!("failed to spawn ssh: {}", e),
        })?;

        Ok(status.code().unwrap_or(-1))
    }
}
