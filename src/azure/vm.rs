//! Virtual machine discovery via `az vm list`.
//!
//! The `-d` (show-details) flag makes `az` resolve power state and IP
//! addresses into flat fields, which is the shape decoded here.

use std::fmt;

use serde::Deserialize;

use super::{AzCli, AzError, AzResult};

/// One fleet VM as reported by `az vm list -d`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmInstance {
    /// VM name
    pub name: String,
    /// Full Azure resource ID (the tunnel target)
    pub id: String,
    /// Resource group containing the VM
    pub resource_group: String,
    /// Azure region
    pub location: String,
    /// Power state string, e.g. "VM running" (absent without -d)
    #[serde(default)]
    pub power_state: Option<String>,
    /// Comma-separated private IP addresses
    #[serde(default)]
    pub private_ips: Option<String>,
}

impl VmInstance {
    /// Parsed power state
    pub fn power_state(&self) -> PowerState {
        self.power_state
            .as_deref()
            .map(PowerState::parse)
            .unwrap_or(PowerState::Unknown)
    }

    /// First private IP address, if any
    pub fn primary_private_ip(&self) -> Option<&str> {
        self.private_ips
            .as_deref()
            .and_then(|ips| ips.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    }
}

/// Power state of a VM, decoded from the `az` display string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// VM is running
    Running,
    /// VM is stopped (still allocated)
    Stopped,
    /// VM is deallocated
    Deallocated,
    /// VM is starting up
    Starting,
    /// VM is shutting down
    Stopping,
    /// State not reported or unrecognized
    Unknown,
}

impl PowerState {
    /// Parse the "VM running" style display string
    pub fn parse(s: &str) -> Self {
        match s.trim().strip_prefix("VM ").unwrap_or(s).trim() {
            "running" => PowerState::Running,
            "stopped" => PowerState::Stopped,
            "deallocated" => PowerState::Deallocated,
            "starting" => PowerState::Starting,
            "stopping" | "deallocating" => PowerState::Stopping,
            _ => PowerState::Unknown,
        }
    }

    /// Whether the VM is reachable for SSH
    pub fn is_running(&self) -> bool {
        matches!(self, PowerState::Running)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerState::Running => "running",
            PowerState::Stopped => "stopped",
            PowerState::Deallocated => "deallocated",
            PowerState::Starting => "starting",
            PowerState::Stopping => "stopping",
            PowerState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl AzCli {
    /// List VMs, optionally restricted to a resource group.
    pub async fn list_vms(&self, resource_group: Option<&str>) -> AzResult<Vec<VmInstance>> {
        let mut args = vec!["vm", "list", "-d"];
        if let Some(rg) = resource_group {
            args.extend(["-g", rg]);
        }

        let value = self.run(&args).await?;
        serde_json::from_value(value).map_err(|source| AzError::MalformedJson {
            command: args.join(" "),
            source,
        })
    }

    /// Fetch a single VM by name.
    pub async fn get_vm(&self, name: &str, resource_group: &str) -> AzResult<VmInstance> {
        let args = ["vm", "show", "-d", "-g", resource_group, "-n", name];

        let value = match self.run(&args).await {
            Ok(value) => value,
            // az reports a missing resource on stderr with exit code 3
            Err(AzError::CommandFailed { stderr, .. })
                if stderr.contains("ResourceNotFound") || stderr.contains("was not found") =>
            {
                return Err(AzError::VmNotFound(name.to_string()));
            }
            Err(e) => return Err(e),
        };

        serde_json::from_value(value).map_err(|source| AzError::MalformedJson {
            command: args.join(" "),
            source,
        })
    }
}
