//! The `list` subcommand: show fleet VMs.

use anyhow::Result;
use clap::Args;

use super::CommandContext;

/// Arguments for the list subcommand
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Only show running VMs
    #[arg(long)]
    pub running: bool,
}

impl ListArgs {
    /// Execute the list command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let rg = ctx.resource_group()?;
        let az = ctx.az();

        ctx.output.debug(&format!("Listing VMs in {}", rg));

        let mut vms = az.list_vms(Some(&rg)).await?;
        if self.running {
            vms.retain(|vm| vm.power_state().is_running());
        }
        vms.sort_by(|a, b| a.name.cmp(&b.name));

        if ctx.output.is_json() {
            let rows: Vec<serde_json::Value> = vms
                .iter()
                .map(|vm| {
                    serde_json::json!({
                        "name": vm.name,
                        "resourceGroup": vm.resource_group,
                        "powerState": vm.power_state().to_string(),
                        "privateIp": vm.primary_private_ip(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            for vm in &vms {
                ctx.output.vm_row(vm);
            }
            ctx.output
                .info(&format!("\n{} VM(s) in {}", vms.len(), rg));
        }

        Ok(0)
    }
}
