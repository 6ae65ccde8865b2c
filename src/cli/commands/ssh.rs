//! The `ssh` subcommand: interactive session to one VM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use vmfleet::exec::FleetExecutor;

use super::CommandContext;

/// Arguments for the ssh subcommand
#[derive(Args, Debug, Clone)]
pub struct SshArgs {
    /// Name of the VM to connect to
    pub vm: String,

    /// Remote user (default from config)
    #[arg(short = 'u', long)]
    pub user: Option<String>,

    /// Private key for ssh -i
    #[arg(short = 'i', long)]
    pub identity_file: Option<PathBuf>,

    /// SSH port on the target VM
    #[arg(short = 'p', long)]
    pub port: Option<u16>,
}

impl SshArgs {
    /// Execute the ssh command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let rg = ctx.resource_group()?;
        let az = ctx.az();

        let vm = az.get_vm(&self.vm, &rg).await?;
        let bastion = az
            .pick_bastion(Some(&rg), ctx.preferred_bastion().as_deref())
            .await?;

        ctx.output.debug(&format!(
            "Opening SSH session to {} via bastion '{}'",
            vm.name, bastion.name
        ));

        let pool = ctx.build_pool()?;
        let ssh = ctx.ssh_options(
            self.user.as_deref(),
            self.port,
            self.identity_file.as_deref(),
        );
        let executor = FleetExecutor::new(Arc::clone(&pool), &bastion.name, ssh, 1);

        let exit_code = executor.interactive(&vm).await?;

        pool.close_all().await;
        Ok(exit_code)
    }
}
