//! The `tunnel` subcommand: hold one tunnel open in the foreground.

use anyhow::Result;
use clap::Args;

use vmfleet::tunnel::{BastionTunnelProvider, TunnelProvider};

use super::CommandContext;

/// Arguments for the tunnel subcommand
#[derive(Args, Debug, Clone)]
pub struct TunnelArgs {
    /// Name of the VM to tunnel to
    pub vm: String,

    /// Port on the VM the tunnel forwards to
    #[arg(short = 'p', long, default_value = "22")]
    pub remote_port: u16,

    /// Local port to listen on (default: picked by the OS)
    #[arg(short = 'L', long)]
    pub local_port: Option<u16>,
}

impl TunnelArgs {
    /// Execute the tunnel command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let rg = ctx.resource_group()?;
        let az = ctx.az();

        let vm = az.get_vm(&self.vm, &rg).await?;
        let bastion = az
            .pick_bastion(Some(&rg), ctx.preferred_bastion().as_deref())
            .await?;

        let az_path = vmfleet::azure::az_binary()?;
        let provider = BastionTunnelProvider::new(
            az_path.to_path_buf(),
            ctx.config.tunnel.connect_timeout,
        );

        let local_port = match self.local_port {
            Some(port) => port,
            None => provider.allocate_port().await?,
        };

        let handle = provider
            .create(
                &bastion.name,
                &vm.resource_group,
                &vm.id,
                local_port,
                self.remote_port,
            )
            .await?;

        ctx.output.info(&format!(
            "Tunnel open: 127.0.0.1:{} -> {}:{} (ctrl-c to close)",
            handle.local_port(),
            vm.name,
            self.remote_port
        ));

        tokio::signal::ctrl_c().await?;

        ctx.output.debug("Closing tunnel");
        if let Err(e) = provider.close(&handle).await {
            ctx.output.warn(&format!("Error closing tunnel: {}", e));
        }

        Ok(0)
    }
}
