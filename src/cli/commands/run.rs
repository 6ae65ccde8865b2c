//! The `run` subcommand: fan out a command across the fleet.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use vmfleet::exec::FleetExecutor;
use vmfleet::tunnel::CleanupDaemon;

use super::CommandContext;

/// Arguments for the run subcommand
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Command to execute on each VM
    #[arg(required = true, trailing_var_arg = true)]
    pub command: Vec<String>,

    /// Only target specific VMs (comma-separated names)
    #[arg(short = 'l', long)]
    pub limit: Option<String>,

    /// Remote user (default from config)
    #[arg(short = 'u', long)]
    pub user: Option<String>,

    /// Private key for ssh -i
    #[arg(short = 'i', long)]
    pub identity_file: Option<PathBuf>,

    /// SSH port on the target VMs
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Number of hosts to run on in parallel
    #[arg(short = 'f', long)]
    pub forks: Option<usize>,

    /// Also target VMs that are not reported as running
    #[arg(long)]
    pub all_states: bool,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let rg = ctx.resource_group()?;
        let az = ctx.az();
        let command = shell_words::join(&self.command);

        // Discover targets
        let mut vms = az.list_vms(Some(&rg)).await?;
        if !self.all_states {
            vms.retain(|vm| vm.power_state().is_running());
        }
        if let Some(limit) = &self.limit {
            let wanted: Vec<&str> = limit.split(',').map(str::trim).collect();
            vms.retain(|vm| wanted.contains(&vm.name.as_str()));
        }
        vms.sort_by(|a, b| a.name.cmp(&b.name));

        if vms.is_empty() {
            bail!("no matching VMs in resource group '{}'", rg);
        }

        let bastion = az
            .pick_bastion(Some(&rg), ctx.preferred_bastion().as_deref())
            .await?;

        ctx.output.banner("FLEET RUN");
        ctx.output.info(&format!(
            "Running on {} host(s) via bastion '{}': {}",
            vms.len(),
            bastion.name,
            command
        ));

        // Tunnel pool plus its reaper for the duration of the run
        let pool = ctx.build_pool()?;
        let mut daemon = CleanupDaemon::new(Arc::clone(&pool));
        daemon.start(ctx.cleanup_interval());

        let ssh = ctx.ssh_options(
            self.user.as_deref(),
            self.port,
            self.identity_file.as_deref(),
        );
        let forks = self.forks.unwrap_or(ctx.config.defaults.forks);
        let executor = FleetExecutor::new(Arc::clone(&pool), &bastion.name, ssh, forks);

        let progress = if ctx.output.is_json() || ctx.verbosity > 0 {
            None
        } else {
            let bar = ProgressBar::new(vms.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            Some(bar)
        };

        let on_done = progress.as_ref().map(|bar| {
            let bar = bar.clone();
            move |report: &vmfleet::exec::ExecReport| {
                bar.set_message(report.host.clone());
                bar.inc(1);
            }
        });
        let reports = executor
            .run(
                &vms,
                &command,
                on_done
                    .as_ref()
                    .map(|f| f as &(dyn Fn(&vmfleet::exec::ExecReport) + Sync)),
            )
            .await;

        if let Some(bar) = progress {
            bar.finish_and_clear();
        }

        // Tear down background work before reporting
        daemon.stop().await;
        pool.close_all().await;

        if ctx.output.is_json() {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        } else {
            for report in &reports {
                ctx.output.host_result(report);
            }
            ctx.output.recap(&reports);
        }

        let summary = vmfleet::exec::ExecSummary::from_reports(&reports);
        Ok(if summary.all_ok() { 0 } else { 2 })
    }
}
