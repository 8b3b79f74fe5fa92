//! `drover monitor`: run the stalled-task sweeper.

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::cli::context::AppContext;
use crate::domain::models::{Config, StallPolicy};
use crate::services::StalledTaskMonitor;

#[derive(Args)]
pub struct MonitorArgs {
    /// Sweep once, print the report, and exit
    #[arg(long)]
    pub once: bool,

    /// Override the configured policy: log_only, reassign, escalate
    #[arg(long)]
    pub policy: Option<String>,
}

pub async fn execute(args: MonitorArgs, config: Config, json: bool) -> Result<()> {
    let ctx = AppContext::init(config).await?;

    let mut monitor_config = ctx.config.monitor.clone();
    if let Some(policy) = &args.policy {
        monitor_config.policy = StallPolicy::from_str(policy)
            .ok_or_else(|| anyhow::anyhow!("Unknown policy: {policy}"))?;
    }

    let monitor = StalledTaskMonitor::new(ctx.ledger.clone(), ctx.channel.clone(), monitor_config);

    if args.once {
        let report = monitor.run_once().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else if report.is_empty() {
            println!("Sweep found nothing to do");
        } else {
            println!("Sweep report:");
            println!("  Stalled: {}", report.stalled);
            println!("  Reassigned: {}", report.reassigned);
            println!("  Escalated: {}", report.escalated);
            println!("  Abandoned: {}", report.abandoned);
            println!("  Retried: {}", report.retried);
            println!("  Anomalies: {}", report.anomalies);
        }
        return Ok(());
    }

    info!(
        interval_secs = monitor.config().sweep_interval_secs,
        threshold_mins = monitor.config().stall_threshold_mins,
        policy = monitor.config().policy.as_str(),
        "Monitor starting"
    );

    let handle = monitor.handle();
    tokio::select! {
        () = monitor.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            handle.stop();
        }
    }

    if !json {
        println!("Monitor stopped");
    }
    Ok(())
}
