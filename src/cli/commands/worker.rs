//! `drover worker`: run an agent's claim/execute loop.

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use std::sync::Arc;
use tracing::info;

use crate::cli::context::AppContext;
use crate::domain::models::{Config, CoordinationEvent, EventType, Task};
use crate::services::{HandlerRegistry, Outcome, TaskExecutor, TaskHandler};

#[derive(Args)]
pub struct WorkerArgs {
    /// Identity this worker claims tasks as
    pub agent_id: String,

    /// Execute at most one task, then exit
    #[arg(long)]
    pub once: bool,
}

/// Built-in handler that completes a task with its own payload.
///
/// Real deployments register domain handlers through the library API;
/// this one exists so the CLI worker can drain smoke-test queues.
struct EchoHandler;

#[async_trait]
impl TaskHandler for EchoHandler {
    fn kind(&self) -> &str {
        "echo"
    }

    async fn execute(&self, task: &Task) -> anyhow::Result<serde_json::Value> {
        Ok(task.payload.clone())
    }
}

pub async fn execute(args: WorkerArgs, config: Config, json: bool) -> Result<()> {
    let ctx = AppContext::init(config).await?;

    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(EchoHandler));

    let executor = TaskExecutor::new(
        ctx.ledger.clone(),
        ctx.registry.clone(),
        handlers,
        ctx.channel.clone(),
        ctx.config.executor.clone(),
    );

    if args.once {
        let outcome = executor.execute_once(&args.agent_id).await?;
        if json {
            println!("{}", serde_json::json!({ "outcome": format!("{outcome:?}") }));
        } else {
            match outcome {
                Outcome::Idle => println!("No eligible task"),
                Outcome::Completed(id) => println!("Completed {id}"),
                Outcome::Failed(id) => println!("Failed {id}"),
                Outcome::Discarded(id) => println!("Discarded result for {id}"),
            }
        }
        return Ok(());
    }

    let handle = executor.handle();
    tokio::select! {
        result = executor.run(&args.agent_id) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            handle.stop();
        }
    }

    // Graceful shutdown: silence from this agent should read as staleness,
    // not as a live capability set.
    let deactivated = ctx.registry.deactivate_all(&args.agent_id).await?;
    if deactivated > 0 {
        ctx.channel
            .publish(
                CoordinationEvent::new(EventType::CapabilityDeactivated)
                    .with_agent(&args.agent_id)
                    .with_detail(serde_json::json!({ "count": deactivated })),
            )
            .await;
    }

    if !json {
        println!("Worker {} stopped", args.agent_id);
    }
    Ok(())
}
