//! `drover task`: submit, inspect and cancel tasks.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use uuid::Uuid;

use crate::cli::context::AppContext;
use crate::cli::display::{list_table, render_list, short_id};
use crate::domain::models::{
    Config, CoordinationEvent, EventType, TaskPriority, TaskSpec, TaskStatus,
};
use crate::domain::ports::TaskQuery;

#[derive(Args)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Submit a new task
    Submit {
        /// Kind discriminator dispatched to a registered handler
        kind: String,
        /// JSON payload handed to the handler
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Capability a claimant must hold (repeatable)
        #[arg(long = "capability")]
        capabilities: Vec<String>,
        /// Priority: low, normal, high, critical
        #[arg(long, default_value = "normal")]
        priority: String,
        /// Free-form tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Claim budget before the monitor abandons the task
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// List tasks
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show one task with its attempt history
    Show { id: Uuid },
    /// Cancel a task that has not reached a terminal state
    Cancel { id: Uuid },
    /// Queue statistics by status
    Stats,
}

pub async fn execute(args: TaskArgs, config: Config, json: bool) -> Result<()> {
    let ctx = AppContext::init(config).await?;

    match args.command {
        TaskCommands::Submit {
            kind,
            payload,
            capabilities,
            priority,
            tags,
            max_attempts,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("Payload is not valid JSON")?;
            let priority = TaskPriority::from_str(&priority)
                .ok_or_else(|| anyhow::anyhow!("Unknown priority: {priority}"))?;

            let mut spec = TaskSpec::new(kind);
            spec.payload = payload;
            spec.required_capabilities = capabilities;
            spec.priority = priority;
            spec.tags = tags;
            spec.max_attempts = max_attempts.or(Some(ctx.config.executor.max_attempts));

            let id = ctx.ledger.submit(spec).await?;
            ctx.channel
                .publish(CoordinationEvent::new(EventType::TaskSubmitted).with_task(id))
                .await;

            if json {
                println!("{}", serde_json::json!({ "task_id": id }));
            } else {
                println!("Task submitted: {id}");
            }
        }

        TaskCommands::List { status, limit } => {
            let status = status
                .map(|s| {
                    TaskStatus::from_str(&s).ok_or_else(|| anyhow::anyhow!("Unknown status: {s}"))
                })
                .transpose()?;

            let tasks = ctx
                .ledger
                .list(TaskQuery {
                    status,
                    limit: Some(limit),
                    ..Default::default()
                })
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                let mut table = list_table(&["id", "kind", "status", "priority", "claimed by", "created"]);
                for task in &tasks {
                    table.add_row(vec![
                        short_id(&task.id),
                        task.kind.clone(),
                        task.status.to_string(),
                        task.priority.to_string(),
                        task.claimed_by.clone().unwrap_or_else(|| "-".to_string()),
                        task.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    ]);
                }
                println!("{}", render_list("task", &table, tasks.len()));
            }
        }

        TaskCommands::Show { id } => {
            let task = ctx
                .ledger
                .get(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Task {id} not found"))?;
            let attempts = ctx.ledger.attempts(id).await?;

            if json {
                let output = serde_json::json!({ "task": task, "attempts": attempts });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("Task {}", task.id);
                println!("  Kind: {}", task.kind);
                println!("  Status: {}", task.status);
                println!("  Priority: {}", task.priority);
                if !task.required_capabilities.is_empty() {
                    println!("  Requires: {}", task.required_capabilities.join(", "));
                }
                if !task.tags.is_empty() {
                    println!("  Tags: {}", task.tags.join(", "));
                }
                if let Some(agent) = &task.claimed_by {
                    println!("  Claimed by: {agent}");
                }
                if let Some(from) = task.escalated_from {
                    println!("  Escalated from: {from}");
                }
                println!("  Created: {}", task.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
                println!("  Updated: {}", task.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
                if let Some(result) = &task.result {
                    println!("  Result: {result}");
                }
                if let Some(error) = &task.error {
                    println!("  Error: {error}");
                }

                if !attempts.is_empty() {
                    println!("  Attempts:");
                    for attempt in &attempts {
                        println!(
                            "    {} {} by {}",
                            attempt.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                            attempt.outcome.as_str(),
                            attempt.agent_id,
                        );
                    }
                }
            }
        }

        TaskCommands::Cancel { id } => {
            let cancelled = ctx.ledger.cancel(id).await?;
            if cancelled {
                ctx.channel
                    .publish(CoordinationEvent::new(EventType::TaskCancelled).with_task(id))
                    .await;
            }

            if json {
                println!("{}", serde_json::json!({ "task_id": id, "cancelled": cancelled }));
            } else if cancelled {
                println!("Task {id} cancelled");
            } else {
                println!("Task {id} was not cancelled (unknown or already terminal)");
            }
        }

        TaskCommands::Stats => {
            let counts = ctx.ledger.count_by_status().await?;

            if json {
                let output: serde_json::Map<String, serde_json::Value> = counts
                    .iter()
                    .map(|(status, count)| (status.as_str().to_string(), (*count).into()))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                let mut table = list_table(&["status", "count"]);
                let mut rows: Vec<_> = counts.into_iter().collect();
                rows.sort_by_key(|(status, _)| status.as_str());
                let total = rows.len();
                for (status, count) in rows {
                    table.add_row(vec![status.to_string(), count.to_string()]);
                }
                println!("{}", render_list("status", &table, total));
            }
        }
    }

    Ok(())
}
