//! `drover event`: inspect the coordination event stream.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::time::Duration;

use crate::cli::context::AppContext;
use crate::cli::display::{list_table, render_list};
use crate::domain::models::{Config, CoordinationEvent};

#[derive(Args)]
pub struct EventArgs {
    #[command(subcommand)]
    pub command: EventCommands,
}

#[derive(Subcommand)]
pub enum EventCommands {
    /// List persisted events
    List {
        /// Only events with sequence greater than this
        #[arg(long, default_value_t = 0)]
        since: u64,
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
    /// Follow the durable log, printing events as they land
    Tail {
        /// Poll interval in seconds
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,
    },
    /// Show an agent's unconsumed inbox
    Inbox {
        agent_id: String,
        #[arg(long, default_value_t = 100)]
        limit: i64,
        /// Acknowledge everything shown, advancing the cursor
        #[arg(long)]
        ack: bool,
    },
}

fn print_event_line(event: &CoordinationEvent) {
    println!(
        "{:>6}  {}  {:<22} task={} agent={}",
        event.sequence,
        event.timestamp.format("%H:%M:%S"),
        event.event_type.to_string(),
        event
            .task_id
            .map_or_else(|| "-".to_string(), |id| id.to_string()),
        event.agent_id.as_deref().unwrap_or("-"),
    );
}

pub async fn execute(args: EventArgs, config: Config, json: bool) -> Result<()> {
    let ctx = AppContext::init(config).await?;

    match args.command {
        EventCommands::List { since, limit } => {
            let events = ctx.channel.replay(since, limit).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else {
                let mut table = list_table(&["seq", "time", "type", "severity", "task", "agent"]);
                for event in &events {
                    table.add_row(vec![
                        event.sequence.to_string(),
                        event.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                        event.event_type.to_string(),
                        event.severity.to_string(),
                        event
                            .task_id
                            .map_or_else(|| "-".to_string(), |id| id.to_string()[..8].to_string()),
                        event.agent_id.clone().unwrap_or_else(|| "-".to_string()),
                    ]);
                }
                println!("{}", render_list("event", &table, events.len()));
            }
        }

        EventCommands::Tail { interval_secs } => {
            // Other processes append to the log; a fresh subscriber here
            // would only see its own events, so tailing polls the durable
            // log instead.
            let mut last_seen = ctx.channel.current_sequence();
            let poll = Duration::from_secs(interval_secs.max(1));

            loop {
                tokio::select! {
                    () = tokio::time::sleep(poll) => {
                        for event in ctx.channel.replay(last_seen, 1000).await? {
                            last_seen = event.sequence;
                            if json {
                                println!("{}", serde_json::to_string(&event)?);
                            } else {
                                print_event_line(&event);
                            }
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }

        EventCommands::Inbox {
            agent_id,
            limit,
            ack,
        } => {
            let events = ctx.channel.inbox(&agent_id, limit).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("Inbox for {agent_id} is empty");
            } else {
                for event in &events {
                    print_event_line(event);
                }
            }

            if ack {
                if let Some(last) = events.last() {
                    ctx.channel.ack(&agent_id, last.sequence).await?;
                    if !json {
                        println!("Acked through sequence {}", last.sequence);
                    }
                }
            }
        }
    }

    Ok(())
}
