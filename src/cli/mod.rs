//! Command-line interface.

pub mod commands;
pub mod context;
pub mod display;

use clap::{Parser, Subcommand};

/// Task coordination engine for pools of autonomous agents
#[derive(Parser)]
#[command(name = "drover", version, about, long_about = None)]
pub struct Cli {
    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a .drover/ directory and database
    Init(commands::init::InitArgs),
    /// Submit, inspect and cancel tasks
    Task(commands::task::TaskArgs),
    /// Register and deactivate agent capabilities
    Agent(commands::agent::AgentArgs),
    /// Run a worker loop claiming and executing tasks
    Worker(commands::worker::WorkerArgs),
    /// Run the stalled-task monitor
    Monitor(commands::monitor::MonitorArgs),
    /// Inspect the coordination event stream
    Event(commands::event::EventArgs),
}

/// Render a top-level error and exit non-zero.
pub fn handle_error(err: anyhow::Error, json: bool) {
    if json {
        let payload = serde_json::json!({ "error": format!("{err:#}") });
        eprintln!("{payload}");
    } else {
        eprintln!("{} {err:#}", console::style("error:").red().bold());
    }
    std::process::exit(1);
}
