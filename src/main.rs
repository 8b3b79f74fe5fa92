//! Drover CLI entry point.

use clap::Parser;

use drover::cli::{Cli, Commands};
use drover::infrastructure::config::ConfigLoader;
use drover::infrastructure::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::load() {
        Ok(config) => config,
        Err(err) => {
            drover::cli::handle_error(err, cli.json);
            return;
        }
    };

    logging::init(&config.logging);

    let result = match cli.command {
        Commands::Init(args) => drover::cli::commands::init::execute(args, config, cli.json).await,
        Commands::Task(args) => drover::cli::commands::task::execute(args, config, cli.json).await,
        Commands::Agent(args) => {
            drover::cli::commands::agent::execute(args, config, cli.json).await
        }
        Commands::Worker(args) => {
            drover::cli::commands::worker::execute(args, config, cli.json).await
        }
        Commands::Monitor(args) => {
            drover::cli::commands::monitor::execute(args, config, cli.json).await
        }
        Commands::Event(args) => {
            drover::cli::commands::event::execute(args, config, cli.json).await
        }
    };

    if let Err(err) = result {
        drover::cli::handle_error(err, cli.json);
    }
}
