//! `drover init`: scaffold project-local configuration and database.

use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

use crate::cli::context::AppContext;
use crate::domain::models::Config;

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

pub async fn execute(args: InitArgs, config: Config, json: bool) -> Result<()> {
    let config_dir = Path::new(".drover");
    let config_path = config_dir.join("config.yaml");

    if config_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    std::fs::create_dir_all(config_dir).context("Failed to create .drover directory")?;
    let yaml = serde_yaml::to_string(&Config::default())
        .context("Failed to serialize default config")?;
    std::fs::write(&config_path, yaml).context("Failed to write config file")?;

    // Opening the context creates the database and applies migrations.
    let ctx = AppContext::init(config).await?;

    if json {
        let output = serde_json::json!({
            "config": config_path.display().to_string(),
            "database": ctx.config.database.path,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Initialized drover project");
        println!("  Config: {}", config_path.display());
        println!("  Database: {}", ctx.config.database.path);
    }

    Ok(())
}
