//! `drover agent`: capability registration and lookup.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::context::AppContext;
use crate::cli::display::{list_table, render_list};
use crate::domain::models::{
    CapabilityVersion, Config, CoordinationEvent, EventType,
};

#[derive(Args)]
pub struct AgentArgs {
    #[command(subcommand)]
    pub command: AgentCommands,
}

#[derive(Subcommand)]
pub enum AgentCommands {
    /// Register capabilities for an agent (repeatable `cap` or `cap@1.2`)
    Register {
        agent_id: String,
        #[arg(long = "capability", required = true)]
        capabilities: Vec<String>,
    },
    /// Deactivate one capability, or all of them
    Deactivate {
        agent_id: String,
        /// Specific capability to deactivate; omit to deactivate all
        #[arg(long)]
        capability: Option<String>,
    },
    /// Show everything an agent has declared
    Show { agent_id: String },
    /// Find agents holding an active capability
    Find {
        capability_id: String,
        /// Minimum acceptable version, e.g. 1.2
        #[arg(long)]
        min_version: Option<String>,
    },
}

/// Split `cap@1.2` into id and version; a bare id defaults to 1.0.
fn parse_capability(spec: &str) -> Result<(String, CapabilityVersion)> {
    match spec.split_once('@') {
        Some((id, version)) => Ok((id.to_string(), version.parse()?)),
        None => Ok((spec.to_string(), CapabilityVersion::default())),
    }
}

pub async fn execute(args: AgentArgs, config: Config, json: bool) -> Result<()> {
    let ctx = AppContext::init(config).await?;

    match args.command {
        AgentCommands::Register {
            agent_id,
            capabilities,
        } => {
            let mut registered = Vec::new();
            for spec in &capabilities {
                let (capability_id, version) = parse_capability(spec)?;
                ctx.registry
                    .register(&agent_id, &capability_id, version)
                    .await?;
                ctx.channel
                    .publish(
                        CoordinationEvent::new(EventType::CapabilityRegistered)
                            .with_agent(&agent_id)
                            .with_detail(serde_json::json!({
                                "capability_id": capability_id,
                                "version": version.to_string(),
                            })),
                    )
                    .await;
                registered.push((capability_id, version));
            }

            if json {
                let output: Vec<_> = registered
                    .iter()
                    .map(|(id, v)| {
                        serde_json::json!({ "capability_id": id, "version": v.to_string() })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({ "agent_id": agent_id, "registered": output })
                );
            } else {
                println!("Registered {} capability(ies) for {agent_id}:", registered.len());
                for (id, version) in &registered {
                    println!("  {id}@{version}");
                }
            }
        }

        AgentCommands::Deactivate {
            agent_id,
            capability,
        } => {
            let count = match &capability {
                Some(capability_id) => {
                    u64::from(ctx.registry.deactivate(&agent_id, capability_id).await?)
                }
                None => ctx.registry.deactivate_all(&agent_id).await?,
            };

            if count > 0 {
                ctx.channel
                    .publish(
                        CoordinationEvent::new(EventType::CapabilityDeactivated)
                            .with_agent(&agent_id)
                            .with_detail(serde_json::json!({
                                "capability_id": capability,
                                "count": count,
                            })),
                    )
                    .await;
            }

            if json {
                println!(
                    "{}",
                    serde_json::json!({ "agent_id": agent_id, "deactivated": count })
                );
            } else if count > 0 {
                println!("Deactivated {count} capability(ies) for {agent_id}");
            } else {
                // Absence is a no-op, not an error
                println!("Nothing to deactivate for {agent_id}");
            }
        }

        AgentCommands::Show { agent_id } => {
            let records = ctx.registry.get(&agent_id).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                let mut table = list_table(&["capability", "version", "active", "last verified"]);
                for record in &records {
                    table.add_row(vec![
                        record.capability_id.clone(),
                        record.version.to_string(),
                        if record.is_active { "yes" } else { "no" }.to_string(),
                        record.last_verified_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    ]);
                }
                println!("{}", render_list("capability", &table, records.len()));
            }
        }

        AgentCommands::Find {
            capability_id,
            min_version,
        } => {
            let min_version = min_version
                .map(|v| v.parse::<CapabilityVersion>())
                .transpose()?;
            let agents = ctx
                .registry
                .find_agents_for(&capability_id, min_version)
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&agents)?);
            } else if agents.is_empty() {
                println!("No active agents hold {capability_id}");
            } else {
                println!("Agents holding {capability_id} (best version first):");
                for agent in &agents {
                    println!("  {agent}");
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capability_with_version() {
        let (id, version) = parse_capability("format.python@2.1").unwrap();
        assert_eq!(id, "format.python");
        assert_eq!(version, CapabilityVersion::new(2, 1));
    }

    #[test]
    fn test_parse_capability_bare() {
        let (id, version) = parse_capability("lint.rust").unwrap();
        assert_eq!(id, "lint.rust");
        assert_eq!(version, CapabilityVersion::new(1, 0));
    }

    #[test]
    fn test_parse_capability_bad_version() {
        assert!(parse_capability("x@not.a.version").is_err());
    }
}
