use anyhow::{Context, Result};
use clap::Subcommand;
use hive::{Agent, AgentStatus, Hive};
use serde_json::Value;

use super::to_output;

#[derive(Subcommand)]
pub enum AgentCommand {
    /// Register (or re-register) an agent
    Register {
        /// Display name
        #[arg(value_name = "NAME")]
        name: String,

        /// Agent ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Capability tag, repeatable
        #[arg(short = 'C', long = "capability", value_name = "CAPABILITY")]
        capabilities: Vec<String>,
    },

    /// Set an agent's status (idle, busy, offline)
    Status {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,

        #[arg(value_name = "STATUS")]
        status: AgentStatus,
    },

    /// Mark an agent offline
    Deregister {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,
    },

    /// List agents, optionally only those with every given capability
    List {
        #[arg(short = 'C', long = "capability", value_name = "CAPABILITY")]
        capabilities: Vec<String>,
    },

    /// Show one agent
    Show {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,
    },
}

pub fn handle_command(hive: &Hive, command: AgentCommand) -> Result<Value> {
    let registry = hive.registry();
    match command {
        AgentCommand::Register {
            name,
            id,
            capabilities,
        } => {
            let mut agent = Agent::new(name).with_capabilities(capabilities);
            if let Some(id) = id {
                agent = agent.with_id(id);
            }
            let agent = registry.register(agent).context("Failed to register agent")?;
            to_output(&agent)
        }
        AgentCommand::Status { agent_id, status } => {
            let agent = registry
                .set_status(&agent_id, status)
                .with_context(|| format!("Failed to set status of {}", agent_id))?;
            to_output(&agent)
        }
        AgentCommand::Deregister { agent_id } => {
            let agent = registry
                .deregister(&agent_id)
                .with_context(|| format!("Failed to deregister {}", agent_id))?;
            to_output(&agent)
        }
        AgentCommand::List { capabilities } => {
            let agents = registry
                .list_by_capabilities(capabilities.as_slice())
                .context("Failed to list agents")?;
            to_output(&agents)
        }
        AgentCommand::Show { agent_id } => {
            let agent = registry.require(&agent_id)?;
            to_output(&agent)
        }
    }
}
