use anyhow::{Context, Result};
use clap::Subcommand;
use hive::{parse_task_spec_file, Hive, TaskStatus};
use serde_json::{json, Value};
use std::path::PathBuf;

use super::{parse_payload, to_output};

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Create a task for one or more agents
    Create {
        #[arg(long, value_name = "AGENT_ID")]
        creator: String,

        /// Assignee, repeatable
        #[arg(short, long = "assignee", value_name = "AGENT_ID", required = true)]
        assignees: Vec<String>,

        #[arg(value_name = "NAME")]
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// JSON payload attached to the task
        #[arg(long, default_value = "null")]
        data: String,
    },

    /// Move a task to a new status on behalf of an assignee
    Status {
        #[arg(value_name = "TASK_ID")]
        task_id: String,

        #[arg(long, value_name = "AGENT_ID")]
        agent: String,

        /// assigned, in_progress, completed or blocked
        #[arg(value_name = "STATUS")]
        status: TaskStatus,

        #[arg(short, long)]
        message: Option<String>,

        /// Fail unless the task is still at this revision
        #[arg(long)]
        revision: Option<u64>,
    },

    /// Set progress (clamped to 0..=100)
    Progress {
        #[arg(value_name = "TASK_ID")]
        task_id: String,

        #[arg(value_name = "PERCENT", allow_hyphen_values = true)]
        progress: i64,
    },

    /// Next task of an agent that is neither completed nor blocked
    Next {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,

        /// Task the agent is currently on
        #[arg(long, value_name = "TASK_ID")]
        after: Option<String>,
    },

    /// Show one task
    Show {
        #[arg(value_name = "TASK_ID")]
        task_id: String,
    },

    /// List tasks, optionally only those of one agent
    List {
        #[arg(long, value_name = "AGENT_ID")]
        agent: Option<String>,
    },

    /// Create tasks from a task-spec document
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, value_name = "AGENT_ID")]
        creator: String,

        #[arg(short, long = "assignee", value_name = "AGENT_ID", required = true)]
        assignees: Vec<String>,
    },
}

pub fn handle_command(hive: &Hive, command: TaskCommand) -> Result<Value> {
    let tasks = hive.tasks();
    match command {
        TaskCommand::Create {
            creator,
            assignees,
            name,
            description,
            data,
        } => {
            let id = tasks
                .create_task(&creator, assignees, &name, &description, parse_payload(&data))
                .context("Failed to create task")?;
            Ok(json!({ "taskId": id }))
        }
        TaskCommand::Status {
            task_id,
            agent,
            status,
            message,
            revision,
        } => {
            let result = match revision {
                Some(expected) => tasks.update_status_at_revision(
                    &task_id,
                    &agent,
                    status,
                    message.as_deref(),
                    expected,
                ),
                None => tasks.update_status(&task_id, &agent, status, message.as_deref()),
            };
            let task = result.with_context(|| format!("Failed to update task {}", task_id))?;
            to_output(&task)
        }
        TaskCommand::Progress { task_id, progress } => {
            let task = tasks.update_progress(&task_id, progress)?;
            to_output(&task)
        }
        TaskCommand::Next { agent_id, after } => {
            let next = tasks.next_pending_for(&agent_id, after.as_deref())?;
            to_output(&next)
        }
        TaskCommand::Show { task_id } => {
            let task = tasks.require(&task_id)?;
            to_output(&task)
        }
        TaskCommand::List { agent } => {
            let list = match agent {
                Some(agent) => tasks.tasks_for(&agent)?,
                None => tasks.list()?,
            };
            to_output(&list)
        }
        TaskCommand::Import {
            file,
            creator,
            assignees,
        } => {
            let specs = parse_task_spec_file(&file)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            let ids = tasks
                .seed_from_specs(&creator, assignees, &specs)
                .context("Failed to create tasks")?;
            Ok(json!({ "taskIds": ids }))
        }
    }
}
