//! # hive
//!
//! Command-line access to a Hive workspace, for scripts and agent runtimes
//! that talk to the coordination layer through a shell.
//!
//! Every command prints pretty JSON on stdout; logs go to stderr and are
//! controlled with `HIVE_LOG` (default `warn`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

mod commands;

use commands::{AgentCommand, MailCommand, TaskCommand};

/// Shared mailbox and task coordination for agent processes
#[derive(Parser)]
#[command(name = "hive")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Workspace directory (overrides config file and HIVE_WORKSPACE)
    #[arg(short, long, global = true, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// Path to a YAML config file
    #[arg(short, long, global = true, env = "HIVE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Agent registry
    #[command(name = "agent")]
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Shared tasks
    #[command(name = "task")]
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    #[command(flatten)]
    Mail(MailCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let hive = open_hive(cli.config.as_deref(), cli.workspace.as_deref())?;

    let output = match cli.command {
        Commands::Agent { command } => commands::agent::handle_command(&hive, command)?,
        Commands::Task { command } => commands::task::handle_command(&hive, command)?,
        Commands::Mail(command) => commands::mail::handle_command(&hive, command)?,
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to render output")?
    );
    Ok(())
}

/// Resolve configuration (the `--workspace` flag also picks the config file)
/// and open the workspace
fn open_hive(config: Option<&Path>, workspace: Option<&Path>) -> Result<hive::Hive> {
    let config =
        hive::HiveConfig::load_for(config, workspace).context("Failed to load configuration")?;
    let workspace = config.workspace.display().to_string();
    let hive = hive::Hive::open(config)
        .with_context(|| format!("Failed to open workspace {}", workspace))?;
    tracing::debug!(workspace = %workspace, "opened hive workspace");
    Ok(hive)
}

/// Initialize tracing subscriber for logging
fn init_logging() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("HIVE_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("warn"))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
