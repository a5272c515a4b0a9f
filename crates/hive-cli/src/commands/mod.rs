//! Command implementations for the hive CLI
//!
//! Handlers return the JSON value to print; `main` renders it.

pub mod agent;
pub mod mail;
pub mod task;

pub use self::agent::AgentCommand;
pub use self::mail::MailCommand;
pub use self::task::TaskCommand;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

/// Free-form payload argument: JSON if it parses, otherwise a plain string
pub(crate) fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub(crate) fn to_output<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).context("Failed to serialize output")
}
