//! Hive - coordination layer for independent agent processes
//!
//! Agents running as separate OS processes share one workspace directory and
//! coordinate through it:
//! - Agent Registry: who exists, what they can do, whether they are available
//! - Mailbox: direct and broadcast messages with per-recipient read state
//! - Task Store: shared tasks with a checked status lifecycle
//! - Broadcaster: registry changes fanned out as notifications
//!
//! Every mutation is one locked read-modify-write cycle against the durable
//! store, so a write by one process is visible to every other process on its
//! next read.

pub mod broadcaster;
pub mod config;
pub mod error;
pub mod events;
mod hive;
pub mod mailbox;
pub mod registry;
pub mod store;
pub mod task_spec;
pub mod tasks;


pub use broadcaster::{BroadcastEvent, Broadcaster};
pub use config::HiveConfig;
pub use error::{EntityKind, HiveError, HiveResult};
pub use events::{CoordinationEvent, EventSink, MemorySink, SharedSink, TracingSink};
pub use hive::Hive;
pub use mailbox::{Mailbox, Message, MessageTarget, MessageType, SendRequest, BROADCAST, SYSTEM_SENDER};
pub use registry::{Agent, AgentRegistry, AgentStatus};
pub use store::{Collection, DurableStore, StoreOptions};
pub use task_spec::{parse_task_spec_file, parse_task_specs, SpecStatus, TaskSpec};
pub use tasks::{StatusChange, Task, TaskStatus, TaskStore};
