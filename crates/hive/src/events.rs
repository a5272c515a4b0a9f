//! Coordination events and sinks
//!
//! Components never log through a global; each one receives an
//! `Arc<dyn EventSink>` at construction and reports what it committed.
//! [`TracingSink`] forwards to `tracing`, [`MemorySink`] keeps events for
//! assertions.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::mailbox::{MessageTarget, MessageType};
use crate::registry::AgentStatus;
use crate::tasks::TaskStatus;

/// Something the coordination layer committed to the workspace
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinationEvent {
    AgentRegistered {
        agent_id: String,
        name: String,
        rejoined: bool,
    },
    AgentStatusChanged {
        agent_id: String,
        previous: AgentStatus,
        status: AgentStatus,
    },
    MessageSent {
        message_id: String,
        from: String,
        to: MessageTarget,
        message_type: MessageType,
        recipients: usize,
    },
    MessageRead {
        message_id: String,
        agent_id: String,
    },
    MessagesPruned {
        count: usize,
    },
    TaskCreated {
        task_id: String,
        creator: String,
        assignees: Vec<String>,
    },
    TaskStatusChanged {
        task_id: String,
        agent_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    TaskProgressUpdated {
        task_id: String,
        progress: u8,
    },
}

/// Receiver for coordination events
pub trait EventSink: Send + Sync + fmt::Debug {
    fn emit(&self, event: &CoordinationEvent);
}

/// Shared handle passed into every component
pub type SharedSink = Arc<dyn EventSink>;

/// Default sink: structured `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn shared() -> SharedSink {
        Arc::new(Self)
    }
}

impl EventSink for TracingSink {
    fn emit(&self, event: &CoordinationEvent) {
        match event {
            CoordinationEvent::AgentRegistered {
                agent_id,
                name,
                rejoined,
            } => tracing::info!(agent_id = %agent_id, name = %name, rejoined, "agent registered"),
            CoordinationEvent::AgentStatusChanged {
                agent_id,
                previous,
                status,
            } => tracing::info!(
                agent_id = %agent_id,
                previous = %previous,
                status = %status,
                "agent status changed"
            ),
            CoordinationEvent::MessageSent {
                message_id,
                from,
                to,
                message_type,
                recipients,
            } => tracing::debug!(
                message_id = %message_id,
                from = %from,
                to = %to,
                message_type = %message_type,
                recipients,
                "message sent"
            ),
            CoordinationEvent::MessageRead {
                message_id,
                agent_id,
            } => tracing::debug!(message_id = %message_id, agent_id = %agent_id, "message read"),
            CoordinationEvent::MessagesPruned { count } => {
                tracing::info!(count, "pruned read messages past retention")
            }
            CoordinationEvent::TaskCreated {
                task_id,
                creator,
                assignees,
            } => tracing::info!(
                task_id = %task_id,
                creator = %creator,
                assignees = ?assignees,
                "task created"
            ),
            CoordinationEvent::TaskStatusChanged {
                task_id,
                agent_id,
                from,
                to,
            } => tracing::info!(
                task_id = %task_id,
                agent_id = %agent_id,
                from = %from,
                to = %to,
                "task status changed"
            ),
            CoordinationEvent::TaskProgressUpdated { task_id, progress } => {
                tracing::debug!(task_id = %task_id, progress, "task progress updated")
            }
        }
    }
}

/// Capturing sink for tests and embedding runtimes
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<CoordinationEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far, oldest first
    pub fn events(&self) -> Vec<CoordinationEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn count_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CoordinationEvent) -> bool,
    {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &CoordinationEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_captures_in_order() {
        let sink = MemorySink::new();
        sink.emit(&CoordinationEvent::MessagesPruned { count: 2 });
        sink.emit(&CoordinationEvent::TaskProgressUpdated {
            task_id: "t1".into(),
            progress: 40,
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], CoordinationEvent::MessagesPruned { count: 2 });
        assert_eq!(
            sink.count_matching(|e| matches!(e, CoordinationEvent::TaskProgressUpdated { .. })),
            1
        );

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_tracing_sink_accepts_every_event() {
        let sink = TracingSink;
        sink.emit(&CoordinationEvent::AgentStatusChanged {
            agent_id: "a1".into(),
            previous: AgentStatus::Idle,
            status: AgentStatus::Busy,
        });
        sink.emit(&CoordinationEvent::MessageSent {
            message_id: "m1".into(),
            from: "a1".into(),
            to: MessageTarget::Broadcast,
            message_type: MessageType::Notification,
            recipients: 3,
        });
    }
}
