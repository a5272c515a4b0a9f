//! Broadcaster
//!
//! Fans registry changes out to every known agent as a `notification` from
//! the system sender. Holds no state of its own.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HiveResult;
use crate::mailbox::{Delivery, Mailbox, MessageType, SendRequest, SYSTEM_SENDER};
use crate::registry::{Agent, AgentStatus};
use crate::store::Snapshot;

/// Registry change announced to everyone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum BroadcastEvent {
    AgentJoined {
        agent: Agent,
    },
    #[serde(rename_all = "camelCase")]
    AgentStatusChanged {
        agent_id: String,
        previous: AgentStatus,
        status: AgentStatus,
    },
}

impl BroadcastEvent {
    pub fn joined(agent: &Agent) -> Self {
        BroadcastEvent::AgentJoined {
            agent: agent.clone(),
        }
    }

    pub fn status_changed(agent_id: impl Into<String>, previous: AgentStatus, status: AgentStatus) -> Self {
        BroadcastEvent::AgentStatusChanged {
            agent_id: agent_id.into(),
            previous,
            status,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            BroadcastEvent::AgentJoined { .. } => "agent-joined",
            BroadcastEvent::AgentStatusChanged { .. } => "agent-status-changed",
        }
    }

    /// Notification payload, plus the number of agents it was fanned out to
    fn content(&self, known_agents: usize) -> HiveResult<Value> {
        let mut content = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut content {
            map.insert("knownAgents".to_string(), Value::from(known_agents));
        }
        Ok(content)
    }
}

/// Turns [`BroadcastEvent`]s into broadcast notifications
#[derive(Debug, Clone)]
pub struct Broadcaster {
    mailbox: Mailbox,
}

impl Broadcaster {
    pub fn new(mailbox: Mailbox) -> Self {
        Self { mailbox }
    }

    /// Announce an event in its own transaction
    pub fn announce(&self, event: &BroadcastEvent) -> HiveResult<String> {
        let delivery = self
            .mailbox
            .store()
            .transaction(|snap| self.announce_in(snap, event))?;
        self.mailbox.report(&delivery);
        Ok(delivery.message.id)
    }

    /// Announce an event inside a caller's transaction, against the agent
    /// snapshot of that transaction. The caller reports the delivery once
    /// the transaction commits.
    pub(crate) fn announce_in(
        &self,
        snap: &mut Snapshot,
        event: &BroadcastEvent,
    ) -> HiveResult<Delivery> {
        let content = event.content(snap.agents().len())?;
        tracing::debug!(event = event.event_name(), "broadcasting registry change");
        self.mailbox.send_in(
            snap,
            SendRequest::broadcast(SYSTEM_SENDER, MessageType::Notification, content),
        )
    }

    pub(crate) fn report(&self, delivery: &Delivery) {
        self.mailbox.report(delivery);
    }
}
