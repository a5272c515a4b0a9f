//! Agent Registry
//!
//! Which agents exist in the workspace, what they can do and whether they
//! are available. Agents are never deleted, only marked offline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::broadcaster::{BroadcastEvent, Broadcaster};
use crate::error::{EntityKind, HiveError, HiveResult};
use crate::events::{CoordinationEvent, SharedSink};
use crate::mailbox::{BROADCAST, SYSTEM_SENDER};
use crate::store::DurableStore;

// ============================================================================
// Types
// ============================================================================

/// Agent status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Busy,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(AgentStatus::Idle),
            "busy" => Ok(AgentStatus::Busy),
            "offline" => Ok(AgentStatus::Offline),
            other => Err(HiveError::validation(format!(
                "unknown agent status: {}",
                other
            ))),
        }
    }
}

/// A registered agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Agent ID, immutable once registered
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Capability tags
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub status: AgentStatus,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// New idle agent with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            capabilities: BTreeSet::new(),
            status: AgentStatus::Idle,
            registered_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    /// Check if agent has a specific capability
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Check if agent has all required capabilities
    pub fn has_all_capabilities<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required.iter().all(|r| self.has_capability(r.as_ref()))
    }

    pub fn is_available(&self) -> bool {
        self.status != AgentStatus::Offline
    }
}

/// Whether an id may be used for a registered agent
fn validate_agent_id(id: &str) -> HiveResult<()> {
    if id.trim().is_empty() {
        return Err(HiveError::validation("agent id must not be empty"));
    }
    if id == SYSTEM_SENDER || id == BROADCAST {
        return Err(HiveError::validation(format!(
            "agent id '{}' is reserved",
            id
        )));
    }
    Ok(())
}

// ============================================================================
// Agent Registry
// ============================================================================

/// Agent Registry backed by the durable store
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    store: Arc<DurableStore>,
    sink: SharedSink,
    broadcaster: Broadcaster,
}

impl AgentRegistry {
    pub fn new(store: Arc<DurableStore>, sink: SharedSink, broadcaster: Broadcaster) -> Self {
        Self {
            store,
            sink,
            broadcaster,
        }
    }

    /// Insert or overwrite an agent by id and announce it to everyone.
    ///
    /// Re-registering keeps the original `registered_at`.
    pub fn register(&self, agent: Agent) -> HiveResult<Agent> {
        validate_agent_id(&agent.id)?;

        let (stored, rejoined, delivery) = self.store.transaction(|snap| {
            let now = Utc::now();
            let mut agent = agent;
            let rejoined = match snap.agents().get(&agent.id) {
                Some(existing) => {
                    agent.registered_at = existing.registered_at;
                    true
                }
                None => {
                    agent.registered_at = now;
                    false
                }
            };
            agent.updated_at = now;
            snap.agents_mut().insert(agent.id.clone(), agent.clone());

            let delivery = self
                .broadcaster
                .announce_in(snap, &BroadcastEvent::joined(&agent))?;
            Ok((agent, rejoined, delivery))
        })?;

        self.sink.emit(&CoordinationEvent::AgentRegistered {
            agent_id: stored.id.clone(),
            name: stored.name.clone(),
            rejoined,
        });
        self.broadcaster.report(&delivery);
        Ok(stored)
    }

    /// Change an agent's status and announce it to everyone
    pub fn set_status(&self, agent_id: &str, status: AgentStatus) -> HiveResult<Agent> {
        let (updated, previous, delivery) = self.store.transaction(|snap| {
            let agent = snap
                .agents_mut()
                .get_mut(agent_id)
                .ok_or_else(|| HiveError::not_found(EntityKind::Agent, agent_id))?;
            let previous = agent.status;
            agent.status = status;
            agent.updated_at = Utc::now();
            let updated = agent.clone();

            let delivery = self.broadcaster.announce_in(
                snap,
                &BroadcastEvent::status_changed(agent_id, previous, status),
            )?;
            Ok((updated, previous, delivery))
        })?;

        self.sink.emit(&CoordinationEvent::AgentStatusChanged {
            agent_id: agent_id.to_string(),
            previous,
            status,
        });
        self.broadcaster.report(&delivery);
        Ok(updated)
    }

    /// Mark an agent offline. The record is kept.
    pub fn deregister(&self, agent_id: &str) -> HiveResult<Agent> {
        self.set_status(agent_id, AgentStatus::Offline)
    }

    pub fn get(&self, agent_id: &str) -> HiveResult<Option<Agent>> {
        Ok(self.store.agents()?.get(agent_id).cloned())
    }

    /// Like [`get`](Self::get), but an unknown id is an error
    pub fn require(&self, agent_id: &str) -> HiveResult<Agent> {
        self.get(agent_id)?
            .ok_or_else(|| HiveError::not_found(EntityKind::Agent, agent_id))
    }

    /// Every agent, ordered by id
    pub fn list(&self) -> HiveResult<Vec<Agent>> {
        Ok(self.store.agents()?.values().cloned().collect())
    }

    /// Agents whose capabilities include all of `required`, ordered by id
    pub fn list_by_capabilities<S: AsRef<str>>(&self, required: &[S]) -> HiveResult<Vec<Agent>> {
        Ok(self
            .store
            .agents()?
            .values()
            .filter(|a| a.has_all_capabilities(required))
            .cloned()
            .collect())
    }
}
