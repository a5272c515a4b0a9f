//! Agent Mailbox
//!
//! Durable message store shared by every agent process in a workspace.
//!
//! # Features
//! - Direct and broadcast messages
//! - Per-recipient read state (a broadcast is read independently by each agent)
//! - Replies linked to the original message, and reply threads
//! - File-share convenience messages
//! - Retention of fully-read history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{EntityKind, HiveError, HiveResult};
use crate::events::{CoordinationEvent, SharedSink};
use crate::store::{DurableStore, MessageLog, Snapshot};

/// Sender id used for system notifications
pub const SYSTEM_SENDER: &str = "system";

/// Wire value of a broadcast target
pub const BROADCAST: &str = "broadcast";

/// Message target - either a specific agent or broadcast
///
/// Serialized as a plain string: the agent id, or `"broadcast"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageTarget {
    /// Send to a specific agent
    Agent(String),
    /// Send to every agent known at send time
    Broadcast,
}

impl MessageTarget {
    pub fn agent(id: impl Into<String>) -> Self {
        MessageTarget::Agent(id.into())
    }

    /// Get the agent ID if this is a single agent target
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            MessageTarget::Agent(id) => Some(id),
            MessageTarget::Broadcast => None,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, MessageTarget::Broadcast)
    }
}

impl From<String> for MessageTarget {
    fn from(value: String) -> Self {
        if value == BROADCAST {
            MessageTarget::Broadcast
        } else {
            MessageTarget::Agent(value)
        }
    }
}

impl From<&str> for MessageTarget {
    fn from(value: &str) -> Self {
        MessageTarget::from(value.to_string())
    }
}

impl From<MessageTarget> for String {
    fn from(target: MessageTarget) -> Self {
        match target {
            MessageTarget::Agent(id) => id,
            MessageTarget::Broadcast => BROADCAST.to_string(),
        }
    }
}

impl fmt::Display for MessageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageTarget::Agent(id) => f.write_str(id),
            MessageTarget::Broadcast => f.write_str(BROADCAST),
        }
    }
}

/// Kind of message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Request,
    Response,
    Notification,
    FileShare,
    TaskUpdate,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Request => "request",
            MessageType::Response => "response",
            MessageType::Notification => "notification",
            MessageType::FileShare => "file-share",
            MessageType::TaskUpdate => "task-update",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request" => Ok(MessageType::Request),
            "response" => Ok(MessageType::Response),
            "notification" => Ok(MessageType::Notification),
            "file-share" => Ok(MessageType::FileShare),
            "task-update" => Ok(MessageType::TaskUpdate),
            other => Err(HiveError::validation(format!(
                "unknown message type: {}",
                other
            ))),
        }
    }
}

/// A message between agents. Immutable once sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier
    pub id: String,
    /// Sender agent ID (or [`SYSTEM_SENDER`])
    pub from: String,
    /// Target (agent ID or broadcast)
    pub to: MessageTarget,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Opaque payload
    pub content: Value,
    /// Send time, strictly increasing in send order
    pub timestamp: DateTime<Utc>,
    /// ID of the message this replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
}

/// Arguments of a send
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub from: String,
    pub to: MessageTarget,
    pub message_type: MessageType,
    pub content: Value,
    pub in_reply_to: Option<String>,
}

impl SendRequest {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<MessageTarget>,
        message_type: MessageType,
        content: Value,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            message_type,
            content,
            in_reply_to: None,
        }
    }

    /// Create a broadcast request
    pub fn broadcast(from: impl Into<String>, message_type: MessageType, content: Value) -> Self {
        Self::new(from, MessageTarget::Broadcast, message_type, content)
    }

    /// Set the message this replies to
    pub fn with_reply_to(mut self, id: impl Into<String>) -> Self {
        self.in_reply_to = Some(id.into());
        self
    }
}

/// Per-recipient read state: `messageId -> agentId -> read`
///
/// An entry exists exactly for the intended recipients of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadIndex(BTreeMap<String, BTreeMap<String, bool>>);

impl ReadIndex {
    /// Read flag for a pair, `None` if the agent was never a recipient
    pub fn get(&self, message_id: &str, agent_id: &str) -> Option<bool> {
        self.0.get(message_id)?.get(agent_id).copied()
    }

    pub fn is_recipient(&self, message_id: &str, agent_id: &str) -> bool {
        self.get(message_id, agent_id).is_some()
    }

    pub fn is_unread(&self, message_id: &str, agent_id: &str) -> bool {
        self.get(message_id, agent_id) == Some(false)
    }

    /// Recipients of a message, sorted by agent id
    pub fn recipients(&self, message_id: &str) -> Vec<&str> {
        self.0
            .get(message_id)
            .map(|entries| entries.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// True when every recipient has read the message (or it had none)
    pub fn is_fully_read(&self, message_id: &str) -> bool {
        self.0
            .get(message_id)
            .map(|entries| entries.values().all(|read| *read))
            .unwrap_or(true)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert_recipients(&mut self, message_id: &str, recipients: &[String]) {
        let entries = recipients.iter().map(|a| (a.clone(), false)).collect();
        self.0.insert(message_id.to_string(), entries);
    }

    /// Set the flag; returns the previous value, `None` if there is no entry
    fn mark_read(&mut self, message_id: &str, agent_id: &str) -> Option<bool> {
        let flag = self.0.get_mut(message_id)?.get_mut(agent_id)?;
        let previous = *flag;
        *flag = true;
        Some(previous)
    }

    fn remove(&mut self, message_id: &str) {
        self.0.remove(message_id);
    }
}

/// A message committed in a transaction, plus who it was delivered to
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message: Message,
    pub recipients: Vec<String>,
    /// Messages dropped by the retention policy while sending this one
    pub pruned: usize,
}

/// Agent Mailbox backed by the durable store
#[derive(Debug, Clone)]
pub struct Mailbox {
    store: Arc<DurableStore>,
    sink: SharedSink,
    /// Keep at most this many messages, dropping the oldest fully-read ones
    retention: Option<usize>,
}

impl Mailbox {
    pub fn new(store: Arc<DurableStore>, sink: SharedSink) -> Self {
        Self {
            store,
            sink,
            retention: None,
        }
    }

    /// Set the retention cap
    pub fn with_retention(mut self, max_messages: Option<usize>) -> Self {
        self.retention = max_messages;
        self
    }

    pub fn retention(&self) -> Option<usize> {
        self.retention
    }

    pub(crate) fn store(&self) -> &Arc<DurableStore> {
        &self.store
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Send a message; returns the new message id
    pub fn send(&self, request: SendRequest) -> HiveResult<String> {
        let delivery = self
            .store
            .transaction(|snap| self.send_in(snap, request))?;
        self.report(&delivery);
        Ok(delivery.message.id)
    }

    /// Reply to a message with a `response`; returns the new message id
    pub fn reply(&self, original_id: &str, from: &str, content: Value) -> HiveResult<String> {
        self.reply_with_type(original_id, from, content, MessageType::Response)
    }

    /// Reply to a message with an explicit message type
    pub fn reply_with_type(
        &self,
        original_id: &str,
        from: &str,
        content: Value,
        message_type: MessageType,
    ) -> HiveResult<String> {
        let delivery = self.store.transaction(|snap| {
            let original = snap
                .messages()
                .get(original_id)
                .ok_or_else(|| HiveError::not_found(EntityKind::Message, original_id))?;
            let request = SendRequest::new(
                from,
                MessageTarget::Agent(original.from.clone()),
                message_type,
                content,
            )
            .with_reply_to(original_id);
            self.send_in(snap, request)
        })?;
        self.report(&delivery);
        Ok(delivery.message.id)
    }

    /// Share a file path with another agent (or everyone)
    pub fn share_file(
        &self,
        from: &str,
        to: impl Into<MessageTarget>,
        path: &str,
        description: &str,
    ) -> HiveResult<String> {
        let content = json!({
            "path": path,
            "description": description,
        });
        self.send(SendRequest::new(from, to, MessageType::FileShare, content))
    }

    /// Validate, stamp and store a message inside an open transaction.
    ///
    /// The read-state entries for every recipient are written in the same
    /// transaction as the message.
    pub(crate) fn send_in(&self, snap: &mut Snapshot, request: SendRequest) -> HiveResult<Delivery> {
        let SendRequest {
            from,
            to,
            message_type,
            content,
            in_reply_to,
        } = request;

        if from.trim().is_empty() {
            return Err(HiveError::validation("sender id must not be empty"));
        }
        if from != SYSTEM_SENDER && !snap.agents().contains_key(&from) {
            return Err(HiveError::not_found(EntityKind::Agent, from));
        }

        let recipients: Vec<String> = match &to {
            MessageTarget::Agent(id) => {
                if !snap.agents().contains_key(id) {
                    return Err(HiveError::not_found(EntityKind::Agent, id.clone()));
                }
                vec![id.clone()]
            }
            MessageTarget::Broadcast => snap.agents().keys().cloned().collect(),
        };

        if let Some(original) = &in_reply_to {
            if !snap.messages().contains_key(original) {
                return Err(HiveError::not_found(EntityKind::Message, original.clone()));
            }
        }

        let mut id = uuid::Uuid::new_v4().to_string();
        while snap.messages().contains_key(&id) {
            id = uuid::Uuid::new_v4().to_string();
        }

        let last = snap.messages().values().last().map(|m| m.timestamp);
        let message = Message {
            id: id.clone(),
            from,
            to,
            message_type,
            content,
            timestamp: crate::store::stamp_after(last),
            in_reply_to,
        };

        snap.read_state_mut().insert_recipients(&id, &recipients);
        snap.messages_mut().insert(id.clone(), message.clone());

        let pruned = match self.retention {
            Some(cap) => prune(snap, cap, &id),
            None => 0,
        };

        Ok(Delivery {
            message,
            recipients,
            pruned,
        })
    }

    /// Emit events for a committed delivery
    pub(crate) fn report(&self, delivery: &Delivery) {
        self.sink.emit(&CoordinationEvent::MessageSent {
            message_id: delivery.message.id.clone(),
            from: delivery.message.from.clone(),
            to: delivery.message.to.clone(),
            message_type: delivery.message.message_type,
            recipients: delivery.recipients.len(),
        });
        if delivery.pruned > 0 {
            self.sink.emit(&CoordinationEvent::MessagesPruned {
                count: delivery.pruned,
            });
        }
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Get a message by id
    pub fn get(&self, message_id: &str) -> HiveResult<Option<Message>> {
        Ok(self.store.messages()?.get(message_id).cloned())
    }

    /// Every message the agent was an intended recipient of, in send order
    pub fn messages_for(&self, agent_id: &str) -> HiveResult<Vec<Message>> {
        self.collect_for(agent_id, |read| read.is_some())
    }

    /// Messages the agent has not marked read yet, in send order
    pub fn unread_for(&self, agent_id: &str) -> HiveResult<Vec<Message>> {
        self.collect_for(agent_id, |read| read == Some(false))
    }

    fn collect_for<F>(&self, agent_id: &str, keep: F) -> HiveResult<Vec<Message>>
    where
        F: Fn(Option<bool>) -> bool,
    {
        if !self.store.agents()?.contains_key(agent_id) {
            return Err(HiveError::not_found(EntityKind::Agent, agent_id));
        }

        // Messages before read state: see the module docs of `store`.
        let messages = self.store.messages()?;
        let read_state = self.store.read_state()?;

        Ok(messages
            .values()
            .filter(|m| keep(read_state.get(&m.id, agent_id)))
            .cloned()
            .collect())
    }

    /// Mark a message read for one agent. Idempotent.
    pub fn mark_read(&self, message_id: &str, agent_id: &str) -> HiveResult<()> {
        let changed = self.store.transaction(|snap| {
            match snap.read_state().get(message_id, agent_id) {
                None => Err(HiveError::not_found(
                    EntityKind::ReadState,
                    format!("{}/{}", message_id, agent_id),
                )),
                Some(true) => Ok(false),
                Some(false) => {
                    snap.read_state_mut().mark_read(message_id, agent_id);
                    Ok(true)
                }
            }
        })?;

        if changed {
            self.sink.emit(&CoordinationEvent::MessageRead {
                message_id: message_id.to_string(),
                agent_id: agent_id.to_string(),
            });
        }
        Ok(())
    }

    /// Mark every unread message of an agent read; returns how many changed
    pub fn mark_all_read(&self, agent_id: &str) -> HiveResult<usize> {
        let marked = self.store.transaction(|snap| {
            if !snap.agents().contains_key(agent_id) {
                return Err(HiveError::not_found(EntityKind::Agent, agent_id));
            }
            let unread: Vec<String> = snap
                .messages()
                .keys()
                .filter(|id| snap.read_state().is_unread(id, agent_id))
                .cloned()
                .collect();
            if !unread.is_empty() {
                let index = snap.read_state_mut();
                for id in &unread {
                    index.mark_read(id, agent_id);
                }
            }
            Ok(unread)
        })?;

        for message_id in &marked {
            self.sink.emit(&CoordinationEvent::MessageRead {
                message_id: message_id.clone(),
                agent_id: agent_id.to_string(),
            });
        }
        Ok(marked.len())
    }

    /// The original message followed by all transitive replies, in send order
    pub fn thread(&self, message_id: &str) -> HiveResult<Vec<Message>> {
        let messages = self.store.messages()?;
        if !messages.contains_key(message_id) {
            return Err(HiveError::not_found(EntityKind::Message, message_id));
        }

        // Replies always come after what they reply to, so one pass suffices.
        let mut members: HashSet<&str> = HashSet::new();
        members.insert(message_id);
        let mut thread = Vec::new();
        for message in messages.values() {
            let in_thread = message.id == message_id
                || message
                    .in_reply_to
                    .as_deref()
                    .is_some_and(|parent| members.contains(parent));
            if in_thread {
                members.insert(&message.id);
                thread.push(message.clone());
            }
        }
        Ok(thread)
    }

    /// Most recent messages first
    pub fn history(&self, limit: Option<usize>) -> HiveResult<Vec<Message>> {
        let messages = self.store.messages()?;
        let limit = limit.unwrap_or(messages.len());
        Ok(messages.values().rev().take(limit).cloned().collect())
    }

    /// Recipients of a message, sorted by agent id
    pub fn recipients(&self, message_id: &str) -> HiveResult<Vec<String>> {
        let messages = self.store.messages()?;
        if !messages.contains_key(message_id) {
            return Err(HiveError::not_found(EntityKind::Message, message_id));
        }
        let read_state = self.store.read_state()?;
        Ok(read_state
            .recipients(message_id)
            .into_iter()
            .map(str::to_string)
            .collect())
    }
}

/// Drop the oldest fully-read messages until at most `cap` remain.
/// Unread messages, `keep`, and anything a surviving message replies to are
/// never dropped.
fn prune(snap: &mut Snapshot, cap: usize, keep: &str) -> usize {
    let excess = snap.messages().len().saturating_sub(cap);
    if excess == 0 {
        return 0;
    }

    let mut candidates: Vec<String> = snap
        .messages()
        .keys()
        .filter(|id| id.as_str() != keep && snap.read_state().is_fully_read(id))
        .cloned()
        .collect();
    spare_reply_parents(snap.messages(), &mut candidates);

    // Widen the oldest-first window while the prunable part still fits.
    let mut victims = Vec::new();
    for width in excess.min(candidates.len())..=candidates.len() {
        let mut trial: Vec<String> = candidates.iter().take(width).cloned().collect();
        spare_reply_parents(snap.messages(), &mut trial);
        if trial.len() > excess {
            break;
        }
        victims = trial;
    }

    if victims.is_empty() {
        tracing::debug!(excess, "retention cap exceeded but nothing is fully read");
        return 0;
    }

    let messages = snap.messages_mut();
    for id in &victims {
        messages.shift_remove(id);
    }
    let read_state = snap.read_state_mut();
    for id in &victims {
        read_state.remove(id);
    }
    victims.len()
}

/// Remove from `victims` every message still replied to by a message that
/// stays, until no surviving reply would dangle.
fn spare_reply_parents(messages: &MessageLog, victims: &mut Vec<String>) {
    loop {
        let referenced: HashSet<String> = {
            let doomed: HashSet<&str> = victims.iter().map(String::as_str).collect();
            messages
                .values()
                .filter(|m| !doomed.contains(m.id.as_str()))
                .filter_map(|m| m.in_reply_to.clone())
                .collect()
        };
        let before = victims.len();
        victims.retain(|id| !referenced.contains(id));
        if victims.len() == before {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use crate::registry::Agent;
    use crate::store::StoreOptions;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<DurableStore>,
        sink: Arc<MemorySink>,
        mailbox: Mailbox,
    }

    fn fixture(agent_ids: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DurableStore::open(dir.path(), StoreOptions::default()).unwrap());
        store
            .transaction(|snap| {
                for id in agent_ids {
                    let agent = Agent::new(*id).with_id(*id);
                    snap.agents_mut().insert(agent.id.clone(), agent);
                }
                Ok(())
            })
            .unwrap();
        let sink = Arc::new(MemorySink::new());
        let mailbox = Mailbox::new(Arc::clone(&store), sink.clone());
        Fixture {
            _dir: dir,
            store,
            sink,
            mailbox,
        }
    }

    #[test]
    fn test_direct_message_is_unread_for_recipient_only() {
        let f = fixture(&["a", "b", "c"]);
        let id = f
            .mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!({"q": 1})))
            .unwrap();

        let unread_b = f.mailbox.unread_for("b").unwrap();
        assert_eq!(unread_b.len(), 1);
        assert_eq!(unread_b[0].id, id);
        assert!(f.mailbox.unread_for("c").unwrap().is_empty());
        assert!(f.mailbox.messages_for("a").unwrap().is_empty());
    }

    #[test]
    fn test_broadcast_reaches_every_known_agent() {
        let f = fixture(&["a", "b", "c"]);
        let id = f
            .mailbox
            .send(SendRequest::broadcast("a", MessageType::Notification, json!("hi")))
            .unwrap();

        assert_eq!(f.mailbox.recipients(&id).unwrap(), vec!["a", "b", "c"]);
        for agent in ["a", "b", "c"] {
            assert_eq!(f.mailbox.unread_for(agent).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_read_state_is_per_recipient() {
        let f = fixture(&["a", "b"]);
        let id = f
            .mailbox
            .send(SendRequest::broadcast("a", MessageType::Notification, json!({})))
            .unwrap();

        f.mailbox.mark_read(&id, "a").unwrap();

        assert!(f.mailbox.unread_for("a").unwrap().is_empty());
        let unread_b = f.mailbox.unread_for("b").unwrap();
        assert_eq!(unread_b.len(), 1);
        assert_eq!(unread_b[0].id, id);
        assert_eq!(f.mailbox.messages_for("a").unwrap().len(), 1);
    }

    #[test]
    fn test_mark_read_is_idempotent_and_emits_once() {
        let f = fixture(&["a", "b"]);
        let id = f
            .mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!(null)))
            .unwrap();

        f.mailbox.mark_read(&id, "b").unwrap();
        f.mailbox.mark_read(&id, "b").unwrap();

        assert_eq!(
            f.sink
                .count_matching(|e| matches!(e, CoordinationEvent::MessageRead { .. })),
            1
        );
    }

    #[test]
    fn test_mark_read_for_non_recipient_is_not_found() {
        let f = fixture(&["a", "b", "c"]);
        let id = f
            .mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!(null)))
            .unwrap();

        let err = f.mailbox.mark_read(&id, "c").unwrap_err();
        assert!(matches!(
            err,
            HiveError::NotFound {
                kind: EntityKind::ReadState,
                ..
            }
        ));
        assert!(f.mailbox.mark_read("missing", "b").unwrap_err().is_not_found());
    }

    #[test]
    fn test_send_validates_agents_and_reply_target() {
        let f = fixture(&["a", "b"]);

        let err = f
            .mailbox
            .send(SendRequest::new("ghost", "b", MessageType::Request, json!(null)))
            .unwrap_err();
        assert!(matches!(
            err,
            HiveError::NotFound {
                kind: EntityKind::Agent,
                ..
            }
        ));

        let err = f
            .mailbox
            .send(SendRequest::new("a", "ghost", MessageType::Request, json!(null)))
            .unwrap_err();
        assert!(err.is_not_found());

        let err = f
            .mailbox
            .send(
                SendRequest::new("a", "b", MessageType::Response, json!(null))
                    .with_reply_to("missing"),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            HiveError::NotFound {
                kind: EntityKind::Message,
                ..
            }
        ));

        let err = f
            .mailbox
            .send(SendRequest::new("  ", "b", MessageType::Request, json!(null)))
            .unwrap_err();
        assert!(matches!(err, HiveError::Validation(_)));

        assert!(f.store.messages().unwrap().is_empty());
    }

    #[test]
    fn test_reply_links_to_original_sender() {
        let f = fixture(&["a", "b"]);
        let m1 = f
            .mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!({"q": 1})))
            .unwrap();
        let m2 = f.mailbox.reply(&m1, "b", json!({"a": 2})).unwrap();

        let reply = f.mailbox.get(&m2).unwrap().unwrap();
        assert_eq!(reply.in_reply_to.as_deref(), Some(m1.as_str()));
        assert_eq!(reply.to, MessageTarget::agent("a"));
        assert_eq!(reply.message_type, MessageType::Response);

        let unread_a = f.mailbox.unread_for("a").unwrap();
        assert!(unread_a.iter().any(|m| m.id == m2));

        assert!(f
            .mailbox
            .reply("missing", "b", json!(null))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_thread_follows_transitive_replies() {
        let f = fixture(&["a", "b"]);
        let root = f
            .mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!(1)))
            .unwrap();
        let unrelated = f
            .mailbox
            .send(SendRequest::new("b", "a", MessageType::Request, json!(2)))
            .unwrap();
        let first = f.mailbox.reply(&root, "b", json!(3)).unwrap();
        let second = f.mailbox.reply(&first, "a", json!(4)).unwrap();

        let ids: Vec<String> = f
            .mailbox
            .thread(&root)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![root, first, second]);
        assert!(!ids.contains(&unrelated));
    }

    #[test]
    fn test_share_file_content() {
        let f = fixture(&["a", "b"]);
        let id = f
            .mailbox
            .share_file("a", "b", "src/lib.rs", "entry point")
            .unwrap();

        let message = f.mailbox.get(&id).unwrap().unwrap();
        assert_eq!(message.message_type, MessageType::FileShare);
        assert_eq!(
            message.content,
            json!({"path": "src/lib.rs", "description": "entry point"})
        );
    }

    #[test]
    fn test_messages_keep_send_order_and_increasing_timestamps() {
        let f = fixture(&["a", "b"]);
        let ids: Vec<String> = (0..5)
            .map(|i| {
                f.mailbox
                    .send(SendRequest::new("a", "b", MessageType::Request, json!(i)))
                    .unwrap()
            })
            .collect();

        let received = f.mailbox.messages_for("b").unwrap();
        let received_ids: Vec<String> = received.iter().map(|m| m.id.clone()).collect();
        assert_eq!(received_ids, ids);
        assert!(received.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_mark_all_read() {
        let f = fixture(&["a", "b"]);
        for i in 0..3 {
            f.mailbox
                .send(SendRequest::new("a", "b", MessageType::Request, json!(i)))
                .unwrap();
        }

        assert_eq!(f.mailbox.mark_all_read("b").unwrap(), 3);
        assert_eq!(f.mailbox.mark_all_read("b").unwrap(), 0);
        assert!(f.mailbox.unread_for("b").unwrap().is_empty());
    }

    #[test]
    fn test_retention_drops_only_fully_read_messages() {
        let f = fixture(&["a", "b"]);
        let mailbox = f.mailbox.clone().with_retention(Some(2));

        let first = mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!(1)))
            .unwrap();
        let second = mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!(2)))
            .unwrap();

        // Nothing read yet: the cap is exceeded but nothing may be dropped.
        mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!(3)))
            .unwrap();
        assert_eq!(f.store.messages().unwrap().len(), 3);

        mailbox.mark_read(&first, "b").unwrap();
        mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!(4)))
            .unwrap();

        let remaining = f.store.messages().unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(!remaining.contains_key(&first));
        assert!(remaining.contains_key(&second));
        assert!(f.store.read_state().unwrap().get(&first, "b").is_none());
        assert_eq!(
            f.sink
                .count_matching(|e| matches!(e, CoordinationEvent::MessagesPruned { count: 1 })),
            1
        );
    }

    #[test]
    fn test_retention_keeps_messages_that_replies_point_at() {
        let f = fixture(&["a", "b"]);
        let mailbox = f.mailbox.clone().with_retention(Some(2));

        let question = mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!({"q": 1})))
            .unwrap();
        mailbox.mark_read(&question, "b").unwrap();
        let answer = mailbox.reply(&question, "b", json!({"a": 2})).unwrap();

        // `question` is fully read, but `answer` still replies to it.
        mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!(3)))
            .unwrap();
        let kept = mailbox.get(&answer).unwrap().unwrap();
        assert_eq!(kept.in_reply_to.as_deref(), Some(question.as_str()));
        assert!(mailbox.get(&question).unwrap().is_some());
        assert_eq!(mailbox.thread(&question).unwrap().len(), 2);

        // Once the whole thread is read it can go together.
        mailbox.mark_read(&answer, "a").unwrap();
        mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!(4)))
            .unwrap();
        let remaining = f.store.messages().unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(!remaining.contains_key(&question));
        assert!(!remaining.contains_key(&answer));
    }

    #[test]
    fn test_retention_prunes_read_reply_before_its_parent() {
        let f = fixture(&["a", "b"]);
        let mailbox = f.mailbox.clone().with_retention(Some(3));

        let question = mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!(1)))
            .unwrap();
        mailbox.mark_read(&question, "b").unwrap();
        let answer = mailbox.reply(&question, "b", json!(2)).unwrap();
        mailbox.mark_read(&answer, "a").unwrap();
        let follow_up = mailbox
            .send(SendRequest::new("b", "a", MessageType::Request, json!(3)).with_reply_to(&question))
            .unwrap();

        // One slot to free: `answer` is a read leaf, `question` still has a
        // surviving reply.
        mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!(4)))
            .unwrap();
        let remaining = f.store.messages().unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(remaining.contains_key(&question));
        assert!(remaining.contains_key(&follow_up));
        assert!(!remaining.contains_key(&answer));
        for message in remaining.values() {
            if let Some(parent) = &message.in_reply_to {
                assert!(remaining.contains_key(parent));
            }
        }
    }

    #[test]
    fn test_history_is_most_recent_first() {
        let f = fixture(&["a", "b"]);
        let first = f
            .mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!(1)))
            .unwrap();
        let second = f
            .mailbox
            .send(SendRequest::new("a", "b", MessageType::Request, json!(2)))
            .unwrap();

        let history = f.mailbox.history(Some(1)).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, second);
        assert_eq!(f.mailbox.history(None).unwrap()[1].id, first);
    }

    #[test]
    fn test_unknown_agent_views_are_not_found() {
        let f = fixture(&["a"]);
        assert!(f.mailbox.unread_for("ghost").unwrap_err().is_not_found());
        assert!(f.mailbox.messages_for("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn test_message_wire_format() {
        let message = Message {
            id: "m1".into(),
            from: "a".into(),
            to: MessageTarget::Broadcast,
            message_type: MessageType::TaskUpdate,
            content: json!({"taskId": "t1"}),
            timestamp: Utc::now(),
            in_reply_to: None,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["to"], json!("broadcast"));
        assert_eq!(value["type"], json!("task-update"));
        assert!(value.get("inReplyTo").is_none());

        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back, message);
    }
}
