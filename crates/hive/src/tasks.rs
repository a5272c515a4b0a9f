//! Task Store
//!
//! Shared tasks and their lifecycle:
//!
//! ```text
//! assigned -> in_progress -> completed
//!                  |  ^
//!                  v  |
//!                blocked
//! ```
//!
//! Every change is one workspace transaction, so two agents racing the same
//! transition cannot both win. Assignees are kept informed through
//! `task-update` messages sent in the same transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{EntityKind, HiveError, HiveResult};
use crate::events::{CoordinationEvent, SharedSink};
use crate::mailbox::{Delivery, Mailbox, MessageTarget, MessageType, SendRequest};
use crate::store::{DurableStore, Snapshot};
use crate::task_spec::TaskSpec;

// ============================================================================
// Types
// ============================================================================

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Assigned,
    InProgress,
    Completed,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }

    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Assigned, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Blocked)
                | (TaskStatus::Blocked, TaskStatus::InProgress)
        )
    }

    /// Still waiting for work (neither completed nor blocked)
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskStatus::Assigned | TaskStatus::InProgress)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assigned" => Ok(TaskStatus::Assigned),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "blocked" => Ok(TaskStatus::Blocked),
            other => Err(HiveError::validation(format!(
                "unknown task status: {}",
                other
            ))),
        }
    }
}

/// One entry of a task's status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub agent: String,
    pub from: TaskStatus,
    pub to: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

/// A task shared by one or more agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Non-empty, no duplicates, in the order given at creation
    pub assignees: Vec<String>,
    pub status: TaskStatus,
    /// Always within 0..=100
    pub progress: u8,
    /// Set the first time the task enters `in_progress`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Set the first time the task is completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
    /// Incremented by every mutation
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub history: Vec<StatusChange>,
}

impl Task {
    /// A task with more than one assignee
    pub fn is_shared(&self) -> bool {
        self.assignees.len() > 1
    }

    pub fn is_assigned_to(&self, agent_id: &str) -> bool {
        self.assignees.iter().any(|a| a == agent_id)
    }
}

/// Clamp an arbitrary progress value to 0..=100
pub fn clamp_progress(progress: i64) -> u8 {
    progress.clamp(0, 100) as u8
}

/// Collapse duplicate assignees, keeping first occurrence order
fn dedup_assignees<I, S>(assignees: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut unique: Vec<String> = Vec::new();
    for assignee in assignees {
        let assignee = assignee.into();
        if !unique.contains(&assignee) {
            unique.push(assignee);
        }
    }
    unique
}

/// Arguments of a task creation
#[derive(Debug, Clone)]
struct NewTask {
    creator: String,
    assignees: Vec<String>,
    name: String,
    description: String,
    data: Value,
}

// ============================================================================
// Task Store
// ============================================================================

/// Task Store backed by the durable store
#[derive(Debug, Clone)]
pub struct TaskStore {
    store: Arc<DurableStore>,
    sink: SharedSink,
    mailbox: Mailbox,
}

impl TaskStore {
    pub fn new(store: Arc<DurableStore>, sink: SharedSink, mailbox: Mailbox) -> Self {
        Self {
            store,
            sink,
            mailbox,
        }
    }

    /// Create a task; returns its id.
    ///
    /// Shared tasks (more than one assignee) notify every assignee with a
    /// `task-update` message from the creator.
    pub fn create_task<I, S>(
        &self,
        creator: &str,
        assignees: I,
        name: &str,
        description: &str,
        data: Value,
    ) -> HiveResult<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let new_task = NewTask {
            creator: creator.to_string(),
            assignees: dedup_assignees(assignees),
            name: name.to_string(),
            description: description.to_string(),
            data,
        };

        let (task, deliveries) = self
            .store
            .transaction(|snap| self.create_in(snap, new_task))?;
        self.report_created(&task, &deliveries);
        Ok(task.id)
    }

    /// Create one task per parsed spec record, all in one transaction
    pub fn seed_from_specs<I, S>(
        &self,
        creator: &str,
        assignees: I,
        specs: &[TaskSpec],
    ) -> HiveResult<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let assignees = dedup_assignees(assignees);
        let created = self.store.transaction(|snap| {
            specs
                .iter()
                .map(|spec| {
                    let new_task = NewTask {
                        creator: creator.to_string(),
                        assignees: assignees.clone(),
                        name: spec.name.clone(),
                        description: spec.overview.clone(),
                        data: spec.to_task_data(),
                    };
                    self.create_in(snap, new_task)
                })
                .collect::<HiveResult<Vec<_>>>()
        })?;

        Ok(created
            .into_iter()
            .map(|(task, deliveries)| {
                self.report_created(&task, &deliveries);
                task.id
            })
            .collect())
    }

    fn create_in(&self, snap: &mut Snapshot, new_task: NewTask) -> HiveResult<(Task, Vec<Delivery>)> {
        let NewTask {
            creator,
            assignees,
            name,
            description,
            data,
        } = new_task;

        if assignees.is_empty() {
            return Err(HiveError::validation("a task needs at least one assignee"));
        }
        if let Some(blank) = assignees.iter().find(|a| a.trim().is_empty()) {
            return Err(HiveError::validation(format!(
                "assignee id must not be empty: {:?}",
                blank
            )));
        }
        if !snap.agents().contains_key(&creator) {
            return Err(HiveError::not_found(EntityKind::Agent, creator));
        }
        if let Some(unknown) = assignees.iter().find(|a| !snap.agents().contains_key(*a)) {
            return Err(HiveError::not_found(EntityKind::Agent, unknown.clone()));
        }

        let mut id = uuid::Uuid::new_v4().to_string();
        while snap.tasks().contains_key(&id) {
            id = uuid::Uuid::new_v4().to_string();
        }

        let task = Task {
            id: id.clone(),
            name,
            description,
            assignees,
            status: TaskStatus::Assigned,
            progress: 0,
            start_time: None,
            end_time: None,
            created_by: creator,
            created_at: Utc::now(),
            data,
            revision: 0,
            history: Vec::new(),
        };
        snap.tasks_mut().insert(id, task.clone());

        let mut deliveries = Vec::new();
        if task.is_shared() {
            let content = json!({
                "event": "task-assigned",
                "taskId": task.id,
                "name": task.name,
                "description": task.description,
                "assignees": task.assignees,
                "status": task.status,
            });
            for assignee in &task.assignees {
                let request = SendRequest::new(
                    task.created_by.clone(),
                    MessageTarget::agent(assignee.clone()),
                    MessageType::TaskUpdate,
                    content.clone(),
                );
                deliveries.push(self.mailbox.send_in(snap, request)?);
            }
        }
        Ok((task, deliveries))
    }

    fn report_created(&self, task: &Task, deliveries: &[Delivery]) {
        self.sink.emit(&CoordinationEvent::TaskCreated {
            task_id: task.id.clone(),
            creator: task.created_by.clone(),
            assignees: task.assignees.clone(),
        });
        for delivery in deliveries {
            self.mailbox.report(delivery);
        }
    }

    /// Move a task to `status` on behalf of one of its assignees.
    ///
    /// Every other assignee receives a `task-update` from the acting agent.
    pub fn update_status(
        &self,
        task_id: &str,
        agent_id: &str,
        status: TaskStatus,
        message: Option<&str>,
    ) -> HiveResult<Task> {
        self.apply_status(task_id, agent_id, status, message, None)
    }

    /// Like [`update_status`](Self::update_status), but fails with
    /// `Conflict` unless the stored task is still at `expected_revision`
    pub fn update_status_at_revision(
        &self,
        task_id: &str,
        agent_id: &str,
        status: TaskStatus,
        message: Option<&str>,
        expected_revision: u64,
    ) -> HiveResult<Task> {
        self.apply_status(task_id, agent_id, status, message, Some(expected_revision))
    }

    fn apply_status(
        &self,
        task_id: &str,
        agent_id: &str,
        status: TaskStatus,
        message: Option<&str>,
        expected_revision: Option<u64>,
    ) -> HiveResult<Task> {
        let (task, previous, deliveries) = self.store.transaction(|snap| {
            let task = snap
                .tasks_mut()
                .get_mut(task_id)
                .ok_or_else(|| HiveError::not_found(EntityKind::Task, task_id))?;

            if !task.is_assigned_to(agent_id) {
                return Err(HiveError::validation(format!(
                    "agent {} is not assigned to task {}",
                    agent_id, task_id
                )));
            }
            if let Some(expected) = expected_revision {
                if task.revision != expected {
                    return Err(HiveError::Conflict(format!(
                        "task {} is at revision {}, expected {}",
                        task_id, task.revision, expected
                    )));
                }
            }
            let previous = task.status;
            if !previous.can_transition_to(status) {
                return Err(HiveError::InvalidTransition {
                    task_id: task_id.to_string(),
                    from: previous,
                    to: status,
                });
            }

            let now = Utc::now();
            match status {
                TaskStatus::InProgress if task.start_time.is_none() => {
                    task.start_time = Some(now);
                }
                TaskStatus::Completed if task.end_time.is_none() => {
                    task.end_time = Some(crate::store::stamp_after(task.start_time));
                }
                _ => {}
            }
            task.status = status;
            task.revision += 1;
            task.history.push(StatusChange {
                agent: agent_id.to_string(),
                from: previous,
                to: status,
                message: message.map(str::to_string),
                at: now,
            });
            let task = task.clone();

            let content = json!({
                "event": "task-status-changed",
                "taskId": task.id,
                "name": task.name,
                "agent": agent_id,
                "from": previous,
                "status": status,
                "message": message,
            });
            let mut deliveries = Vec::new();
            for assignee in task.assignees.iter().filter(|a| a.as_str() != agent_id) {
                let request = SendRequest::new(
                    agent_id,
                    MessageTarget::agent(assignee.clone()),
                    MessageType::TaskUpdate,
                    content.clone(),
                );
                deliveries.push(self.mailbox.send_in(snap, request)?);
            }
            Ok((task, previous, deliveries))
        })?;

        self.sink.emit(&CoordinationEvent::TaskStatusChanged {
            task_id: task.id.clone(),
            agent_id: agent_id.to_string(),
            from: previous,
            to: status,
        });
        for delivery in &deliveries {
            self.mailbox.report(delivery);
        }
        Ok(task)
    }

    /// Set progress, clamped to 0..=100. Status is unchanged.
    pub fn update_progress(&self, task_id: &str, progress: i64) -> HiveResult<Task> {
        let progress = clamp_progress(progress);
        let task = self.store.transaction(|snap| {
            let task = snap
                .tasks_mut()
                .get_mut(task_id)
                .ok_or_else(|| HiveError::not_found(EntityKind::Task, task_id))?;
            task.progress = progress;
            task.revision += 1;
            Ok(task.clone())
        })?;

        self.sink.emit(&CoordinationEvent::TaskProgressUpdated {
            task_id: task.id.clone(),
            progress,
        });
        Ok(task)
    }

    /// First task of `agent_id` after `current_task_id`, in creation order,
    /// that is neither completed nor blocked.
    ///
    /// Scans from the start when there is no current task or it is not one
    /// of the agent's tasks.
    pub fn next_pending_for(
        &self,
        agent_id: &str,
        current_task_id: Option<&str>,
    ) -> HiveResult<Option<Task>> {
        let tasks = self.tasks_for(agent_id)?;
        let start = current_task_id
            .and_then(|current| tasks.iter().position(|t| t.id == current))
            .map(|index| index + 1)
            .unwrap_or(0);

        Ok(tasks
            .into_iter()
            .skip(start)
            .find(|t| t.status.is_pending()))
    }

    pub fn get(&self, task_id: &str) -> HiveResult<Option<Task>> {
        Ok(self.store.tasks()?.get(task_id).cloned())
    }

    /// Like [`get`](Self::get), but an unknown id is an error
    pub fn require(&self, task_id: &str) -> HiveResult<Task> {
        self.get(task_id)?
            .ok_or_else(|| HiveError::not_found(EntityKind::Task, task_id))
    }

    /// Every task, in creation order
    pub fn list(&self) -> HiveResult<Vec<Task>> {
        Ok(self.store.tasks()?.values().cloned().collect())
    }

    /// Tasks assigned to an agent, in creation order
    pub fn tasks_for(&self, agent_id: &str) -> HiveResult<Vec<Task>> {
        Ok(self
            .store
            .tasks()?
            .values()
            .filter(|t| t.is_assigned_to(agent_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use crate::registry::Agent;
    use crate::store::StoreOptions;
    use tempfile::TempDir;
    use test_case::test_case;

    struct Fixture {
        _dir: TempDir,
        sink: Arc<MemorySink>,
        mailbox: Mailbox,
        tasks: TaskStore,
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
        let tasks = TaskStore::new(store, sink.clone(), mailbox.clone());
        Fixture {
            _dir: dir,
            sink,
            mailbox,
            tasks,
        }
    }

    fn drive(f: &Fixture, task_id: &str, path: &[TaskStatus]) {
        for status in path {
            f.tasks.update_status(task_id, "a", *status, None).unwrap();
        }
    }

    #[test_case(TaskStatus::Assigned, TaskStatus::InProgress, true ; "assigned to in_progress")]
    #[test_case(TaskStatus::InProgress, TaskStatus::Completed, true ; "in_progress to completed")]
    #[test_case(TaskStatus::InProgress, TaskStatus::Blocked, true ; "in_progress to blocked")]
    #[test_case(TaskStatus::Blocked, TaskStatus::InProgress, true ; "blocked recovers")]
    #[test_case(TaskStatus::Assigned, TaskStatus::Completed, false ; "cannot skip work")]
    #[test_case(TaskStatus::Assigned, TaskStatus::Blocked, false ; "cannot block before start")]
    #[test_case(TaskStatus::Assigned, TaskStatus::Assigned, false ; "assigned self loop")]
    #[test_case(TaskStatus::InProgress, TaskStatus::InProgress, false ; "in_progress self loop")]
    #[test_case(TaskStatus::InProgress, TaskStatus::Assigned, false ; "no way back to assigned")]
    #[test_case(TaskStatus::Completed, TaskStatus::InProgress, false ; "completed is terminal")]
    #[test_case(TaskStatus::Completed, TaskStatus::Blocked, false ; "completed cannot block")]
    #[test_case(TaskStatus::Blocked, TaskStatus::Completed, false ; "blocked cannot complete")]
    fn test_transition_table(from: TaskStatus, to: TaskStatus, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test_case(-5, 0 ; "negative clamps to zero")]
    #[test_case(250, 100 ; "overflow clamps to hundred")]
    #[test_case(42, 42 ; "in range is kept")]
    fn test_clamp_progress(input: i64, expected: u8) {
        assert_eq!(clamp_progress(input), expected);
    }

    #[test]
    fn test_create_requires_assignees_and_known_agents() {
        let f = fixture(&["a", "b"]);

        let err = f
            .tasks
            .create_task("a", Vec::<String>::new(), "t", "d", Value::Null)
            .unwrap_err();
        assert!(matches!(err, HiveError::Validation(_)));

        let err = f
            .tasks
            .create_task("a", ["ghost"], "t", "d", Value::Null)
            .unwrap_err();
        assert!(matches!(
            err,
            HiveError::NotFound {
                kind: EntityKind::Agent,
                ..
            }
        ));

        let err = f
            .tasks
            .create_task("ghost", ["a"], "t", "d", Value::Null)
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(f.tasks.list().unwrap().is_empty());
    }

    #[test]
    fn test_shared_task_notifies_every_assignee() {
        let f = fixture(&["a", "b"]);
        let id = f
            .tasks
            .create_task("a", ["a", "b"], "Review", "desc", json!({}))
            .unwrap();

        for agent in ["a", "b"] {
            let unread = f.mailbox.unread_for(agent).unwrap();
            assert_eq!(unread.len(), 1);
            assert_eq!(unread[0].message_type, MessageType::TaskUpdate);
            assert_eq!(unread[0].content["taskId"], json!(id));
        }

        let task = f.tasks.require(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.progress, 0);
        assert!(task.is_shared());
    }

    #[test]
    fn test_single_assignee_task_sends_nothing() {
        let f = fixture(&["a", "b"]);
        f.tasks
            .create_task("a", ["b"], "Solo", "desc", Value::Null)
            .unwrap();
        assert!(f.mailbox.unread_for("b").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_assignees_collapse() {
        let f = fixture(&["a", "b"]);
        let id = f
            .tasks
            .create_task("a", ["b", "a", "b"], "t", "d", Value::Null)
            .unwrap();
        assert_eq!(f.tasks.require(&id).unwrap().assignees, vec!["b", "a"]);
    }

    #[test]
    fn test_lifecycle_stamps_times_once() {
        let f = fixture(&["a"]);
        let id = f.tasks.create_task("a", ["a"], "t", "d", Value::Null).unwrap();

        let started = f
            .tasks
            .update_status(&id, "a", TaskStatus::InProgress, Some("starting"))
            .unwrap();
        let start = started.start_time.unwrap();

        drive(&f, &id, &[TaskStatus::Blocked, TaskStatus::InProgress]);
        let resumed = f.tasks.require(&id).unwrap();
        assert_eq!(resumed.start_time, Some(start));

        let done = f
            .tasks
            .update_status(&id, "a", TaskStatus::Completed, None)
            .unwrap();
        assert!(done.end_time.unwrap() > start);
        assert_eq!(done.history.len(), 4);
        assert_eq!(done.history[0].message.as_deref(), Some("starting"));
        assert_eq!(done.revision, 4);

        let err = f
            .tasks
            .update_status(&id, "a", TaskStatus::Blocked, None)
            .unwrap_err();
        assert!(matches!(
            err,
            HiveError::InvalidTransition {
                from: TaskStatus::Completed,
                to: TaskStatus::Blocked,
                ..
            }
        ));
    }

    #[test]
    fn test_update_status_checks() {
        let f = fixture(&["a", "b", "c"]);
        let id = f
            .tasks
            .create_task("a", ["a", "b"], "t", "d", Value::Null)
            .unwrap();

        assert!(f
            .tasks
            .update_status("missing", "a", TaskStatus::InProgress, None)
            .unwrap_err()
            .is_not_found());

        let err = f
            .tasks
            .update_status(&id, "c", TaskStatus::InProgress, None)
            .unwrap_err();
        assert!(matches!(err, HiveError::Validation(_)));

        let err = f
            .tasks
            .update_status_at_revision(&id, "a", TaskStatus::InProgress, None, 7)
            .unwrap_err();
        assert!(err.is_retryable());

        f.tasks
            .update_status_at_revision(&id, "a", TaskStatus::InProgress, None, 0)
            .unwrap();
        assert_eq!(f.tasks.require(&id).unwrap().status, TaskStatus::InProgress);
    }

    #[test]
    fn test_status_change_notifies_other_assignees_only() {
        let f = fixture(&["a", "b", "c"]);
        let id = f
            .tasks
            .create_task("a", ["a", "b", "c"], "t", "d", Value::Null)
            .unwrap();
        f.mailbox.mark_all_read("a").unwrap();
        f.mailbox.mark_all_read("b").unwrap();
        f.mailbox.mark_all_read("c").unwrap();

        f.tasks
            .update_status(&id, "b", TaskStatus::InProgress, Some("on it"))
            .unwrap();

        assert!(f.mailbox.unread_for("b").unwrap().is_empty());
        for agent in ["a", "c"] {
            let unread = f.mailbox.unread_for(agent).unwrap();
            assert_eq!(unread.len(), 1);
            assert_eq!(unread[0].from, "b");
            assert_eq!(unread[0].content["status"], json!("in_progress"));
            assert_eq!(unread[0].content["message"], json!("on it"));
        }
        assert_eq!(
            f.sink
                .count_matching(|e| matches!(e, CoordinationEvent::TaskStatusChanged { .. })),
            1
        );
    }

    #[test]
    fn test_update_progress_clamps_and_keeps_status() {
        let f = fixture(&["a"]);
        let id = f.tasks.create_task("a", ["a"], "t", "d", Value::Null).unwrap();

        assert_eq!(f.tasks.update_progress(&id, 250).unwrap().progress, 100);
        let task = f.tasks.update_progress(&id, -5).unwrap();
        assert_eq!(task.progress, 0);
        assert_eq!(task.status, TaskStatus::Assigned);
        assert!(f.tasks.update_progress("missing", 10).unwrap_err().is_not_found());
    }

    #[test]
    fn test_next_pending_for_skips_finished_tasks() {
        let f = fixture(&["a", "b"]);
        let t1 = f.tasks.create_task("a", ["a"], "one", "", Value::Null).unwrap();
        let t2 = f.tasks.create_task("a", ["a"], "two", "", Value::Null).unwrap();
        let t3 = f.tasks.create_task("a", ["a"], "three", "", Value::Null).unwrap();
        f.tasks.create_task("a", ["b"], "other", "", Value::Null).unwrap();

        drive(&f, &t2, &[TaskStatus::InProgress, TaskStatus::Blocked]);

        let next = |current: Option<&str>| {
            f.tasks
                .next_pending_for("a", current)
                .unwrap()
                .map(|t| t.id)
        };
        assert_eq!(next(None), Some(t1.clone()));
        assert_eq!(next(Some(t1.as_str())), Some(t3.clone()));
        assert_eq!(next(Some(t3.as_str())), None);
        assert_eq!(next(Some("not-mine")), Some(t1));
        assert!(f.tasks.next_pending_for("nobody", None).unwrap().is_none());
    }

    #[test]
    fn test_tasks_for_keeps_creation_order() {
        let f = fixture(&["a", "b"]);
        let first = f.tasks.create_task("a", ["a", "b"], "1", "", Value::Null).unwrap();
        f.tasks.create_task("a", ["a"], "2", "", Value::Null).unwrap();
        let third = f.tasks.create_task("b", ["b"], "3", "", Value::Null).unwrap();

        let ids: Vec<String> = f.tasks.tasks_for("b").unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![first, third]);
        assert_eq!(f.tasks.list().unwrap().len(), 3);
    }

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("in_progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert!("done".parse::<TaskStatus>().is_err());
        assert_eq!(TaskStatus::Blocked.to_string(), "blocked");
        assert_eq!(
            serde_json::to_value(TaskStatus::InProgress).unwrap(),
            json!("in_progress")
        );
    }
}
