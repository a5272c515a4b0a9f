//! Transaction snapshot
//!
//! The state a single read-modify-write cycle works on. Every collection is
//! loaded fresh from disk under the workspace lock; mutable accessors mark
//! the collection dirty so only changed files are rewritten.

use super::{AgentTable, Collection, MessageLog, TaskTable};
use crate::mailbox::ReadIndex;

/// A loaded collection plus its on-disk version
#[derive(Debug, Clone, Default)]
pub(crate) struct Tracked<T> {
    pub(crate) value: T,
    pub(crate) version: u64,
    pub(crate) dirty: bool,
}

impl<T> Tracked<T> {
    pub(crate) fn loaded(value: T, version: u64) -> Self {
        Self {
            value,
            version,
            dirty: false,
        }
    }

    fn get_mut(&mut self) -> &mut T {
        self.dirty = true;
        &mut self.value
    }
}

/// Latest state of every collection inside one transaction
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub(crate) agents: Tracked<AgentTable>,
    pub(crate) messages: Tracked<MessageLog>,
    pub(crate) read_state: Tracked<ReadIndex>,
    pub(crate) tasks: Tracked<TaskTable>,
}

impl Snapshot {
    pub fn agents(&self) -> &AgentTable {
        &self.agents.value
    }

    pub fn agents_mut(&mut self) -> &mut AgentTable {
        self.agents.get_mut()
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages.value
    }

    pub fn messages_mut(&mut self) -> &mut MessageLog {
        self.messages.get_mut()
    }

    pub fn read_state(&self) -> &ReadIndex {
        &self.read_state.value
    }

    pub fn read_state_mut(&mut self) -> &mut ReadIndex {
        self.read_state.get_mut()
    }

    pub fn tasks(&self) -> &TaskTable {
        &self.tasks.value
    }

    pub fn tasks_mut(&mut self) -> &mut TaskTable {
        self.tasks.get_mut()
    }

    /// Collections touched so far, in commit order
    pub fn dirty_collections(&self) -> Vec<Collection> {
        Collection::COMMIT_ORDER
            .into_iter()
            .filter(|c| self.is_dirty(*c))
            .collect()
    }

    fn is_dirty(&self, collection: Collection) -> bool {
        match collection {
            Collection::Agents => self.agents.dirty,
            Collection::Messages => self.messages.dirty,
            Collection::ReadState => self.read_state.dirty,
            Collection::Tasks => self.tasks.dirty,
        }
    }
}
