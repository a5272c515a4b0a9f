//! Hive handle
//!
//! Wires the store, the event sink and the coordination components for one
//! workspace. Each agent process opens its own `Hive`; processes share state
//! only through the workspace directory.

use std::sync::Arc;

use crate::broadcaster::Broadcaster;
use crate::config::HiveConfig;
use crate::error::HiveResult;
use crate::events::{SharedSink, TracingSink};
use crate::mailbox::Mailbox;
use crate::registry::AgentRegistry;
use crate::store::DurableStore;
use crate::tasks::TaskStore;

#[derive(Debug, Clone)]
pub struct Hive {
    config: HiveConfig,
    store: Arc<DurableStore>,
    registry: AgentRegistry,
    mailbox: Mailbox,
    broadcaster: Broadcaster,
    tasks: TaskStore,
}

impl Hive {
    /// Open a workspace, reporting through `tracing`
    pub fn open(config: HiveConfig) -> HiveResult<Self> {
        Self::open_with_sink(config, TracingSink::shared())
    }

    pub fn open_with_sink(config: HiveConfig, sink: SharedSink) -> HiveResult<Self> {
        config.validate()?;
        let store = Arc::new(DurableStore::open(
            &config.workspace,
            config.store_options(),
        )?);

        let mailbox = Mailbox::new(Arc::clone(&store), Arc::clone(&sink))
            .with_retention(config.message_retention);
        let broadcaster = Broadcaster::new(mailbox.clone());
        let registry = AgentRegistry::new(Arc::clone(&store), Arc::clone(&sink), broadcaster.clone());
        let tasks = TaskStore::new(Arc::clone(&store), sink, mailbox.clone());

        Ok(Self {
            config,
            store,
            registry,
            mailbox,
            broadcaster,
            tasks,
        })
    }

    pub fn config(&self) -> &HiveConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<DurableStore> {
        &self.store
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CoordinationEvent, MemorySink};
    use crate::registry::Agent;
    use tempfile::TempDir;

    #[test]
    fn test_open_wires_shared_sink() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MemorySink::new());
        let config = HiveConfig::default().with_workspace(dir.path().join("ws"));
        let hive = Hive::open_with_sink(config, sink.clone()).unwrap();

        hive.registry().register(Agent::new("a").with_id("a")).unwrap();

        assert!(dir.path().join("ws").join("agents.json").exists());
        assert_eq!(
            sink.count_matching(|e| matches!(e, CoordinationEvent::AgentRegistered { .. })),
            1
        );
        assert_eq!(
            sink.count_matching(|e| matches!(e, CoordinationEvent::MessageSent { .. })),
            1
        );
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let config = HiveConfig::default()
            .with_workspace(dir.path())
            .with_lock_timeout_ms(0);
        assert!(Hive::open(config).is_err());
    }
}
