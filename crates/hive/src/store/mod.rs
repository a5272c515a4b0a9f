//! Durable Store
//!
//! Persists agents, messages, the read-state index and tasks as JSON files in
//! a shared workspace directory:
//!
//! ```text
//! <workspace>/
//!   agents.json       {"version": n, "records": {agentId: Agent}}
//!   messages.json     {"version": n, "records": {messageId: Message}}   (send order)
//!   read_state.json   {"version": n, "records": {messageId: {agentId: bool}}}
//!   tasks.json        {"version": n, "records": {taskId: Task}}          (creation order)
//!   .lock
//! ```
//!
//! Mutations run through [`DurableStore::transaction`]: take the workspace
//! lock, load every collection from disk, apply the change, write the dirty
//! collections back, release. Files are replaced atomically (temp file in the
//! same directory, fsync, rename), so lock-free readers always see a whole
//! file. Reads go through an in-memory cache keyed by the file's metadata
//! (see `Fingerprint`) and confirmed against the envelope version.
//!
//! Commit order is agents, tasks, read-state, messages. Readers that need a
//! message and its read-state load messages first, so any message they see
//! already has its read-state entries on disk.

mod lock;
mod snapshot;

pub use lock::WorkspaceLock;
pub use snapshot::Snapshot;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;

use crate::error::{HiveError, HiveResult};
use crate::mailbox::{Message, ReadIndex};
use crate::registry::Agent;
use crate::tasks::Task;
use snapshot::Tracked;

/// Agents keyed by id
pub type AgentTable = BTreeMap<String, Agent>;
/// Messages keyed by id, in send order
pub type MessageLog = IndexMap<String, Message>;
/// Tasks keyed by id, in creation order
pub type TaskTable = IndexMap<String, Task>;

const LOCK_FILE: &str = ".lock";

/// One independently loadable/saveable collection of the workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Agents,
    Messages,
    ReadState,
    Tasks,
}

impl Collection {
    /// Order in which dirty collections are written back
    pub const COMMIT_ORDER: [Collection; 4] = [
        Collection::Agents,
        Collection::Tasks,
        Collection::ReadState,
        Collection::Messages,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Collection::Agents => "agents.json",
            Collection::Messages => "messages.json",
            Collection::ReadState => "read_state.json",
            Collection::Tasks => "tasks.json",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// On-disk wrapper around a collection
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u64,
    records: T,
}

/// Identity of a collection file's contents, used to validate cached reads.
/// Every write renames a fresh file into place, so the inode changes too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
    inode: u64,
}

impl Fingerprint {
    fn of(file: &File) -> std::io::Result<Self> {
        let meta = file.metadata()?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
            inode: inode(&meta),
        })
    }
}

#[cfg(unix)]
fn inode(meta: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode(_meta: &fs::Metadata) -> u64 {
    0
}

#[derive(Debug)]
pub(crate) struct Cached<T> {
    fingerprint: Fingerprint,
    version: u64,
    value: Arc<T>,
}

#[derive(Debug, Default)]
pub(crate) struct CollectionCache {
    agents: Option<Cached<AgentTable>>,
    messages: Option<Cached<MessageLog>>,
    read_state: Option<Cached<ReadIndex>>,
    tasks: Option<Cached<TaskTable>>,
}

/// Ties a record type to its collection file and cache slot
pub(crate) trait CollectionData:
    Serialize + DeserializeOwned + Default + Send + Sync + 'static
{
    const COLLECTION: Collection;

    fn cache_slot(cache: &mut CollectionCache) -> &mut Option<Cached<Self>>;
}

impl CollectionData for AgentTable {
    const COLLECTION: Collection = Collection::Agents;

    fn cache_slot(cache: &mut CollectionCache) -> &mut Option<Cached<Self>> {
        &mut cache.agents
    }
}

impl CollectionData for MessageLog {
    const COLLECTION: Collection = Collection::Messages;

    fn cache_slot(cache: &mut CollectionCache) -> &mut Option<Cached<Self>> {
        &mut cache.messages
    }
}

impl CollectionData for ReadIndex {
    const COLLECTION: Collection = Collection::ReadState;

    fn cache_slot(cache: &mut CollectionCache) -> &mut Option<Cached<Self>> {
        &mut cache.read_state
    }
}

impl CollectionData for TaskTable {
    const COLLECTION: Collection = Collection::Tasks;

    fn cache_slot(cache: &mut CollectionCache) -> &mut Option<Cached<Self>> {
        &mut cache.tasks
    }
}

/// Durable Store options
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long a writer waits for the workspace lock before `Conflict`
    pub lock_timeout: Duration,
    /// Pause between lock attempts
    pub retry_interval: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_millis(10),
        }
    }
}

/// File-backed store shared by every agent process using one workspace
#[derive(Debug)]
pub struct DurableStore {
    root: PathBuf,
    options: StoreOptions,
    cache: RwLock<CollectionCache>,
}

impl DurableStore {
    /// Open a workspace, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>, options: StoreOptions) -> HiveResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        tracing::debug!(workspace = %root.display(), "opened durable store");
        Ok(Self {
            root,
            options,
            cache: RwLock::new(CollectionCache::default()),
        })
    }

    /// Workspace directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn collection_path(&self, collection: Collection) -> PathBuf {
        self.root.join(collection.file_name())
    }

    // ========================================================================
    // Snapshot reads
    // ========================================================================

    pub fn agents(&self) -> HiveResult<Arc<AgentTable>> {
        self.read_cached()
    }

    pub fn messages(&self) -> HiveResult<Arc<MessageLog>> {
        self.read_cached()
    }

    pub fn read_state(&self) -> HiveResult<Arc<ReadIndex>> {
        self.read_cached()
    }

    pub fn tasks(&self) -> HiveResult<Arc<TaskTable>> {
        self.read_cached()
    }

    /// Current on-disk version of a collection (0 if never written)
    pub fn version(&self, collection: Collection) -> HiveResult<u64> {
        let version = match collection {
            Collection::Agents => self.read_versioned::<AgentTable>()?.0,
            Collection::Messages => self.read_versioned::<MessageLog>()?.0,
            Collection::ReadState => self.read_versioned::<ReadIndex>()?.0,
            Collection::Tasks => self.read_versioned::<TaskTable>()?.0,
        };
        Ok(version)
    }

    fn read_cached<T: CollectionData>(&self) -> HiveResult<Arc<T>> {
        Ok(self.read_versioned::<T>()?.1)
    }

    fn read_versioned<T: CollectionData>(&self) -> HiveResult<(u64, Arc<T>)> {
        let path = self.collection_path(T::COLLECTION);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok((0, Arc::new(T::default())));
            }
            Err(err) => return Err(err.into()),
        };

        // Metadata comes from the open handle, so it describes exactly the
        // bytes read below even if the file is replaced meanwhile.
        let fingerprint = Fingerprint::of(&file)?;
        {
            let mut cache = self.cache.write();
            if let Some(cached) = T::cache_slot(&mut cache) {
                // Inodes get reused and mtime can be coarse, so the envelope
                // version has the last word.
                if cached.fingerprint == fingerprint
                    && peek_version(&mut file)? == Some(cached.version)
                {
                    return Ok((cached.version, Arc::clone(&cached.value)));
                }
            }
        }

        file.rewind()?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)?;
        let (version, value) = decode::<T>(&raw)?;
        let value = Arc::new(value);

        let mut cache = self.cache.write();
        *T::cache_slot(&mut cache) = Some(Cached {
            fingerprint,
            version,
            value: Arc::clone(&value),
        });
        Ok((version, value))
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Run one atomic read-modify-write cycle.
    ///
    /// The closure sees the latest state of every collection. If it returns
    /// `Ok`, every collection it borrowed mutably is written back before the
    /// lock is released; if it returns `Err`, nothing is written.
    pub fn transaction<T, F>(&self, apply: F) -> HiveResult<T>
    where
        F: FnOnce(&mut Snapshot) -> HiveResult<T>,
    {
        let lock = WorkspaceLock::acquire(
            &self.root.join(LOCK_FILE),
            self.options.lock_timeout,
            self.options.retry_interval,
        )?;

        let mut snapshot = self.load_snapshot()?;
        let value = apply(&mut snapshot)?;
        self.commit(snapshot)?;

        tracing::trace!(held_ms = lock.held_for().as_millis() as u64, "transaction committed");
        Ok(value)
    }

    fn load_snapshot(&self) -> HiveResult<Snapshot> {
        Ok(Snapshot {
            agents: self.load_fresh()?,
            messages: self.load_fresh()?,
            read_state: self.load_fresh()?,
            tasks: self.load_fresh()?,
        })
    }

    fn load_fresh<T: CollectionData>(&self) -> HiveResult<Tracked<T>> {
        let path = self.collection_path(T::COLLECTION);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Tracked::loaded(T::default(), 0));
            }
            Err(err) => return Err(err.into()),
        };
        let (version, value) = decode::<T>(&raw)?;
        Ok(Tracked::loaded(value, version))
    }

    fn commit(&self, snapshot: Snapshot) -> HiveResult<()> {
        let mut written = Vec::new();
        for collection in snapshot.dirty_collections() {
            let result = match collection {
                Collection::Agents => self.write_collection(&snapshot.agents),
                Collection::Messages => self.write_collection(&snapshot.messages),
                Collection::ReadState => self.write_collection(&snapshot.read_state),
                Collection::Tasks => self.write_collection(&snapshot.tasks),
            };

            if let Err(err) = result {
                if written.is_empty() {
                    return Err(err);
                }
                tracing::warn!(
                    ?written,
                    failed = %collection,
                    error = %err,
                    "commit stopped part-way"
                );
                return Err(HiveError::PartialCommit {
                    written,
                    failed: collection,
                    source: Box::new(err),
                });
            }
            written.push(collection);
        }
        Ok(())
    }

    fn write_collection<T: CollectionData + Clone>(&self, tracked: &Tracked<T>) -> HiveResult<()> {
        let version = tracked.version + 1;
        let envelope = Envelope {
            version,
            records: &tracked.value,
        };
        let json = serde_json::to_vec_pretty(&envelope)?;

        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        let file = tmp
            .persist(self.collection_path(T::COLLECTION))
            .map_err(|err| HiveError::Io(err.error))?;

        let fingerprint = Fingerprint::of(&file)?;
        let mut cache = self.cache.write();
        *T::cache_slot(&mut cache) = Some(Cached {
            fingerprint,
            version,
            value: Arc::new(tracked.value.clone()),
        });
        Ok(())
    }
}

fn decode<T: CollectionData>(raw: &str) -> HiveResult<(u64, T)> {
    if raw.trim().is_empty() {
        return Ok((0, T::default()));
    }
    let envelope: Envelope<T> = serde_json::from_str(raw).map_err(|err| HiveError::Corrupt {
        collection: T::COLLECTION,
        reason: err.to_string(),
    })?;
    Ok((envelope.version, envelope.records))
}

/// Bytes read from the head of a collection file to find its version
const VERSION_PEEK_LEN: u64 = 64;

/// The `version` of an envelope, read from the first bytes of the file.
/// `None` when the head does not look like an envelope we wrote.
fn peek_version(file: &mut File) -> std::io::Result<Option<u64>> {
    file.rewind()?;
    let mut head = Vec::new();
    std::io::Read::by_ref(file).take(VERSION_PEEK_LEN).read_to_end(&mut head)?;
    Ok(parse_version_head(&String::from_utf8_lossy(&head)))
}

fn parse_version_head(head: &str) -> Option<u64> {
    let (_, rest) = head.split_once("\"version\":")?;
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Timestamp for a new record that must sort strictly after `floor`
pub(crate) fn stamp_after(floor: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match floor {
        Some(floor) if now <= floor => floor + ChronoDuration::microseconds(1),
        _ => now,
    }
}
