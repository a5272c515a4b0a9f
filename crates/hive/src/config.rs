//! Hive configuration
//!
//! Resolution order, later wins:
//! 1. Built-in defaults
//! 2. YAML file (an explicit path, else `<workspace>/config.yaml` if present)
//! 3. Environment (`HIVE_WORKSPACE`, `HIVE_LOCK_TIMEOUT_MS`,
//!    `HIVE_MESSAGE_RETENTION`)
//!
//! 4. A workspace chosen by the caller ([`HiveConfig::load_for`]), which is
//!    also where the config file is looked up
//!
//! Callers such as the CLI apply other flags on top with the `with_*`
//! builders.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HiveError, HiveResult};
use crate::store::StoreOptions;

pub const ENV_WORKSPACE: &str = "HIVE_WORKSPACE";
pub const ENV_LOCK_TIMEOUT_MS: &str = "HIVE_LOCK_TIMEOUT_MS";
pub const ENV_MESSAGE_RETENTION: &str = "HIVE_MESSAGE_RETENTION";

/// File name looked up inside the workspace when no path is given
pub const CONFIG_FILE_NAME: &str = "config.yaml";

const DEFAULT_WORKSPACE: &str = ".hive";

fn default_workspace() -> PathBuf {
    PathBuf::from(DEFAULT_WORKSPACE)
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_lock_retry_interval_ms() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HiveConfig {
    /// Shared workspace directory
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
    /// How long a writer waits for the workspace lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_lock_retry_interval_ms")]
    pub lock_retry_interval_ms: u64,
    /// Keep at most this many messages (unread ones are always kept)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_retention: Option<usize>,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_retry_interval_ms: default_lock_retry_interval_ms(),
            message_retention: None,
        }
    }
}

impl HiveConfig {
    /// Load configuration from `path`, or from the workspace's config file,
    /// then apply environment overrides
    pub fn load(path: Option<&Path>) -> HiveResult<Self> {
        Self::load_for(path, None)
    }

    /// Like [`load`](Self::load), with a caller-chosen workspace that wins
    /// over the environment and the file. Without an explicit `path` the
    /// config file is looked up inside that workspace.
    pub fn load_for(path: Option<&Path>, workspace: Option<&Path>) -> HiveResult<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let dir = match workspace {
                    Some(dir) => dir.to_path_buf(),
                    None => std::env::var_os(ENV_WORKSPACE)
                        .map(PathBuf::from)
                        .unwrap_or_else(default_workspace),
                };
                let candidate = dir.join(CONFIG_FILE_NAME);
                if candidate.is_file() {
                    Self::from_file(&candidate)?
                } else {
                    tracing::debug!(path = %candidate.display(), "no config file, using defaults");
                    Self::default()
                }
            }
        };

        let mut config = config.apply_env()?;
        if let Some(dir) = workspace {
            config.workspace = dir.to_path_buf();
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file
    pub fn from_file(path: &Path) -> HiveResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|err| match err {
            HiveError::Validation(reason) => {
                HiveError::Validation(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })
    }

    pub fn from_yaml(content: &str) -> HiveResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
            .map_err(|err| HiveError::validation(format!("invalid config: {}", err)))
    }

    /// Override fields from `HIVE_*` environment variables
    pub fn apply_env(mut self) -> HiveResult<Self> {
        if let Some(workspace) = std::env::var_os(ENV_WORKSPACE) {
            self.workspace = PathBuf::from(workspace);
        }
        if let Some(timeout) = env_number::<u64>(ENV_LOCK_TIMEOUT_MS)? {
            self.lock_timeout_ms = timeout;
        }
        if let Ok(raw) = std::env::var(ENV_MESSAGE_RETENTION) {
            let raw = raw.trim();
            self.message_retention = if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(parse_number(ENV_MESSAGE_RETENTION, raw)?)
            };
        }
        Ok(self)
    }

    pub fn validate(&self) -> HiveResult<()> {
        if self.workspace.as_os_str().is_empty() {
            return Err(HiveError::validation("workspace must not be empty"));
        }
        if self.lock_timeout_ms == 0 {
            return Err(HiveError::validation("lock_timeout_ms must be positive"));
        }
        if self.lock_retry_interval_ms == 0 {
            return Err(HiveError::validation("lock_retry_interval_ms must be positive"));
        }
        if self.message_retention == Some(0) {
            return Err(HiveError::validation("message_retention must be positive"));
        }
        Ok(())
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    pub fn with_lock_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    pub fn with_message_retention(mut self, retention: Option<usize>) -> Self {
        self.message_retention = retention;
        self
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            retry_interval: Duration::from_millis(self.lock_retry_interval_ms),
        }
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> HiveResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => parse_number(key, raw.trim()).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> HiveResult<T> {
    raw.parse::<T>()
        .map_err(|_| HiveError::validation(format!("{} must be a number, got '{}'", key, raw)))
}
