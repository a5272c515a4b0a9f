//! Workspace write lock
//!
//! An advisory exclusive lock on `<workspace>/.lock`. Separate processes (and
//! separate handles inside one process) exclude each other; the lock is
//! released when the guard drops.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{HiveError, HiveResult};

/// Guard for a held workspace lock
#[derive(Debug)]
pub struct WorkspaceLock {
    file: File,
    acquired_at: Instant,
}

impl WorkspaceLock {
    /// Try to take the lock, retrying until `timeout` elapses.
    ///
    /// Fails with `HiveError::Conflict` when another writer holds the lock for
    /// longer than `timeout`.
    pub fn acquire(path: &Path, timeout: Duration, retry_interval: Duration) -> HiveResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let started = Instant::now();
        let deadline = started + timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match file.try_lock_exclusive() {
                Ok(()) => {
                    if attempts > 1 {
                        tracing::debug!(
                            attempts,
                            waited_ms = started.elapsed().as_millis() as u64,
                            "workspace lock acquired after contention"
                        );
                    }
                    return Ok(Self {
                        file,
                        acquired_at: Instant::now(),
                    });
                }
                Err(err) if is_contended(&err) => {
                    if Instant::now() >= deadline {
                        tracing::warn!(
                            attempts,
                            path = %path.display(),
                            "workspace lock still held after timeout"
                        );
                        return Err(HiveError::Conflict(format!(
                            "workspace lock {} held by another writer for more than {}ms",
                            path.display(),
                            timeout.as_millis()
                        )));
                    }
                    thread::sleep(retry_interval);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// How long this guard has been held
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %err, "failed to release workspace lock");
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_handle_conflicts_until_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");

        let first = WorkspaceLock::acquire(&path, Duration::from_millis(50), Duration::from_millis(5))
            .unwrap();

        let second =
            WorkspaceLock::acquire(&path, Duration::from_millis(30), Duration::from_millis(5));
        assert!(matches!(second, Err(HiveError::Conflict(_))));

        drop(first);

        let third =
            WorkspaceLock::acquire(&path, Duration::from_millis(50), Duration::from_millis(5));
        assert!(third.is_ok());
    }

    #[test]
    fn test_waiter_gets_lock_once_holder_releases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");

        let holder = WorkspaceLock::acquire(&path, Duration::from_millis(50), Duration::from_millis(5))
            .unwrap();

        let waiter_path = path.clone();
        let waiter = thread::spawn(move || {
            WorkspaceLock::acquire(&waiter_path, Duration::from_secs(5), Duration::from_millis(5))
                .map(|_| ())
        });

        thread::sleep(Duration::from_millis(50));
        drop(holder);

        assert!(waiter.join().unwrap().is_ok());
    }
}
