//! Exclusive advisory lock on a single file.
//!
//! The lock is host-local and non-blocking: [`DirectoryLock::try_acquire`] either takes
//! it at once or fails with [`LockError::Locked`]. It is released by
//! [`DirectoryLock::unlock`], or by dropping the handle, which closes the descriptor.

use serde::{Deserialize, Serialize};
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, warn};

/// Diagnostic record written into the lock file by its holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMetadata {
    pub pid: u32,
    pub acquired_at_unix: u64,
    /// What the holder is doing, e.g. `"init"` or `"open"`.
    pub holder: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another handle holds the lock.
    #[error("{} is locked{}", .path.display(), describe_holder(.holder.as_ref()))]
    Locked {
        path: PathBuf,
        /// Holder metadata, if the lock file could be read.
        holder: Option<LockMetadata>,
    },

    #[error("lock error on {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn describe_holder(holder: Option<&LockMetadata>) -> String {
    match holder {
        Some(meta) => format!(
            " by {} (pid {}, since unix time {})",
            meta.holder, meta.pid, meta.acquired_at_unix
        ),
        None => String::new(),
    }
}

/// A held exclusive lock.
#[derive(Debug)]
#[must_use = "the lock is released when the handle is dropped"]
pub struct DirectoryLock {
    file: File,
    path: PathBuf,
}

impl DirectoryLock {
    /// Try to take the lock on `path`, creating the file if needed.
    ///
    /// `holder` is recorded in the lock file for contention diagnostics.
    pub fn try_acquire(path: impl AsRef<Path>, holder: &str) -> Result<Self, LockError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        if let Err(err) = try_lock(&file) {
            if err.kind() == io::ErrorKind::WouldBlock {
                return Err(LockError::Locked {
                    holder: read_metadata(&path),
                    path,
                });
            }
            return Err(io_err(err));
        }

        let lock = Self { file, path };
        // Metadata is diagnostic only; a failure to record it does not give up the lock.
        if let Err(err) = lock.write_metadata(holder) {
            warn!(path = %lock.path.display(), %err, "Failed to write lock metadata");
        }

        debug!(path = %lock.path.display(), holder, "Acquired lock");
        Ok(lock)
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock.
    pub fn unlock(self) -> Result<(), LockError> {
        let Self { file, path } = self;
        unlock(&file).map_err(|source| LockError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Released lock");
        Ok(())
    }

    fn write_metadata(&self, holder: &str) -> io::Result<()> {
        let metadata = LockMetadata {
            pid: std::process::id(),
            acquired_at_unix: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            holder: holder.to_owned(),
        };

        let mut file = &self.file;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        serde_json::to_writer(&mut file, &metadata).map_err(io::Error::other)?;
        file.flush()
    }

    /// Reads the metadata through the held handle.
    pub fn metadata(&self) -> io::Result<LockMetadata> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        serde_json::from_str(&contents).map_err(io::Error::other)
    }
}

fn read_metadata(path: &Path) -> Option<LockMetadata> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<()> {
    use rustix::fs::{FlockOperation, flock};

    flock(file, FlockOperation::NonBlockingLockExclusive)
        .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(unix)]
fn unlock(file: &File) -> io::Result<()> {
    use rustix::fs::{FlockOperation, flock};

    flock(file, FlockOperation::Unlock).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(not(unix))]
fn try_lock(file: &File) -> io::Result<()> {
    file.try_lock().map_err(|err| match err {
        std::fs::TryLockError::WouldBlock => io::ErrorKind::WouldBlock.into(),
        std::fs::TryLockError::Error(err) => err,
    })
}

#[cfg(not(unix))]
fn unlock(file: &File) -> io::Result<()> {
    file.unlock()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    #[test]
    fn acquire_creates_file_and_records_holder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lock");

        let lock = DirectoryLock::try_acquire(&path, "test").unwrap();
        assert!(path.exists());
        assert_eq!(lock.path(), path);

        let metadata = lock.metadata().unwrap();
        assert_eq!(metadata.pid, std::process::id());
        assert_eq!(metadata.holder, "test");
    }

    #[test]
    fn second_acquire_fails_fast() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lock");

        let _lock = DirectoryLock::try_acquire(&path, "first").unwrap();
        let err = DirectoryLock::try_acquire(&path, "second").unwrap_err();

        assert_matches!(
            &err,
            LockError::Locked { holder: Some(meta), .. } if meta.holder == "first"
        );
        assert!(err.to_string().contains("by first"));
    }

    #[test]
    fn unlock_allows_reacquire() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lock");

        let lock = DirectoryLock::try_acquire(&path, "first").unwrap();
        lock.unlock().unwrap();

        let lock = DirectoryLock::try_acquire(&path, "second").unwrap();
        assert_eq!(lock.metadata().unwrap().holder, "second");
    }

    #[test]
    fn drop_releases() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lock");

        {
            let _lock = DirectoryLock::try_acquire(&path, "scoped").unwrap();
        }

        DirectoryLock::try_acquire(&path, "after").unwrap().unlock().unwrap();
    }

    #[test]
    fn missing_parent_is_io_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent/lock");

        assert_matches!(
            DirectoryLock::try_acquire(&path, "test"),
            Err(LockError::Io { .. })
        );
    }
}
