//! Directory creation helpers.

use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::trace;

/// Probe file written into the root to check write permission.
const WRITE_PROBE: &str = ".write-probe";

/// Failed directory operation, with the path and what was being done to it.
#[derive(Debug, thiserror::Error)]
#[error("failed to {op} {}", .path.display())]
pub struct DirError {
    pub op: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl DirError {
    fn new(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Create the store root if absent and check it is writable.
///
/// A probe file is created and removed again; it is never left behind on success.
pub(crate) fn init_root(path: &Path) -> Result<(), DirError> {
    fs::create_dir_all(path).map_err(|e| DirError::new("create directory", path, e))?;

    let probe = path.join(WRITE_PROBE);
    fs::write(&probe, b"").map_err(|e| DirError::new("write to", path, e))?;
    fs::remove_file(&probe).map_err(|e| DirError::new("remove probe file", &probe, e))?;

    trace!(path = %path.display(), "Store root is writable");
    Ok(())
}

/// Create `path` and any missing parents. No-op if it already exists.
pub(crate) fn init_dir(path: &Path) -> Result<(), DirError> {
    fs::create_dir_all(path).map_err(|e| DirError::new("create directory", path, e))
}

/// Like [`init_dir`], but new directories are readable only by the owner on Unix.
pub(crate) fn init_private_dir(path: &Path) -> Result<(), DirError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(path)
        .map_err(|e| DirError::new("create directory", path, e))
}

/// Whether any filesystem entry exists at `path`.
pub(crate) fn exists(path: &Path) -> bool {
    // symlink_metadata so a dangling link still counts as an entry.
    fs::symlink_metadata(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_root_creates_nested_and_leaves_no_probe() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("a/b/store");

        init_root(&root).unwrap();

        assert!(root.is_dir());
        assert!(!exists(&root.join(WRITE_PROBE)));
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn init_root_fails_on_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, b"").unwrap();

        let err = init_root(&file).unwrap_err();
        assert_eq!(err.op, "create directory");
        assert_eq!(err.path, file);
    }

    #[cfg(unix)]
    #[test]
    fn init_root_fails_when_read_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let root = dir.path().join("ro");
        fs::create_dir(&root).unwrap();
        fs::set_permissions(&root, fs::Permissions::from_mode(0o500)).unwrap();

        // Root ignores permission bits; nothing to check there.
        let probe_allowed = fs::write(root.join("x"), b"").is_ok();
        if !probe_allowed {
            let err = init_root(&root).unwrap_err();
            assert_eq!(err.op, "write to");
            assert!(!exists(&root.join(WRITE_PROBE)));
        }

        fs::set_permissions(&root, fs::Permissions::from_mode(0o700)).unwrap();
    }

    #[test]
    fn init_dir_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");

        init_dir(&path).unwrap();
        fs::write(path.join("keep"), b"x").unwrap();
        init_dir(&path).unwrap();

        assert!(path.join("keep").exists());
    }

    #[cfg(unix)]
    #[test]
    fn private_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("keys/evm");
        init_private_dir(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn exists_reports_entries() {
        let dir = tempdir().unwrap();
        assert!(exists(dir.path()));
        assert!(!exists(&dir.path().join("nope")));
    }
}
