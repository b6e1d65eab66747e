//! Store lifecycle errors.

use std::{io, path::PathBuf};

use bridge_keystore::{EvmKeystoreError, P2pKeystoreError};
use bridge_storage_redb::DatabaseError;

use crate::{dirs::DirError, lock::LockError, path::PathError};

/// Errors from [`init`](crate::init), [`Store::open`](crate::Store::open) and
/// [`Store::close`](crate::Store::close).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another handle holds the store lock.
    #[error("store at {} is already opened", .path.display())]
    Opened { path: PathBuf },

    /// A directory required by the requested components is missing.
    #[error("store at {} is not initialized", .path.display())]
    NotInited { path: PathBuf },

    /// The datastore was requested without engine configuration.
    #[error("datastore requested without database configuration")]
    MissingDatabaseConfig,

    #[error(transparent)]
    Resolve(#[from] PathError),

    #[error("failed to {op} {}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Lock(LockError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    EvmKeystore(#[from] EvmKeystoreError),

    #[error(transparent)]
    P2pKeystore(#[from] P2pKeystoreError),
}

impl StoreError {
    /// Whether the store is held by another handle. This is the only transient error.
    pub fn is_opened(&self) -> bool {
        matches!(self, Self::Opened { .. })
    }

    pub fn is_not_inited(&self) -> bool {
        matches!(self, Self::NotInited { .. })
    }
}

impl From<DirError> for StoreError {
    fn from(err: DirError) -> Self {
        Self::Io {
            op: err.op,
            path: err.path,
            source: err.source,
        }
    }
}

/// Contention becomes [`StoreError::Opened`] at the store root; other lock failures
/// keep their detail.
pub(crate) fn from_lock(root: PathBuf, err: LockError) -> StoreError {
    match err {
        LockError::Locked { .. } => StoreError::Opened { path: root },
        other => StoreError::Lock(other),
    }
}
