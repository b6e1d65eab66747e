//! Init/open/close lifecycle of the on-disk store.

use bridge_keystore::{EvmKeystore, P2pKeystore};
use bridge_storage_redb::Database;
use tracing::{debug, debug_span, info, warn};

use crate::{
    dirs,
    error::{StoreError, from_lock},
    lock::DirectoryLock,
    options::{InitOptions, OpenOptions},
    path::StorePath,
    retry::{RetryError, Retrier},
};

/// Create the store layout at `path` for the requested components.
///
/// The store lock is held while directories are created, so a concurrent `init` or an
/// open store makes this fail with [`StoreError::Opened`] instead of blocking. Running
/// it again on an initialized, unlocked store is a no-op.
pub fn init(path: &str, opts: InitOptions) -> Result<StorePath, StoreError> {
    let root = StorePath::resolve(path)?;
    let _span = debug_span!("store_init", path = %root).entered();

    dirs::init_root(root.root())?;

    let lock = DirectoryLock::try_acquire(root.lock_file(), "init")
        .map_err(|err| from_lock(root.root().to_path_buf(), err))?;

    let created = create_dirs(&root, opts);
    let unlocked = lock.unlock().map_err(StoreError::Lock);
    created?;
    unlocked?;

    info!(
        path = %root,
        data_store = opts.data_store,
        evm_key_store = opts.evm_key_store,
        p2p_key_store = opts.p2p_key_store,
        "Initialized store"
    );
    Ok(root)
}

fn create_dirs(root: &StorePath, opts: InitOptions) -> Result<(), StoreError> {
    if opts.data_store {
        dirs::init_dir(&root.data_dir())?;
    }
    if opts.evm_key_store {
        dirs::init_private_dir(&root.evm_keys_dir())?;
    }
    if opts.p2p_key_store {
        dirs::init_private_dir(&root.p2p_keys_dir())?;
    }
    Ok(())
}

/// Whether the store at `path` has every directory `opts` requires.
///
/// Never creates anything and never takes the lock. An unresolvable path is logged and
/// reported as not initialized.
pub fn is_init(path: &str, opts: InitOptions) -> bool {
    match StorePath::resolve(path) {
        Ok(root) => is_init_at(&root, opts),
        Err(err) => {
            warn!(path, %err, "Failed to resolve store path");
            false
        }
    }
}

fn is_init_at(root: &StorePath, opts: InitOptions) -> bool {
    let required = [
        (opts.data_store, root.data_dir()),
        (opts.evm_key_store, root.evm_keys_dir()),
        (opts.p2p_key_store, root.p2p_keys_dir()),
    ];

    dirs::exists(root.root())
        && required
            .iter()
            .filter(|(needed, _)| *needed)
            .all(|(_, dir)| dirs::exists(dir))
}

/// An open store.
///
/// Owns the store lock and the datastore when opened with `data_store`, and the
/// requested keystores. Release everything with [`close`](Self::close); dropping the
/// handle releases too, but discards errors.
#[derive(Debug)]
pub struct Store {
    path: StorePath,
    // Declared before `lock` so the engine is dropped first.
    database: Option<Database>,
    lock: Option<DirectoryLock>,
    evm_keystore: Option<EvmKeystore>,
    p2p_keystore: Option<P2pKeystore>,
}

impl Store {
    /// Open the components of the store at `path` named by `opts`.
    ///
    /// Fails with [`StoreError::NotInited`] if a required directory is missing and with
    /// [`StoreError::Opened`] if the datastore is requested while another handle holds
    /// the lock. On any failure everything acquired so far is released.
    pub fn open(path: &str, opts: OpenOptions) -> Result<Self, StoreError> {
        let root = StorePath::resolve(path)?;
        let _span = debug_span!("store_open", path = %root).entered();

        if !is_init_at(&root, InitOptions::from(&opts)) {
            return Err(StoreError::NotInited {
                path: root.into(),
            });
        }

        let mut store = Self {
            path: root,
            database: None,
            lock: None,
            evm_keystore: None,
            p2p_keystore: None,
        };

        if let Err(err) = store.acquire(&opts) {
            debug!(%err, "Open failed, releasing acquired resources");
            if let Err(close_err) = store.close() {
                warn!(%close_err, "Failed to release store after open error");
            }
            return Err(err);
        }

        info!(
            path = %store.path,
            data_store = opts.data_store,
            evm_key_store = opts.evm_key_store,
            p2p_key_store = opts.p2p_key_store,
            "Opened store"
        );
        Ok(store)
    }

    fn acquire(&mut self, opts: &OpenOptions) -> Result<(), StoreError> {
        if opts.data_store {
            let lock = DirectoryLock::try_acquire(self.path.lock_file(), "open")
                .map_err(|err| from_lock(self.path.root().to_path_buf(), err))?;
            self.lock = Some(lock);

            let args = opts
                .database
                .as_ref()
                .ok_or(StoreError::MissingDatabaseConfig)?;
            self.database = Some(Database::open(self.path.data_dir(), args)?);
        }

        if opts.evm_key_store {
            self.evm_keystore = Some(EvmKeystore::open(self.path.evm_keys_dir())?);
        }

        if opts.p2p_key_store {
            self.p2p_keystore = Some(P2pKeystore::open(self.path.p2p_keys_dir())?);
        }

        Ok(())
    }

    /// [`open`](Self::open), retried with backoff while another handle holds the lock.
    ///
    /// Any other error is returned at once.
    pub fn open_with_retry(
        path: &str,
        opts: &OpenOptions,
        retrier: &Retrier,
    ) -> Result<Self, StoreError> {
        retrier
            .run_if(|| Self::open(path, opts.clone()), StoreError::is_opened)
            .map_err(RetryError::into_inner)
    }

    /// Close the datastore, then release the lock.
    ///
    /// Both steps run even if the first fails; the first error is returned. Data and
    /// directories are left in place.
    pub fn close(self) -> Result<(), StoreError> {
        let Self {
            path,
            database,
            lock,
            ..
        } = self;
        let mut first_err = None;

        if let Some(database) = database
            && let Err(err) = database.close()
        {
            warn!(path = %path, %err, "Failed to close datastore");
            first_err.get_or_insert(StoreError::Database(err));
        }

        if let Some(lock) = lock
            && let Err(err) = lock.unlock()
        {
            warn!(path = %path, %err, "Failed to release store lock");
            first_err.get_or_insert(StoreError::Lock(err));
        }

        match first_err {
            Some(err) => Err(err),
            None => {
                debug!(path = %path, "Closed store");
                Ok(())
            }
        }
    }

    /// Resolved store root.
    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// The datastore, if opened.
    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub fn evm_keystore(&self) -> Option<&EvmKeystore> {
        self.evm_keystore.as_ref()
    }

    pub fn p2p_keystore(&self) -> Option<&P2pKeystore> {
        self.p2p_keystore.as_ref()
    }

    /// Whether this handle holds the store lock.
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn root_of(dir: &tempfile::TempDir) -> StorePath {
        StorePath::resolve(dir.path().join("store").to_str().unwrap()).unwrap()
    }

    #[test]
    fn is_init_requires_root() {
        let dir = tempdir().unwrap();
        let root = root_of(&dir);

        assert!(!is_init_at(&root, InitOptions::default()));
        fs::create_dir(root.root()).unwrap();
        assert!(is_init_at(&root, InitOptions::default()));
    }

    #[test]
    fn is_init_checks_each_requested_dir() {
        let dir = tempdir().unwrap();
        let root = root_of(&dir);
        fs::create_dir_all(root.evm_keys_dir()).unwrap();

        let evm_only = InitOptions {
            evm_key_store: true,
            ..Default::default()
        };
        assert!(is_init_at(&root, evm_only));
        assert!(!is_init_at(&root, InitOptions::data_store()));
        assert!(!is_init_at(&root, InitOptions::all()));
    }

    #[test]
    fn is_init_false_on_unresolvable_path() {
        assert!(!is_init(
            "$BRIDGE_STORE_TEST_SURELY_UNSET_VAR/store",
            InitOptions::all()
        ));
    }

    #[test]
    fn create_dirs_only_creates_requested() {
        let dir = tempdir().unwrap();
        let root = root_of(&dir);
        fs::create_dir(root.root()).unwrap();

        create_dirs(
            &root,
            InitOptions {
                p2p_key_store: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert!(root.p2p_keys_dir().is_dir());
        assert!(!root.evm_keys_dir().exists());
        assert!(!root.data_dir().exists());
    }

    #[test]
    fn keystore_only_open_takes_no_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");
        let path = path.to_str().unwrap();
        init(path, InitOptions::all()).unwrap();

        let opts = OpenOptions {
            evm_key_store: true,
            p2p_key_store: true,
            ..Default::default()
        };
        let first = Store::open(path, opts.clone()).unwrap();
        let second = Store::open(path, opts).unwrap();

        assert!(!first.is_locked());
        assert!(first.database().is_none());
        assert!(first.evm_keystore().is_some());
        assert!(second.p2p_keystore().is_some());

        first.close().unwrap();
        second.close().unwrap();
    }
}
