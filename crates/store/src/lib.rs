//! On-disk store of the bridge node.
//!
//! A store is a directory holding an embedded datastore and two keystores:
//!
//! ```text
//! <root>/lock          advisory lock, held while the datastore is open
//! <root>/data/         datastore files
//! <root>/keys/evm/     EVM signing keys
//! <root>/keys/p2p/     P2P identity keys
//! ```
//!
//! [`init`] creates the layout once, [`Store::open`] acquires the requested components
//! for a session and [`Store::close`] releases them. Only the datastore is guarded by
//! the lock: at most one [`Store`] per host may hold it at a time.
//!
//! Typed rows are defined with [`Table`] and read or written through
//! [`Database::get_typed`] and [`Database::put_typed`].

mod args;
mod dirs;
mod error;
mod lock;
mod options;
mod path;
mod retry;
mod store;

pub use args::{DEFAULT_DATADIR, StoreArgs};
pub use dirs::DirError;
pub use error::StoreError;
pub use lock::{DirectoryLock, LockError, LockMetadata};
pub use options::{InitOptions, OpenOptions};
pub use path::{DATA_DIR, EVM_KEYS_DIR, KEYS_DIR, LOCK_FILE, P2P_KEYS_DIR, PathError, StorePath};
pub use retry::{
    DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, DEFAULT_MULTIPLIER, RetryError,
    Retrier,
};
pub use store::{Store, init, is_init};

pub use bridge_keystore::{EvmKeystore, EvmKeystoreError, P2pKeystore, P2pKeystoreError};
pub use bridge_storage::{Decode, DecodeError, Encode, Table};
pub use bridge_storage_redb::{Database, DatabaseArgs, DatabaseError, Durability, WriteBatch};
