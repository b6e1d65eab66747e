//! P2P identity keystore.
//!
//! Keys are libp2p [`Keypair`]s stored one per file, protobuf-encoded, under a
//! caller-chosen name.

use libp2p::{
    PeerId,
    identity::{DecodingError, Keypair},
};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Errors from the P2P keystore.
#[derive(Debug, thiserror::Error)]
pub enum P2pKeystoreError {
    /// The keystore directory is missing or unreadable.
    #[error("P2P keystore directory {} is not accessible", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Key names must be non-empty, must not start with `.` and must not contain a path
    /// separator.
    #[error("invalid key name {0:?}")]
    InvalidName(String),

    #[error("key {0:?} not found")]
    NotFound(String),

    #[error("key {0:?} already exists")]
    AlreadyExists(String),

    /// The stored bytes are not a valid keypair encoding.
    #[error("key {name:?} is malformed")]
    Decoding {
        name: String,
        #[source]
        source: DecodingError,
    },

    /// Filesystem error on a key file.
    #[error("io error on {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// File-based libp2p keystore.
#[derive(Debug, Clone)]
pub struct P2pKeystore {
    path: PathBuf,
}

impl P2pKeystore {
    /// Open the keystore rooted at `path`. The directory must exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, P2pKeystoreError> {
        let path = path.as_ref().to_path_buf();
        crate::check_dir(&path).map_err(|source| P2pKeystoreError::Directory {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "Opened P2P keystore");
        Ok(Self { path })
    }

    /// Keystore directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn validate_name(name: &str) -> Result<(), P2pKeystoreError> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(P2pKeystoreError::InvalidName(name.to_owned()));
        }
        Ok(())
    }

    fn key_path(&self, name: &str) -> Result<PathBuf, P2pKeystoreError> {
        Self::validate_name(name)?;
        Ok(self.path.join(name))
    }

    /// Check if a key is stored under `name`.
    pub fn has(&self, name: &str) -> Result<bool, P2pKeystoreError> {
        Ok(self.key_path(name)?.is_file())
    }

    /// Store `keypair` under `name`. Never overwrites an existing key.
    pub fn put(&self, name: &str, keypair: &Keypair) -> Result<(), P2pKeystoreError> {
        let path = self.key_path(name)?;
        let encoded = keypair
            .to_protobuf_encoding()
            .map_err(|source| P2pKeystoreError::Decoding {
                name: name.to_owned(),
                source,
            })?;

        let io_err = |source| P2pKeystoreError::Io {
            path: path.clone(),
            source,
        };

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = match options.open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(P2pKeystoreError::AlreadyExists(name.to_owned()));
            }
            Err(err) => return Err(io_err(err)),
        };
        if let Err(err) = file.write_all(&encoded).and_then(|()| file.sync_all()) {
            // Don't leave a truncated key behind.
            let _ = fs::remove_file(&path);
            return Err(io_err(err));
        }

        info!(key = name, peer_id = %keypair.public().to_peer_id(), "Stored P2P key");
        Ok(())
    }

    /// Load the keypair stored under `name`.
    pub fn get(&self, name: &str) -> Result<Keypair, P2pKeystoreError> {
        let path = self.key_path(name)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(P2pKeystoreError::NotFound(name.to_owned()));
            }
            Err(source) => return Err(P2pKeystoreError::Io { path, source }),
        };

        Keypair::from_protobuf_encoding(&bytes).map_err(|source| P2pKeystoreError::Decoding {
            name: name.to_owned(),
            source,
        })
    }

    /// Remove the key stored under `name`.
    pub fn delete(&self, name: &str) -> Result<(), P2pKeystoreError> {
        let path = self.key_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(key = name, "Deleted P2P key");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(P2pKeystoreError::NotFound(name.to_owned()))
            }
            Err(source) => Err(P2pKeystoreError::Io { path, source }),
        }
    }

    /// Names of all stored keys, sorted.
    pub fn list(&self) -> Result<Vec<String>, P2pKeystoreError> {
        let io_err = |source| P2pKeystoreError::Io {
            path: self.path.clone(),
            source,
        };

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if !entry.file_type().map_err(io_err)?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && Self::validate_name(name).is_ok()
            {
                names.push(name.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Generate a fresh ed25519 identity, store it under `name` and return its peer id.
    pub fn generate_ed25519(&self, name: &str) -> Result<PeerId, P2pKeystoreError> {
        let keypair = Keypair::generate_ed25519();
        self.put(name, &keypair)?;
        Ok(keypair.public().to_peer_id())
    }
}
