//! EVM keystore backed by alloy's local signer.
//!
//! Each account is one encrypted JSON v3 file named after its lowercase hex address
//! (without `0x`). Decrypted signers are kept in memory between [`EvmKeystore::unlock`]
//! and [`EvmKeystore::lock`].

use alloy_primitives::{Address, B256, Signature};
use alloy_signer::{SignerSync, k256::ecdsa};
use alloy_signer_local::{LocalSignerError, PrivateKeySigner};
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};
use rand_08::RngCore;
use tracing::{debug, info, warn};

/// Errors from the EVM keystore.
#[derive(Debug, thiserror::Error)]
pub enum EvmKeystoreError {
    /// The keystore directory is missing or unreadable.
    #[error("EVM keystore directory {} is not accessible", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No key file exists for the account.
    #[error("account {0} not found")]
    NotFound(Address),

    /// A key file already exists for the account.
    #[error("account {0} already exists")]
    AlreadyExists(Address),

    /// The account must be unlocked first.
    #[error("account {0} is locked")]
    Locked(Address),

    /// Raw key material is not a valid secp256k1 scalar.
    #[error("invalid private key")]
    InvalidKey(#[source] ecdsa::Error),

    /// Encrypting, decrypting or writing the key file failed.
    #[error("keystore file error for account {address}")]
    Keystore {
        address: Address,
        #[source]
        source: LocalSignerError,
    },

    /// A decrypted key file holds a different account than its name says.
    #[error("key file for {expected} decrypts to {actual}")]
    AddressMismatch { expected: Address, actual: Address },

    /// Signing failed.
    #[error("signing failed")]
    Sign(#[from] alloy_signer::Error),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// File-based EVM keystore.
pub struct EvmKeystore {
    path: PathBuf,
    unlocked: RwLock<HashMap<Address, PrivateKeySigner>>,
}

impl std::fmt::Debug for EvmKeystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmKeystore")
            .field("path", &self.path)
            .field("unlocked", &self.unlocked.read().len())
            .finish()
    }
}

impl EvmKeystore {
    /// Open the keystore rooted at `path`. The directory must exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EvmKeystoreError> {
        let path = path.as_ref().to_path_buf();
        crate::check_dir(&path).map_err(|source| EvmKeystoreError::Directory {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "Opened EVM keystore");
        Ok(Self {
            path,
            unlocked: RwLock::new(HashMap::new()),
        })
    }

    /// Keystore directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn key_name(address: &Address) -> String {
        hex::encode(address.as_slice())
    }

    fn key_path(&self, address: &Address) -> PathBuf {
        self.path.join(Self::key_name(address))
    }

    /// Generate a new random account encrypted with `password`.
    pub fn create(&self, password: &str) -> Result<Address, EvmKeystoreError> {
        let key = ecdsa::SigningKey::random(&mut rand_08::thread_rng());
        self.import(key.to_bytes().as_slice(), password)
    }

    /// Store existing raw key material encrypted with `password`.
    pub fn import(&self, private_key: &[u8], password: &str) -> Result<Address, EvmKeystoreError> {
        let address = PrivateKeySigner::from_slice(private_key)
            .map_err(EvmKeystoreError::InvalidKey)?
            .address();
        if self.has(&address) {
            return Err(EvmKeystoreError::AlreadyExists(address));
        }

        // Encrypt under a private temporary name, then link it into place. The link fails
        // if the key file appeared meanwhile, so a concurrent import never overwrites it.
        let mut rng = rand_08::thread_rng();
        let tmp_name = format!(".{}.{:016x}.tmp", Self::key_name(&address), rng.next_u64());
        let tmp_path = self.path.join(&tmp_name);
        PrivateKeySigner::encrypt_keystore(
            &self.path,
            &mut rng,
            private_key,
            password,
            Some(&tmp_name),
        )
        .map_err(|source| EvmKeystoreError::Keystore { address, source })?;

        let linked = crate::restrict_permissions(&tmp_path)
            .and_then(|()| fs::hard_link(&tmp_path, self.key_path(&address)));
        if let Err(err) = fs::remove_file(&tmp_path) {
            warn!(path = %tmp_path.display(), %err, "Failed to remove temporary key file");
        }
        match linked {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(EvmKeystoreError::AlreadyExists(address));
            }
            Err(err) => return Err(err.into()),
        }

        info!(%address, "Stored EVM key");
        Ok(address)
    }

    /// Check if a key file exists for `address`.
    pub fn has(&self, address: &Address) -> bool {
        self.key_path(address).is_file()
    }

    /// All accounts with a key file, sorted.
    pub fn accounts(&self) -> Result<Vec<Address>, EvmKeystoreError> {
        let mut accounts = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().map(str::parse::<Address>) {
                Some(Ok(address)) => accounts.push(address),
                _ => debug!(file = ?name, "Skipping non-key file in EVM keystore"),
            }
        }
        accounts.sort();
        Ok(accounts)
    }

    /// Decrypt the key for `address` and keep it available for signing.
    pub fn unlock(&self, address: &Address, password: &str) -> Result<(), EvmKeystoreError> {
        let path = self.key_path(address);
        if !path.is_file() {
            return Err(EvmKeystoreError::NotFound(*address));
        }

        let signer = PrivateKeySigner::decrypt_keystore(&path, password).map_err(|source| {
            EvmKeystoreError::Keystore {
                address: *address,
                source,
            }
        })?;
        if signer.address() != *address {
            return Err(EvmKeystoreError::AddressMismatch {
                expected: *address,
                actual: signer.address(),
            });
        }

        self.unlocked.write().insert(*address, signer);
        debug!(%address, "Unlocked EVM key");
        Ok(())
    }

    /// Drop the decrypted key for `address`. Returns whether it was unlocked.
    pub fn lock(&self, address: &Address) -> bool {
        self.unlocked.write().remove(address).is_some()
    }

    pub fn is_unlocked(&self, address: &Address) -> bool {
        self.unlocked.read().contains_key(address)
    }

    /// Clone of the unlocked signer for `address`.
    pub fn signer(&self, address: &Address) -> Result<PrivateKeySigner, EvmKeystoreError> {
        self.unlocked
            .read()
            .get(address)
            .cloned()
            .ok_or(EvmKeystoreError::Locked(*address))
    }

    /// Sign a 32-byte digest with the unlocked key for `address`.
    pub fn sign_hash(&self, address: &Address, hash: &B256) -> Result<Signature, EvmKeystoreError> {
        let unlocked = self.unlocked.read();
        let signer = unlocked
            .get(address)
            .ok_or(EvmKeystoreError::Locked(*address))?;
        Ok(signer.sign_hash_sync(hash)?)
    }
}
