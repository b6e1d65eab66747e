//! Private-key keystores for the bridge node.
//!
//! Two independent file-backed keystores live under the store root:
//!
//! - [`EvmKeystore`]: secp256k1 signing keys in the Ethereum JSON v3 format (scrypt +
//!   AES-128-CTR), used by the relayer to sign attestations.
//! - [`P2pKeystore`]: libp2p identity keypairs, used for the node's peer identity.
//!
//! Neither keystore takes the store's directory lock. Concurrent use of one keystore
//! directory from several processes is not prevented.

mod evm;
mod p2p;

pub use evm::{EvmKeystore, EvmKeystoreError};
pub use p2p::{P2pKeystore, P2pKeystoreError};

use std::{fs, io, path::Path};

/// Check that `path` is an existing, readable directory.
pub(crate) fn check_dir(path: &Path) -> io::Result<()> {
    let metadata = fs::metadata(path)?;
    if !metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("{} is not a directory", path.display()),
        ));
    }
    fs::read_dir(path)?;
    Ok(())
}

/// Restrict a key file to its owner.
#[cfg(unix)]
pub(crate) fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
pub(crate) fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
