//! Store root path resolution and directory layout.

use std::{
    env::VarError,
    fmt::{Display, Formatter},
    io,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

/// Advisory lock file guarding the datastore.
pub const LOCK_FILE: &str = "lock";
/// Datastore directory.
pub const DATA_DIR: &str = "data";
/// Parent of both keystore directories.
pub const KEYS_DIR: &str = "keys";
/// EVM keystore directory, under [`KEYS_DIR`].
pub const EVM_KEYS_DIR: &str = "evm";
/// P2P keystore directory, under [`KEYS_DIR`].
pub const P2P_KEYS_DIR: &str = "p2p";

/// Errors from turning a user-supplied string into a [`StorePath`].
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// A `$VAR` in the path is not set or not unicode.
    #[error("failed to expand {raw:?}")]
    Expand {
        raw: String,
        #[source]
        source: shellexpand::LookupError<VarError>,
    },

    /// The path uses `~` but no home directory is known.
    #[error("cannot expand '~' in {0:?}: home directory unknown")]
    NoHome(String),

    /// The path uses `~user`, which is not expanded.
    #[error("cannot expand {0:?}: unknown user")]
    UnknownUser(String),

    /// The path could not be made absolute.
    #[error("cannot make {raw:?} absolute")]
    Absolute {
        raw: String,
        #[source]
        source: io::Error,
    },
}

/// Absolute, lexically cleaned root directory of a store.
///
/// The [`FromStr`] implementation supports shell expansions such as `~` for the home
/// directory and `$VAR` for environment variables. Relative paths are anchored at the
/// current working directory.
///
/// ```text
/// <root>/lock
/// <root>/data/
/// <root>/keys/evm/
/// <root>/keys/p2p/
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath(PathBuf);

impl StorePath {
    /// Resolve a raw, possibly shell-abbreviated path.
    pub fn resolve(raw: &str) -> Result<Self, PathError> {
        let expanded = shellexpand::full(raw).map_err(|source| PathError::Expand {
            raw: raw.to_owned(),
            source,
        })?;

        // shellexpand leaves `~` untouched when it cannot find a home directory, and never
        // expands `~user`.
        if let Some(Component::Normal(first)) = Path::new(&*expanded).components().next()
            && first.as_encoded_bytes().starts_with(b"~")
        {
            return Err(if first == "~" {
                PathError::NoHome(raw.to_owned())
            } else {
                PathError::UnknownUser(raw.to_owned())
            });
        }

        let absolute = std::path::absolute(Path::new(&*expanded)).map_err(|source| {
            PathError::Absolute {
                raw: raw.to_owned(),
                source,
            }
        })?;

        Ok(Self(clean(&absolute)))
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.0
    }

    pub fn lock_file(&self) -> PathBuf {
        self.0.join(LOCK_FILE)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.0.join(DATA_DIR)
    }

    pub fn evm_keys_dir(&self) -> PathBuf {
        self.0.join(KEYS_DIR).join(EVM_KEYS_DIR)
    }

    pub fn p2p_keys_dir(&self) -> PathBuf {
        self.0.join(KEYS_DIR).join(P2P_KEYS_DIR)
    }
}

impl Display for StorePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl FromStr for StorePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}

impl AsRef<Path> for StorePath {
    fn as_ref(&self) -> &Path {
        self.0.as_path()
    }
}

impl From<StorePath> for PathBuf {
    fn from(value: StorePath) -> Self {
        value.0
    }
}

/// Remove `.` and `..` components without touching the filesystem.
///
/// `..` at the root stays at the root.
fn clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(cleaned.components().next_back(), Some(Component::Normal(_))) {
                    cleaned.pop();
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}
