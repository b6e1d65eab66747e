//! Which parts of a store to initialize or open.

use bridge_storage_redb::DatabaseArgs;

/// Directories [`init`](crate::init) creates and [`is_init`](crate::is_init) requires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// `<root>/data`
    pub data_store: bool,
    /// `<root>/keys/evm`
    pub evm_key_store: bool,
    /// `<root>/keys/p2p`
    pub p2p_key_store: bool,
}

impl InitOptions {
    /// Every component.
    pub const fn all() -> Self {
        Self {
            data_store: true,
            evm_key_store: true,
            p2p_key_store: true,
        }
    }

    /// Only the datastore.
    pub const fn data_store() -> Self {
        Self {
            data_store: true,
            evm_key_store: false,
            p2p_key_store: false,
        }
    }
}

/// Components [`Store::open`](crate::Store::open) acquires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Take the store lock and open the datastore.
    pub data_store: bool,
    /// Engine configuration. Required when `data_store` is set.
    pub database: Option<DatabaseArgs>,
    pub evm_key_store: bool,
    pub p2p_key_store: bool,
}

impl OpenOptions {
    /// Every component, with the given engine configuration.
    pub fn all(database: DatabaseArgs) -> Self {
        Self {
            data_store: true,
            database: Some(database),
            evm_key_store: true,
            p2p_key_store: true,
        }
    }

    /// Only the datastore, with the given engine configuration.
    pub fn data_store(database: DatabaseArgs) -> Self {
        Self {
            data_store: true,
            database: Some(database),
            ..Default::default()
        }
    }
}

impl From<&OpenOptions> for InitOptions {
    fn from(opts: &OpenOptions) -> Self {
        Self {
            data_store: opts.data_store,
            evm_key_store: opts.evm_key_store,
            p2p_key_store: opts.p2p_key_store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_options_map_to_required_dirs() {
        let opts = OpenOptions {
            data_store: true,
            database: None,
            evm_key_store: false,
            p2p_key_store: true,
        };
        assert_eq!(
            InitOptions::from(&opts),
            InitOptions {
                data_store: true,
                evm_key_store: false,
                p2p_key_store: true,
            }
        );

        assert_eq!(
            InitOptions::from(&OpenOptions::all(DatabaseArgs::default())),
            InitOptions::all()
        );
        assert_eq!(
            InitOptions::from(&OpenOptions::data_store(DatabaseArgs::default())),
            InitOptions::data_store()
        );
    }
}
