//! Store CLI arguments.

use bridge_storage_redb::DatabaseArgs;
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{
    options::{InitOptions, OpenOptions},
    path::{PathError, StorePath},
};

/// Default store root.
pub const DEFAULT_DATADIR: &str = "~/.bridge";

/// Where the store lives and how its datastore is configured.
#[derive(Debug, Args, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[command(next_help_heading = "Store")]
#[serde(default)]
pub struct StoreArgs {
    /// Store root directory. Supports `~` and `$VAR`.
    #[arg(long, value_name = "DIR", default_value = DEFAULT_DATADIR)]
    pub datadir: String,

    #[command(flatten)]
    pub database: DatabaseArgs,
}

impl Default for StoreArgs {
    fn default() -> Self {
        Self {
            datadir: DEFAULT_DATADIR.to_owned(),
            database: DatabaseArgs::default(),
        }
    }
}

impl StoreArgs {
    /// Resolved store root.
    pub fn path(&self) -> Result<StorePath, PathError> {
        StorePath::resolve(&self.datadir)
    }

    /// Options opening every component with the configured datastore.
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions::all(self.database.clone())
    }

    /// Options initializing every component.
    pub fn init_options(&self) -> InitOptions {
        InitOptions::from(&self.open_options())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_storage_redb::Durability;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        store: StoreArgs,
    }

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["bridge"]);
        assert_eq!(cli.store, StoreArgs::default());
        assert_eq!(cli.store.init_options(), InitOptions::all());
    }

    #[test]
    fn parse_flags() {
        let cli = Cli::parse_from([
            "bridge",
            "--datadir",
            "/var/lib/bridge",
            "--db.cache",
            "64",
            "--db.durability",
            "eventual",
        ]);
        assert_eq!(cli.store.datadir, "/var/lib/bridge");
        assert_eq!(cli.store.database.cache_size_mb, Some(64));
        assert_eq!(cli.store.database.durability, Durability::Eventual);

        let path = cli.store.path().unwrap();
        assert_eq!(path.root(), std::path::Path::new("/var/lib/bridge"));

        let opts = cli.store.open_options();
        assert!(opts.data_store && opts.evm_key_store && opts.p2p_key_store);
        assert_eq!(opts.database.as_ref(), Some(&cli.store.database));
    }

    #[test]
    fn deserialize_partial_config() {
        let args: StoreArgs =
            serde_json::from_str(r#"{"datadir":"/srv/bridge","database":{"durability":"eventual"}}"#)
                .unwrap();
        assert_eq!(args.datadir, "/srv/bridge");
        assert_eq!(args.database.durability, Durability::Eventual);
        assert_eq!(args.database.file_name, bridge_storage_redb::DEFAULT_DB_FILE);
    }
}
