//! Database CLI arguments.

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

/// Default file name of the database inside the data directory.
pub const DEFAULT_DB_FILE: &str = "store.redb";

/// Commit durability for write transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Every commit is fsynced before it returns.
    #[default]
    Immediate,
    /// Commits become durable at the next immediate commit or on clean shutdown.
    Eventual,
}

impl From<Durability> for redb::Durability {
    fn from(value: Durability) -> Self {
        match value {
            Durability::Immediate => redb::Durability::Immediate,
            Durability::Eventual => redb::Durability::Eventual,
        }
    }
}

/// Datastore engine configuration.
///
/// The engine keeps every value until it is deleted: there is no TTL, no value-log
/// garbage collection and no background compaction.
#[derive(Debug, Args, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[command(next_help_heading = "Database")]
#[serde(default)]
pub struct DatabaseArgs {
    /// Database page cache size in megabytes.
    #[arg(long = "db.cache", value_name = "MB")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_size_mb: Option<u64>,

    /// Commit durability.
    #[arg(long = "db.durability", value_enum, default_value_t = Durability::Immediate)]
    pub durability: Durability,

    /// Database file name inside the data directory.
    #[arg(long = "db.file", value_name = "NAME", default_value = DEFAULT_DB_FILE)]
    pub file_name: String,
}

impl Default for DatabaseArgs {
    fn default() -> Self {
        Self {
            cache_size_mb: None,
            durability: Durability::Immediate,
            file_name: DEFAULT_DB_FILE.to_owned(),
        }
    }
}

impl DatabaseArgs {
    /// Cache size in bytes, if configured.
    pub fn cache_size_bytes(&self) -> Option<usize> {
        self.cache_size_mb
            .map(|mb| usize::try_from(mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        db: DatabaseArgs,
    }

    #[test]
    fn defaults_match_cli_defaults() {
        let cli = Cli::parse_from(["bridge"]);
        assert_eq!(cli.db, DatabaseArgs::default());
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from([
            "bridge",
            "--db.cache",
            "64",
            "--db.durability",
            "eventual",
            "--db.file",
            "relayer.redb",
        ]);
        assert_eq!(cli.db.cache_size_bytes(), Some(64 * 1024 * 1024));
        assert_eq!(cli.db.durability, Durability::Eventual);
        assert_eq!(cli.db.file_name, "relayer.redb");
    }
}
