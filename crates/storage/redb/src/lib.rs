//! redb-backed datastore for the bridge node.
//!
//! [`Database`] is a thin adapter over a single redb table holding raw byte keys and
//! values. Typed access goes through [`bridge_storage::Table`] definitions, which
//! namespace rows by key prefix inside that one table.
//!
//! redb is a copy-on-write B-tree: it has no TTL, no value-log garbage collection and no
//! background compaction, so rows persist until explicitly deleted.

mod args;
mod batch;
mod error;

pub use args::{DEFAULT_DB_FILE, DatabaseArgs, Durability};
pub use batch::{BatchOp, WriteBatch};
pub use error::{DatabaseError, DatabaseResult};

use std::path::{Component, Path, PathBuf};

use bridge_storage::{Decode, Encode, Table};
use redb::{ReadableTable, TableDefinition};
use tracing::debug;

/// Table definition for all rows.
/// Key: raw key bytes
/// Value: raw value bytes
const KV_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kv");

/// Embedded key-value datastore.
///
/// Thread-safe for concurrent reads and writes; redb serializes write transactions.
pub struct Database {
    db: redb::Database,
    path: PathBuf,
    durability: redb::Durability,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open or create the datastore inside `dir` using `args`.
    ///
    /// `dir` must already exist. `args.file_name` must name a file directly inside it.
    pub fn open(dir: impl AsRef<Path>, args: &DatabaseArgs) -> DatabaseResult<Self> {
        check_file_name(&args.file_name)?;
        let path = dir.as_ref().join(&args.file_name);

        let mut builder = redb::Builder::new();
        if let Some(bytes) = args.cache_size_bytes() {
            builder.set_cache_size(bytes);
        }
        let db = builder
            .create(&path)
            .map_err(|source| DatabaseError::Open {
                path: path.clone(),
                source,
            })?;

        // Ensure the table exists so read transactions never see it missing.
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(KV_TABLE)?;
        }
        write_txn.commit()?;

        debug!(path = %path.display(), durability = ?args.durability, "Opened datastore");
        Ok(Self {
            db,
            path,
            durability: args.durability.into(),
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &[u8]) -> DatabaseResult<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(KV_TABLE)?;
        Ok(table.get(key)?.map(|value| value.value().to_vec()))
    }

    pub fn contains(&self, key: &[u8]) -> DatabaseResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(KV_TABLE)?;
        Ok(table.get(key)?.is_some())
    }

    /// Insert or overwrite a row.
    pub fn put(&self, key: &[u8], value: &[u8]) -> DatabaseResult<()> {
        let mut write_txn = self.db.begin_write()?;
        write_txn.set_durability(self.durability);
        {
            let mut table = write_txn.open_table(KV_TABLE)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove a row. Returns whether it existed.
    pub fn delete(&self, key: &[u8]) -> DatabaseResult<bool> {
        let mut write_txn = self.db.begin_write()?;
        write_txn.set_durability(self.durability);
        let existed = {
            let mut table = write_txn.open_table(KV_TABLE)?;
            table.remove(key)?.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    /// Apply every op in `batch` atomically.
    ///
    /// Either all writes become visible or, on error, none of them do.
    pub fn batch(&self, batch: WriteBatch) -> DatabaseResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let ops = batch.len();

        let mut write_txn = self.db.begin_write()?;
        write_txn.set_durability(self.durability);
        {
            let mut table = write_txn.open_table(KV_TABLE)?;
            for op in batch.into_ops() {
                match op {
                    BatchOp::Put(key, value) => {
                        table.insert(key.as_slice(), value.as_slice())?;
                    }
                    BatchOp::Delete(key) => {
                        table.remove(key.as_slice())?;
                    }
                }
            }
        }
        // Dropping an uncommitted transaction aborts it.
        write_txn.commit()?;

        debug!(ops, "Committed write batch");
        Ok(())
    }

    /// Visit rows whose key starts with `prefix`, in key order.
    ///
    /// The callback receives each key and value. Return `false` to stop iteration.
    pub fn for_each_prefix<F>(&self, prefix: &[u8], mut callback: F) -> DatabaseResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(KV_TABLE)?;

        for entry in table.range(prefix..)? {
            let (key, value) = entry?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            if !callback(key, value.value()) {
                break;
            }
        }

        Ok(())
    }

    /// Number of rows across all tables.
    pub fn count(&self) -> DatabaseResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(KV_TABLE)?;
        let mut count = 0u64;
        for entry in table.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    pub fn get_typed<T: Table>(&self, key: T::Key) -> DatabaseResult<Option<T::Value>> {
        self.get(&T::raw_key(key))?
            .map(<T::Value as Decode>::decode_owned)
            .transpose()
            .map_err(Into::into)
    }

    pub fn put_typed<T: Table>(&self, key: T::Key, value: T::Value) -> DatabaseResult<()> {
        self.put(&T::raw_key(key), value.encode().as_ref())
    }

    pub fn delete_typed<T: Table>(&self, key: T::Key) -> DatabaseResult<bool> {
        self.delete(&T::raw_key(key))
    }

    /// Visit every row of table `T` in key order. Return `false` to stop.
    ///
    /// Stops with an error at the first row that fails to decode.
    pub fn for_each_typed<T, F>(&self, mut callback: F) -> DatabaseResult<()>
    where
        T: Table,
        F: FnMut(T::Key, T::Value) -> bool,
    {
        let mut decode_error = None;
        self.for_each_prefix(T::PREFIX, |raw_key, raw_value| {
            let row = T::decode_raw_key(raw_key)
                .and_then(|key| <T::Value as Decode>::decode(raw_value).map(|value| (key, value)));
            match row {
                Ok((key, value)) => callback(key, value),
                Err(err) => {
                    decode_error = Some(err);
                    false
                }
            }
        })?;

        match decode_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Close the datastore, releasing the engine's own file lock.
    pub fn close(self) -> DatabaseResult<()> {
        let Self { db, path, .. } = self;
        drop(db);
        debug!(path = %path.display(), "Closed datastore");
        Ok(())
    }
}

fn check_file_name(name: &str) -> DatabaseResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(DatabaseError::InvalidFileName(name.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    #[derive(Debug)]
    struct Nonces;

    impl Table for Nonces {
        const PREFIX: &'static [u8] = b"nonce/";
        type Key = u64;
        type Value = String;
    }

    #[derive(Debug)]
    struct Checkpoints;

    impl Table for Checkpoints {
        const PREFIX: &'static [u8] = b"checkpoint/";
        type Key = String;
        type Value = u64;
    }

    fn open_temp() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), &DatabaseArgs::default()).unwrap();
        (dir, db)
    }

    #[test]
    fn test_open_rejects_file_name_outside_dir() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir(&data).unwrap();

        for name in ["", ".", "..", "../escaped.redb", "/tmp/abs.redb", "nested/db.redb", "db/"] {
            let args = DatabaseArgs {
                file_name: name.to_owned(),
                ..Default::default()
            };
            assert_matches!(
                Database::open(&data, &args),
                Err(DatabaseError::InvalidFileName(_)),
                "file name {name:?} should be rejected"
            );
        }

        assert!(!dir.path().join("escaped.redb").exists());
        assert_eq!(std::fs::read_dir(&data).unwrap().count(), 0);
    }

    #[test]
    fn test_open_custom_file_name() {
        let dir = tempdir().unwrap();
        let args = DatabaseArgs {
            file_name: "relayer.redb".to_owned(),
            ..Default::default()
        };
        let db = Database::open(dir.path(), &args).unwrap();
        assert_eq!(db.path(), dir.path().join("relayer.redb"));
        db.close().unwrap();
    }

    #[test]
    fn test_put_get() {
        let (_dir, db) = open_temp();

        db.put(b"key", b"hello world").unwrap();

        assert_eq!(db.get(b"key").unwrap(), Some(b"hello world".to_vec()));
        assert_eq!(db.get(b"missing").unwrap(), None);
    }

    #[test]
    fn test_overwrite() {
        let (_dir, db) = open_temp();

        db.put(b"key", b"first").unwrap();
        db.put(b"key", b"second").unwrap();

        assert_eq!(db.get(b"key").unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn test_delete() {
        let (_dir, db) = open_temp();

        db.put(b"key", b"data").unwrap();
        assert!(db.contains(b"key").unwrap());

        assert!(db.delete(b"key").unwrap());
        assert!(!db.contains(b"key").unwrap());
        assert!(!db.delete(b"key").unwrap());
    }

    #[test]
    fn test_batch_applies_in_order() {
        let (_dir, db) = open_temp();
        db.put(b"stale", b"x").unwrap();

        let mut batch = WriteBatch::new();
        batch
            .put(b"a".to_vec(), b"1".to_vec())
            .put(b"b".to_vec(), b"2".to_vec())
            .delete(b"stale".to_vec())
            .put(b"a".to_vec(), b"3".to_vec());
        assert_eq!(batch.len(), 4);
        db.batch(batch).unwrap();

        assert_eq!(db.get(b"a").unwrap(), Some(b"3".to_vec()));
        assert_eq!(db.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(db.get(b"stale").unwrap(), None);
        assert_eq!(db.count().unwrap(), 2);
    }

    #[test]
    fn test_prefix_iteration_is_bounded_and_ordered() {
        let (_dir, db) = open_temp();
        db.put(b"nonce/b", b"2").unwrap();
        db.put(b"nonce/a", b"1").unwrap();
        db.put(b"noncf", b"outside").unwrap();
        db.put(b"zzz", b"outside").unwrap();

        let mut seen = Vec::new();
        db.for_each_prefix(b"nonce/", |key, _| {
            seen.push(key.to_vec());
            true
        })
        .unwrap();

        assert_eq!(seen, vec![b"nonce/a".to_vec(), b"nonce/b".to_vec()]);
    }

    #[test]
    fn test_prefix_iteration_stops_early() {
        let (_dir, db) = open_temp();
        for i in 0u8..5 {
            db.put(&[b'p', i], b"v").unwrap();
        }

        let mut count = 0;
        db.for_each_prefix(b"p", |_, _| {
            count += 1;
            count < 2
        })
        .unwrap();

        assert_eq!(count, 2);
    }

    #[test]
    fn test_typed_tables_are_isolated() {
        let (_dir, db) = open_temp();

        db.put_typed::<Nonces>(3, "processed".into()).unwrap();
        db.put_typed::<Nonces>(1, "processed".into()).unwrap();
        db.put_typed::<Checkpoints>("evm".into(), 42).unwrap();

        assert_eq!(
            db.get_typed::<Nonces>(3).unwrap(),
            Some("processed".to_owned())
        );
        assert_eq!(db.get_typed::<Checkpoints>("evm".into()).unwrap(), Some(42));

        let mut nonces = Vec::new();
        db.for_each_typed::<Nonces, _>(|nonce, _| {
            nonces.push(nonce);
            true
        })
        .unwrap();
        assert_eq!(nonces, vec![1, 3]);

        assert!(db.delete_typed::<Nonces>(1).unwrap());
        assert_eq!(db.get_typed::<Nonces>(1).unwrap(), None);
    }

    #[test]
    fn test_typed_decode_failure_surfaces() {
        let (_dir, db) = open_temp();
        db.put(b"checkpoint/evm", b"short").unwrap();

        assert_matches!(
            db.get_typed::<Checkpoints>("evm".into()),
            Err(DatabaseError::Decode(_))
        );
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let args = DatabaseArgs::default();

        let db = Database::open(dir.path(), &args).unwrap();
        db.put_typed::<Nonces>(9, "done".into()).unwrap();
        db.close().unwrap();

        let db = Database::open(dir.path(), &args).unwrap();
        assert_eq!(db.get_typed::<Nonces>(9).unwrap(), Some("done".to_owned()));
        assert_eq!(db.path(), dir.path().join(DEFAULT_DB_FILE));
    }

    #[test]
    fn test_open_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent");

        assert_matches!(
            Database::open(&missing, &DatabaseArgs::default()),
            Err(DatabaseError::Open { .. })
        );
    }
}
