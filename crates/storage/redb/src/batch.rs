//! Atomic write batches.

use bridge_storage::{Encode, Table};

/// A single buffered write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite `key` with `value`.
    Put(Vec<u8>, Vec<u8>),
    /// Remove `key` if present.
    Delete(Vec<u8>),
}

/// Writes applied together in one transaction by [`Database::batch`].
///
/// Operations are applied in insertion order, so a later op on the same key wins.
///
/// [`Database::batch`]: crate::Database::batch
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Put(key.into(), value.into()));
        self
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Delete(key.into()));
        self
    }

    /// Buffers a typed row for table `T`.
    pub fn put_typed<T: Table>(&mut self, key: T::Key, value: T::Value) -> &mut Self {
        let raw_key = T::raw_key(key);
        self.put(raw_key, value.encode())
    }

    /// Buffers removal of a typed row for table `T`.
    pub fn delete_typed<T: Table>(&mut self, key: T::Key) -> &mut Self {
        self.delete(T::raw_key(key))
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}
