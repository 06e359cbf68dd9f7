//! Storage module — the ordered key-value substrate.
//!
//! The record store depends only on the [`KvBackend`] trait. Two backends
//! ship with the crate: [`SledBackend`] (persistent, sled B+Tree) and
//! [`MemoryBackend`] (BTreeMap, for tests and scratch stores).
//!
//! # Contract
//!
//! - `get`: returns `None` for non-existent keys, never errors on absence.
//! - `scan_prefix`: returns every pair whose key starts with the prefix, in
//!   key order.
//! - `scan_prefixes`: the same for several prefixes, all read from one view.
//!   A batch applied concurrently shows up in every result or in none.
//! - `apply`: applies every operation of a batch atomically.
//! - `fetch_add` / `compare_and_swap`: operate on the separate sequence
//!   keyspace; values are u64 counters.

pub mod disk;
pub mod memory;

pub use disk::SledBackend;
pub use memory::MemoryBackend;

use crate::error::TkvResult;

/// One write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Remove { key: Vec<u8> },
}

/// Ordered group of writes applied as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn remove(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Remove { key: key.into() });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Ordered byte-key store with atomic batches and sequence counters.
///
/// `Send + Sync` is required: one backend is shared by every caller of a
/// [`crate::Store`].
pub trait KvBackend: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> TkvResult<Option<Vec<u8>>>;

    /// Scan all pairs under each prefix, in key order, from one consistent
    /// view of the entries. Results line up with `prefixes`.
    fn scan_prefixes(&self, prefixes: &[&[u8]]) -> TkvResult<Vec<Vec<(Vec<u8>, Vec<u8>)>>>;

    /// Scan all pairs under `prefix` in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> TkvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.scan_prefixes(&[prefix])?.pop().unwrap_or_default())
    }

    /// Apply a batch atomically.
    fn apply(&self, batch: WriteBatch) -> TkvResult<()>;

    /// Insert a single pair.
    fn insert(&self, key: &[u8], value: &[u8]) -> TkvResult<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.apply(batch)
    }

    /// Remove a single key. Absent keys are not an error.
    fn remove(&self, key: &[u8]) -> TkvResult<()> {
        let mut batch = WriteBatch::new();
        batch.remove(key);
        self.apply(batch)
    }

    /// Atomically add `delta` to the sequence counter at `key` (absent = 0)
    /// and return the previous value.
    fn fetch_add(&self, key: &[u8], delta: u64) -> TkvResult<u64>;

    /// Set the sequence counter at `key` to `new` only if it currently holds
    /// `expected`. Returns whether the swap happened.
    fn compare_and_swap(&self, key: &[u8], expected: u64, new: u64) -> TkvResult<bool>;

    /// Flush buffered data to durable storage.
    fn flush(&self) -> TkvResult<()>;
}

pub(crate) fn decode_counter(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[8 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
    u64::from_be_bytes(buf)
}
