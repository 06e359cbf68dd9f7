//! sled-backed persistent substrate.
//!
//! Entries live in the `entries` tree; row sequence counters live in the
//! `sequences` tree so the two key namespaces never interleave in scans.

use crate::error::TkvResult;
use crate::storage::{KvBackend, WriteBatch, WriteOp, decode_counter};
use parking_lot::RwLock;
use std::path::Path;
use tracing::{debug, info};

const ENTRIES_TREE: &str = "entries";
const SEQUENCES_TREE: &str = "sequences";

/// Persistent storage with B+Tree indexing.
///
/// sled iterators do not share a snapshot, so batches and multi-prefix scans
/// are serialized through `view`. Every write to `entries` goes through
/// [`KvBackend::apply`].
pub struct SledBackend {
    db: sled::Db,
    entries: sled::Tree,
    sequences: sled::Tree,
    view: RwLock<()>,
}

impl SledBackend {
    /// Open or create a store in the given directory.
    pub fn open(path: &Path) -> TkvResult<Self> {
        info!("opening sled store at {:?}", path);
        Self::from_db(sled::open(path)?)
    }

    /// Open a temporary store (for testing). Data is deleted on drop.
    pub fn open_temporary() -> TkvResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> TkvResult<Self> {
        let entries = db.open_tree(ENTRIES_TREE)?;
        let sequences = db.open_tree(SEQUENCES_TREE)?;
        Ok(Self {
            db,
            entries,
            sequences,
            view: RwLock::new(()),
        })
    }
}

impl KvBackend for SledBackend {
    fn get(&self, key: &[u8]) -> TkvResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key)?.map(|ivec| ivec.to_vec()))
    }

    fn scan_prefixes(&self, prefixes: &[&[u8]]) -> TkvResult<Vec<Vec<(Vec<u8>, Vec<u8>)>>> {
        let _view = self.view.read();
        let mut results = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            let mut result = Vec::new();
            for item in self.entries.scan_prefix(prefix) {
                let (k, v) = item?;
                result.push((k.to_vec(), v.to_vec()));
            }
            results.push(result);
        }
        Ok(results)
    }

    fn apply(&self, batch: WriteBatch) -> TkvResult<()> {
        let len = batch.len();
        let mut sled_batch = sled::Batch::default();
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { key, value } => sled_batch.insert(key, value),
                WriteOp::Remove { key } => sled_batch.remove(key),
            }
        }
        {
            let _view = self.view.write();
            self.entries.apply_batch(sled_batch)?;
        }
        debug!(ops = len, "applied batch");
        Ok(())
    }

    fn fetch_add(&self, key: &[u8], delta: u64) -> TkvResult<u64> {
        let previous = self.sequences.fetch_and_update(key, |old| {
            let current = old.map(decode_counter).unwrap_or(0);
            Some(current.saturating_add(delta).to_be_bytes().to_vec())
        })?;
        Ok(previous.map(|ivec| decode_counter(&ivec)).unwrap_or(0))
    }

    fn compare_and_swap(&self, key: &[u8], expected: u64, new: u64) -> TkvResult<bool> {
        let swapped = self.sequences.compare_and_swap(
            key,
            Some(expected.to_be_bytes().to_vec()),
            Some(new.to_be_bytes().to_vec()),
        )?;
        Ok(swapped.is_ok())
    }

    fn flush(&self) -> TkvResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
