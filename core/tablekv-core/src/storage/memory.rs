//! In-memory substrate using BTreeMap.
//!
//! Batches are applied under one write lock, so readers see all of a batch
//! or none of it.

use crate::error::TkvResult;
use crate::storage::{KvBackend, WriteBatch, WriteOp};
use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;

/// In-memory backend, used by tests and throwaway stores.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    sequences: Mutex<AHashMap<Vec<u8>, u64>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> TkvResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn scan_prefixes(&self, prefixes: &[&[u8]]) -> TkvResult<Vec<Vec<(Vec<u8>, Vec<u8>)>>> {
        let entries = self.entries.read();
        Ok(prefixes
            .iter()
            .map(|prefix| {
                entries
                    .range(prefix.to_vec()..)
                    .take_while(|(k, _)| k.starts_with(prefix))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .collect())
    }

    fn apply(&self, batch: WriteBatch) -> TkvResult<()> {
        let mut entries = self.entries.write();
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                WriteOp::Remove { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn fetch_add(&self, key: &[u8], delta: u64) -> TkvResult<u64> {
        let mut sequences = self.sequences.lock();
        let counter = sequences.entry(key.to_vec()).or_insert(0);
        let previous = *counter;
        *counter = previous.saturating_add(delta);
        Ok(previous)
    }

    fn compare_and_swap(&self, key: &[u8], expected: u64, new: u64) -> TkvResult<bool> {
        let mut sequences = self.sequences.lock();
        match sequences.get_mut(key) {
            Some(counter) if *counter == expected => {
                *counter = new;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn flush(&self) -> TkvResult<()> {
        // No-op for in-memory backend
        Ok(())
    }
}
