//! Row sequence allocator.
//!
//! Row ids are unique per (owner, table). Each sequence leases a block of
//! `bandwidth` ids from the substrate counter at `owner.table` and hands them
//! out locally until the block runs dry. Releasing the allocator returns the
//! unused tail of every block, provided no other allocator leased past it.

use crate::entry::{Owner, check_ident, sequence_key};
use crate::error::{TkvError, TkvResult};
use crate::storage::KvBackend;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cached counter handle for one sequence key.
#[derive(Debug)]
pub struct Sequence {
    key: String,
    next: u64,
    leased: u64,
    bandwidth: u64,
    released: bool,
}

impl Sequence {
    /// Create a handle and lease its first block.
    fn acquire(backend: &dyn KvBackend, key: String, bandwidth: u64) -> TkvResult<Self> {
        let mut seq = Sequence {
            key,
            next: 0,
            leased: 0,
            bandwidth,
            released: false,
        };
        seq.lease(backend)?;
        Ok(seq)
    }

    fn lease(&mut self, backend: &dyn KvBackend) -> TkvResult<()> {
        let start = backend
            .fetch_add(self.key.as_bytes(), self.bandwidth)
            .map_err(|e| allocation_failed(&self.key, e))?;
        self.next = start;
        self.leased = start.saturating_add(self.bandwidth);
        debug!(key = %self.key, start, leased = self.leased, "leased sequence block");
        Ok(())
    }

    fn next(&mut self, backend: &dyn KvBackend) -> TkvResult<u64> {
        if self.released {
            return Err(TkvError::AllocationFailed {
                key: self.key.clone(),
                reason: "sequence released".to_string(),
            });
        }
        if self.next >= self.leased {
            self.lease(backend)?;
        }
        let id = self.next;
        self.next += 1;
        Ok(id)
    }

    fn release(&mut self, backend: &dyn KvBackend) -> TkvResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if self.next < self.leased {
            let returned = backend
                .compare_and_swap(self.key.as_bytes(), self.leased, self.next)
                .map_err(|e| allocation_failed(&self.key, e))?;
            debug!(key = %self.key, returned, "released sequence");
        }
        Ok(())
    }
}

fn allocation_failed(key: &str, err: TkvError) -> TkvError {
    TkvError::AllocationFailed {
        key: key.to_string(),
        reason: err.to_string(),
    }
}

/// Issues row ids for inserts. `next` is the only path that produces them.
pub struct SequenceAllocator {
    backend: Arc<dyn KvBackend>,
    bandwidth: u64,
    /// `None` once released.
    handles: Mutex<Option<AHashMap<String, Arc<Mutex<Sequence>>>>>,
}

impl SequenceAllocator {
    pub fn new(backend: Arc<dyn KvBackend>, bandwidth: u64) -> Self {
        Self {
            backend,
            bandwidth: bandwidth.max(1),
            handles: Mutex::new(Some(AHashMap::new())),
        }
    }

    /// Allocate the next row id for (owner, table).
    pub fn next(&self, owner: &Owner, table: &str) -> TkvResult<u32> {
        owner.validate()?;
        check_ident("table", table)?;
        let key = sequence_key(owner, table);
        let handle = self.handle(&key)?;
        let id = handle.lock().next(self.backend.as_ref())?;
        u32::try_from(id).map_err(|_| TkvError::AllocationFailed {
            key,
            reason: format!("row id {id} exceeds u32 range"),
        })
    }

    /// Check the cache, else create the handle. The map lock covers only
    /// this step.
    fn handle(&self, key: &str) -> TkvResult<Arc<Mutex<Sequence>>> {
        let mut guard = self.handles.lock();
        let handles = guard.as_mut().ok_or_else(|| TkvError::AllocationFailed {
            key: key.to_string(),
            reason: "allocator released".to_string(),
        })?;
        if let Some(handle) = handles.get(key) {
            return Ok(Arc::clone(handle));
        }
        let seq = Sequence::acquire(self.backend.as_ref(), key.to_string(), self.bandwidth)?;
        let handle = Arc::new(Mutex::new(seq));
        handles.insert(key.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Number of cached handles.
    pub fn cached(&self) -> usize {
        self.handles.lock().as_ref().map_or(0, |h| h.len())
    }

    pub fn is_released(&self) -> bool {
        self.handles.lock().is_none()
    }

    /// Return unused leases and invalidate every handle.
    ///
    /// Every handle is released even if one fails; the first error is
    /// returned. Releasing twice is a no-op.
    pub fn release(&self) -> TkvResult<()> {
        let Some(handles) = self.handles.lock().take() else {
            return Ok(());
        };
        let mut first_err = None;
        for (key, handle) in handles {
            if let Err(e) = handle.lock().release(self.backend.as_ref()) {
                warn!(key = %key, error = %e, "failed to release sequence");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn allocator(bandwidth: u64) -> (Arc<dyn KvBackend>, SequenceAllocator) {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
        let alloc = SequenceAllocator::new(Arc::clone(&backend), bandwidth);
        (backend, alloc)
    }

    #[test]
    fn interleaved_sequences_are_independent() {
        let (_, alloc) = allocator(100);
        let root = Owner::Root;
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(alloc.next(&root, "fruits").unwrap());
            ids.push(alloc.next(&root, "cakes").unwrap());
        }
        assert_eq!(ids, vec![0, 0, 1, 1, 2, 2]);
        assert_eq!(alloc.cached(), 2);
    }

    #[test]
    fn owners_do_not_share_sequences() {
        let (_, alloc) = allocator(1);
        assert_eq!(alloc.next(&Owner::Root, "t").unwrap(), 0);
        assert_eq!(alloc.next(&Owner::id("a").unwrap(), "t").unwrap(), 0);
        assert_eq!(alloc.next(&Owner::Root, "t").unwrap(), 1);
    }

    #[test]
    fn dotted_names_cannot_alias_a_sequence() {
        let (_, alloc) = allocator(1);
        assert_eq!(alloc.next(&Owner::id("a").unwrap(), "b").unwrap(), 0);
        // "a.b" + "c" and "a" + "b.c" would both land on key "a.b.c"
        assert!(matches!(
            alloc.next(&Owner::Id("a.b".into()), "c"),
            Err(TkvError::InvalidIdentifier { kind: "owner", .. })
        ));
        assert!(matches!(
            alloc.next(&Owner::id("a").unwrap(), "b.c"),
            Err(TkvError::InvalidIdentifier { kind: "table", .. })
        ));
        assert_eq!(alloc.cached(), 1);
    }

    #[test]
    fn leases_new_block_when_exhausted() {
        let (_, alloc) = allocator(2);
        let ids: Vec<u32> = (0..5).map(|_| alloc.next(&Owner::Root, "t").unwrap()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn release_returns_unused_ids() {
        let (backend, alloc) = allocator(100);
        for _ in 0..3 {
            alloc.next(&Owner::Root, "t").unwrap();
        }
        alloc.release().unwrap();
        let again = SequenceAllocator::new(backend, 100);
        assert_eq!(again.next(&Owner::Root, "t").unwrap(), 3);
    }

    #[test]
    fn two_allocators_never_collide() {
        let (backend, a) = allocator(10);
        let b = SequenceAllocator::new(Arc::clone(&backend), 10);
        let x = a.next(&Owner::Root, "t").unwrap();
        let y = b.next(&Owner::Root, "t").unwrap();
        assert_ne!(x, y);
        // b leased past a, so a cannot hand its tail back
        a.release().unwrap();
        let c = SequenceAllocator::new(backend, 10);
        assert_eq!(c.next(&Owner::Root, "t").unwrap(), 20);
    }

    #[test]
    fn use_after_release_fails() {
        let (_, alloc) = allocator(1);
        alloc.next(&Owner::Root, "t").unwrap();
        alloc.release().unwrap();
        assert!(alloc.is_released());
        assert!(matches!(
            alloc.next(&Owner::Root, "t"),
            Err(TkvError::AllocationFailed { .. })
        ));
        alloc.release().unwrap();
    }

    #[test]
    fn concurrent_allocation_is_unique() {
        let (_, alloc) = allocator(3);
        let alloc = Arc::new(alloc);
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let alloc = Arc::clone(&alloc);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| alloc.next(&Owner::Root, "t").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<u32> = threads
            .into_iter()
            .flat_map(|t| t.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
        assert_eq!(alloc.cached(), 1);
    }
}
