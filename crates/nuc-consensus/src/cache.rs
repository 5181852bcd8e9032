//! Epoch-keyed cache and dataset handles.
//!
//! Verifiers hold `Arc` handles for the duration of a mix; memory is freed
//! when the last borrower drops its handle, never underneath one.

use crate::algorithm::{generate_cache, generate_dataset, seed_hash, EPOCH_LENGTH};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// The verification cache for one epoch.
pub struct EpochCache {
    epoch: u64,
    data: Vec<u32>,
}

impl EpochCache {
    /// Generate the cache of the given byte size for an epoch.
    pub fn generate(epoch: u64, size: u64) -> Self {
        let seed = seed_hash(epoch * EPOCH_LENGTH);
        EpochCache {
            epoch,
            data: generate_cache(size, &seed),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn data(&self) -> &[u32] {
        &self.data
    }
}

/// The full dataset for one epoch. Construction registers the epoch and
/// size only; the expensive materialization happens on demand, possibly on
/// a background thread.
pub struct EpochDataset {
    epoch: u64,
    size: u64,
    full: OnceLock<Vec<u32>>,
    generating: AtomicBool,
}

impl EpochDataset {
    pub fn new(epoch: u64, size: u64) -> Self {
        EpochDataset {
            epoch,
            size,
            full: OnceLock::new(),
            generating: AtomicBool::new(false),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether the dataset is ready for full-speed mixing.
    pub fn generated(&self) -> bool {
        self.full.get().is_some()
    }

    /// Materialize the dataset from the epoch cache. Idempotent; concurrent
    /// callers block on the first materialization.
    pub fn generate(&self, cache: &EpochCache) -> &[u32] {
        self.full.get_or_init(|| generate_dataset(self.size, cache.data()))
    }

    pub fn data(&self) -> Option<&[u32]> {
        self.full.get().map(Vec::as_slice)
    }

    /// Claim the right to generate in the background. Returns true for the
    /// first caller only.
    pub fn claim_generation(&self) -> bool {
        !self.generating.swap(true, Ordering::SeqCst)
    }
}

/// A tiny epoch-keyed LRU of shared handles. The consensus engine keeps a
/// couple of caches and at most one dataset in memory.
pub(crate) struct EpochLru<T> {
    cap: usize,
    entries: Mutex<Vec<(u64, Arc<T>)>>,
}

impl<T> EpochLru<T> {
    pub fn new(cap: usize) -> Self {
        EpochLru {
            cap: cap.max(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Fetch the handle for an epoch, creating it if absent. The returned
    /// handle stays valid after eviction.
    pub fn get_or_insert(&self, epoch: u64, make: impl FnOnce() -> T) -> Arc<T> {
        let mut entries = self.entries.lock();
        if let Some(pos) = entries.iter().position(|(e, _)| *e == epoch) {
            let entry = entries.remove(pos);
            let handle = entry.1.clone();
            entries.push(entry);
            return handle;
        }
        let handle = Arc::new(make());
        entries.push((epoch, handle.clone()));
        if entries.len() > self.cap {
            entries.remove(0);
        }
        handle
    }
}
