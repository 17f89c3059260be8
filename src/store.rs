//! Dataset store with atomic hot swap of the city/ASN reader pair.
//!
//! The active [`DatasetSet`] lives behind a reader/writer lock:
//! - lookups take the shared side for the whole query, so a lookup that
//!   started before a swap finishes against the old pair
//! - files are opened in [`DatasetStore::load`] without holding the lock
//! - [`DatasetStore::swap`] holds the exclusive side only for the handle
//!   replacement; the replaced pair is dropped after the lock is released

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dataset::{DatasetPaths, DatasetReader, DatasetSet, MmdbReader};
use crate::error::LoadError;

/// Owner of the currently active dataset pair.
pub struct DatasetStore<R = MmdbReader> {
    current: RwLock<Option<DatasetSet<R>>>,
    /// Incremented on every successful swap.
    generation: AtomicU64,
}

impl<R: DatasetReader> Default for DatasetStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: DatasetReader> DatasetStore<R> {
    /// Create an empty store. Lookups fail until a pair is swapped in.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Open both dataset files into a new, not yet installed pair.
    ///
    /// The active pair is not touched, whether this succeeds or not.
    pub fn load(&self, paths: &DatasetPaths) -> Result<DatasetSet<R>, LoadError> {
        DatasetSet::open(paths)
    }

    /// Install `set` as the active pair and close the previous one.
    ///
    /// Returns the new generation number.
    pub fn swap(&self, set: DatasetSet<R>) -> u64 {
        let city_epoch = set.city().build_epoch();
        let asn_epoch = set.asn().build_epoch();

        let (previous, generation) = {
            let mut guard = self.current.write();
            let previous = guard.replace(set);
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (previous, generation)
        };

        // No lookup can reach the old pair once the write guard is gone.
        let replaced = previous.is_some();
        drop(previous);

        log::info!(
            "Installed datasets generation {} (city build {:?}, asn build {:?}, replaced: {})",
            generation,
            city_epoch,
            asn_epoch,
            replaced
        );
        generation
    }

    /// Open the pair at `paths` and swap it in.
    pub fn reload(&self, paths: &DatasetPaths) -> Result<u64, LoadError> {
        let set = self.load(paths)?;
        Ok(self.swap(set))
    }

    /// Run `f` against the active pair under shared access.
    ///
    /// Returns `None` if no pair has been installed yet.
    pub fn with_readers<T>(&self, f: impl FnOnce(&DatasetSet<R>) -> T) -> Option<T> {
        let guard = self.current.read();
        guard.as_ref().map(f)
    }

    /// Whether a dataset pair is installed.
    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }

    /// Number of swaps performed so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
