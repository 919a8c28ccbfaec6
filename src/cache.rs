use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::dataset::Dataset;
use crate::error::Result;
use crate::schema::SchemaDescriptor;

/// Identity of a memoized load: where the data came from and how it was typed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: String,
    pub schema: SchemaDescriptor,
}

impl CacheKey {
    pub fn new(source: impl Into<String>, schema: &SchemaDescriptor) -> Self {
        Self {
            source: source.into(),
            schema: schema.clone(),
        }
    }
}

type Slot = Arc<Mutex<Option<Arc<Dataset>>>>;

/// Memoized datasets, one slot per [`CacheKey`].
///
/// Owned by whoever drives the session (there is no process-wide instance).
/// Concurrent first access to the same key runs the load once: the map lock
/// is only held to find the slot, and the slot lock is held for the load.
/// Failed loads leave the slot empty so the next call retries.
#[derive(Default)]
pub struct DatasetCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic inside a load leaves the slot empty, which is a valid state
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached dataset for `key`, running `load` if it is absent.
    ///
    /// The boolean is `true` when the value came from the cache.
    pub fn get_or_load<F>(&self, key: &CacheKey, load: F) -> Result<(Arc<Dataset>, bool)>
    where
        F: FnOnce() -> Result<Dataset>,
    {
        let slot = {
            let mut slots = lock(&self.slots);
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let mut guard = lock(&slot);
        if let Some(dataset) = guard.as_ref() {
            return Ok((Arc::clone(dataset), true));
        }
        let dataset = Arc::new(load()?);
        *guard = Some(Arc::clone(&dataset));
        Ok((dataset, false))
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Dataset>> {
        let slot = lock(&self.slots).get(key).cloned()?;
        let guard = lock(&slot);
        guard.clone()
    }

    /// Number of datasets currently held.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = lock(&self.slots).values().cloned().collect();
        slots.iter().filter(|s| lock(s).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        lock(&self.slots).remove(key).is_some()
    }

    /// Drop every entry loaded from `source`, whatever its schema.
    /// Returns how many entries were removed.
    pub fn invalidate_source(&self, source: &str) -> usize {
        let mut slots = lock(&self.slots);
        let before = slots.len();
        slots.retain(|key, _| key.source != source);
        before - slots.len()
    }

    pub fn clear(&self) {
        lock(&self.slots).clear();
    }
}
