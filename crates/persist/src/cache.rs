use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use dex_core::{CatalogRecord, StorageError};
use metrics::counter;
use tracing::{debug, warn};

use crate::{MemoryStorage, Storage};

/// Storage key holding the whole `name -> record` mapping.
pub const CACHE_KEY: &str = "dex.records.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Persisted,
    /// Persisting failed; memory and storage were wiped.
    Cleared,
}

/// Name-keyed cache of normalized records, mirrored into one storage value.
///
/// Loaded lazily on first access. Every check-and-merge runs under a single
/// lock guard with no suspension in between.
pub struct ResponseCache {
    storage: Arc<dyn Storage>,
    entries: Mutex<Option<HashMap<String, CatalogRecord>>>,
}

impl ResponseCache {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage, entries: Mutex::new(None) }
    }

    /// Cache backed by unbounded process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn get(&self, name: &str) -> Option<CatalogRecord> {
        let mut guard = self.lock();
        let hit = Self::loaded(&mut guard, &*self.storage).get(name).cloned();
        if hit.is_some() {
            counter!("cache_hits_total", 1u64);
        } else {
            counter!("cache_misses_total", 1u64);
        }
        hit
    }

    pub fn put(&self, name: &str, record: CatalogRecord) -> PersistOutcome {
        let mut guard = self.lock();
        Self::loaded(&mut guard, &*self.storage).insert(name.to_string(), record);
        self.persist(&mut guard)
    }

    /// Merge a batch then persist once.
    pub fn put_many(&self, records: &[CatalogRecord]) -> PersistOutcome {
        let mut guard = self.lock();
        let map = Self::loaded(&mut guard, &*self.storage);
        for r in records {
            map.insert(r.name.clone(), r.clone());
        }
        self.persist(&mut guard)
    }

    pub fn len(&self) -> usize {
        let mut guard = self.lock();
        Self::loaded(&mut guard, &*self.storage).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut guard = self.lock();
        self.wipe(&mut guard);
    }

    fn lock(&self) -> MutexGuard<'_, Option<HashMap<String, CatalogRecord>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn loaded<'a>(
        slot: &'a mut Option<HashMap<String, CatalogRecord>>,
        storage: &dyn Storage,
    ) -> &'a mut HashMap<String, CatalogRecord> {
        slot.get_or_insert_with(|| match storage.read(CACHE_KEY) {
            Ok(Some(blob)) => match serde_json::from_str::<HashMap<String, CatalogRecord>>(&blob) {
                Ok(map) => {
                    debug!(entries = map.len(), "response cache loaded");
                    map
                }
                Err(e) => {
                    warn!(error = %e, "response cache corrupt; discarding");
                    let _ = storage.remove(CACHE_KEY);
                    HashMap::new()
                }
            },
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(error = %e, "response cache unreadable; starting empty");
                HashMap::new()
            }
        })
    }

    fn persist(&self, slot: &mut Option<HashMap<String, CatalogRecord>>) -> PersistOutcome {
        let Some(map) = slot.as_ref() else {
            return PersistOutcome::Persisted;
        };
        let res = serde_json::to_string(map)
            .map_err(|e| StorageError::Corrupt(e.to_string()))
            .and_then(|blob| self.storage.write(CACHE_KEY, &blob));
        match res {
            Ok(()) => PersistOutcome::Persisted,
            Err(e) => {
                warn!(error = %e, entries = map.len(), "response cache persist failed; clearing");
                counter!("cache_cleared_total", 1u64);
                self.wipe(slot);
                PersistOutcome::Cleared
            }
        }
    }

    fn wipe(&self, slot: &mut Option<HashMap<String, CatalogRecord>>) {
        *slot = Some(HashMap::new());
        if let Err(e) = self.storage.remove(CACHE_KEY) {
            warn!(error = %e, "response cache remove failed");
        }
    }
}
