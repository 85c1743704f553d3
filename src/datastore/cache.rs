use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::debug;
use serde_json::Value;

use super::store::Datastore;
use crate::document::{DatasetSnapshot, Document, PrimaryKey, SnapshotHandle};
use crate::error::DatastoreError;
use crate::metadata::MetadataStore;

/// One cached snapshot. Never mutated in place: updates and eviction always
/// install a fresh value, so the map's invariants stay easy to reason about.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    snapshot: DatasetSnapshot,
    /// Whether the cached snapshot is known to be the current head of the
    /// dataset's history. This flag, not the version number, is what lets a
    /// request without an explicit version be served from cache.
    is_last: bool,
    /// Cache-insertion time, distinct from the snapshot's creation time.
    created_at: DateTime<Utc>,
    /// Insertion sequence. Orders entries for eviction; wall-clock insertion
    /// times can tie at clock resolution.
    seq: u64,
}

impl CacheEntry {
    fn matches_version(&self, version: Option<u64>) -> bool {
        match version {
            None => self.is_last,
            Some(version) => version == self.snapshot.version,
        }
    }

    pub fn snapshot(&self) -> &DatasetSnapshot {
        &self.snapshot
    }

    pub fn is_last(&self) -> bool {
        self.is_last
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    next_seq: u64,
}

/// Datastore decorator that keeps the most recently used snapshot of each
/// dataset in memory.
///
/// At most one entry is held per dataset name and at most `cache_size`
/// entries are held in total. The assumption is that an interactive front-end
/// repeatedly re-reads the same live-edited dataset, so eviction is
/// LRU-by-insertion: on a miss that would exceed the bound, the entry that
/// was installed least recently is removed. A cache size of zero disables
/// caching and every call delegates straight through.
///
/// The whole read-then-maybe-write sequence of `checkout`, `commit`, `load`,
/// and `drop_dataset` runs under one mutex, so concurrent calls for the same
/// name cannot lose updates or race eviction against insertion. The wrapper
/// introduces no error kinds of its own; a failed delegate call leaves the
/// cache exactly as it was.
pub struct CachedDatastore<D> {
    inner: D,
    cache_size: usize,
    cache: Mutex<CacheState>,
}

impl<D> CachedDatastore<D> {
    /// Wrap a datastore with the default cache bound of one dataset.
    pub fn new(inner: D) -> Self {
        Self::with_cache_size(inner, 1)
    }

    pub fn with_cache_size(inner: D, cache_size: usize) -> Self {
        CachedDatastore {
            inner,
            cache_size,
            cache: Mutex::new(CacheState {
                entries: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// The wrapped datastore.
    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    /// Install or replace the entry for `name`. Evicts the least recently
    /// inserted entry first when a new name would exceed the bound.
    fn update_cache(
        &self,
        state: &mut CacheState,
        name: &str,
        snapshot: DatasetSnapshot,
        is_last: bool,
    ) {
        if self.cache_size == 0 {
            return;
        }
        if !state.entries.contains_key(name) && state.entries.len() == self.cache_size {
            let evict = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(key, _)| key.clone());
            if let Some(evict) = evict {
                debug!("evicting '{}' from the snapshot cache", evict);
                state.entries.remove(&evict);
            }
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            name.to_string(),
            CacheEntry {
                snapshot,
                is_last,
                created_at: Utc::now(),
                seq,
            },
        );
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CacheState>, DatastoreError> {
        self.cache
            .lock()
            .map_err(|_| DatastoreError::LockPoisoned("snapshot cache"))
    }

    #[cfg(test)]
    fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cache.lock().unwrap().entries.keys().cloned().collect();
        names.sort();
        names
    }

    #[cfg(test)]
    fn cached_entry(&self, name: &str) -> Option<CacheEntry> {
        self.cache.lock().unwrap().entries.get(name).cloned()
    }
}

impl<D: Datastore> Datastore for CachedDatastore<D> {
    fn load(
        &self,
        document: Document,
        name: &str,
        primary_key: Option<PrimaryKey>,
    ) -> Result<DatasetSnapshot, DatastoreError> {
        // Creating a dataset can never be a cache hit.
        let mut state = self.lock()?;
        let snapshot = self.inner.load(document, name, primary_key)?;
        self.update_cache(&mut state, name, snapshot.clone(), true);
        Ok(snapshot)
    }

    fn checkout(
        &self,
        name: &str,
        version: Option<u64>,
    ) -> Result<DatasetSnapshot, DatastoreError> {
        let mut state = self.lock()?;
        if let Some(entry) = state.entries.get(name) {
            if entry.matches_version(version) {
                debug!("cache hit for dataset '{}'", name);
                return Ok(entry.snapshot.clone());
            }
        }
        let snapshot = self.inner.checkout(name, version)?;
        let is_last = match version {
            None => true,
            Some(version) => version == self.inner.last_version(name)?,
        };
        self.update_cache(&mut state, name, snapshot.clone(), is_last);
        Ok(snapshot)
    }

    fn commit(
        &self,
        document: Document,
        name: &str,
        action: Option<Value>,
    ) -> Result<DatasetSnapshot, DatastoreError> {
        // A commit is never a no-op read; always delegate. The committed
        // snapshot becomes the dataset's new head.
        let mut state = self.lock()?;
        let snapshot = self.inner.commit(document, name, action)?;
        self.update_cache(&mut state, name, snapshot.clone(), true);
        Ok(snapshot)
    }

    fn drop_dataset(&self, name: &str) -> Result<(), DatastoreError> {
        // Remove the cache entry before the durable drop completes so no
        // reader can observe a cached snapshot of a dropped dataset.
        let mut state = self.lock()?;
        state.entries.remove(name);
        self.inner.drop_dataset(name)
    }

    fn last_version(&self, name: &str) -> Result<u64, DatastoreError> {
        self.inner.last_version(name)
    }

    fn snapshots(&self, name: &str) -> Result<Vec<SnapshotHandle>, DatastoreError> {
        self.inner.snapshots(name)
    }

    fn metadata(
        &self,
        name: &str,
        version: Option<u64>,
    ) -> Result<Arc<dyn MetadataStore>, DatastoreError> {
        self.inner.metadata(name, version)
    }
}
