//! Cache Store Module
//!
//! Main cache engine combining a sharded concurrent map with a sorted
//! eviction index and TTL expiration.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tracing::{debug, error};

use crate::cache::{
    CacheEntry, CacheKey, CacheStats, Clock, EvictionIndex, EvictionRecord, StatsCounters,
    SystemClock,
};
use crate::error::{CacheError, Result};

// == Cache Store ==
/// Concurrent TTL cache of origin responses.
///
/// Reads only touch one map shard. Writes and sweeps additionally take the
/// index lock, always before any shard lock, so the map and the index
/// change together for a given key.
pub struct CacheStore {
    /// Key-value storage
    entries: DashMap<CacheKey, Arc<CacheEntry>>,
    /// Live keys ordered by expiry
    index: Mutex<EvictionIndex>,
    /// Time source for expiry decisions
    clock: Arc<dyn Clock>,
    /// TTL in seconds applied to every entry
    ttl: i64,
    /// Performance statistics
    stats: StatsCounters,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore backed by the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Creates a new CacheStore reading time from `clock`.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            index: Mutex::new(EvictionIndex::new()),
            clock,
            ttl: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
            stats: StatsCounters::new(),
        }
    }

    // == Get ==
    /// Retrieves the entry stored under `key`.
    ///
    /// Expiry is checked on every call, so an entry the sweeper has not
    /// reached yet is still reported as `Expired`.
    pub fn get(&self, key: &CacheKey) -> Result<Arc<CacheEntry>> {
        let now = self.clock.now();

        let Some(entry) = self.entries.get(key).map(|e| Arc::clone(e.value())) else {
            self.stats.record_miss();
            return Err(CacheError::NotFound(key.to_string()));
        };

        if entry.is_expired_at(now) {
            self.stats.record_expired();
            return Err(CacheError::Expired(key.to_string()));
        }

        self.stats.record_hit();
        Ok(entry)
    }

    // == Set ==
    /// Stores a response under `key`, expiring `ttl` seconds from now.
    ///
    /// An existing entry is replaced along with its eviction record.
    pub fn set(
        &self,
        key: CacheKey,
        content_type: impl Into<String>,
        content_encoding: impl Into<String>,
        payload: Bytes,
    ) -> Arc<CacheEntry> {
        // Saturates for TTLs long enough to run past the end of time
        let expires_at = self.clock.now().saturating_add(self.ttl);
        let entry = Arc::new(CacheEntry::new(
            expires_at,
            content_type,
            content_encoding,
            payload,
        ));

        let mut index = self.lock_index();
        if let Some(previous) = self.entries.insert(key, Arc::clone(&entry)) {
            index.remove(&EvictionRecord::new(key, previous.expires_at));
        }
        index.insert(EvictionRecord::new(key, expires_at));
        drop(index);

        self.stats.record_store();
        debug!(
            %key,
            expires_at,
            content_type = %entry.content_type,
            content_encoding = %entry.content_encoding,
            bytes = entry.payload.len(),
            "cached"
        );
        entry
    }

    // == Sweep Expired ==
    /// Removes every entry whose expiry is strictly before now.
    ///
    /// Walks the index from the earliest expiry and stops at the first live
    /// record. Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();

        let mut index = self.lock_index();

        let mut removed = 0;
        for record in index.drain_expired(now) {
            // A record only owns the entry stored with the same expiry.
            let deleted = self
                .entries
                .remove_if(&record.key, |_, entry| entry.expires_at == record.expires_at);
            if deleted.is_some() {
                debug!(key = %record.key, expires_at = record.expires_at, "swept");
                removed += 1;
            }
        }
        drop(index);

        self.stats.record_swept(removed);
        removed
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.entries.len())
    }

    /// Whether the eviction index holds a record for `key`.
    pub fn has_eviction_record(&self, key: &CacheKey) -> bool {
        self.lock_index().contains_key(key)
    }

    /// Number of records in the eviction index.
    pub fn index_len(&self) -> usize {
        self.lock_index().len()
    }

    /// Locks the eviction index, recovering it if a holder panicked.
    ///
    /// Every index operation is a single `BTreeSet` insert or removal, so a
    /// panic elsewhere never leaves it half-updated.
    fn lock_index(&self) -> MutexGuard<'_, EvictionIndex> {
        self.index.lock().unwrap_or_else(|poisoned| {
            error!("eviction index lock poisoned, recovering");
            self.index.clear_poison();
            poisoned.into_inner()
        })
    }

    /// TTL applied to new entries.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl as u64)
    }

    // == Length ==
    /// Returns the number of entries physically held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
