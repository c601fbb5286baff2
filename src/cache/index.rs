//! Eviction Index Module
//!
//! Keeps every live key ordered by expiry so the sweeper only touches
//! entries that have actually expired.

use std::collections::BTreeSet;

use crate::cache::CacheKey;

// == Eviction Record ==
/// Pairs a key with the expiry it was stored with.
///
/// Ordering is by `expires_at` first and `key` second, so two entries
/// expiring in the same second never share an index slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EvictionRecord {
    pub expires_at: i64,
    pub key: CacheKey,
}

impl EvictionRecord {
    pub fn new(key: CacheKey, expires_at: i64) -> Self {
        Self { expires_at, key }
    }
}

// == Eviction Index ==
/// Sorted set of eviction records, O(log n) insert and remove.
#[derive(Debug, Default)]
pub struct EvictionIndex {
    records: BTreeSet<EvictionRecord>,
}

impl EvictionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // == Insert ==
    pub fn insert(&mut self, record: EvictionRecord) {
        self.records.insert(record);
    }

    // == Remove ==
    /// Removes one record, returning whether it was present.
    pub fn remove(&mut self, record: &EvictionRecord) -> bool {
        self.records.remove(record)
    }

    // == Drain Expired ==
    /// Removes and returns every record with `expires_at < now`, earliest first.
    ///
    /// Stops at the first record that is still live.
    pub fn drain_expired(&mut self, now: i64) -> Vec<EvictionRecord> {
        let mut expired = Vec::new();
        while let Some(first) = self.records.first() {
            if first.expires_at >= now {
                break;
            }
            if let Some(record) = self.records.pop_first() {
                expired.push(record);
            }
        }
        expired
    }

    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.records.iter().any(|r| &r.key == key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in expiry order.
    pub fn iter(&self) -> impl Iterator<Item = &EvictionRecord> {
        self.records.iter()
    }
}
