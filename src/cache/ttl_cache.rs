//! TTL Cache Module
//!
//! Owns the store, its sweeper, and any in-flight background writes.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::cache::{CacheEntry, CacheKey, CacheStats, CacheStore};
use crate::config::Config;
use crate::error::Result;
use crate::tasks::SweeperHandle;

// == TTL Cache ==
/// A running cache instance.
///
/// The sweeper starts with the instance and is aborted when it is dropped
/// or shut down. Construction requires a tokio runtime.
#[derive(Debug)]
pub struct TtlCache {
    store: Arc<CacheStore>,
    sweeper: SweeperHandle,
    writes: TaskTracker,
}

impl TtlCache {
    // == Constructor ==
    /// Wraps `store` and starts sweeping it every `sweep_interval`.
    pub fn start(store: CacheStore, sweep_interval: Duration) -> Self {
        let store = Arc::new(store);
        let sweeper = SweeperHandle::spawn(Arc::clone(&store), sweep_interval);

        // Closed from the start: `wait` then resolves whenever no write is
        // pending, while `spawn` keeps accepting new writes.
        let writes = TaskTracker::new();
        writes.close();

        Self {
            store,
            sweeper,
            writes,
        }
    }

    /// Creates a cache on the system clock from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::start(CacheStore::new(config.ttl()), config.sweep_interval())
    }

    pub fn get(&self, key: &CacheKey) -> Result<Arc<CacheEntry>> {
        self.store.get(key)
    }

    pub fn set(
        &self,
        key: CacheKey,
        content_type: impl Into<String>,
        content_encoding: impl Into<String>,
        payload: Bytes,
    ) -> Arc<CacheEntry> {
        self.store.set(key, content_type, content_encoding, payload)
    }

    // == Background Set ==
    /// Stores an entry on a detached task.
    ///
    /// The write completes even if the caller goes away. The returned handle
    /// and [`TtlCache::flush`] both let callers wait for it.
    pub fn set_in_background(
        &self,
        key: CacheKey,
        content_type: String,
        content_encoding: String,
        payload: Bytes,
    ) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        self.writes.spawn(async move {
            store.set(key, content_type, content_encoding, payload);
        })
    }

    /// Waits until every background write spawned so far has finished.
    pub async fn flush(&self) {
        self.writes.wait().await;
    }

    /// Runs one sweep immediately, outside the periodic schedule.
    pub fn sweep_now(&self) -> usize {
        self.store.sweep_expired()
    }

    /// Stops the sweeper and waits for pending writes.
    pub async fn shutdown(&self) {
        self.sweeper.stop();
        self.flush().await;
        info!(entries = self.store.len(), "Cache shut down");
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }
}
