//! Cache Sweeper Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Spawns a background task that sweeps expired entries every `interval`.
///
/// The first sweep runs one full interval after spawning. A tick that runs
/// late delays the following ones rather than bunching them up.
///
/// # Returns
/// A JoinHandle for the spawned task. Prefer [`SweeperHandle`], which
/// aborts the task when dropped.
pub fn spawn_sweeper(store: Arc<CacheStore>, interval: Duration) -> JoinHandle<()> {
    let interval = interval.max(Duration::from_millis(1));

    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting cache sweeper");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let removed = store.sweep_expired();

            if removed > 0 {
                let stats = store.stats();
                info!(
                    removed,
                    entries = stats.entries,
                    hit_rate = stats.hit_rate(),
                    "Sweep: removed expired entries"
                );
            } else {
                debug!("Sweep: no expired entries found");
            }
        }
    })
}

// == Sweeper Handle ==
/// Owns a running sweeper task and aborts it on drop.
#[derive(Debug)]
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Spawns a sweeper over `store`. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<CacheStore>, interval: Duration) -> Self {
        Self {
            handle: spawn_sweeper(store, interval),
        }
    }

    /// Stops the sweeper. Idempotent.
    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
