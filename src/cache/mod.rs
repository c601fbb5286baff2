//! Cache Module
//!
//! Provides an in-memory response cache with TTL expiration and
//! background eviction.

mod clock;
mod entry;
mod index;
mod key;
mod stats;
mod store;
mod ttl_cache;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use index::{EvictionIndex, EvictionRecord};
pub use key::CacheKey;
pub use stats::{CacheStats, StatsCounters};
pub use store::CacheStore;
pub use ttl_cache::TtlCache;
