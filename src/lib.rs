//! Edge Cache - An in-memory HTTP caching reverse proxy
//!
//! Sits in front of an origin server, answers repeat requests from memory
//! and expires entries after a fixed TTL.

pub mod cache;
pub mod config;
pub mod error;
pub mod proxy;
pub mod tasks;

pub use cache::TtlCache;
pub use config::Config;
pub use error::CacheError;
pub use proxy::{create_router, ProxyState};
