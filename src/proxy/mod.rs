//! Proxy Module
//!
//! Request routing, origin forwarding and response capture.
//!
//! # Flow
//! - Upgrade requests are tunnelled to the origin, never cached
//! - Cache hit: served from memory with `x-cache-status: hit`
//! - Miss: forwarded to the origin; cacheable 200s are captured on the way
//!   back and marked `x-cache-status: miss`

pub mod compress;
pub mod handlers;
pub mod headers;
pub mod interceptor;
pub mod origin;
pub mod routes;

pub use handlers::{proxy_handler, ProxyState};
pub use headers::{CacheStatus, CACHE_STATUS_HEADER};
pub use interceptor::{is_cacheable, Captured, ResponseInterceptor};
pub use origin::OriginClient;
pub use routes::create_router;
