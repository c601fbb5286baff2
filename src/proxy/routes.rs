//! Proxy Routes
//!
//! Configures the Axum router that sends every request through the cache.

use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers::{proxy_handler, ProxyState};

/// Creates the proxy router.
///
/// There are no routes of its own: every method and path falls through to
/// [`proxy_handler`], so the origin's URL space is exposed unchanged.
///
/// # Middleware
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: ProxyState) -> Router {
    Router::new()
        .fallback(proxy_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
