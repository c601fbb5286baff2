//! Proxy Handlers
//!
//! The per-request decision between serving from cache, forwarding to the
//! origin with capture, and bypassing the cache entirely.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    response::Response,
};
use tracing::{debug, error};

use super::headers::{
    apply_static_headers, build_response, inbound_response_headers, is_upgrade_request,
    parse_static_headers, CacheStatus, CACHE_STATUS_HEADER,
};
use super::interceptor::{is_cacheable, ResponseInterceptor};
use super::origin::{request_uri, OriginClient};
use crate::cache::{CacheEntry, CacheKey, TtlCache};
use crate::config::Config;
use crate::error::{CacheError, Result};

/// Application state shared across all requests.
#[derive(Debug, Clone)]
pub struct ProxyState {
    /// Running cache instance
    pub cache: Arc<TtlCache>,
    /// Client for the origin server
    pub origin: OriginClient,
    /// Captures cacheable origin responses
    pub interceptor: ResponseInterceptor,
    /// Headers added to every response
    pub static_headers: Arc<HeaderMap>,
}

impl ProxyState {
    /// Creates a new ProxyState around a running cache.
    pub fn new(cache: Arc<TtlCache>, config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            origin: OriginClient::new(&config.origin_url)?,
            interceptor: ResponseInterceptor::new(Arc::clone(&cache)),
            static_headers: Arc::new(parse_static_headers(&config.headers)),
            cache,
        })
    }
}

/// Fallback handler for every inbound request.
///
/// Upgrade requests bypass the cache. Everything else is looked up by path
/// and query; a hit is served from memory, while a miss or any cache fault
/// is forwarded to the origin. Only origin failures surface as errors.
pub async fn proxy_handler(
    State(state): State<ProxyState>,
    request: Request,
) -> Result<Response> {
    if is_upgrade_request(request.headers()) {
        debug!(uri = %request.uri(), "protocol upgrade, bypassing cache");
        let mut response = state.origin.tunnel(request).await?;
        apply_static_headers(response.headers_mut(), &state.static_headers);
        return Ok(response);
    }

    let request_uri = request_uri(request.uri()).to_owned();
    let key = CacheKey::derive(&request_uri);

    match state.cache.get(&key) {
        Ok(entry) => {
            debug!(%request_uri, "cache hit");
            return Ok(serve_from_cache(&state, &entry));
        }
        Err(err) if err.is_miss() => {
            debug!(%request_uri, reason = %err, "cache miss");
        }
        Err(err) => {
            error!(%request_uri, error = %err, "cache lookup failed, forwarding to origin");
        }
    }

    forward_to_origin(&state, &request_uri, request).await
}

fn serve_from_cache(state: &ProxyState, entry: &CacheEntry) -> Response {
    let mut headers = HeaderMap::new();
    if let Some(content_type) = non_empty_header(&entry.content_type) {
        headers.insert(CONTENT_TYPE, content_type);
    }
    if let Some(content_encoding) = non_empty_header(&entry.content_encoding) {
        headers.insert(CONTENT_ENCODING, content_encoding);
    }
    apply_static_headers(&mut headers, &state.static_headers);
    headers.insert(CACHE_STATUS_HEADER, CacheStatus::Hit.header_value());

    build_response(StatusCode::OK, headers, Body::from(entry.payload.clone()))
}

async fn forward_to_origin(
    state: &ProxyState,
    request_uri: &str,
    request: Request,
) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let upstream = state.origin.forward(&parts, body).await?;

    let status = upstream.status();
    // A HEAD reply has no body to serve later GETs from
    let cacheable = parts.method != Method::HEAD && is_cacheable(status, upstream.headers());
    let mut headers = inbound_response_headers(upstream.headers());

    let body = if cacheable {
        let bytes = upstream.bytes().await.map_err(|e| {
            CacheError::OriginUnavailable(format!("failed to read origin response body: {}", e))
        })?;
        headers.remove(CONTENT_LENGTH);
        Body::from(state.interceptor.capture(request_uri, &mut headers, bytes).body)
    } else {
        debug!(%request_uri, %status, "origin response not cacheable");
        Body::from_stream(upstream.bytes_stream())
    };

    apply_static_headers(&mut headers, &state.static_headers);
    headers.insert(CACHE_STATUS_HEADER, CacheStatus::Miss.header_value());

    Ok(build_response(status, headers, body))
}

fn non_empty_header(value: &str) -> Option<HeaderValue> {
    if value.is_empty() {
        return None;
    }
    HeaderValue::from_str(value).ok()
}
