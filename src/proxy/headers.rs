//! Header Helpers
//!
//! Hop-by-hop filtering, static header injection and the cache-status marker.

use std::collections::BTreeMap;

use axum::{
    body::Body,
    http::{
        header::{CONNECTION, CONTENT_LENGTH, HOST, UPGRADE},
        HeaderMap, HeaderName, HeaderValue, StatusCode,
    },
    response::Response,
};
use tracing::{debug, warn};

/// Response header telling clients whether the cache served the response.
pub const CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-cache-status");

// == Cache Status ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
        }
    }

    pub fn header_value(&self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

// == Static Headers ==
/// Parses configured header strings once, skipping invalid ones.
pub fn parse_static_headers(raw: &BTreeMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in raw {
        if let (Ok(header_name), Ok(header_value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            headers.insert(header_name, header_value);
            debug!(header = %name, value = %value, "Added static header");
        } else {
            warn!(header = %name, "Invalid static header name or value, skipping");
        }
    }
    headers
}

/// Sets every static header on `target`, replacing values from the origin.
pub fn apply_static_headers(target: &mut HeaderMap, statics: &HeaderMap) {
    for (name, value) in statics {
        target.insert(name.clone(), value.clone());
    }
}

// == Request Classification ==
/// Requests asking to switch protocols are never cached.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers.contains_key(UPGRADE)
}

/// Checks if a header is a hop-by-hop header that should not be forwarded.
///
/// Hop-by-hop headers are defined in RFC 2616 Section 13.5.1.
pub fn is_hop_by_hop_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Headers to send to the origin.
///
/// `Host` is dropped so the client sets the origin's. With `keep_upgrade`
/// the `Connection`/`Upgrade` pair survives for protocol switching.
pub fn outbound_request_headers(incoming: &HeaderMap, keep_upgrade: bool) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(incoming.len());
    for (name, value) in incoming {
        let upgrade_pair = *name == CONNECTION || *name == UPGRADE;
        if *name == HOST || *name == CONTENT_LENGTH {
            continue;
        }
        if is_hop_by_hop_header(name) && !(keep_upgrade && upgrade_pair) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Origin response headers minus hop-by-hop ones.
pub fn inbound_response_headers(origin: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(origin.len());
    for (name, value) in origin {
        if !is_hop_by_hop_header(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Header value as text; non UTF-8 bytes are replaced, absence is empty.
pub fn header_text(headers: &HeaderMap, name: &HeaderName) -> String {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default()
}

pub fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
