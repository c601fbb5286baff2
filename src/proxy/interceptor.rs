//! Response Interceptor
//!
//! Captures cacheable origin responses on their way back to the client.

use std::sync::Arc;

use axum::http::{
    header::{CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE},
    HeaderMap, HeaderValue, StatusCode,
};
use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::compress::{gzip, should_compress, GZIP};
use super::headers::header_text;
use crate::cache::{CacheKey, TtlCache};

/// Only a plain 200 whose `Cache-Control` is not exactly `no-cache` or
/// `no-store` is cached. This is deliberately coarser than RFC 9111.
pub fn is_cacheable(status: StatusCode, headers: &HeaderMap) -> bool {
    if status != StatusCode::OK {
        return false;
    }
    !matches!(
        headers.get(CACHE_CONTROL).map(HeaderValue::as_bytes),
        Some(b"no-cache") | Some(b"no-store")
    )
}

// == Captured Response ==
/// What the client gets after interception.
#[derive(Debug)]
pub struct Captured {
    /// Body to send; identical to the cached payload when a write was started
    pub body: Bytes,
    /// Completion of the background cache write, if one was started
    pub write: Option<JoinHandle<()>>,
}

// == Response Interceptor ==
#[derive(Debug, Clone)]
pub struct ResponseInterceptor {
    cache: Arc<TtlCache>,
}

impl ResponseInterceptor {
    pub fn new(cache: Arc<TtlCache>) -> Self {
        Self { cache }
    }

    /// Compresses the fully read `body` when policy says so, rewrites
    /// `headers` to match, and stores the result under `request_uri` on a
    /// background task.
    ///
    /// The caller must already have checked [`is_cacheable`]. Failures are
    /// logged and leave the response untouched; they never abort it.
    pub fn capture(&self, request_uri: &str, headers: &mut HeaderMap, body: Bytes) -> Captured {
        let content_type = header_text(headers, &CONTENT_TYPE);
        let mut content_encoding = header_text(headers, &CONTENT_ENCODING);

        let body = if should_compress(&content_type, &content_encoding) {
            match gzip(&body) {
                Ok(compressed) => {
                    content_encoding = GZIP.to_string();
                    headers.insert(CONTENT_ENCODING, HeaderValue::from_static(GZIP));
                    headers.remove(CONTENT_LENGTH);
                    Bytes::from(compressed)
                }
                Err(err) => {
                    warn!(%request_uri, error = %err, "compression failed, response not cached");
                    return Captured { body, write: None };
                }
            }
        } else {
            body
        };

        let key = CacheKey::derive(request_uri);
        debug!(
            %request_uri,
            %key,
            content_type = %content_type,
            content_encoding = %content_encoding,
            bytes = body.len(),
            "capturing origin response"
        );
        let write = self
            .cache
            .set_in_background(key, content_type, content_encoding, body.clone());

        Captured {
            body,
            write: Some(write),
        }
    }
}
