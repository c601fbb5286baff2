//! Cache Entry Module
//!
//! Defines a captured origin response together with its expiry.

use bytes::Bytes;

// == Cache Entry ==
/// A captured origin response. Never mutated after construction; a newer
/// `set` for the same key replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Expiration timestamp (Unix seconds)
    pub expires_at: i64,
    /// Origin `Content-Type`, possibly empty
    pub content_type: String,
    /// `Content-Encoding` of `payload`, empty when the payload is identity-encoded
    pub content_encoding: String,
    /// Response body exactly as it is sent to clients
    pub payload: Bytes,
}

impl CacheEntry {
    // == Constructor ==
    pub fn new(
        expires_at: i64,
        content_type: impl Into<String>,
        content_encoding: impl Into<String>,
        payload: Bytes,
    ) -> Self {
        Self {
            expires_at,
            content_type: content_type.into(),
            content_encoding: content_encoding.into(),
            payload,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry stops being valid the moment its TTL has fully elapsed, so
    /// `now == expires_at` already counts as expired.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}
