//! Cache Key Module
//!
//! Derives fixed-width cache keys from request URIs.

use std::fmt;

// == Cache Key ==
/// A 256-bit BLAKE3 digest of a request's path and query.
///
/// Derivation is syntactic: `/a?x=1&y=2` and `/a?y=2&x=1` are distinct keys.
/// Collisions are not detected; at this width they are not expected.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; CacheKey::LEN]);

impl CacheKey {
    /// Digest width in bytes
    pub const LEN: usize = blake3::OUT_LEN;

    // == Derive ==
    /// Derives the key for a request URI (path plus optional query).
    pub fn derive(request_uri: &str) -> Self {
        Self(*blake3::hash(request_uri.as_bytes()).as_bytes())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; CacheKey::LEN] {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", &hex::encode(self.0)[..16])
    }
}
