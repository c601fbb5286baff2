//! Compression Policy
//!
//! Decides which origin bodies get gzipped before caching and does the work.

use std::io::{self, Write};

use flate2::write::GzEncoder;
use flate2::Compression;

/// `Content-Encoding` token for gzip.
pub const GZIP: &str = "gzip";

/// Textual and application payloads without an existing encoding are
/// compressed. Anything already encoded is left alone.
pub fn should_compress(content_type: &str, content_encoding: &str) -> bool {
    content_encoding.is_empty()
        && (content_type.contains("text") || content_type.contains("application"))
}

/// Gzips `body` at the default level.
pub fn gzip(body: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}
