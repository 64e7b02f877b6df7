//! Gzip compression for large textual payloads.
//!
//! Compressed values are stored as base64 text behind a fixed marker prefix,
//! so readers can always distinguish a compressed payload from a plain one
//! without any out-of-band metadata.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use http::HeaderMap;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, VARY};
use std::io::{Read, Write};

use crate::error::CacheError;

/// Prefix marking a compressed payload.
pub const COMPRESSION_MARKER: &str = "gz64:";

/// Payloads below this many bytes are never compressed.
pub const COMPRESSION_THRESHOLD: usize = 1024;

/// Content types worth compressing. Matched against the media type only,
/// parameters like `; charset=utf-8` are ignored.
const COMPRESSIBLE_TYPES: &[&str] = &[
    "application/json",
    "text/html",
    "text/css",
    "application/javascript",
    "text/javascript",
    "text/plain",
    "application/xml",
    "text/xml",
];

/// Whether a response body of `len` bytes with the given content type is
/// worth compressing.
pub fn should_compress(content_type: &str, len: usize) -> bool {
    if len < COMPRESSION_THRESHOLD {
        return false;
    }
    let media = content_type.split(';').next().unwrap_or("").trim();
    COMPRESSIBLE_TYPES
        .iter()
        .any(|t| media.eq_ignore_ascii_case(t))
}

/// Whether a stored payload carries the compression marker.
pub fn is_compressed(value: &str) -> bool {
    value.starts_with(COMPRESSION_MARKER)
}

/// Gzip and base64-encode `text`, prefixed with the compression marker.
pub fn compress(text: &str) -> Result<String, CacheError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .map_err(|e| CacheError::Compression(format!("gzip write failed: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| CacheError::Compression(format!("gzip finish failed: {e}")))?;
    Ok(format!("{COMPRESSION_MARKER}{}", BASE64.encode(compressed)))
}

/// Reverse [`compress`]: strip the marker, base64-decode and gunzip.
pub fn decompress(marked: &str) -> Result<String, CacheError> {
    let encoded = marked
        .strip_prefix(COMPRESSION_MARKER)
        .ok_or_else(|| CacheError::Compression("missing compression marker".to_string()))?;
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| CacheError::Compression(format!("base64 decode failed: {e}")))?;
    let mut decoder = GzDecoder::new(bytes.as_slice());
    let mut out = String::new();
    decoder
        .read_to_string(&mut out)
        .map_err(|e| CacheError::Compression(format!("gzip decode failed: {e}")))?;
    Ok(out)
}

/// Adjust response headers after compressing a body of `compressed_len` bytes.
///
/// Sets `Content-Encoding: gzip`, rewrites `Content-Length` and appends
/// `Accept-Encoding` to `Vary` so intermediaries key on it.
///
/// Standalone helper for handlers that serve gzip bodies themselves. The
/// response cache does not use it: cached bodies are decompressed before
/// being served, so its responses carry no `Content-Encoding`.
pub fn apply_compression_headers(headers: &mut HeaderMap, compressed_len: usize) {
    headers.insert(CONTENT_ENCODING, http::HeaderValue::from_static("gzip"));
    if let Ok(len) = http::HeaderValue::from_str(&compressed_len.to_string()) {
        headers.insert(CONTENT_LENGTH, len);
    }
    let vary = match headers.get(VARY).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.is_empty() => {
            if existing
                .split(',')
                .any(|v| v.trim().eq_ignore_ascii_case("accept-encoding"))
            {
                existing.to_string()
            } else {
                format!("{existing}, Accept-Encoding")
            }
        }
        _ => "Accept-Encoding".to_string(),
    };
    if let Ok(value) = http::HeaderValue::from_str(&vary) {
        headers.insert(VARY, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_compress_respects_threshold_and_type() {
        assert!(should_compress("application/json", 2048));
        assert!(should_compress("text/html; charset=utf-8", 2048));
        assert!(!should_compress("application/json", 100));
        assert!(!should_compress("image/png", 2048));
        assert!(!should_compress("application/octet-stream", 1_000_000));
    }

    #[test]
    fn test_compress_round_trip() {
        let original = "humanitarian field report ".repeat(200);
        let compressed = compress(&original).unwrap();
        assert!(is_compressed(&compressed));
        assert!(compressed.len() < original.len());
        assert_eq!(decompress(&compressed).unwrap(), original);
    }

    #[test]
    fn test_decompress_rejects_corrupt_input() {
        assert!(decompress("no marker here").is_err());
        assert!(decompress("gz64:!!!not-base64!!!").is_err());
        // Valid base64 but not a gzip stream.
        let bogus = format!("{COMPRESSION_MARKER}{}", BASE64.encode(b"plain bytes"));
        assert!(decompress(&bogus).is_err());
    }

    #[test]
    fn test_apply_compression_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(VARY, http::HeaderValue::from_static("Origin"));
        apply_compression_headers(&mut headers, 512);
        assert_eq!(headers.get(CONTENT_ENCODING).unwrap(), "gzip");
        assert_eq!(headers.get(CONTENT_LENGTH).unwrap(), "512");
        assert_eq!(headers.get(VARY).unwrap(), "Origin, Accept-Encoding");
    }
}
