/// Error type for cache operations.
///
/// None of these variants ever escape the public `CacheStore` surface: every
/// operation there converts errors into benign defaults and logs them. The
/// type exists for the `Backend` seam and internal plumbing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The remote key-value backend failed or was unreachable.
    #[error("backend error during {op} for key '{key}': {message}")]
    Backend {
        op: &'static str,
        key: String,
        message: String,
    },
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Compression or decompression failed (corrupt gzip stream, bad marker).
    #[error("compression error: {0}")]
    Compression(String),
}

impl CacheError {
    /// Create a new backend error.
    pub fn backend(op: &'static str, key: impl Into<String>, message: impl Into<String>) -> Self {
        CacheError::Backend {
            op,
            key: key.into(),
            message: message.into(),
        }
    }
}
