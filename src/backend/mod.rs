//! Key-value backend implementations.

pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::error::CacheError;

/// Aggregate statistics reported by a backend.
#[derive(Debug, Clone, Default)]
pub struct BackendStats {
    /// Total number of live keys.
    pub total_keys: u64,
    /// Approximate memory usage in bytes.
    pub memory_bytes: u64,
}

/// The remote key-value protocol the cache layer is written against.
///
/// Any Redis-compatible store satisfies this. Implementations return
/// `CacheError` on failure; the fail-open policy lives one layer up in
/// `CacheStore`, not here.
#[async_trait]
pub trait Backend: Send + Sync {
    /// A name for logging and metrics, e.g. "redis" or "memory".
    fn name(&self) -> &'static str;

    /// GET a string value. `None` on miss.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// SET with expiry in seconds.
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError>;

    /// DEL one or more keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> Result<usize, CacheError>;

    /// EXISTS.
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// MGET, preserving input order. Missing keys map to `None`.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError>;

    /// Pipelined SET-with-expiry for a batch of pairs.
    async fn mset_ex(
        &self,
        items: &[(String, String)],
        ttl_seconds: u64,
    ) -> Result<(), CacheError>;

    /// INCRBY, returning the new value.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError>;

    /// SADD members to a set.
    async fn sadd(&self, key: &str, members: &[String]) -> Result<(), CacheError>;

    /// SMEMBERS.
    async fn smembers(&self, key: &str) -> Result<Vec<String>, CacheError>;

    /// SREM members from a set.
    async fn srem(&self, key: &str, members: &[String]) -> Result<(), CacheError>;

    /// EXPIRE, setting or refreshing a key's TTL in seconds.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), CacheError>;

    /// Remaining TTL in seconds. `None` when the key is missing or has no
    /// expiry.
    async fn ttl_remaining(&self, key: &str) -> Result<Option<u64>, CacheError>;

    /// All keys matching a glob-style pattern.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    /// Server-level statistics.
    async fn stats(&self) -> Result<BackendStats, CacheError>;
}
