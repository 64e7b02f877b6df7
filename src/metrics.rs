//! Cache operation metrics.
//!
//! `CacheStore` optionally emits one [`CacheMetric`] per operation to a
//! caller-provided sink. The sink implementation (Prometheus, StatsD, a test
//! buffer) lives outside this crate; with no sink configured nothing is
//! recorded.

/// Metric emitted per cache operation.
#[derive(Debug, Clone)]
pub enum CacheMetric {
    /// Emitted on every read.
    Read {
        namespace: String,
        key: String,
        /// Whether the key was found.
        hit: bool,
        latency_ms: f64,
    },
    /// Emitted on every write.
    Write {
        namespace: String,
        key: String,
        latency_ms: f64,
    },
    /// Emitted on every delete.
    Remove {
        namespace: String,
        key: String,
        latency_ms: f64,
    },
}

/// Trait for receiving cache metrics.
///
/// `emit` is called synchronously in the hot path of cache operations.
/// Implementations should be fast, e.g. buffer in memory and flush elsewhere.
pub trait MetricsSink: Send + Sync {
    fn emit(&self, metric: CacheMetric);
}
