//! Per-namespace caching strategy catalog.
//!
//! The catalog is static configuration consumed by `CacheService`: each
//! domain namespace maps to a TTL, an update strategy, the tags its entries
//! carry, and whether large payloads get compressed. Unknown namespaces fall
//! back to a built-in default rather than erroring.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How writes to the source of truth interact with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStrategy {
    /// Plain expiry-driven caching.
    Ttl,
    /// Cache updated synchronously with the source of truth.
    WriteThrough,
    /// Cache updated, source of truth written asynchronously.
    WriteBehind,
    /// Application reads/fills the cache around the source of truth.
    CacheAside,
    /// Cache loads from the source of truth on miss.
    ReadThrough,
}

/// Static per-namespace cache policy.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub ttl_seconds: u64,
    pub strategy: CacheStrategy,
    pub tags: Vec<String>,
    pub compress: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            ttl_seconds: 3600,
            strategy: CacheStrategy::Ttl,
            tags: Vec::new(),
            compress: false,
        }
    }
}

fn tags(names: &[&str]) -> Vec<String> {
    names.iter().map(|t| t.to_string()).collect()
}

static CATALOG: Lazy<HashMap<&'static str, StrategyConfig>> = Lazy::new(|| {
    HashMap::from([
        (
            "users",
            StrategyConfig {
                ttl_seconds: 1800,
                strategy: CacheStrategy::CacheAside,
                tags: tags(&["users"]),
                compress: false,
            },
        ),
        (
            "reports",
            StrategyConfig {
                ttl_seconds: 3600,
                strategy: CacheStrategy::WriteThrough,
                tags: tags(&["reports"]),
                compress: true,
            },
        ),
        (
            "reports_list",
            StrategyConfig {
                ttl_seconds: 300,
                strategy: CacheStrategy::Ttl,
                tags: tags(&["reports", "lists"]),
                compress: true,
            },
        ),
        (
            "assessments",
            StrategyConfig {
                ttl_seconds: 3600,
                strategy: CacheStrategy::WriteThrough,
                tags: tags(&["assessments"]),
                compress: true,
            },
        ),
        (
            "analytics",
            StrategyConfig {
                ttl_seconds: 900,
                strategy: CacheStrategy::ReadThrough,
                tags: tags(&["analytics"]),
                compress: true,
            },
        ),
        (
            "api",
            StrategyConfig {
                ttl_seconds: 300,
                strategy: CacheStrategy::Ttl,
                tags: Vec::new(),
                compress: true,
            },
        ),
    ])
});

/// Resolve the strategy for a namespace, falling back to the default when
/// the namespace is not in the catalog.
pub fn strategy_for(namespace: &str) -> StrategyConfig {
    CATALOG.get(namespace).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_namespace() {
        let config = strategy_for("reports");
        assert_eq!(config.ttl_seconds, 3600);
        assert_eq!(config.strategy, CacheStrategy::WriteThrough);
        assert_eq!(config.tags, vec!["reports"]);
    }

    #[test]
    fn test_unknown_namespace_falls_back() {
        let config = strategy_for("never_configured");
        assert_eq!(config.ttl_seconds, 3600);
        assert_eq!(config.strategy, CacheStrategy::Ttl);
        assert!(config.tags.is_empty());
        assert!(!config.compress);
    }
}
