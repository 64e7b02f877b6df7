use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::backend::{Backend, BackendStats};
use crate::error::CacheError;
use crate::util::now_ms;

/// What a key holds: a plain string value or a tag member set.
///
/// Counters are plain values holding decimal integers, matching how Redis
/// treats INCRBY on string keys.
#[derive(Debug, Clone)]
enum Slot {
    Value(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Stored {
    slot: Slot,
    /// Unix ms after which the key is gone. `None` means no expiry.
    expires_at: Option<i64>,
}

impl Stored {
    fn live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Thread-safe in-memory backend.
///
/// Implements the same protocol as [`super::redis::RedisBackend`] over a
/// `HashMap` with per-entry expiry timestamps. Intended for tests, demos and
/// benchmarks; it makes no attempt at background eviction beyond dropping
/// expired entries lazily on access.
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<HashMap<String, Stored>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    /// Glob matching limited to what the cache layer actually uses:
    /// an exact key, or a prefix followed by a trailing `*`.
    fn pattern_matches(pattern: &str, key: &str) -> bool {
        match pattern.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => key == pattern,
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let state = self.state.read().await;
        let now = now_ms();
        match state.get(key) {
            Some(stored) if stored.live(now) => match &stored.slot {
                Slot::Value(v) => Ok(Some(v.clone())),
                Slot::Set(_) => Ok(None),
            },
            Some(_) => {
                // Expired: drop it lazily.
                drop(state);
                self.state.write().await.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        state.insert(
            key.to_string(),
            Stored {
                slot: Slot::Value(value.to_string()),
                expires_at: Some(now_ms() + ttl_seconds as i64 * 1000),
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<usize, CacheError> {
        let mut state = self.state.write().await;
        let now = now_ms();
        let mut deleted = 0;
        for key in keys {
            if let Some(stored) = state.remove(key)
                && stored.live(now)
            {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let state = self.state.read().await;
        Ok(state.get(key).is_some_and(|s| s.live(now_ms())))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        let state = self.state.read().await;
        let now = now_ms();
        Ok(keys
            .iter()
            .map(|key| match state.get(key) {
                Some(stored) if stored.live(now) => match &stored.slot {
                    Slot::Value(v) => Some(v.clone()),
                    Slot::Set(_) => None,
                },
                _ => None,
            })
            .collect())
    }

    async fn mset_ex(
        &self,
        items: &[(String, String)],
        ttl_seconds: u64,
    ) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        let expires_at = Some(now_ms() + ttl_seconds as i64 * 1000);
        for (key, value) in items {
            state.insert(
                key.clone(),
                Stored {
                    slot: Slot::Value(value.clone()),
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        let mut state = self.state.write().await;
        let now = now_ms();
        let current = match state.get(key) {
            Some(stored) if stored.live(now) => match &stored.slot {
                Slot::Value(v) => v.parse::<i64>().map_err(|_| {
                    CacheError::backend("INCRBY", key, "value is not an integer")
                })?,
                Slot::Set(_) => {
                    return Err(CacheError::backend("INCRBY", key, "wrong slot kind"));
                }
            },
            _ => 0,
        };
        let next = current + delta;
        let expires_at = state
            .get(key)
            .filter(|s| s.live(now))
            .and_then(|s| s.expires_at);
        state.insert(
            key.to_string(),
            Stored {
                slot: Slot::Value(next.to_string()),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        let now = now_ms();
        let entry = state
            .entry(key.to_string())
            .and_modify(|stored| {
                if !stored.live(now) {
                    stored.slot = Slot::Set(HashSet::new());
                    stored.expires_at = None;
                }
            })
            .or_insert_with(|| Stored {
                slot: Slot::Set(HashSet::new()),
                expires_at: None,
            });
        match &mut entry.slot {
            Slot::Set(set) => {
                set.extend(members.iter().cloned());
                Ok(())
            }
            Slot::Value(_) => Err(CacheError::backend("SADD", key, "wrong slot kind")),
        }
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let state = self.state.read().await;
        match state.get(key) {
            Some(stored) if stored.live(now_ms()) => match &stored.slot {
                Slot::Set(set) => Ok(set.iter().cloned().collect()),
                Slot::Value(_) => Err(CacheError::backend("SMEMBERS", key, "wrong slot kind")),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        if let Some(stored) = state.get_mut(key)
            && let Slot::Set(set) = &mut stored.slot
        {
            for member in members {
                set.remove(member);
            }
        }
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        if let Some(stored) = state.get_mut(key) {
            stored.expires_at = Some(now_ms() + ttl_seconds as i64 * 1000);
        }
        Ok(())
    }

    async fn ttl_remaining(&self, key: &str) -> Result<Option<u64>, CacheError> {
        let state = self.state.read().await;
        let now = now_ms();
        Ok(state.get(key).filter(|s| s.live(now)).and_then(|stored| {
            stored
                .expires_at
                .map(|at| ((at - now).max(0) as u64).div_ceil(1000))
        }))
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let state = self.state.read().await;
        let now = now_ms();
        Ok(state
            .iter()
            .filter(|(key, stored)| stored.live(now) && Self::pattern_matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn stats(&self) -> Result<BackendStats, CacheError> {
        let state = self.state.read().await;
        let now = now_ms();
        let mut total_keys = 0u64;
        let mut memory_bytes = 0u64;
        for (key, stored) in state.iter() {
            if !stored.live(now) {
                continue;
            }
            total_keys += 1;
            memory_bytes += key.len() as u64;
            memory_bytes += match &stored.slot {
                Slot::Value(v) => v.len() as u64,
                Slot::Set(set) => set.iter().map(|m| m.len() as u64).sum(),
            };
        }
        Ok(BackendStats {
            total_keys,
            memory_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_del() {
        let backend = MemoryBackend::new();

        assert!(backend.get("k1").await.unwrap().is_none());

        backend.set_ex("k1", "value1", 60).await.unwrap();
        assert_eq!(backend.get("k1").await.unwrap().as_deref(), Some("value1"));
        assert!(backend.exists("k1").await.unwrap());

        let deleted = backend.del(&["k1".to_string()]).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(backend.get("k1").await.unwrap().is_none());

        // Deleting again is a no-op.
        let deleted = backend.del(&["k1".to_string()]).await.unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn test_expiry() {
        let backend = MemoryBackend::new();
        backend.set_ex("k1", "v", 60).await.unwrap();
        // Force the entry into the past.
        backend.state.write().await.get_mut("k1").unwrap().expires_at = Some(now_ms() - 1);
        assert!(backend.get("k1").await.unwrap().is_none());
        assert!(!backend.exists("k1").await.unwrap());
    }

    #[tokio::test]
    async fn test_sets() {
        let backend = MemoryBackend::new();
        backend
            .sadd("tags:t", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let mut members = backend.smembers("tags:t").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);

        backend.srem("tags:t", &["a".to_string()]).await.unwrap();
        assert_eq!(backend.smembers("tags:t").await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_counter() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.incr_by("c", 5).await.unwrap(), 5);
        assert_eq!(backend.incr_by("c", -2).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_scan_and_stats() {
        let backend = MemoryBackend::new();
        backend.set_ex("fc:reports:global:a", "1", 60).await.unwrap();
        backend.set_ex("fc:reports:global:b", "2", 60).await.unwrap();
        backend.set_ex("fc:users:global:c", "3", 60).await.unwrap();

        let mut keys = backend.scan("fc:reports:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["fc:reports:global:a", "fc:reports:global:b"]);

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.total_keys, 3);
        assert!(stats.memory_bytes > 0);
    }
}
