use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use crate::backend::{Backend, BackendStats};
use crate::error::CacheError;

/// Configuration for [`RedisBackend`].
#[derive(Debug, Clone)]
pub struct RedisBackendConfig {
    /// Redis connection URL.
    ///
    /// Format: `redis://[username:password@]host[:port][/database]`
    pub url: String,
}

/// Redis-backed key-value store.
///
/// Holds a single multiplexed connection created at startup; the connection
/// handle is cheap to clone per call. Construct once and inject wherever a
/// [`Backend`] is needed; there is no hidden global client.
pub struct RedisBackend {
    connection: MultiplexedConnection,
}

impl RedisBackend {
    /// Connect to Redis with the given configuration.
    pub async fn new(config: RedisBackendConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| CacheError::backend("connect", "", e.to_string()))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::backend("connect", "", e.to_string()))?;
        Ok(RedisBackend { connection })
    }
}

#[async_trait]
impl Backend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        let result: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::backend("GET", key, e.to_string()))?;
        Ok(result)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .set_ex(key, value, ttl_seconds)
            .await
            .map_err(|e| CacheError::backend("SETEX", key, e.to_string()))?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<usize, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection.clone();
        let deleted: usize = conn
            .del(keys.to_vec())
            .await
            .map_err(|e| CacheError::backend("DEL", keys.join(","), e.to_string()))?;
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection.clone();
        let exists: bool = conn
            .exists(key)
            .await
            .map_err(|e| CacheError::backend("EXISTS", key, e.to_string()))?;
        Ok(exists)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        let values: Vec<Option<String>> = conn
            .mget(keys.to_vec())
            .await
            .map_err(|e| CacheError::backend("MGET", keys.join(","), e.to_string()))?;
        Ok(values)
    }

    async fn mset_ex(
        &self,
        items: &[(String, String)],
        ttl_seconds: u64,
    ) -> Result<(), CacheError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        let mut pipe = redis::pipe();
        for (key, value) in items {
            pipe.set_ex(key, value, ttl_seconds).ignore();
        }
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::backend("MSET", "", e.to_string()))?;
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        let mut conn = self.connection.clone();
        let value: i64 = conn
            .incr(key, delta)
            .await
            .map_err(|e| CacheError::backend("INCRBY", key, e.to_string()))?;
        Ok(value)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        let _: () = conn
            .sadd(key, members.to_vec())
            .await
            .map_err(|e| CacheError::backend("SADD", key, e.to_string()))?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection.clone();
        let members: Vec<String> = conn
            .smembers(key)
            .await
            .map_err(|e| CacheError::backend("SMEMBERS", key, e.to_string()))?;
        Ok(members)
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        let _: () = conn
            .srem(key, members.to_vec())
            .await
            .map_err(|e| CacheError::backend("SREM", key, e.to_string()))?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .expire(key, ttl_seconds as i64)
            .await
            .map_err(|e| CacheError::backend("EXPIRE", key, e.to_string()))?;
        Ok(())
    }

    async fn ttl_remaining(&self, key: &str) -> Result<Option<u64>, CacheError> {
        let mut conn = self.connection.clone();
        let ttl: i64 = conn
            .ttl(key)
            .await
            .map_err(|e| CacheError::backend("TTL", key, e.to_string()))?;
        // -2 means the key does not exist, -1 means no expiry is set.
        if ttl < 0 {
            Ok(None)
        } else {
            Ok(Some(ttl as u64))
        }
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection.clone();
        let mut keys = Vec::new();
        let mut iter: redis::AsyncIter<'_, String> = conn
            .scan_match(pattern)
            .await
            .map_err(|e| CacheError::backend("SCAN", pattern, e.to_string()))?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn stats(&self) -> Result<BackendStats, CacheError> {
        let mut conn = self.connection.clone();
        let total_keys: u64 = redis::cmd("DBSIZE")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::backend("DBSIZE", "", e.to_string()))?;
        let info: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::backend("INFO", "", e.to_string()))?;
        let memory_bytes = info
            .lines()
            .find_map(|line| line.strip_prefix("used_memory:"))
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        Ok(BackendStats {
            total_keys,
            memory_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a running Redis instance.

    #[tokio::test]
    #[ignore = "requires running Redis instance"]
    async fn test_redis_get_set_del() {
        let backend = RedisBackend::new(RedisBackendConfig {
            url: "redis://localhost:6379".to_string(),
        })
        .await
        .unwrap();

        let key = "fieldcache:test:global:redis_backend";
        assert!(backend.get(key).await.unwrap().is_none());

        backend.set_ex(key, "value", 60).await.unwrap();
        assert_eq!(backend.get(key).await.unwrap().as_deref(), Some("value"));
        assert!(backend.ttl_remaining(key).await.unwrap().is_some());

        let deleted = backend.del(&[key.to_string()]).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(backend.get(key).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "requires running Redis instance"]
    async fn test_redis_sets_and_counters() {
        let backend = RedisBackend::new(RedisBackendConfig {
            url: "redis://localhost:6379".to_string(),
        })
        .await
        .unwrap();

        let set_key = "fieldcache:tags:test_tag";
        backend
            .sadd(set_key, &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let mut members = backend.smembers(set_key).await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);
        backend.del(&[set_key.to_string()]).await.unwrap();

        let counter = "fieldcache:test:global:counter";
        backend.del(&[counter.to_string()]).await.unwrap();
        assert_eq!(backend.incr_by(counter, 3).await.unwrap(), 3);
        assert_eq!(backend.incr_by(counter, 2).await.unwrap(), 5);
        backend.del(&[counter.to_string()]).await.unwrap();
    }
}
