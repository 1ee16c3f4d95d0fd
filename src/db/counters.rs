//! Rate-limit counter stores
//!
//! The rate limiter only ever needs one primitive: increment a key and, if the
//! key was just created, give it an expiry. Both backends perform that as a
//! single atomic step so concurrent requests from one client cannot lose
//! updates and a crash cannot leave a counter without a TTL.

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// INCR, then EXPIRE only on the first increment of the window.
const INCREMENT_WITH_EXPIRY: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Shared counter store used by the rate limiter
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key`, setting its expiry to `ttl` when the key is
    /// created. Returns the post-increment count.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CounterStoreError>;

    /// Check connectivity
    async fn ping(&self) -> Result<(), CounterStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CounterStoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Counter store unavailable: {0}")]
    Unavailable(String),
}

/// Redis-backed counter store shared by every gateway instance
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    script: Arc<Script>,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Connect to Redis
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the first connection fails.
    pub async fn connect(url: &str) -> Result<Self, CounterStoreError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            script: Arc::new(Script::new(INCREMENT_WITH_EXPIRY)),
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CounterStoreError> {
        let mut conn = self.connection.clone();
        let count: u64 = self
            .script
            .key(key)
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn ping(&self) -> Result<(), CounterStoreError> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u64,
    ttl: Duration,
}

/// Expiry fixed at creation; updates keep the remaining lifetime.
struct ExpireFromCreation;

impl Expiry<String, WindowCounter> for ExpireFromCreation {
    fn expire_after_create(&self, _key: &String, value: &WindowCounter, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Process-local counter store
///
/// Correct only for a single gateway instance; used for development and tests.
#[derive(Clone)]
pub struct InMemoryCounterStore {
    counters: Cache<String, WindowCounter>,
}

impl InMemoryCounterStore {
    /// Entries are bounded only by their window TTL. A size bound would let
    /// the cache refuse new keys, which reads as a fresh count of one.
    pub fn new() -> Self {
        let counters = Cache::builder().expire_after(ExpireFromCreation).build();
        Self { counters }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CounterStoreError> {
        let entry = self
            .counters
            .entry(key.to_string())
            .and_upsert_with(|existing| {
                let next = match existing {
                    Some(entry) => {
                        let current = entry.into_value();
                        WindowCounter {
                            count: current.count + 1,
                            ttl: current.ttl,
                        }
                    }
                    None => WindowCounter { count: 1, ttl },
                };
                std::future::ready(next)
            })
            .await;

        Ok(entry.into_value().count)
    }

    async fn ping(&self) -> Result<(), CounterStoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_increment_counts_per_key() {
        let store = InMemoryCounterStore::new();
        let ttl = Duration::from_secs(60);

        assert_eq!(store.increment("rate_limit:1.2.3.4:1", ttl).await.unwrap(), 1);
        assert_eq!(store.increment("rate_limit:1.2.3.4:1", ttl).await.unwrap(), 2);
        assert_eq!(store.increment("rate_limit:1.2.3.4:2", ttl).await.unwrap(), 1);
        assert_eq!(store.increment("rate_limit:5.6.7.8:1", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_concurrent_increments_are_not_lost() {
        let store = InMemoryCounterStore::new();
        let ttl = Duration::from_secs(60);

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment("hot", ttl).await.unwrap() })
            })
            .collect();

        let mut seen = Vec::new();
        for task in tasks {
            seen.push(task.await.unwrap());
        }
        seen.sort_unstable();

        assert_eq!(seen, (1..=50).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_in_memory_new_key_counts_after_many_keys() {
        let store = InMemoryCounterStore::new();
        let ttl = Duration::from_secs(60);

        for i in 0..2_000 {
            let key = format!("rate_limit:10.0.{}.{}:1", i / 256, i % 256);
            for _ in 0..3 {
                store.increment(&key, ttl).await.unwrap();
            }
        }

        let mut counts = Vec::new();
        for _ in 0..10 {
            counts.push(store.increment("rate_limit:203.0.113.9:1", ttl).await.unwrap());
        }

        assert_eq!(counts, (1..=10).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_in_memory_entry_expires() {
        let store = InMemoryCounterStore::new();
        let ttl = Duration::from_millis(50);

        assert_eq!(store.increment("short", ttl).await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(store.increment("short", ttl).await.unwrap(), 1);
    }
}
