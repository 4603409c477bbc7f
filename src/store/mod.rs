//! Store Module
//!
//! The key-value capability set the cache layer is built on, with a Redis
//! implementation for shared deployments and an in-process one for tests and
//! single-instance use.
//!
//! # TTL convention
//! `Duration::ZERO` means "no expiry" everywhere a TTL is accepted. TTLs are
//! applied with millisecond precision.

pub mod memory;
mod pipeline;
mod redis_store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::{Config, StoreBackend};
use crate::error::Result;

pub use self::memory::MemoryStore;
pub use self::pipeline::{Command, Pipeline, Reply};
pub use self::redis_store::RedisStore;

/// Minimal key-value store capability set.
///
/// Implementations must be safe to share between tasks; the cache layer never
/// adds locking of its own around a store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Checks that the store answers.
    async fn ping(&self) -> Result<()>;

    /// Reads a string value. Absent keys yield `CacheError::NotFound`.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Writes a string value unconditionally.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Deletes keys in one command and returns how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// Creates `key` only if it does not exist. Returns true iff this call created it.
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool>;

    /// Atomically adds `delta` (absent = 0) and returns the new value.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;

    /// Runs a server-side script that returns an integer.
    async fn eval_script(&self, script: &str, keys: &[String], args: &[String]) -> Result<i64>;

    /// Sets (or with zero, clears) the expiry of a key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Remaining time to live; `None` when the key never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Reads several string values, `None` for each absent key, in input order.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Reads all fields of a hash; an absent key yields an empty map.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Sets hash fields and returns how many were newly created.
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<u64>;

    /// Sends a batch of write commands in one round trip and returns one reply
    /// per command, in order.
    ///
    /// Every command runs even if an earlier one fails; the first failure is
    /// then returned instead of the replies. The batch is not atomic.
    async fn pipeline(&self, commands: &[Command]) -> Result<Vec<Reply>>;
}

/// Builds the configured store backend.
///
/// Redis connections are checked with PING before being handed out; the memory backend
/// gets its expiry sweep spawned on the current runtime.
pub async fn connect(config: &Config) -> Result<Arc<dyn KvStore>> {
    match config.backend {
        StoreBackend::Redis => {
            let store = RedisStore::connect(&config.redis).await?;
            info!(host = %config.redis.host, port = config.redis.port, db = config.redis.db, "Connected to redis");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            let store = Arc::new(MemoryStore::new(config.memory.max_entries));
            crate::tasks::spawn_cleanup_task(store.clone(), config.memory.cleanup_interval);
            info!(max_entries = config.memory.max_entries, "Using in-process store");
            Ok(store)
        }
    }
}

/// Milliseconds for a TTL, `None` for the "no expiry" zero duration.
pub(crate) fn ttl_millis(ttl: Duration) -> Option<u64> {
    if ttl.is_zero() {
        None
    } else {
        Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1))
    }
}
