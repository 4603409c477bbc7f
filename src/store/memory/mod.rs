//! In-process Store
//!
//! A `KvStore` living in the current process, with TTL expiration, LRU eviction
//! and native stand-ins for the server-side scripts the cache layer runs.
//! Every command takes the keyspace lock once, so each command (and each
//! script) is atomic with respect to all others.

mod entry;
mod keyspace;
mod lru;
mod stats;

#[cfg(test)]
mod property_tests;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{CacheError, Result};
use crate::store::pipeline::{self, Command, Reply};
use crate::store::KvStore;

pub(crate) use entry::{Entry, Value};
pub use keyspace::Keyspace;
pub(crate) use lru::LruTracker;
pub use stats::StoreStats;

/// Rust implementation of a server-side script, run under the keyspace lock.
pub type NativeScript =
    Arc<dyn Fn(&mut Keyspace, &[String], &[String]) -> Result<i64> + Send + Sync>;

// == Memory Store ==
pub struct MemoryStore {
    keyspace: RwLock<Keyspace>,
    /// Script source text -> native implementation
    scripts: HashMap<String, NativeScript>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("scripts", &self.scripts.len())
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Creates a store holding at most `max_entries` keys.
    ///
    /// The capped-counter script is registered out of the box.
    pub fn new(max_entries: usize) -> Self {
        Self {
            keyspace: RwLock::new(Keyspace::new(max_entries)),
            scripts: HashMap::new(),
        }
        .with_script(
            crate::counter::INCR_WITH_MAX_SCRIPT,
            crate::counter::incr_with_max_native,
        )
    }

    /// Registers a native implementation for the script with exactly this source.
    pub fn with_script<F>(mut self, source: &str, script: F) -> Self
    where
        F: Fn(&mut Keyspace, &[String], &[String]) -> Result<i64> + Send + Sync + 'static,
    {
        self.scripts.insert(source.to_string(), Arc::new(script));
        self
    }

    /// Returns a snapshot of the usage counters.
    pub async fn stats(&self) -> StoreStats {
        self.keyspace.read().await.stats()
    }

    /// Drops every expired key and returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        self.keyspace.write().await.cleanup_expired()
    }

    /// Number of stored keys, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.keyspace.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keyspace.read().await.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(crate::config::MemoryConfig::default().max_entries)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.keyspace.write().await.record_command();
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let mut ks = self.keyspace.write().await;
        ks.record_command();
        ks.get(key)?
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut ks = self.keyspace.write().await;
        ks.record_command();
        ks.set(key, value.to_vec(), ttl)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut ks = self.keyspace.write().await;
        ks.record_command();
        Ok(keys.iter().filter(|key| ks.remove(key)).count() as u64)
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut ks = self.keyspace.write().await;
        ks.record_command();
        ks.set_if_absent(key, value.to_vec(), ttl)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut ks = self.keyspace.write().await;
        ks.record_command();
        ks.incr_by(key, delta)
    }

    async fn eval_script(&self, script: &str, keys: &[String], args: &[String]) -> Result<i64> {
        let native = self.scripts.get(script).ok_or_else(|| {
            CacheError::Store("NOSCRIPT No matching script registered".to_string())
        })?;
        let mut ks = self.keyspace.write().await;
        ks.record_command();
        let run = native.as_ref();
        run(&mut *ks, keys, args)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut ks = self.keyspace.write().await;
        ks.record_command();
        Ok(ks.expire(key, ttl))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut ks = self.keyspace.write().await;
        ks.record_command();
        ks.ttl(key)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let mut ks = self.keyspace.write().await;
        ks.record_command();
        // MGET answers nil for wrong-typed keys instead of failing
        Ok(keys
            .iter()
            .map(|key| ks.get(key).ok().flatten())
            .collect())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut ks = self.keyspace.write().await;
        ks.record_command();
        ks.hgetall(key)
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<u64> {
        if fields.is_empty() {
            return Err(CacheError::InvalidRequest(
                "HSET requires at least one field".to_string(),
            ));
        }
        let mut ks = self.keyspace.write().await;
        ks.record_command();
        ks.hset(key, fields)
    }

    async fn pipeline(&self, commands: &[Command]) -> Result<Vec<Reply>> {
        pipeline::validate(commands)?;
        let mut ks = self.keyspace.write().await;
        let mut replies = Vec::with_capacity(commands.len());
        let mut first_error = None;
        // Like a server-side pipeline, a failed command does not stop the rest
        for command in commands {
            ks.record_command();
            match run_command(&mut ks, command) {
                Ok(reply) => replies.push(reply),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(replies),
        }
    }
}

fn run_command(ks: &mut Keyspace, command: &Command) -> Result<Reply> {
    match command {
        Command::Set { key, value, ttl } => {
            ks.set(key, value.clone(), *ttl)?;
            Ok(Reply::Done)
        }
        Command::Delete { keys } => {
            let removed = keys.iter().filter(|key| ks.remove(key)).count();
            Ok(Reply::Integer(removed as i64))
        }
        Command::IncrBy { key, delta } => ks.incr_by(key, *delta).map(Reply::Integer),
        Command::Expire { key, ttl } => Ok(Reply::Bool(ks.expire(key, *ttl))),
        Command::HSet { key, fields } => ks
            .hset(key, fields)
            .map(|created| Reply::Integer(created as i64)),
    }
}
