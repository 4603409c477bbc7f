//! Cache-Aside Accessor
//!
//! Typed reads and writes of JSON payloads over a shared `KvStore`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::codec;
use crate::counter::CappedCounter;
use crate::error::{CacheError, Result};
use crate::lock::DistributedLock;
use crate::store::{KvStore, Pipeline, Reply};
use crate::tasks::BackgroundTasks;

// == Cache ==
/// Cache-aside accessor. Cheap to clone; clones share the store handle and
/// the background task spawner.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn KvStore>,
    tasks: BackgroundTasks,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").field("tasks", &self.tasks).finish_non_exhaustive()
    }
}

impl Cache {
    // == Constructor ==
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_tasks(store, BackgroundTasks::new())
    }

    /// Uses an existing spawner, e.g. one shared with other components.
    pub fn with_tasks(store: Arc<dyn KvStore>, tasks: BackgroundTasks) -> Self {
        Self { store, tasks }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Spawner running the cache write-backs.
    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Lock handle over the same store.
    pub fn locks(&self) -> DistributedLock {
        DistributedLock::new(self.store.clone())
    }

    /// Capped counter handle over the same store.
    pub fn counters(&self) -> CappedCounter {
        CappedCounter::new(self.store.clone())
    }

    // == Get Or Set ==
    /// Reads `key`, falling back to `fetch` on a miss.
    ///
    /// - Hit: the cached payload is decoded; a payload that does not decode is an
    ///   error, not a miss.
    /// - Store failure while reading: logged and treated as a miss.
    /// - Miss: `fetch` runs and its error, if any, is returned untouched. Its value
    ///   is encoded and decoded back, and that decoded copy is returned, so the
    ///   caller sees exactly what was cached. The payload is written under `key`
    ///   with `ttl` by a detached background task; the caller does not wait for it
    ///   and never hears about its failure.
    ///
    /// Concurrent misses on one key each run `fetch`; pair with a
    /// [`DistributedLock`] to serialize them.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        validate_key(key)?;

        match self.store.get(key).await {
            Ok(bytes) => return Ok(codec::decode(&bytes)?),
            Err(err) if err.is_not_found() => debug!(key, "Cache miss"),
            Err(err) => warn!(key, error = %err, "Cache read failed, fetching from source"),
        }

        let value = fetch().await?;
        let (payload, normalized) = codec::normalize(&value)?;

        let store = self.store.clone();
        let key = key.to_string();
        self.tasks.spawn("cache_write_back", async move {
            store.set(&key, &payload, ttl).await
        });

        Ok(normalized)
    }

    // == Get ==
    /// Reads and decodes `key`. Absent keys yield `CacheError::NotFound`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        validate_key(key)?;
        let bytes = self.store.get(key).await?;
        codec::decode(&bytes)
    }

    // == Set ==
    /// Encodes and stores `value` unconditionally.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        validate_key(key)?;
        let payload = codec::encode(value)?;
        self.store.set(key, &payload, ttl).await
    }

    // == Delete ==
    /// Deletes keys in a single command and returns how many existed.
    ///
    /// An empty list succeeds without contacting the store. On error some keys
    /// may already be gone; deleting again is safe.
    pub async fn delete<K: AsRef<str>>(&self, keys: &[K]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        self.store.delete(&keys).await
    }

    // == Multi Get ==
    /// Reads several keys and decodes the ones present.
    ///
    /// Absent keys are skipped, so the result does not line up with `keys`.
    /// If none is present the result is `CacheError::NotFound`.
    pub async fn mget<T: DeserializeOwned, K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<T>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        let values = self.store.mget(&keys).await?;

        let found: Vec<T> = values
            .iter()
            .flatten()
            .map(|bytes| codec::decode(bytes))
            .collect::<Result<_>>()?;

        if found.is_empty() {
            return Err(CacheError::NotFound(keys.join(",")));
        }
        Ok(found)
    }

    // == Hashes ==
    /// All fields of a hash; empty if the key does not exist.
    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        validate_key(key)?;
        self.store.hgetall(key).await
    }

    /// Sets one hash field. Returns true if the field was new.
    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        validate_key(key)?;
        let created = self
            .store
            .hset(key, &[(field.to_string(), value.to_string())])
            .await?;
        Ok(created == 1)
    }

    /// Sets several hash fields at once. Returns how many were new.
    pub async fn hmset(&self, key: &str, fields: &HashMap<String, String>) -> Result<u64> {
        validate_key(key)?;
        let fields: Vec<(String, String)> = fields
            .iter()
            .map(|(f, v)| (f.clone(), v.clone()))
            .collect();
        self.store.hset(key, &fields).await
    }

    // == Atomic Counters ==
    pub async fn incr(&self, key: &str) -> Result<i64> {
        self.incr_by(key, 1).await
    }

    pub async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        validate_key(key)?;
        self.store.incr_by(key, delta).await
    }

    pub async fn decr(&self, key: &str) -> Result<i64> {
        self.incr_by(key, -1).await
    }

    pub async fn decr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let delta = delta
            .checked_neg()
            .ok_or_else(|| CacheError::InvalidRequest(format!("cannot decrement by {}", delta)))?;
        self.incr_by(key, delta).await
    }

    // == Pipeline ==
    /// Queues commands with `build` and sends them in one round trip.
    ///
    /// Nothing is sent if `build` fails, e.g. because a value did not encode.
    /// The batch is not atomic: every command runs, and the first failing one
    /// decides the returned error.
    pub async fn pipeline<F>(&self, build: F) -> Result<Vec<Reply>>
    where
        F: FnOnce(&mut Pipeline) -> Result<()>,
    {
        let mut pipeline = Pipeline::new();
        build(&mut pipeline)?;
        if pipeline.is_empty() {
            return Ok(Vec::new());
        }
        let replies = self.store.pipeline(pipeline.commands()).await?;
        debug!(commands = pipeline.len(), "Pipeline executed");
        Ok(replies)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    Ok(())
}
