//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CacheError, Result};
use crate::store::{Command, KvStore, MemoryStore, Reply};

/// `MemoryStore` wrapper that can be told to fail the next N calls of a command
/// with a connectivity error, and counts the calls it receives.
#[derive(Debug, Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    failures: Mutex<HashMap<&'static str, usize>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` calls of `command` fail.
    pub fn fail_next(&self, command: &'static str, times: usize) {
        self.failures.lock().unwrap().insert(command, times);
    }

    pub fn calls(&self, command: &'static str) -> usize {
        self.calls.lock().unwrap().get(command).copied().unwrap_or(0)
    }

    fn enter(&self, command: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(command).or_default() += 1;
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(command) {
            Some(left) if *left > 0 => {
                *left -= 1;
                let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "injected");
                Err(CacheError::Redis(io.into()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl KvStore for FaultyStore {
    async fn ping(&self) -> Result<()> {
        self.enter("ping")?;
        self.inner.ping().await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.enter("get")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.enter("set")?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.enter("delete")?;
        self.inner.delete(keys).await
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        self.enter("set_if_absent")?;
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.enter("incr_by")?;
        self.inner.incr_by(key, delta).await
    }

    async fn eval_script(&self, script: &str, keys: &[String], args: &[String]) -> Result<i64> {
        self.enter("eval_script")?;
        self.inner.eval_script(script, keys, args).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.enter("expire")?;
        self.inner.expire(key, ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.enter("ttl")?;
        self.inner.ttl(key).await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        self.enter("mget")?;
        self.inner.mget(keys).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.enter("hgetall")?;
        self.inner.hgetall(key).await
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<u64> {
        self.enter("hset")?;
        self.inner.hset(key, fields).await
    }

    async fn pipeline(&self, commands: &[Command]) -> Result<Vec<Reply>> {
        self.enter("pipeline")?;
        self.inner.pipeline(commands).await
    }
}
