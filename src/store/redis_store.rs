//! Redis Store
//!
//! `KvStore` over a multiplexed, auto-reconnecting Redis connection.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use crate::config::RedisConfig;
use crate::error::{CacheError, Result};
use crate::store::pipeline::{self, Command, Reply};
use crate::store::{ttl_millis, KvStore};

// == Redis Store ==
/// Shared Redis handle. Cloning is cheap and all clones share one connection.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Opens a connection and checks it with `PING` within the configured timeout.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.connection_info())?;
        let manager = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(config.connect_timeout))??;

        let store = Self { manager };
        tokio::time::timeout(config.connect_timeout, store.ping())
            .await
            .map_err(|_| CacheError::Timeout(config.connect_timeout))??;

        Ok(store)
    }

    /// Wraps an already established connection.
    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn ping(&self) -> Result<()> {
        let mut con = self.conn();
        let _pong: String = redis::cmd("PING").query_async(&mut con).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let mut con = self.conn();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut con).await?;
        value.ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut con = self.conn();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ms) = ttl_millis(ttl) {
            cmd.arg("PX").arg(ms);
        }
        let _: () = cmd.query_async(&mut con).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut con = self.conn();
        let removed: u64 = redis::cmd("DEL").arg(keys).query_async(&mut con).await?;
        Ok(removed)
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut con = self.conn();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ms) = ttl_millis(ttl) {
            cmd.arg("PX").arg(ms);
        }
        // Nil reply when the key already exists
        let reply: Option<String> = cmd.query_async(&mut con).await?;
        Ok(reply.is_some())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut con = self.conn();
        let value: i64 = redis::cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .query_async(&mut con)
            .await?;
        Ok(value)
    }

    async fn eval_script(&self, script: &str, keys: &[String], args: &[String]) -> Result<i64> {
        let mut con = self.conn();
        let script = Script::new(script);
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(arg);
        }
        let value: i64 = invocation.invoke_async(&mut con).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut con = self.conn();
        let changed: i64 = match ttl_millis(ttl) {
            Some(ms) => {
                redis::cmd("PEXPIRE")
                    .arg(key)
                    .arg(ms)
                    .query_async(&mut con)
                    .await?
            }
            None => {
                let exists: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut con).await?;
                if exists == 0 {
                    return Ok(false);
                }
                let _: i64 = redis::cmd("PERSIST").arg(key).query_async(&mut con).await?;
                1
            }
        };
        Ok(changed == 1)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut con = self.conn();
        let ms: i64 = redis::cmd("PTTL").arg(key).query_async(&mut con).await?;
        match ms {
            -2 => Err(CacheError::NotFound(key.to_string())),
            -1 => Ok(None),
            ms => Ok(Some(Duration::from_millis(ms.max(0) as u64))),
        }
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut con = self.conn();
        let values: Vec<Option<Vec<u8>>> =
            redis::cmd("MGET").arg(keys).query_async(&mut con).await?;
        Ok(values)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut con = self.conn();
        let fields: HashMap<String, String> =
            redis::cmd("HGETALL").arg(key).query_async(&mut con).await?;
        Ok(fields)
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<u64> {
        if fields.is_empty() {
            return Err(CacheError::InvalidRequest(
                "HSET requires at least one field".to_string(),
            ));
        }
        let mut con = self.conn();
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        let created: u64 = cmd.query_async(&mut con).await?;
        Ok(created)
    }

    async fn pipeline(&self, commands: &[Command]) -> Result<Vec<Reply>> {
        pipeline::validate(commands)?;
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for command in commands {
            match command {
                Command::Set { key, value, ttl } => {
                    pipe.cmd("SET").arg(key).arg(value.as_slice());
                    if let Some(ms) = ttl_millis(*ttl) {
                        pipe.arg("PX").arg(ms);
                    }
                }
                Command::Delete { keys } => {
                    pipe.cmd("DEL").arg(keys);
                }
                Command::IncrBy { key, delta } => {
                    pipe.cmd("INCRBY").arg(key).arg(*delta);
                }
                Command::Expire { key, ttl } => match ttl_millis(*ttl) {
                    Some(ms) => {
                        pipe.cmd("PEXPIRE").arg(key).arg(ms);
                    }
                    // PERSIST answers 0 for keys without expiry; EXISTS carries the reply
                    None => {
                        pipe.cmd("EXISTS").arg(key);
                        pipe.cmd("PERSIST").arg(key).ignore();
                    }
                },
                Command::HSet { key, fields } => {
                    pipe.cmd("HSET").arg(key);
                    for (field, value) in fields {
                        pipe.arg(field).arg(value);
                    }
                }
            }
        }

        let mut con = self.conn();
        let values: Vec<redis::Value> = pipe.query_async(&mut con).await?;
        if values.len() != commands.len() {
            return Err(CacheError::Store(format!(
                "pipeline answered {} replies for {} commands",
                values.len(),
                commands.len()
            )));
        }
        commands
            .iter()
            .zip(values.iter())
            .map(|(command, value)| pipeline_reply(command, value))
            .collect()
    }
}

fn pipeline_reply(command: &Command, value: &redis::Value) -> Result<Reply> {
    let reply = match command {
        Command::Set { .. } => Reply::Done,
        Command::Expire { .. } => Reply::Bool(redis::from_redis_value::<i64>(value)? == 1),
        Command::Delete { .. } | Command::IncrBy { .. } | Command::HSet { .. } => {
            Reply::Integer(redis::from_redis_value::<i64>(value)?)
        }
    };
    Ok(reply)
}
