//! Configuration Module
//!
//! Handles loading the cache layer configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

/// Which key-value store backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Shared Redis instance
    Redis,
    /// In-process store, single instance only
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!("unknown store backend '{}', expected 'redis' or 'memory'", other),
        }
    }
}

/// Redis connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    /// Upper bound for the initial PING
    pub connect_timeout: Duration,
}

impl RedisConfig {
    /// Connection parameters for the redis client.
    ///
    /// The password travels as its own field, so it may contain any character.
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                password: self.password.clone(),
                ..RedisConnectionInfo::default()
            },
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: 0,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// In-process store parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Maximum number of keys before LRU eviction kicks in
    pub max_entries: usize,
    /// Interval between expired-entry sweeps
    pub cleanup_interval: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            cleanup_interval: Duration::from_secs(1),
        }
    }
}

/// Cache layer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Deployment environment, `production` switches logging to JSON
    pub environment: String,
    pub backend: StoreBackend,
    pub redis: RedisConfig,
    pub memory: MemoryConfig,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `APP_ENV` - Deployment environment (default: development)
    /// - `STORE_BACKEND` - `redis` or `memory` (default: redis)
    /// - `REDIS_HOST` - Redis host (default: 127.0.0.1)
    /// - `REDIS_PORT` - Redis port (default: 6379)
    /// - `REDIS_PASSWORD` - Redis password (default: none)
    /// - `REDIS_DB` - Redis database index (default: 0)
    /// - `REDIS_CONNECT_TIMEOUT_SECS` - Ping timeout on connect (default: 5)
    /// - `MEMORY_MAX_ENTRIES` - In-process store capacity (default: 10000)
    /// - `MEMORY_CLEANUP_INTERVAL_SECS` - Expiry sweep interval (default: 1)
    ///
    /// Unset variables fall back to their defaults; set but malformed ones are errors.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        Ok(Self {
            environment: env::var("APP_ENV").unwrap_or(defaults.environment),
            backend: parse_var("STORE_BACKEND")?.unwrap_or(defaults.backend),
            redis: RedisConfig {
                host: env::var("REDIS_HOST").unwrap_or(defaults.redis.host),
                port: parse_var("REDIS_PORT")?.unwrap_or(defaults.redis.port),
                password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
                db: parse_var("REDIS_DB")?.unwrap_or(defaults.redis.db),
                connect_timeout: parse_var("REDIS_CONNECT_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.redis.connect_timeout),
            },
            memory: MemoryConfig {
                max_entries: parse_var("MEMORY_MAX_ENTRIES")?
                    .unwrap_or(defaults.memory.max_entries),
                cleanup_interval: parse_var("MEMORY_CLEANUP_INTERVAL_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.memory.cleanup_interval),
            },
        })
    }

    /// Returns true when running in production.
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            backend: StoreBackend::Redis,
            redis: RedisConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

fn parse_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid value '{}' for {}", raw, name)),
        Err(_) => Ok(None),
    }
}
