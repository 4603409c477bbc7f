//! Cache Layer - Redis-backed caching for application services
//!
//! Cache-aside reads with background write-back, distributed locks, capped
//! counters and cache invalidation tied to database writes. Runs against Redis
//! or an in-process store with TTL expiration and LRU eviction.

pub mod cache;
pub mod codec;
pub mod config;
pub mod counter;
pub mod db;
pub mod error;
pub mod lock;
pub mod logging;
pub mod retry;
pub mod store;
pub mod tasks;

#[cfg(test)]
mod testing;

pub use cache::Cache;
pub use config::Config;
pub use counter::{CappedCounter, IncrementOutcome};
pub use db::{CachedDb, Database};
pub use error::{CacheError, Result};
pub use lock::DistributedLock;
pub use retry::set_if_absent_with_retry;
pub use store::{Command, KvStore, MemoryStore, Pipeline, RedisStore, Reply};
pub use tasks::{spawn_cleanup_task, BackgroundTasks};
