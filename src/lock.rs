//! Distributed Lock
//!
//! Cross-instance mutual exclusion on top of the store's conditional create.
//!
//! At most one caller holds a given lock at a time; the store's atomic
//! `SET NX` guarantees it. There is no ownership token: `release` deletes the
//! key whoever holds it, so a holder whose TTL ran out can release a lock that
//! has since been taken by someone else. Keep TTLs well above the critical
//! section's duration.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::Result;
use crate::retry::set_if_absent_with_retry;
use crate::store::KvStore;

/// Namespace separating lock keys from cache entries.
pub const LOCK_PREFIX: &str = "lock:";

/// Value stored under a held lock.
pub const LOCK_MARKER: &[u8] = b"1";

// == Distributed Lock ==
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn KvStore>,
    prefix: String,
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_prefix(store, LOCK_PREFIX)
    }

    /// Uses a custom namespace instead of `lock:`.
    pub fn with_prefix(store: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// The store key backing the lock `key`.
    pub fn lock_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    // == Acquire ==
    /// Tries once to take the lock for `ttl`.
    ///
    /// `Ok(false)` means someone else holds it; errors are store failures.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let lock_key = self.lock_key(key);
        let acquired = self.store.set_if_absent(&lock_key, LOCK_MARKER, ttl).await?;
        debug!(lock = %lock_key, acquired, "Lock acquire");
        Ok(acquired)
    }

    /// Takes the lock, retrying up to `max_retries` times with linear backoff.
    ///
    /// `value` is stored as the lock marker. `Ok(false)` after the retries are
    /// exhausted means the lock stayed held; a failing store yields its error.
    pub async fn acquire_with_retry(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        max_retries: u32,
    ) -> Result<bool> {
        let lock_key = self.lock_key(key);
        set_if_absent_with_retry(self.store.as_ref(), &lock_key, value, ttl, max_retries).await
    }

    // == Release ==
    /// Deletes the lock unconditionally. Releasing a free lock is a no-op.
    pub async fn release(&self, key: &str) -> Result<()> {
        let lock_key = self.lock_key(key);
        let removed = self.store.delete(&[lock_key.clone()]).await?;
        debug!(lock = %lock_key, held = removed > 0, "Lock release");
        Ok(())
    }
}
