//! Atomic Capped Counter
//!
//! Increment-if-below-limit executed as one server-side script, so concurrent
//! callers can never push the count past the ceiling.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::store::memory::Keyspace;
use crate::store::KvStore;

/// Increments `KEYS[1]` if it is below `ARGV[2]`, otherwise answers `-1`.
///
/// `ARGV[1]` is an unused placeholder kept for compatibility with existing
/// callers of the script.
pub const INCR_WITH_MAX_SCRIPT: &str = r#"
    local current = tonumber(redis.call('GET', KEYS[1]) or 0)
    local max = tonumber(ARGV[2])
    if current < max then
        return redis.call('INCR', KEYS[1])
    else
        return -1
    end
"#;

/// Script reply meaning "at capacity".
pub const LIMIT_REACHED: i64 = -1;

/// Result of a bounded increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// The counter was incremented to this value.
    Incremented(i64),
    /// The counter was already at the ceiling and was left unchanged.
    LimitReached,
}

impl IncrementOutcome {
    pub fn is_limit_reached(&self) -> bool {
        matches!(self, IncrementOutcome::LimitReached)
    }

    /// The new count, if the increment happened.
    pub fn count(&self) -> Option<i64> {
        match self {
            IncrementOutcome::Incremented(n) => Some(*n),
            IncrementOutcome::LimitReached => None,
        }
    }
}

// == Capped Counter ==
#[derive(Clone)]
pub struct CappedCounter {
    store: Arc<dyn KvStore>,
}

impl std::fmt::Debug for CappedCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CappedCounter").finish_non_exhaustive()
    }
}

impl CappedCounter {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Increments `key` if its count is below `max`.
    ///
    /// An absent key counts as zero. After a successful increment the expiry is
    /// reset to `ttl` (zero removes any expiry), so the window slides forward
    /// with every accepted call. Failing to refresh the expiry is logged; the
    /// increment itself already happened and is reported.
    ///
    /// Counters are expected to stay non-negative. A count driven to `-2` by
    /// `decr_by` increments to `-1`, which is indistinguishable from the
    /// script's "at capacity" reply and is reported as `LimitReached` even
    /// though the stored count changed.
    pub async fn increment_bounded(
        &self,
        key: &str,
        max: i64,
        ttl: Duration,
    ) -> Result<IncrementOutcome> {
        let reply = self
            .store
            .eval_script(
                INCR_WITH_MAX_SCRIPT,
                &[key.to_string()],
                &["1".to_string(), max.to_string()],
            )
            .await?;

        if reply == LIMIT_REACHED {
            debug!(key, max, "Counter at capacity");
            return Ok(IncrementOutcome::LimitReached);
        }

        if let Err(err) = self.store.expire(key, ttl).await {
            warn!(key, error = %err, "Failed to refresh counter expiry");
        }
        Ok(IncrementOutcome::Incremented(reply))
    }
}

/// In-process equivalent of [`INCR_WITH_MAX_SCRIPT`] for the memory store.
pub(crate) fn incr_with_max_native(
    keyspace: &mut Keyspace,
    keys: &[String],
    args: &[String],
) -> Result<i64> {
    let key = keys
        .first()
        .ok_or_else(|| CacheError::Store("ERR script expects one key".to_string()))?;
    let max = args
        .get(1)
        .and_then(|arg| arg.parse::<i64>().ok())
        .ok_or_else(|| CacheError::Store("ERR script expects an integer ceiling".to_string()))?;

    if keyspace.peek_integer(key)? < max {
        keyspace.incr_by(key, 1)
    } else {
        Ok(LIMIT_REACHED)
    }
}
