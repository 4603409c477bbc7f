//! Retrying conditional create
//!
//! `SET key value NX` with bounded retries on store errors.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Result;
use crate::store::KvStore;

/// Base step of the linear backoff between failed attempts.
pub const RETRY_BACKOFF_STEP: Duration = Duration::from_millis(100);

/// Creates `key` only if absent, retrying while it is taken or the store fails.
///
/// Up to `max_retries` attempts are made, sleeping `100ms * attempt` between
/// them. The first successful create returns `Ok(true)`. If the key stays taken
/// through every attempt the result is `Ok(false)`, which is distinct from a
/// store failure: an error on the final attempt is returned as is.
/// `max_retries == 0` makes no attempt and yields `Ok(false)`.
pub async fn set_if_absent_with_retry(
    store: &dyn KvStore,
    key: &str,
    value: &[u8],
    ttl: Duration,
    max_retries: u32,
) -> Result<bool> {
    for attempt in 1..=max_retries {
        match store.set_if_absent(key, value, ttl).await {
            Ok(true) => {
                debug!(key, attempt, "Conditional create succeeded");
                return Ok(true);
            }
            Ok(false) => debug!(key, attempt, "Key already taken"),
            Err(err) if attempt == max_retries => return Err(err),
            Err(err) => warn!(key, attempt, error = %err, "Conditional create failed, retrying"),
        }

        if attempt < max_retries {
            tokio::time::sleep(RETRY_BACKOFF_STEP * attempt).await;
        }
    }
    Ok(false)
}
