//! TTL Cleanup Task
//!
//! Background task that periodically removes expired keys from a `MemoryStore`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::store::MemoryStore;

/// Spawns a background task that periodically sweeps expired keys.
///
/// The task only holds a weak reference and stops on its own once the store
/// is dropped. The returned handle can abort it earlier.
///
/// # Example
/// ```ignore
/// let store = Arc::new(MemoryStore::new(1000));
/// let cleanup_handle = spawn_cleanup_task(store.clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(store: Arc<MemoryStore>, interval: Duration) -> JoinHandle<()> {
    let store = Arc::downgrade(&store);

    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting TTL cleanup task");

        loop {
            tokio::time::sleep(interval).await;

            let Some(store) = store.upgrade() else {
                debug!("Store dropped, stopping TTL cleanup task");
                break;
            };

            let removed = store.cleanup_expired().await;
            if removed > 0 {
                info!(removed, "TTL cleanup: removed expired keys");
            } else {
                debug!("TTL cleanup: no expired keys found");
            }
        }
    })
}
