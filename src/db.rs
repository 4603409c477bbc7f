//! Cached Database
//!
//! Couples a relational backing store to the cache: reads go through the
//! cache-aside path, successful writes schedule invalidation of the cache keys
//! they affect.
//!
//! Invalidation runs detached after the write has committed and is not part of
//! its atomicity, so a read racing a write may still see, or even re-cache, the
//! pre-write value. Use short TTLs or a [`crate::DistributedLock`] where that
//! matters.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::error::CacheError;

/// Transaction capability of a backing store.
///
/// Dropping a transaction that was neither committed nor rolled back must roll
/// it back; that is what happens when a transaction body panics.
#[async_trait]
pub trait Database: Send + Sync {
    /// Open transaction handle.
    type Tx: Send;
    /// Store error; cache errors (e.g. "no row") convert into it.
    type Error: From<CacheError> + Display + Send;

    async fn begin(&self) -> Result<Self::Tx, Self::Error>;
    async fn commit(&self, tx: Self::Tx) -> Result<(), Self::Error>;
    async fn rollback(&self, tx: Self::Tx) -> Result<(), Self::Error>;
}

// == Cached Database ==
#[derive(Debug, Clone)]
pub struct CachedDb<D> {
    db: D,
    cache: Cache,
}

impl<D: Database> CachedDb<D> {
    pub fn new(db: D, cache: Cache) -> Self {
        Self { db, cache }
    }

    pub fn db(&self) -> &D {
        &self.db
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    // == Read Through ==
    /// Reads one row through the cache.
    ///
    /// On a miss `query` runs against the database; `Ok(None)` (no row) becomes
    /// `CacheError::NotFound` converted into the database error type.
    pub async fn read_through<'a, T, F, Fut>(
        &'a self,
        cache_key: &str,
        ttl: Duration,
        query: F,
    ) -> Result<T, D::Error>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&'a D) -> Fut,
        Fut: Future<Output = Result<Option<T>, D::Error>> + 'a,
    {
        self.cache
            .get_or_set(cache_key, ttl, || async {
                let row = query(&self.db).await?;
                row.ok_or_else(|| D::Error::from(CacheError::NotFound(cache_key.to_string())))
            })
            .await
    }

    // == Write Invalidate ==
    /// Runs `mutate`; once it succeeds, `cache_keys` are deleted in the background.
    ///
    /// A failed mutation invalidates nothing and its error is returned as is.
    pub async fn write_invalidate<'a, R, F, Fut, K>(
        &'a self,
        cache_keys: &[K],
        mutate: F,
    ) -> Result<R, D::Error>
    where
        F: FnOnce(&'a D) -> Fut,
        Fut: Future<Output = Result<R, D::Error>> + 'a,
        K: AsRef<str>,
    {
        let result = mutate(&self.db).await?;
        self.invalidate(cache_keys);
        Ok(result)
    }

    // == Transaction Invalidate ==
    /// Runs `body` inside a transaction; only after a successful commit are
    /// `cache_keys` deleted in the background.
    ///
    /// A failing body rolls the transaction back and invalidates nothing.
    pub async fn transaction_invalidate<R, F, K>(
        &self,
        cache_keys: &[K],
        body: F,
    ) -> Result<R, D::Error>
    where
        F: for<'t> FnOnce(&'t mut D::Tx) -> BoxFuture<'t, Result<R, D::Error>>,
        K: AsRef<str>,
    {
        let mut tx = self.db.begin().await?;

        match body(&mut tx).await {
            Ok(result) => {
                self.db.commit(tx).await?;
                self.invalidate(cache_keys);
                Ok(result)
            }
            Err(err) => {
                if let Err(rollback_err) = self.db.rollback(tx).await {
                    warn!(error = %rollback_err, "Transaction rollback failed");
                }
                debug!(error = %err, "Transaction aborted, cache left untouched");
                Err(err)
            }
        }
    }

    fn invalidate<K: AsRef<str>>(&self, cache_keys: &[K]) {
        if cache_keys.is_empty() {
            return;
        }
        let keys: Vec<String> = cache_keys.iter().map(|k| k.as_ref().to_string()).collect();
        let cache = self.cache.clone();
        self.cache.tasks().spawn("cache_invalidate", async move {
            cache.delete(&keys).await.map(|_| ())
        });
    }
}
