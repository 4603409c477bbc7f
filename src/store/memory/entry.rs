//! Memory Entry Module
//!
//! A single key of the in-process store: its value and expiry deadline.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

// == Value ==
/// Value types the in-process store understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Value {
    /// Plain string value (GET/SET/INCR family)
    Bytes(Vec<u8>),
    /// Field map (HGETALL/HSET family)
    Hash(HashMap<String, String>),
}

// == Entry ==
/// Represents a single key with value and expiry metadata.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) value: Value,
    /// Expiration deadline, None = no expiration
    pub(crate) expires_at: Option<Instant>,
    /// Whether LRU eviction may drop this key; locks and counters are pinned
    pub(crate) evictable: bool,
}

impl Entry {
    // == Constructor ==
    /// Creates a new evictable entry; a zero TTL means the entry never expires.
    pub(crate) fn new(value: Value, ttl: Duration) -> Self {
        let mut entry = Self {
            value,
            expires_at: None,
            evictable: true,
        };
        entry.set_ttl(ttl);
        entry
    }

    /// Creates an entry that only expiry or an explicit delete can remove.
    pub(crate) fn pinned(value: Value, ttl: Duration) -> Self {
        Self {
            evictable: false,
            ..Self::new(value, ttl)
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its deadline.
    pub(crate) fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Replaces the expiry; zero clears it.
    pub(crate) fn set_ttl(&mut self, ttl: Duration) {
        self.expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
    }

    /// Remaining time to live, or None if no expiration is set.
    pub(crate) fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}
