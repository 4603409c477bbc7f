//! Keyspace Module
//!
//! The data behind a `MemoryStore`: HashMap storage with LRU tracking and TTL
//! expiration. Not synchronized; the store wraps it in a lock.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{CacheError, Result};
use crate::store::memory::{Entry, LruTracker, StoreStats, Value};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const OOM: &str = "OOM keyspace full and no evictable key left";

// == Keyspace ==
#[derive(Debug)]
pub struct Keyspace {
    entries: HashMap<String, Entry>,
    lru: LruTracker,
    stats: StoreStats,
    /// Maximum number of keys before eviction
    max_entries: usize,
}

impl Keyspace {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: StoreStats::new(),
            max_entries: max_entries.max(1),
        }
    }

    // == Live Lookup ==
    /// Returns the entry for `key` unless it is absent or expired.
    ///
    /// Expired entries are removed on the way.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(Entry::is_expired) {
            self.remove(key);
            self.stats.record_expired(1);
            return None;
        }
        self.entries.get_mut(key)
    }

    // == Insert ==
    /// Stores an entry, evicting the least recently used evictable key when full.
    ///
    /// Pinned keys (locks, counters) are never evicted. When only pinned keys
    /// are left and none has expired, the write is refused.
    fn insert(&mut self, key: &str, entry: Entry) -> Result<()> {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            match self.lru.evict_oldest() {
                Some(evicted) => {
                    self.entries.remove(&evicted);
                    self.stats.record_eviction();
                }
                None if self.cleanup_expired() > 0 => {}
                None => return Err(CacheError::Store(OOM.to_string())),
            }
        }
        let evictable = entry.evictable;
        self.entries.insert(key.to_string(), entry);
        if evictable {
            self.lru.touch(key);
        } else {
            self.lru.remove(key);
        }
        Ok(())
    }

    /// Marks a key as recently used if it takes part in eviction.
    fn touch(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(|entry| entry.evictable) {
            self.lru.touch(key);
        }
    }

    // == Get ==
    /// Reads a string value, recording a hit or miss.
    pub fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = match self.live(key) {
            Some(Entry {
                value: Value::Bytes(bytes),
                ..
            }) => Some(bytes.clone()),
            Some(_) => return Err(CacheError::Store(WRONGTYPE.to_string())),
            None => None,
        };

        match value {
            Some(_) => {
                self.stats.record_hit();
                self.touch(key);
            }
            None => self.stats.record_miss(),
        }
        Ok(value)
    }

    // == Set ==
    /// Writes a string value, replacing any previous value and TTL.
    pub fn set(&mut self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.insert(key, Entry::new(Value::Bytes(value), ttl))
    }

    /// Writes only if the key is absent (or expired).
    ///
    /// The key is pinned: it guards mutual exclusion, so only its TTL or a
    /// delete may remove it.
    pub fn set_if_absent(&mut self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        if self.live(key).is_some() {
            return Ok(false);
        }
        self.insert(key, Entry::pinned(Value::Bytes(value), ttl))?;
        Ok(true)
    }

    // == Remove ==
    /// Removes a key, returning whether a live entry existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.lru.remove(key);
        match self.entries.remove(key) {
            Some(entry) => !entry.is_expired(),
            None => false,
        }
    }

    /// Reads an integer value without counting it as a hit or miss; absent = 0.
    pub fn peek_integer(&mut self, key: &str) -> Result<i64> {
        match self.live(key) {
            None => Ok(0),
            Some(entry) => parse_integer(&entry.value),
        }
    }

    // == Increment ==
    /// Adds `delta` to an integer value (absent = 0), keeping any TTL.
    ///
    /// Counters are pinned; losing one to eviction would reset it to zero.
    pub fn incr_by(&mut self, key: &str, delta: i64) -> Result<i64> {
        match self.live(key) {
            Some(entry) => {
                let next = parse_integer(&entry.value)?
                    .checked_add(delta)
                    .ok_or_else(|| {
                        CacheError::Store("ERR increment or decrement would overflow".to_string())
                    })?;
                entry.value = Value::Bytes(next.to_string().into_bytes());
                entry.evictable = false;
                self.lru.remove(key);
                Ok(next)
            }
            None => {
                let value = Value::Bytes(delta.to_string().into_bytes());
                self.insert(key, Entry::pinned(value, Duration::ZERO))?;
                Ok(delta)
            }
        }
    }

    // == Expiry ==
    /// Replaces the TTL of a live key; zero removes it.
    pub fn expire(&mut self, key: &str, ttl: Duration) -> bool {
        match self.live(key) {
            Some(entry) => {
                entry.set_ttl(ttl);
                true
            }
            None => false,
        }
    }

    pub fn ttl(&mut self, key: &str) -> Result<Option<Duration>> {
        match self.live(key) {
            Some(entry) => Ok(entry.ttl_remaining()),
            None => Err(CacheError::NotFound(key.to_string())),
        }
    }

    // == Hashes ==
    pub fn hgetall(&mut self, key: &str) -> Result<HashMap<String, String>> {
        match self.live(key) {
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.clone()),
            Some(_) => Err(CacheError::Store(WRONGTYPE.to_string())),
            None => Ok(HashMap::new()),
        }
    }

    /// Sets hash fields, creating the hash if needed. Returns the number of new fields.
    pub fn hset(&mut self, key: &str, fields: &[(String, String)]) -> Result<u64> {
        if self.live(key).is_none() {
            self.insert(key, Entry::new(Value::Hash(HashMap::new()), Duration::ZERO))?;
        }
        let Some(entry) = self.entries.get_mut(key) else {
            return Err(CacheError::NotFound(key.to_string()));
        };
        let Value::Hash(hash) = &mut entry.value else {
            return Err(CacheError::Store(WRONGTYPE.to_string()));
        };

        let mut created = 0;
        for (field, value) in fields {
            if hash.insert(field.clone(), value.clone()).is_none() {
                created += 1;
            }
        }
        self.touch(key);
        Ok(created)
    }

    // == Cleanup Expired ==
    /// Removes all expired entries and returns how many were dropped.
    pub fn cleanup_expired(&mut self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.remove(key);
            self.lru.remove(key);
        }
        self.stats.record_expired(expired.len());
        expired.len()
    }

    pub fn record_command(&mut self) {
        self.stats.record_command();
    }

    pub fn stats(&self) -> StoreStats {
        let mut stats = self.stats.clone();
        stats.total_entries = self.entries.len();
        stats
    }

    /// Number of stored keys, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_integer(value: &Value) -> Result<i64> {
    let Value::Bytes(bytes) = value else {
        return Err(CacheError::Store(WRONGTYPE.to_string()));
    };
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| CacheError::Store("ERR value is not an integer or out of range".to_string()))
}
