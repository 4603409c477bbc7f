//! Pipeline Module
//!
//! Write commands queued client-side and sent to the store in one round trip.
//! A pipeline is a batch, not a transaction: every command runs even when an
//! earlier one fails, and other clients may interleave with it.

use std::time::Duration;

use serde::Serialize;

use crate::codec;
use crate::error::{CacheError, Result};

/// One queued store command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set {
        key: String,
        value: Vec<u8>,
        ttl: Duration,
    },
    Delete {
        keys: Vec<String>,
    },
    IncrBy {
        key: String,
        delta: i64,
    },
    /// Zero removes the expiry
    Expire {
        key: String,
        ttl: Duration,
    },
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
}

/// Reply to one pipelined command, in queue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// `Set` succeeded
    Done,
    /// `Delete` (keys removed), `IncrBy` (new value), `HSet` (fields created)
    Integer(i64),
    /// `Expire`: whether the key existed
    Bool(bool),
}

// == Pipeline ==
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<Vec<u8>>, ttl: Duration) -> &mut Self {
        self.commands.push(Command::Set {
            key: key.to_string(),
            value: value.into(),
            ttl,
        });
        self
    }

    /// Queues a `set` of `value` encoded as JSON.
    pub fn set_value<T>(&mut self, key: &str, value: &T, ttl: Duration) -> Result<&mut Self>
    where
        T: Serialize + ?Sized,
    {
        let payload = codec::encode(value)?;
        Ok(self.set(key, payload, ttl))
    }

    pub fn delete<K: AsRef<str>>(&mut self, keys: &[K]) -> &mut Self {
        self.commands.push(Command::Delete {
            keys: keys.iter().map(|k| k.as_ref().to_string()).collect(),
        });
        self
    }

    pub fn incr_by(&mut self, key: &str, delta: i64) -> &mut Self {
        self.commands.push(Command::IncrBy {
            key: key.to_string(),
            delta,
        });
        self
    }

    pub fn expire(&mut self, key: &str, ttl: Duration) -> &mut Self {
        self.commands.push(Command::Expire {
            key: key.to_string(),
            ttl,
        });
        self
    }

    pub fn hset(&mut self, key: &str, field: &str, value: &str) -> &mut Self {
        self.commands.push(Command::HSet {
            key: key.to_string(),
            fields: vec![(field.to_string(), value.to_string())],
        });
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Rejects batches a store could not run as queued.
pub(crate) fn validate(commands: &[Command]) -> Result<()> {
    for command in commands {
        let keys: Vec<&str> = match command {
            Command::Delete { keys } if keys.is_empty() => {
                return Err(CacheError::InvalidRequest(
                    "pipelined delete needs at least one key".to_string(),
                ));
            }
            Command::HSet { fields, .. } if fields.is_empty() => {
                return Err(CacheError::InvalidRequest(
                    "pipelined HSET needs at least one field".to_string(),
                ));
            }
            Command::Delete { keys } => keys.iter().map(String::as_str).collect(),
            Command::Set { key, .. }
            | Command::IncrBy { key, .. }
            | Command::Expire { key, .. }
            | Command::HSet { key, .. } => vec![key.as_str()],
        };
        if keys.iter().any(|key| key.is_empty()) {
            return Err(CacheError::InvalidRequest(
                "pipelined command with empty key".to_string(),
            ));
        }
    }
    Ok(())
}
