//! Payload codec
//!
//! JSON encoding of cached values. Every byte string written by the cache layer
//! goes through [`encode`], every one read back through [`decode`].

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// Serializes a value into its cached byte form.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Deserializes a cached byte string.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Encodes `value` and decodes the very same bytes again.
///
/// The returned value is exactly what a later cache hit would produce, so callers
/// never observe state that did not make it into the payload.
pub fn normalize<T: Serialize + DeserializeOwned>(value: &T) -> Result<(Vec<u8>, T)> {
    let bytes = encode(value)?;
    let decoded = decode(&bytes)?;
    Ok((bytes, decoded))
}
