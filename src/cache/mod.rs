//! Cache Module
//!
//! Cache-aside access to JSON payloads stored in a shared key-value store.

mod accessor;

pub use accessor::Cache;
