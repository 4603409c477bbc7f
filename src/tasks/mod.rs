//! Background Tasks Module
//!
//! Work that runs outside the call that caused it.
//!
//! # Tasks
//! - Detached spawner: cache write-back and invalidation after a write
//! - TTL Cleanup: sweeps expired keys out of the in-process store

mod background;
mod cleanup;

pub use background::BackgroundTasks;
pub use cleanup::spawn_cleanup_task;
