//! Checkpoint module for windows that failed to transfer
//!
//! This module provides:
//! - The on-disk entry format
//! - The locked, atomically rewritten checkpoint store

mod entry;
mod lock;
mod store;

pub use entry::CheckpointEntry;
pub use lock::CheckpointLock;
pub use store::{load, CheckpointStore};
