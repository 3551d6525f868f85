//! Fingerprinting and external-modification tracking for syncpoint.
//!
//! This crate provides content hashing, the in-memory hash registry (with a
//! bounded version cache for contention diffs), and the debounced filesystem
//! watcher that keeps fingerprints in sync with out-of-band edits.

pub mod hash;
pub mod registry;
pub mod watcher;

// Re-exports
pub use hash::{compute_file_hash, compute_hash, HashError};
pub use registry::{HashRegistry, HashSource, RegistryEntry, VersionCache};
pub use watcher::{spawn_watcher, WatcherConfig, WatcherHandle};
