//! Persistence of merged guide snapshots
//!
//! Snapshots are loaded and saved whole, keyed by provider id. The merge
//! engine and the query services only see the [`SnapshotStore`] trait, so
//! the on-disk JSON store can be swapped for the in-memory one in tests.

pub mod snapshot_store;

pub use snapshot_store::{JsonSnapshotStore, MemorySnapshotStore, SnapshotStore};
