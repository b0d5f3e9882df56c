//! Channel identity resolution between playlists and guide snapshots

pub mod cache;
pub mod index;
pub mod matcher;

pub use cache::{SnapshotCache, SnapshotEntry};
pub use index::ResolutionIndex;
pub use matcher::{ChannelMatch, ChannelMatcher, MatchTier};
