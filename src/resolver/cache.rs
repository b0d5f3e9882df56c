//! Per-snapshot lookup state
//!
//! Each provider's current snapshot gets one [`SnapshotEntry`] holding the
//! lazily built [`ResolutionIndex`] and the memoized channel resolutions.
//! The entry is keyed by the snapshot's id: handing the cache a snapshot
//! with a different id drops the old entry, so nothing derived from a
//! replaced snapshot survives the refresh.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use super::index::ResolutionIndex;
use super::matcher::{cache_key, ChannelMatcher};
use crate::models::{EpgSnapshot, PlaylistChannel, Program};

#[derive(Debug)]
pub struct SnapshotEntry {
    snapshot: Arc<EpgSnapshot>,
    index: OnceLock<ResolutionIndex>,
    /// Positive resolutions only; misses are retried on every lookup
    resolutions: RwLock<HashMap<String, String>>,
}

impl SnapshotEntry {
    pub fn new(snapshot: Arc<EpgSnapshot>) -> Self {
        Self {
            snapshot,
            index: OnceLock::new(),
            resolutions: RwLock::new(HashMap::new()),
        }
    }

    pub fn snapshot(&self) -> &Arc<EpgSnapshot> {
        &self.snapshot
    }

    pub fn snapshot_id(&self) -> Uuid {
        self.snapshot.id
    }

    /// Index for this snapshot, built on first use
    pub fn index(&self) -> &ResolutionIndex {
        self.index.get_or_init(|| ResolutionIndex::build(&self.snapshot))
    }

    /// Guide channel id for a playlist channel, if any tier finds one
    pub fn resolve(&self, channel: &PlaylistChannel) -> Option<String> {
        let key = cache_key(channel);

        if let Some(hit) = self
            .resolutions
            .read()
            .ok()
            .and_then(|map| map.get(&key).cloned())
        {
            return Some(hit);
        }

        let resolved = ChannelMatcher::new(self.index()).resolve(channel)?;

        match self.resolutions.write() {
            Ok(mut map) => {
                map.insert(key, resolved.channel_id.clone());
            }
            Err(_) => warn!("Resolution cache lock poisoned, not memoizing '{}'", key),
        }

        Some(resolved.channel_id)
    }

    /// Sorted programmes for a playlist channel; empty when unresolved
    pub fn programs_for(&self, channel: &PlaylistChannel) -> &[Program] {
        match self.resolve(channel) {
            Some(channel_id) => self.index().programs(&channel_id),
            None => &[],
        }
    }

    pub fn cached_resolutions(&self) -> usize {
        self.resolutions.read().map(|map| map.len()).unwrap_or(0)
    }
}

/// Current [`SnapshotEntry`] per provider
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: RwLock<HashMap<String, Arc<SnapshotEntry>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached entry for the provider if it still belongs to `snapshot_id`
    pub fn get(&self, provider_id: &str, snapshot_id: Uuid) -> Option<Arc<SnapshotEntry>> {
        let entries = self.entries.read().ok()?;
        entries
            .get(provider_id)
            .filter(|entry| entry.snapshot_id() == snapshot_id)
            .cloned()
    }

    /// Any cached entry for the provider, whatever snapshot it belongs to
    pub fn current(&self, provider_id: &str) -> Option<Arc<SnapshotEntry>> {
        self.entries.read().ok()?.get(provider_id).cloned()
    }

    /// Entry for `snapshot`, replacing the provider's entry when the
    /// snapshot id differs from the cached one.
    pub fn entry_for(&self, snapshot: Arc<EpgSnapshot>) -> Arc<SnapshotEntry> {
        if let Some(entry) = self.get(&snapshot.provider_id, snapshot.id) {
            return entry;
        }

        let entry = Arc::new(SnapshotEntry::new(snapshot));
        match self.entries.write() {
            Ok(mut entries) => {
                let provider_id = entry.snapshot().provider_id.clone();
                // Another caller may have installed the same snapshot meanwhile
                if let Some(existing) = entries
                    .get(&provider_id)
                    .filter(|e| e.snapshot_id() == entry.snapshot_id())
                {
                    return Arc::clone(existing);
                }
                if let Some(old) = entries.insert(provider_id.clone(), Arc::clone(&entry)) {
                    debug!(
                        "Replaced cached snapshot {} with {} for provider '{}'",
                        old.snapshot_id(),
                        entry.snapshot_id(),
                        provider_id
                    );
                }
            }
            Err(_) => warn!("Snapshot cache lock poisoned, serving uncached entry"),
        }
        entry
    }

    /// Drop the provider's entry, returning whether one was cached
    pub fn evict(&self, provider_id: &str) -> bool {
        let removed = self
            .entries
            .write()
            .map(|mut entries| entries.remove(provider_id).is_some())
            .unwrap_or(false);
        if removed {
            debug!("Evicted cached snapshot for provider '{}'", provider_id);
        }
        removed
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EpgChannel;
    use chrono::{TimeZone, Utc};

    fn snapshot() -> Arc<EpgSnapshot> {
        Arc::new(EpgSnapshot::new(
            "p1",
            vec![Program {
                channel_id: "BBC1".to_string(),
                title: "News".to_string(),
                description: None,
                start: Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2024, 1, 1, 19, 0, 0).unwrap(),
            }],
            vec![EpgChannel {
                id: "BBC1".to_string(),
                display_names: vec!["BBC One".to_string()],
            }],
        ))
    }

    fn channel(name: &str, tvg_id: Option<&str>) -> PlaylistChannel {
        PlaylistChannel {
            provider_id: "p1".to_string(),
            category_name: "UK".to_string(),
            name: name.to_string(),
            tvg_id: tvg_id.map(str::to_string),
            logo_url: None,
            stream_url: "http://stream/1".to_string(),
        }
    }

    #[test]
    fn test_only_positive_resolutions_are_cached() {
        let entry = SnapshotEntry::new(snapshot());

        assert_eq!(entry.resolve(&channel("BBC One HD", None)), Some("BBC1".to_string()));
        assert_eq!(entry.resolve(&channel("Unknown", Some("nope.xx"))), None);
        assert_eq!(entry.cached_resolutions(), 1);
        assert_eq!(entry.programs_for(&channel("bbc one", None)).len(), 1);
        assert!(entry.programs_for(&channel("Unknown", None)).is_empty());
    }

    #[test]
    fn test_entry_replaced_when_snapshot_changes() {
        let cache = SnapshotCache::new();
        let first = snapshot();

        let a = cache.entry_for(Arc::clone(&first));
        let b = cache.entry_for(Arc::clone(&first));
        assert!(Arc::ptr_eq(&a, &b));

        let c = cache.entry_for(snapshot());
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("p1", first.id).is_none());

        assert!(cache.evict("p1"));
        assert!(!cache.evict("p1"));
        assert!(cache.is_empty());
    }
}
