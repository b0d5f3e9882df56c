//! Guide query service
//!
//! Ties the pieces of a lookup together: the provider's current snapshot is
//! fetched from the store (or the in-process cache), its resolution index is
//! built on first use, the playlist channel is resolved to a guide channel
//! id and the programme queries run against that channel's sorted list.
//!
//! An unresolvable channel or a provider with no snapshot yields empty
//! results, never an error; only store failures surface as `Err`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::programs::{self, NowNext, TimelineItem};
use crate::errors::AppResult;
use crate::ingestor::{EpgEvent, EventReceiver};
use crate::models::{EpgSnapshot, PlaylistChannel, Program};
use crate::repositories::SnapshotStore;
use crate::resolver::{SnapshotCache, SnapshotEntry};

pub struct EpgService {
    store: Arc<dyn SnapshotStore>,
    cache: SnapshotCache,
}

impl EpgService {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            cache: SnapshotCache::new(),
        }
    }

    /// Cached lookup state for the provider's current snapshot
    pub async fn entry(&self, provider_id: &str) -> AppResult<Option<Arc<SnapshotEntry>>> {
        if let Some(entry) = self.cache.current(provider_id) {
            return Ok(Some(entry));
        }

        match self.store.load(provider_id).await? {
            Some(snapshot) => {
                debug!(
                    "Loaded snapshot {} for provider '{}' ({} programmes)",
                    snapshot.id,
                    provider_id,
                    snapshot.programs.len()
                );
                Ok(Some(self.cache.entry_for(Arc::new(snapshot))))
            }
            None => Ok(None),
        }
    }

    /// Make `snapshot` the provider's current one without a store round trip
    pub fn install(&self, snapshot: EpgSnapshot) -> Arc<SnapshotEntry> {
        self.cache.entry_for(Arc::new(snapshot))
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Guide channel id for a playlist channel, if one can be matched
    pub async fn resolve_channel_id(&self, channel: &PlaylistChannel) -> AppResult<Option<String>> {
        Ok(self
            .entry(&channel.provider_id)
            .await?
            .and_then(|entry| entry.resolve(channel)))
    }

    /// Sorted programmes for a playlist channel
    pub async fn programs(&self, channel: &PlaylistChannel) -> AppResult<Vec<Program>> {
        Ok(self
            .entry(&channel.provider_id)
            .await?
            .map(|entry| entry.programs_for(channel).to_vec())
            .unwrap_or_default())
    }

    pub async fn now_next<Tz: TimeZone>(&self, channel: &PlaylistChannel, at: DateTime<Tz>) -> AppResult<NowNext> {
        let at = at.with_timezone(&Utc);
        Ok(self
            .entry(&channel.provider_id)
            .await?
            .map(|entry| programs::now_next(entry.programs_for(channel), at))
            .unwrap_or_default())
    }

    pub async fn timeline<Tz: TimeZone>(
        &self,
        channel: &PlaylistChannel,
        at: DateTime<Tz>,
        past: Duration,
        future: Duration,
    ) -> AppResult<Vec<Program>> {
        let at = at.with_timezone(&Utc);
        Ok(self
            .entry(&channel.provider_id)
            .await?
            .map(|entry| programs::timeline(entry.programs_for(channel), at, past, future))
            .unwrap_or_default())
    }

    pub async fn timeline_items<Tz: TimeZone>(
        &self,
        channel: &PlaylistChannel,
        at: DateTime<Tz>,
        past: Duration,
        future: Duration,
    ) -> AppResult<Vec<TimelineItem>> {
        let at = at.with_timezone(&Utc);
        Ok(self
            .entry(&channel.provider_id)
            .await?
            .map(|entry| programs::timeline_items(entry.programs_for(channel), at, past, future))
            .unwrap_or_default())
    }

    /// Drop cached state made stale by a refresh
    pub fn handle_event(&self, event: &EpgEvent) {
        if let EpgEvent::SnapshotReplaced {
            provider_id,
            snapshot_id,
        } = event
        {
            if self.cache.get(provider_id, *snapshot_id).is_none() && self.cache.evict(provider_id) {
                info!(
                    "Provider '{}' has new snapshot {}, cached lookups dropped",
                    provider_id, snapshot_id
                );
            }
        }
    }

    /// Follow refresh events until the bus closes
    pub fn spawn_event_listener(self: Arc<Self>, mut rx: EventReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => self.handle_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} guide event(s), clearing lookup cache", skipped);
                        self.cache.clear();
                    }
                    Err(RecvError::Closed) => {
                        debug!("Guide event bus closed, listener exiting");
                        break;
                    }
                }
            }
        })
    }
}
