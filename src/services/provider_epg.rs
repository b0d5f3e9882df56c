//! Provider guide refresh orchestration
//!
//! Decides where a provider's guide comes from and produces its next
//! snapshot:
//!
//! - a manually configured file path is loaded as the only source, and any
//!   failure is returned to the caller since nothing can stand in for it;
//! - otherwise manually configured URLs, or failing those the URLs
//!   advertised in the playlist header, are merged by [`SourceMergeEngine`];
//! - with no URLs at all the user is told so and the old snapshot stays.
//!
//! Successful refreshes are announced on the [`EpgEventBus`] so query-side
//! caches can drop state tied to the replaced snapshot.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::MergeConfig;
use crate::errors::{AppError, AppResult, SourceError};
use crate::ingestor::{DiagnosticReport, EpgEvent, EpgEventBus, FeedOutcome, MergeOutcome, SourceMergeEngine};
use crate::models::{EpgSnapshot, ProviderEpgConfig};
use crate::repositories::SnapshotStore;
use crate::services::programs::dedup_programs;
use crate::sources::m3u_header::{extract_epg_urls, join_urls, split_joined_urls};
use crate::sources::xmltv::{classify_document, parse_xmltv, preview, DocumentKind};
use crate::sources::FeedFetcher;

pub const NO_GUIDE_URLS_MESSAGE: &str = "No guide URLs found (no x-tvg-url in playlist header)";

/// Where a refresh takes its guide data from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuidePlan {
    SingleFile(String),
    Merge(Vec<String>),
    Nothing,
}

pub struct ProviderEpgService {
    fetcher: Arc<dyn FeedFetcher>,
    store: Arc<dyn SnapshotStore>,
    bus: EpgEventBus,
    engine: SourceMergeEngine,
}

impl ProviderEpgService {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<dyn SnapshotStore>,
        bus: EpgEventBus,
        config: MergeConfig,
    ) -> Self {
        let engine = SourceMergeEngine::new(Arc::clone(&fetcher), Arc::clone(&store), config);
        Self {
            fetcher,
            store,
            bus,
            engine,
        }
    }

    /// Work out the guide source for a provider.
    pub fn plan(provider: &ProviderEpgConfig, playlist: Option<&str>) -> GuidePlan {
        if provider.has_manual_source() {
            if let Some(path) = provider
                .xmltv_file_path
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
            {
                return GuidePlan::SingleFile(path.to_string());
            }

            // Stored entries may themselves hold comma separated lists
            let manual = split_joined_urls(&join_urls(&provider.xmltv_urls));
            if !manual.is_empty() {
                return GuidePlan::Merge(manual);
            }
        }

        let discovered = playlist.map(extract_epg_urls).unwrap_or_default();
        if discovered.is_empty() {
            GuidePlan::Nothing
        } else {
            GuidePlan::Merge(discovered)
        }
    }

    /// Refresh a provider's guide, returning the outcome when a new
    /// snapshot was stored.
    pub async fn refresh(
        &self,
        provider: &ProviderEpgConfig,
        playlist: Option<&str>,
    ) -> AppResult<Option<MergeOutcome>> {
        let provider_id = provider.provider_id.trim();
        if provider_id.is_empty() {
            return Err(AppError::validation("Provider id must not be empty"));
        }

        let outcome = match Self::plan(provider, playlist) {
            GuidePlan::SingleFile(path) => self.load_single(provider_id, &path).await?,
            GuidePlan::Merge(urls) => self.engine.merge(provider_id, &urls).await?,
            GuidePlan::Nothing => {
                info!("Provider '{}' has no guide URLs, keeping current snapshot", provider_id);
                self.bus.notify(Some(provider_id), NO_GUIDE_URLS_MESSAGE);
                return Ok(None);
            }
        };

        self.bus.publish(EpgEvent::SnapshotReplaced {
            provider_id: provider_id.to_string(),
            snapshot_id: outcome.snapshot.id,
        });
        self.bus.notify(Some(provider_id), outcome.summary.to_string());

        Ok(Some(outcome))
    }

    /// Load one manually configured guide file or URL as the whole snapshot.
    async fn load_single(&self, provider_id: &str, location: &str) -> AppResult<MergeOutcome> {
        info!("Loading guide for provider '{}' from single source", provider_id);

        let text = self.fetcher.fetch_text(location).await?;

        match classify_document(&text) {
            DocumentKind::Guide => {}
            DocumentKind::Empty => {
                return Err(AppError::validation(format!("Guide source is empty: {location}")));
            }
            DocumentKind::NotGuideFormat => {
                return Err(SourceError::UnrecognizedFormat {
                    location: location.to_string(),
                    preview: preview(&text),
                }
                .into());
            }
        }

        let document = tokio::task::spawn_blocking(move || parse_xmltv(&text))
            .await
            .map_err(|e| AppError::internal(format!("Guide parser task failed: {e}")))??;

        if document.programs.is_empty() {
            return Err(AppError::validation(format!(
                "Guide source contains no valid programmes: {location}"
            )));
        }

        let mut report = DiagnosticReport::new();
        report.record(
            location,
            FeedOutcome::Ok {
                programs: document.programs.len(),
                channels: document.channels.len(),
            },
        );

        let snapshot = EpgSnapshot::new(provider_id, dedup_programs(document.programs), document.channels);
        self.store.save(&snapshot).await?;

        let lines = report.sorted_lines();
        if let Err(e) = self.store.write_report(provider_id, &lines).await {
            warn!("Failed to write guide report for provider '{}': {}", provider_id, e);
        }

        let summary = report.summary(snapshot.programs.len(), snapshot.channels.len());
        info!("Provider '{}': {}", provider_id, summary);

        Ok(MergeOutcome {
            snapshot,
            summary,
            report: lines,
        })
    }
}
