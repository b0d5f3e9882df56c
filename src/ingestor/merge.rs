//! Multi-source guide merge
//!
//! Every feed URL is fetched and parsed as an independent task; strict hosts
//! go through a small, staggered pool and everything else through a wider
//! one. Once all tasks settle, each channel id is assigned the single source
//! that supplied the most programmes for it (earlier URL on a tie) and only
//! that source's programmes are kept. Display names are pooled from every
//! source. Failed feeds are reported and counted but never abort the run.

use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::report::{DiagnosticReport, FeedOutcome};
use crate::config::MergeConfig;
use crate::errors::AppResult;
use crate::models::{EpgChannel, EpgSnapshot, MergeSummary, Program};
use crate::repositories::SnapshotStore;
use crate::services::programs::dedup_programs;
use crate::sources::xmltv::{classify_document, parse_xmltv, preview, DocumentKind, XmltvDocument};
use crate::sources::{FeedFetcher, RetrySchedule};
use crate::utils::url::UrlUtils;

/// One successfully parsed feed, alive only for the duration of a merge run
#[derive(Debug, Clone)]
pub struct FeedSource {
    /// Position in the de-duplicated input list, used for tie-breaks
    pub index: usize,
    pub url: String,
    pub programs: Vec<Program>,
    pub channels: Vec<EpgChannel>,
}

/// Result of a merge run
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub snapshot: EpgSnapshot,
    pub summary: MergeSummary,
    /// Sorted report lines as written to the store
    pub report: Vec<String>,
}

pub struct SourceMergeEngine {
    fetcher: Arc<dyn FeedFetcher>,
    store: Arc<dyn SnapshotStore>,
    config: MergeConfig,
}

impl SourceMergeEngine {
    pub fn new(fetcher: Arc<dyn FeedFetcher>, store: Arc<dyn SnapshotStore>, config: MergeConfig) -> Self {
        Self {
            fetcher,
            store,
            config,
        }
    }

    /// Fetch, parse and merge `urls` into a new snapshot for `provider_id`.
    ///
    /// The snapshot is saved even when every feed failed; the summary makes
    /// that visible. Only a store failure while saving the snapshot is an
    /// error. A failure to write the report is logged and ignored.
    pub async fn merge(&self, provider_id: &str, urls: &[String]) -> AppResult<MergeOutcome> {
        let urls = dedup_urls(urls);
        info!(
            "Starting guide merge for provider '{}' with {} feed(s)",
            provider_id,
            urls.len()
        );

        let (sources, report) = self.fetch_all(&urls).await;
        let programs_before = sources.iter().map(|s| s.programs.len()).sum::<usize>();

        let winners = select_winners(&sources);
        let programs = dedup_programs(winning_programs(&sources, &winners));
        let channels = merge_channels(&sources);

        info!(
            "Merged {} programmes ({} offered) across {} channel ids for provider '{}'",
            programs.len(),
            programs_before,
            winners.len(),
            provider_id
        );

        let snapshot = EpgSnapshot::new(provider_id, programs, channels);
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

    async fn fetch_all(&self, urls: &[String]) -> (Vec<FeedSource>, DiagnosticReport) {
        let restricted_gate = Arc::new(Semaphore::new(self.config.restricted_concurrency()));
        let normal_gate = Arc::new(Semaphore::new(self.config.normal_concurrency()));
        let retry = self.config.retry_schedule();

        let mut restricted_position = 0usize;
        let mut handles = Vec::with_capacity(urls.len());

        for (index, url) in urls.iter().enumerate() {
            let (gate, stagger) = if self.config.is_restricted(url) {
                let stagger = self.config.restricted_stagger(restricted_position);
                restricted_position += 1;
                (Arc::clone(&restricted_gate), stagger)
            } else {
                (Arc::clone(&normal_gate), std::time::Duration::ZERO)
            };

            let fetcher = Arc::clone(&self.fetcher);
            let retry = retry.clone();
            let url = url.clone();

            let handle = tokio::spawn(async move {
                if !stagger.is_zero() {
                    tokio::time::sleep(stagger).await;
                }
                let Ok(_permit) = gate.acquire_owned().await else {
                    return (FeedOutcome::DownloadFailed, None);
                };
                process_feed(fetcher.as_ref(), &retry, &url).await
            });
            handles.push((index, urls[index].clone(), handle));
        }

        debug!(
            "Spawned {} feed task(s), {} on the restricted pool",
            handles.len(),
            restricted_position
        );

        let (meta, tasks): (Vec<_>, Vec<_>) = handles
            .into_iter()
            .map(|(index, url, handle)| ((index, url), handle))
            .unzip();
        let results = join_all(tasks).await;

        let mut report = DiagnosticReport::new();
        let mut sources = Vec::new();

        for ((index, url), result) in meta.into_iter().zip(results) {
            let (outcome, document) = match result {
                Ok(settled) => settled,
                Err(e) => {
                    error!("Feed task for {} failed: {}", UrlUtils::obfuscate_credentials(&url), e);
                    (FeedOutcome::DownloadFailed, None)
                }
            };

            report.record(url.clone(), outcome);
            if let Some(document) = document {
                sources.push(FeedSource {
                    index,
                    url,
                    programs: document.programs,
                    channels: document.channels,
                });
            }
        }

        (sources, report)
    }
}

/// Fetch, classify and parse one feed. Never fails; the outcome says how it went.
async fn process_feed(
    fetcher: &dyn FeedFetcher,
    retry: &RetrySchedule,
    url: &str,
) -> (FeedOutcome, Option<XmltvDocument>) {
    let display_url = UrlUtils::obfuscate_credentials(url);

    let text = match retry.fetch(fetcher, url).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Download failed for {}: {}", display_url, e);
            return (FeedOutcome::DownloadFailed, None);
        }
    };

    match classify_document(&text) {
        DocumentKind::Empty => {
            warn!("Empty body from {}", display_url);
            return (FeedOutcome::DownloadFailed, None);
        }
        DocumentKind::NotGuideFormat => {
            let head = preview(&text);
            warn!("Not a guide document: {} (head: {})", display_url, head);
            return (FeedOutcome::NotGuideFormat { preview: head }, None);
        }
        DocumentKind::Guide => {}
    }

    let parsed = tokio::task::spawn_blocking(move || parse_xmltv(&text)).await;
    match parsed {
        Ok(Ok(document)) => {
            info!(
                "Parsed {}: {} programmes, {} channels",
                display_url,
                document.programs.len(),
                document.channels.len()
            );
            let outcome = FeedOutcome::Ok {
                programs: document.programs.len(),
                channels: document.channels.len(),
            };
            (outcome, Some(document))
        }
        Ok(Err(e)) => {
            warn!("Parse failed for {}: {}", display_url, e);
            (FeedOutcome::ParseFailed, None)
        }
        Err(e) => {
            error!("Parser task for {} failed: {}", display_url, e);
            (FeedOutcome::ParseFailed, None)
        }
    }
}

/// Trimmed, non-empty URLs in input order, first spelling kept on
/// case-insensitive duplicates.
fn dedup_urls(urls: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty() && seen.insert(u.to_lowercase()))
        .map(str::to_string)
        .collect()
}

fn channel_key(channel_id: &str) -> String {
    channel_id.trim().to_lowercase()
}

/// Winning source index per lowercased channel id: most programmes, then
/// earliest position in the input list.
pub fn select_winners(sources: &[FeedSource]) -> HashMap<String, usize> {
    let mut best: HashMap<String, (usize, usize)> = HashMap::new();

    for source in sources {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for program in &source.programs {
            let key = channel_key(&program.channel_id);
            if !key.is_empty() {
                *counts.entry(key).or_default() += 1;
            }
        }

        for (key, count) in counts {
            best.entry(key)
                .and_modify(|(index, best_count)| {
                    if count > *best_count || (count == *best_count && source.index < *index) {
                        *index = source.index;
                        *best_count = count;
                    }
                })
                .or_insert((source.index, count));
        }
    }

    best.into_iter().map(|(key, (index, _))| (key, index)).collect()
}

fn winning_programs(sources: &[FeedSource], winners: &HashMap<String, usize>) -> Vec<Program> {
    sources
        .iter()
        .flat_map(|source| {
            source.programs.iter().filter(move |program| {
                winners.get(&channel_key(&program.channel_id)) == Some(&source.index)
            })
        })
        .cloned()
        .collect()
}

/// Union of channels across all sources, display names de-duplicated
/// ignoring case. Sources are visited in input order so the first spelling
/// of an id and the order of its names are stable.
pub fn merge_channels(sources: &[FeedSource]) -> Vec<EpgChannel> {
    let mut ordered: Vec<&FeedSource> = sources.iter().collect();
    ordered.sort_by_key(|s| s.index);

    let mut merged: Vec<EpgChannel> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut seen_names: Vec<HashSet<String>> = Vec::new();

    for channel in ordered.iter().flat_map(|s| s.channels.iter()) {
        let key = channel_key(&channel.id);
        if key.is_empty() {
            continue;
        }

        let position = *positions.entry(key).or_insert_with(|| {
            merged.push(EpgChannel {
                id: channel.id.trim().to_string(),
                display_names: Vec::new(),
            });
            seen_names.push(HashSet::new());
            merged.len() - 1
        });

        for name in &channel.display_names {
            let name = name.trim();
            if !name.is_empty() && seen_names[position].insert(name.to_lowercase()) {
                merged[position].display_names.push(name.to_string());
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn programs(channel_id: &str, count: usize) -> Vec<Program> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| Program {
                channel_id: channel_id.to_string(),
                title: format!("{channel_id} {i}"),
                description: None,
                start: base + Duration::minutes(30 * i as i64),
                end: base + Duration::minutes(30 * (i as i64 + 1)),
            })
            .collect()
    }

    fn source(index: usize, programs: Vec<Program>, channels: Vec<EpgChannel>) -> FeedSource {
        FeedSource {
            index,
            url: format!("http://feed/{index}.xml"),
            programs,
            channels,
        }
    }

    #[test]
    fn test_most_programmes_wins() {
        let a = source(0, programs("X", 50), vec![]);
        let mut b_programs = programs("x", 30);
        b_programs.extend(programs("Y", 20));
        let b = source(1, b_programs, vec![]);

        let winners = select_winners(&[a, b]);
        assert_eq!(winners.get("x"), Some(&0));
        assert_eq!(winners.get("y"), Some(&1));
    }

    #[test]
    fn test_tie_goes_to_earlier_url() {
        // Listed out of order to make sure position, not arrival, decides
        let later = source(3, programs("X", 10), vec![]);
        let earlier = source(1, programs("X", 10), vec![]);

        let winners = select_winners(&[later, earlier]);
        assert_eq!(winners.get("x"), Some(&1));
    }

    #[test]
    fn test_only_winner_programmes_are_kept() {
        let sources = vec![
            source(0, programs("X", 3), vec![]),
            source(1, programs("X", 2), vec![]),
        ];
        let winners = select_winners(&sources);
        let kept = winning_programs(&sources, &winners);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn test_channels_merged_across_all_sources() {
        let sources = vec![
            source(
                1,
                vec![],
                vec![EpgChannel {
                    id: "bbc1".to_string(),
                    display_names: vec!["BBC 1".to_string(), "BBC One".to_string()],
                }],
            ),
            source(
                0,
                vec![],
                vec![
                    EpgChannel {
                        id: "BBC1".to_string(),
                        display_names: vec!["BBC One".to_string()],
                    },
                    EpgChannel {
                        id: " ".to_string(),
                        display_names: vec!["Nothing".to_string()],
                    },
                ],
            ),
        ];

        let merged = merge_channels(&sources);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "BBC1");
        assert_eq!(merged[0].display_names, vec!["BBC One", "BBC 1"]);
    }

    #[test]
    fn test_dedup_urls() {
        let urls = vec![
            " http://a/1.xml ".to_string(),
            "".to_string(),
            "HTTP://A/1.XML".to_string(),
            "http://b/2.xml".to_string(),
        ];
        assert_eq!(dedup_urls(&urls), vec!["http://a/1.xml", "http://b/2.xml"]);
    }
}
