use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

pub mod http_config;

pub use http_config::HttpConfig;

/// Placeholder title for programmes whose feed carries no usable title.
pub const UNTITLED_PROGRAM: &str = "(Untitled)";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Program {
    pub channel_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Program {
    pub fn is_airing_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EpgChannel {
    pub id: String,
    pub display_names: Vec<String>,
}

/// Merged guide data for one provider.
///
/// Snapshots are never mutated after construction. A refresh builds a new
/// snapshot with a fresh `id`, and anything derived from the old one (see
/// `resolver::cache`) is discarded when the id changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpgSnapshot {
    pub id: Uuid,
    pub provider_id: String,
    pub created_at: DateTime<Utc>,
    pub programs: Vec<Program>,
    pub channels: Vec<EpgChannel>,
}

impl EpgSnapshot {
    pub fn new(provider_id: impl Into<String>, programs: Vec<Program>, channels: Vec<EpgChannel>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_id: provider_id.into(),
            created_at: Utc::now(),
            programs,
            channels,
        }
    }

    pub fn empty(provider_id: impl Into<String>) -> Self {
        Self::new(provider_id, Vec::new(), Vec::new())
    }
}

/// A channel as listed by the provider's playlist, read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistChannel {
    pub provider_id: String,
    pub category_name: String,
    pub name: String,
    pub tvg_id: Option<String>, // External guide id, rarely equal to the feed's own id
    pub logo_url: Option<String>,
    pub stream_url: String,
}

/// Manually configured guide location(s) for a provider.
///
/// A file path takes precedence over URLs; when neither is set the URLs are
/// discovered from the playlist header instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderEpgConfig {
    pub provider_id: String,
    pub xmltv_urls: Vec<String>,
    pub xmltv_file_path: Option<String>,
}

impl ProviderEpgConfig {
    pub fn has_manual_source(&self) -> bool {
        self.xmltv_file_path
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
            || self.xmltv_urls.iter().any(|u| !u.trim().is_empty())
    }
}

/// Aggregate counts of one merge run, shown to the user afterwards.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeSummary {
    pub ok: usize,
    pub download_failed: usize,
    pub parse_failed: usize,
    pub not_guide_format: usize,
    pub programs: usize,
    pub channels: usize,
}

impl MergeSummary {
    pub fn sources_total(&self) -> usize {
        self.ok + self.download_failed + self.parse_failed + self.not_guide_format
    }
}

impl fmt::Display for MergeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EPG: OK={}, DL_FAIL={}, PARSE_FAIL={}, NOT_XML={}, Programs={}, Channels={}",
            self.ok,
            self.download_failed,
            self.parse_failed,
            self.not_guide_format,
            self.programs,
            self.channels
        )
    }
}

/// Extra request headers keyed by header name.
pub type HeaderMap = BTreeMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_program_airing_window_is_half_open() {
        let program = Program {
            channel_id: "bbc1".to_string(),
            title: "News".to_string(),
            description: None,
            start: Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 1, 19, 0, 0).unwrap(),
        };

        assert!(program.is_airing_at(program.start));
        assert!(!program.is_airing_at(program.end));
    }

    #[test]
    fn test_manual_source_detection() {
        let mut config = ProviderEpgConfig {
            provider_id: "p1".to_string(),
            ..Default::default()
        };
        assert!(!config.has_manual_source());

        config.xmltv_urls = vec!["  ".to_string()];
        assert!(!config.has_manual_source());

        config.xmltv_file_path = Some("/srv/guide.xml".to_string());
        assert!(config.has_manual_source());
    }

    #[test]
    fn test_summary_display() {
        let summary = MergeSummary {
            ok: 2,
            download_failed: 1,
            parse_failed: 0,
            not_guide_format: 1,
            programs: 120,
            channels: 8,
        };
        assert_eq!(summary.sources_total(), 4);
        assert_eq!(
            summary.to_string(),
            "EPG: OK=2, DL_FAIL=1, PARSE_FAIL=0, NOT_XML=1, Programs=120, Channels=8"
        );
    }
}
