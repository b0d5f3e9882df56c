//! Tiered resolution of playlist channels to guide channel ids
//!
//! Tiers, each tried only when the previous found nothing:
//!
//! 1. **Exact id**: the tvg-id as given or without a country suffix, then
//!    the channel name as given or without quality tokens.
//! 2. **Display name**: the normalized channel name against guide display names.
//! 3. **Normalized id**: every tier 1 candidate normalized, against normalized ids.
//! 4. **Fuzzy**: prefix/containment scoring against normalized ids.
//!
//! Not finding a match is an ordinary outcome, not an error.

use std::collections::HashSet;
use tracing::trace;

use super::index::ResolutionIndex;
use crate::models::PlaylistChannel;
use crate::utils::normalize::{normalize_key, remove_country_suffix, strip_quality_tokens};

/// Lowest fuzzy score accepted as a match
pub const FUZZY_THRESHOLD: i32 = 55;
const MAX_LENGTH_PENALTY: i32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    ExactId,
    DisplayName,
    NormalizedId,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMatch {
    pub channel_id: String,
    pub tier: MatchTier,
}

impl ChannelMatch {
    fn new(channel_id: &str, tier: MatchTier) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            tier,
        }
    }
}

/// Resolution cache key: the tvg-id when present, else the trimmed name
pub fn cache_key(channel: &PlaylistChannel) -> String {
    match channel.tvg_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => format!("id:{}", id.to_lowercase()),
        None => format!("name:{}", channel.name.trim().to_lowercase()),
    }
}

/// Score a normalized key against a normalized query, or `None` below the
/// threshold.
///
/// ```rust
/// use epg_merge::resolver::matcher::fuzzy_score;
///
/// assert_eq!(fuzzy_score("SKYSPORTSMAIN", "SKYSPORTS"), Some(76));
/// assert_eq!(fuzzy_score("BBC1", "ITV2"), None);
/// ```
pub fn fuzzy_score(key: &str, query: &str) -> Option<i32> {
    let base = if key == query {
        100
    } else if key.starts_with(query) {
        80
    } else if query.starts_with(key) {
        70
    } else if key.contains(query) {
        60
    } else if query.contains(key) {
        55
    } else {
        return None;
    };

    let delta = (key.chars().count() as i64 - query.chars().count() as i64).unsigned_abs();
    let penalty = delta.min(MAX_LENGTH_PENALTY as u64) as i32;
    let score = base - penalty;
    (score >= FUZZY_THRESHOLD).then_some(score)
}

pub struct ChannelMatcher<'a> {
    index: &'a ResolutionIndex,
}

impl<'a> ChannelMatcher<'a> {
    pub fn new(index: &'a ResolutionIndex) -> Self {
        Self { index }
    }

    pub fn resolve(&self, channel: &PlaylistChannel) -> Option<ChannelMatch> {
        if self.index.is_empty() {
            return None;
        }

        let raw = raw_candidates(channel);

        let found = self
            .exact_id(&raw)
            .or_else(|| self.display_name(&channel.name))
            .or_else(|| {
                let normalized = normalized_candidates(&raw);
                self.normalized_id(&normalized)
                    .or_else(|| self.fuzzy(&normalized))
            });

        match &found {
            Some(m) => trace!("Resolved '{}' to '{}' via {:?}", channel.name, m.channel_id, m.tier),
            None => trace!("No guide channel for '{}'", channel.name),
        }
        found
    }

    fn exact_id(&self, raw: &[String]) -> Option<ChannelMatch> {
        raw.iter()
            .find_map(|candidate| self.index.canonical_id(candidate))
            .map(|id| ChannelMatch::new(id, MatchTier::ExactId))
    }

    fn display_name(&self, name: &str) -> Option<ChannelMatch> {
        if name.trim().is_empty() {
            return None;
        }
        [normalize_key(name), normalize_key(&strip_quality_tokens(name))]
            .iter()
            .filter(|key| !key.is_empty())
            .find_map(|key| self.index.id_for_display_name(key))
            .map(|id| ChannelMatch::new(id, MatchTier::DisplayName))
    }

    fn normalized_id(&self, normalized: &[String]) -> Option<ChannelMatch> {
        normalized
            .iter()
            .find_map(|key| self.index.id_for_normalized(key))
            .map(|id| ChannelMatch::new(id, MatchTier::NormalizedId))
    }

    fn fuzzy(&self, normalized: &[String]) -> Option<ChannelMatch> {
        normalized.iter().find_map(|query| {
            self.index
                .normalized_keys()
                .filter_map(|(key, id)| fuzzy_score(key, query).map(|score| (score, id)))
                // Highest score, then shortest id, then lexically smallest
                .max_by(|(sa, ia), (sb, ib)| {
                    sa.cmp(sb)
                        .then_with(|| ib.len().cmp(&ia.len()))
                        .then_with(|| ib.cmp(ia))
                })
                .map(|(_, id)| ChannelMatch::new(id, MatchTier::Fuzzy))
        })
    }
}

/// Tier 1 candidates in priority order, trimmed, non-empty and distinct
/// ignoring case.
fn raw_candidates(channel: &PlaylistChannel) -> Vec<String> {
    let mut candidates = Vec::with_capacity(5);

    if let Some(tvg_id) = channel.tvg_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        candidates.push(tvg_id.to_string());
        candidates.push(remove_country_suffix(tvg_id, '.').to_string());
        candidates.push(remove_country_suffix(tvg_id, '-').to_string());
    }

    let name = channel.name.trim();
    if !name.is_empty() {
        candidates.push(name.to_string());
        candidates.push(strip_quality_tokens(name));
    }

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && seen.insert(c.to_lowercase()))
        .collect()
}

fn normalized_candidates(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .map(|c| normalize_key(c))
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .collect()
}
