//! Lookup structures built once per snapshot
//!
//! Guide channel ids compare case-insensitively; the first spelling seen in
//! the snapshot is the one handed back to callers.

use std::collections::HashMap;
use tracing::debug;

use crate::models::{EpgSnapshot, Program};
use crate::utils::normalize::normalize_key;

#[derive(Debug, Clone)]
struct ChannelPrograms {
    channel_id: String,
    /// Sorted ascending by start
    programs: Vec<Program>,
}

#[derive(Debug, Clone, Default)]
pub struct ResolutionIndex {
    /// Lowercased raw id -> canonical id and its programmes
    by_raw: HashMap<String, ChannelPrograms>,
    /// Normalized id -> canonical ids, shortest first
    by_normalized: HashMap<String, Vec<String>>,
    /// Normalized display name -> channel id, first channel listing it wins
    by_display_name: HashMap<String, String>,
}

impl ResolutionIndex {
    pub fn build(snapshot: &EpgSnapshot) -> Self {
        let mut by_raw: HashMap<String, ChannelPrograms> = HashMap::new();

        for program in &snapshot.programs {
            let raw = program.channel_id.trim();
            if raw.is_empty() {
                continue;
            }
            by_raw
                .entry(raw.to_lowercase())
                .or_insert_with(|| ChannelPrograms {
                    channel_id: raw.to_string(),
                    programs: Vec::new(),
                })
                .programs
                .push(program.clone());
        }

        let mut by_normalized: HashMap<String, Vec<String>> = HashMap::new();
        for entry in by_raw.values_mut() {
            entry.programs.sort_by_key(|p| p.start);

            let key = normalize_key(&entry.channel_id);
            if !key.is_empty() {
                by_normalized
                    .entry(key)
                    .or_default()
                    .push(entry.channel_id.clone());
            }
        }
        for ids in by_normalized.values_mut() {
            ids.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        }

        let mut by_display_name = HashMap::new();
        for channel in &snapshot.channels {
            let id = channel.id.trim();
            if id.is_empty() {
                continue;
            }
            // Prefer the spelling programmes use so lookups land in by_raw
            let id = by_raw
                .get(&id.to_lowercase())
                .map(|entry| entry.channel_id.clone())
                .unwrap_or_else(|| id.to_string());

            for name in &channel.display_names {
                let key = normalize_key(name);
                if !key.is_empty() {
                    by_display_name.entry(key).or_insert_with(|| id.clone());
                }
            }
        }

        debug!(
            "Built resolution index for snapshot {}: {} channel ids, {} normalized keys, {} display names",
            snapshot.id,
            by_raw.len(),
            by_normalized.len(),
            by_display_name.len()
        );

        Self {
            by_raw,
            by_normalized,
            by_display_name,
        }
    }

    /// True when the snapshot has no programmes at all
    pub fn is_empty(&self) -> bool {
        self.by_raw.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.by_raw.len()
    }

    /// Canonical spelling of a raw channel id that has programmes
    pub fn canonical_id(&self, raw: &str) -> Option<&str> {
        self.by_raw
            .get(&raw.trim().to_lowercase())
            .map(|entry| entry.channel_id.as_str())
    }

    /// Programmes of a channel sorted by start; empty when unknown
    pub fn programs(&self, channel_id: &str) -> &[Program] {
        self.by_raw
            .get(&channel_id.trim().to_lowercase())
            .map(|entry| entry.programs.as_slice())
            .unwrap_or_default()
    }

    pub fn id_for_display_name(&self, normalized: &str) -> Option<&str> {
        self.by_display_name.get(normalized).map(String::as_str)
    }

    /// Shortest raw id sharing a normalized key
    pub fn id_for_normalized(&self, normalized: &str) -> Option<&str> {
        self.by_normalized
            .get(normalized)
            .and_then(|ids| ids.first())
            .map(String::as_str)
    }

    /// Every normalized key with its shortest raw id
    pub fn normalized_keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_normalized
            .iter()
            .filter_map(|(key, ids)| ids.first().map(|id| (key.as_str(), id.as_str())))
    }
}
