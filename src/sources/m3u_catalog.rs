//! Minimal `#EXTINF` playlist reader
//!
//! Produces the [`PlaylistChannel`] records guide lookups are made for. It
//! understands `tvg-id`, `tvg-name`, `tvg-logo` and `group-title`, plus a
//! following `#EXTGRP` line; every other tag is ignored.

use tracing::debug;

use super::m3u_header::parse_attributes;
use crate::models::PlaylistChannel;

const DEFAULT_CATEGORY: &str = "Other";

#[derive(Debug, Default)]
struct PendingEntry {
    name: Option<String>,
    tvg_id: Option<String>,
    tvg_name: Option<String>,
    logo_url: Option<String>,
    group_title: Option<String>,
    ext_group: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl PendingEntry {
    fn from_extinf(line: &str) -> Self {
        // #EXTINF:-1 tvg-id="..." tvg-logo="..." group-title="...",Channel Name
        let body = line.get("#EXTINF:".len()..).unwrap_or_default();
        let (attributes_part, name) = match body.rfind(',') {
            Some(comma_pos) => (&body[..comma_pos], Some(body[comma_pos + 1..].to_string())),
            None => (body, None),
        };

        let mut entry = Self {
            name: non_blank(name),
            ..Default::default()
        };

        for (key, value) in parse_attributes(attributes_part) {
            match key.to_ascii_lowercase().as_str() {
                "tvg-id" => entry.tvg_id = non_blank(Some(value)),
                "tvg-name" => entry.tvg_name = non_blank(Some(value)),
                "tvg-logo" => entry.logo_url = non_blank(Some(value)),
                "group-title" => entry.group_title = non_blank(Some(value)),
                _ => {}
            }
        }

        entry
    }

    fn into_channel(self, provider_id: &str, stream_url: &str) -> PlaylistChannel {
        PlaylistChannel {
            provider_id: provider_id.to_string(),
            category_name: self
                .group_title
                .or(self.ext_group)
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            name: self
                .name
                .or(self.tvg_name)
                .unwrap_or_else(|| stream_url.to_string()),
            tvg_id: self.tvg_id,
            logo_url: self.logo_url,
            stream_url: stream_url.to_string(),
        }
    }
}

fn starts_with_tag(line: &str, tag: &str) -> bool {
    line.get(..tag.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(tag))
}

/// Read every channel entry of a playlist.
///
/// A stream URL line without a preceding `#EXTINF` still becomes a channel
/// named after its URL.
pub fn parse_playlist(provider_id: &str, content: &str) -> Vec<PlaylistChannel> {
    let mut channels = Vec::new();
    let mut pending = PendingEntry::default();

    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if starts_with_tag(line, "#EXTINF") {
            pending = PendingEntry::from_extinf(line);
        } else if starts_with_tag(line, "#EXTGRP") {
            pending.ext_group = non_blank(line.split_once(':').map(|(_, group)| group.to_string()));
        } else if !line.starts_with('#') {
            channels.push(std::mem::take(&mut pending).into_channel(provider_id, line));
        }
    }

    debug!("Parsed {} playlist channels for provider '{}'", channels.len(), provider_id);
    channels
}
