//! Guide URL discovery from the playlist header line
//!
//! Providers advertise their guide feeds on the `#EXTM3U` line, e.g.
//! `#EXTM3U x-tvg-url="https://a/guide.xml.gz,https://b/guide.xml"`.

use std::collections::{HashMap, HashSet};
use std::iter::Peekable;
use std::str::Chars;
use tracing::debug;

const HEADER_TAG: &str = "#EXTM3U";

/// Header attributes naming guide feeds, in lookup priority order
pub const GUIDE_URL_KEYS: [&str; 5] = ["x-tvg-url", "url-tvg", "tvg-url", "x-tvg-url1", "x-tvg-url2"];

/// Extract guide feed URLs from playlist text.
///
/// Only the first non-blank line is inspected and only when it is the
/// `#EXTM3U` header. The first recognised attribute with a non-blank value
/// wins; its value is split on commas, trimmed, unquoted and de-duplicated
/// case-insensitively. Anything else yields an empty list.
pub fn extract_epg_urls(playlist: &str) -> Vec<String> {
    let Some(first_line) = playlist.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Vec::new();
    };

    let is_header = first_line
        .get(..HEADER_TAG.len())
        .is_some_and(|tag| tag.eq_ignore_ascii_case(HEADER_TAG));
    if !is_header {
        return Vec::new();
    }

    let attributes = parse_header_attributes(first_line);

    for key in GUIDE_URL_KEYS {
        if let Some(raw) = attributes.get(key).filter(|v| !v.trim().is_empty()) {
            let urls = normalize_urls(raw.split(','));
            debug!("Discovered {} guide URL(s) from header attribute '{}'", urls.len(), key);
            return urls;
        }
    }

    Vec::new()
}

/// Attributes of a header line keyed by lowercased name. A repeated key
/// keeps its last value.
pub fn parse_header_attributes(header_line: &str) -> HashMap<String, String> {
    let Some((_, rest)) = header_line.trim().split_once(char::is_whitespace) else {
        return HashMap::new();
    };

    parse_attributes(rest)
        .into_iter()
        .map(|(key, value)| (key.to_ascii_lowercase(), value))
        .collect()
}

/// Split a stored feed list (comma or newline separated) back into URLs.
pub fn split_joined_urls(joined: &str) -> Vec<String> {
    normalize_urls(joined.split([',', '\n']))
}

/// Join URLs into the single string form used for storage.
pub fn join_urls<I, S>(urls: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let owned: Vec<String> = urls.into_iter().map(|u| u.as_ref().to_string()).collect();
    normalize_urls(owned.iter().map(String::as_str)).join(",")
}

fn normalize_urls<'a>(parts: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    parts
        .map(|p| p.trim().trim_matches('"').trim())
        .filter(|p| !p.is_empty())
        .filter(|p| seen.insert(p.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Parse `key="value"` and `key=value` tokens in order of appearance.
///
/// Whitespace is allowed around `=`. A quoted value runs to the next quote
/// and is taken literally, backslashes included; an unquoted value runs to
/// the next whitespace. Bare tokens without `=` are skipped.
pub(crate) fn parse_attributes(attributes: &str) -> Vec<(String, String)> {
    fn skip_whitespace(chars: &mut Peekable<Chars<'_>>) {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    let mut attrs = Vec::new();
    let mut chars = attributes.chars().peekable();

    loop {
        skip_whitespace(&mut chars);
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != '=') {
            key.push(c);
        }

        skip_whitespace(&mut chars);
        if chars.next_if_eq(&'=').is_none() {
            continue;
        }
        skip_whitespace(&mut chars);

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                value.push(c);
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                value.push(c);
            }
        }

        if !key.is_empty() {
            attrs.push((key, value));
        }
    }

    attrs
}
