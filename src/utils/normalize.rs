//! Loose comparison keys for channel identifiers, display names and titles
//!
//! Playlist names and guide ids rarely agree on spelling: `"BBC One HD"`,
//! `"bbc.one"` and `"BBC-ONE"` should all meet at `"BBCONE"`.

use regex::Regex;
use std::sync::OnceLock;

fn quality_regex() -> &'static Regex {
    static QUALITY: OnceLock<Regex> = OnceLock::new();
    QUALITY.get_or_init(|| Regex::new(r"(?i)\b(HD|FHD|UHD|4K)\b").expect("valid quality pattern"))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn alphanumeric_upper(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Remove quality markers (`HD`, `FHD`, `UHD`, `4K`) as whole words.
///
/// ```rust
/// use epg_merge::utils::normalize::strip_quality_tokens;
///
/// assert_eq!(strip_quality_tokens("  BBC One HD "), "BBC One");
/// assert_eq!(strip_quality_tokens("HDTV"), "HDTV");
/// ```
pub fn strip_quality_tokens(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    collapse_whitespace(&quality_regex().replace_all(trimmed, ""))
}

/// Comparison key for channel ids and display names: quality tokens
/// stripped, then letters and digits only, uppercased.
pub fn normalize_key(s: &str) -> String {
    alphanumeric_upper(&strip_quality_tokens(s))
}

/// Comparison key for programme titles. Quality tokens are kept, titles
/// like "Planet Earth 4K" are distinct programmes from "Planet Earth".
pub fn normalize_title(s: &str) -> String {
    alphanumeric_upper(&collapse_whitespace(s))
}

/// Drop a trailing two-letter country code separated by `sep`, as in
/// `"BBC1.uk"` or `"RTL-de"`. Anything else is returned unchanged.
pub fn remove_country_suffix(s: &str, sep: char) -> &str {
    match s.rsplit_once(sep) {
        Some((head, suffix))
            if !head.is_empty()
                && suffix.chars().count() == 2
                && suffix.chars().all(char::is_alphabetic) =>
        {
            head
        }
        _ => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_quality_tokens() {
        assert_eq!(strip_quality_tokens("BBC One HD"), "BBC One");
        assert_eq!(strip_quality_tokens("fhd Sky  Sports uhd"), "Sky Sports");
        assert_eq!(strip_quality_tokens("Discovery 4K"), "Discovery");
        assert_eq!(strip_quality_tokens("HDTV Channel"), "HDTV Channel");
        assert_eq!(strip_quality_tokens("   "), "");
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("BBC One HD"), "BBCONE");
        assert_eq!(normalize_key("bbc.one"), "BBCONE");
        assert_eq!(normalize_key("TRT 1"), "TRT1");
        assert_eq!(normalize_key("HD"), "");
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  The   News at Six! "), "THENEWSATSIX");
        assert_eq!(normalize_title("Planet Earth 4K"), "PLANETEARTH4K");
        assert_eq!(normalize_title(""), "");
    }

    #[test]
    fn test_remove_country_suffix() {
        assert_eq!(remove_country_suffix("BBC1.uk", '.'), "BBC1");
        assert_eq!(remove_country_suffix("RTL-de", '-'), "RTL");
        assert_eq!(remove_country_suffix("BBC1.uk", '-'), "BBC1.uk");
        assert_eq!(remove_country_suffix("ZDF.info", '.'), "ZDF.info");
        assert_eq!(remove_country_suffix("Channel.4", '.'), "Channel.4");
        assert_eq!(remove_country_suffix(".uk", '.'), ".uk");
    }
}
