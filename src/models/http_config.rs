//! Per-provider HTTP settings used when downloading guide feeds

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::HeaderMap;

/// Some feed hosts reject non-browser agents outright.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 180;
pub const MIN_TIMEOUT_SECONDS: u64 = 10;
pub const MAX_TIMEOUT_SECONDS: u64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(default)]
    pub headers: HeaderMap,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            referer: None,
            headers: HeaderMap::new(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl HttpConfig {
    /// Fill in defaults and drop blank values.
    ///
    /// A blank user agent becomes [`DEFAULT_USER_AGENT`], a zero timeout
    /// becomes [`DEFAULT_TIMEOUT_SECONDS`], and headers with an empty name or
    /// value are removed after trimming.
    pub fn normalized(&self) -> Self {
        let user_agent = self
            .user_agent
            .as_deref()
            .map(str::trim)
            .filter(|ua| !ua.is_empty())
            .unwrap_or(DEFAULT_USER_AGENT)
            .to_string();

        let referer = self
            .referer
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let headers = self
            .headers
            .iter()
            .map(|(k, v)| (k.trim(), v.trim()))
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let timeout_seconds = if self.timeout_seconds == 0 {
            DEFAULT_TIMEOUT_SECONDS
        } else {
            self.timeout_seconds
        };

        Self {
            user_agent: Some(user_agent),
            referer,
            headers,
            timeout_seconds,
        }
    }

    /// Request timeout, always within [10, 600] seconds.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(
            self.timeout_seconds
                .clamp(MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_fills_defaults() {
        let mut headers = HeaderMap::new();
        headers.insert(" X-Token ".to_string(), " abc ".to_string());
        headers.insert("X-Empty".to_string(), "   ".to_string());

        let config = HttpConfig {
            user_agent: Some("  ".to_string()),
            referer: Some("".to_string()),
            headers,
            timeout_seconds: 0,
        }
        .normalized();

        assert_eq!(config.user_agent.as_deref(), Some(DEFAULT_USER_AGENT));
        assert_eq!(config.referer, None);
        assert_eq!(config.headers.len(), 1);
        assert_eq!(config.headers.get("X-Token").map(String::as_str), Some("abc"));
        assert_eq!(config.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
    }

    #[test]
    fn test_timeout_is_clamped() {
        let short = HttpConfig {
            timeout_seconds: 1,
            ..Default::default()
        };
        assert_eq!(short.timeout(), Duration::from_secs(10));

        let long = HttpConfig {
            timeout_seconds: 3600,
            ..Default::default()
        };
        assert_eq!(long.timeout(), Duration::from_secs(600));

        let normal = HttpConfig {
            timeout_seconds: 45,
            ..Default::default()
        };
        assert_eq!(normal.timeout(), Duration::from_secs(45));
    }
}
