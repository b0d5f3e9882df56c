//! Guide feed retrieval
//!
//! [`FeedFetcher`] is the seam between the merge engine and the network: the
//! engine only ever asks for decoded text, so tests substitute an in-process
//! implementation while production uses [`HttpFeedFetcher`].

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE, REFERER};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::{SourceError, SourceResult};
use crate::models::HttpConfig;
use crate::utils::decompression::maybe_decompress;
use crate::utils::url::UrlUtils;

/// Source of raw guide text for a URL or local file path
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch a location and return its decompressed, decoded text
    async fn fetch_text(&self, location: &str) -> SourceResult<String>;
}

/// reqwest-backed fetcher applying one provider's HTTP settings
pub struct HttpFeedFetcher {
    client: Client,
}

impl HttpFeedFetcher {
    /// Build a client from normalized provider settings.
    ///
    /// Headers whose name or value is not valid HTTP are skipped with a
    /// warning rather than failing the whole provider.
    pub fn new(config: &HttpConfig) -> SourceResult<Self> {
        let config = config.normalized();
        let mut headers = reqwest::header::HeaderMap::new();

        if let Some(referer) = config.referer.as_deref() {
            match HeaderValue::from_str(referer) {
                Ok(value) => {
                    headers.insert(REFERER, value);
                }
                Err(e) => warn!("Ignoring invalid referer '{}': {}", referer, e),
            }
        }

        for (name, value) in &config.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!("Ignoring invalid request header '{}'", name),
            }
        }

        let client = Client::builder()
            .user_agent(config.user_agent.as_deref().unwrap_or_default())
            .default_headers(headers)
            .timeout(config.timeout())
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(|e| SourceError::transport("http_client", e.to_string()))?;

        Ok(Self { client })
    }

    async fn fetch_url(&self, url: &str) -> SourceResult<String> {
        let display_url = UrlUtils::obfuscate_credentials(url);
        debug!("Fetching guide feed from: {}", display_url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&display_url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(SourceError::Http {
                status: status.as_u16(),
                message: format!(
                    "{} - URL: {}",
                    status.canonical_reason().unwrap_or("Unknown"),
                    display_url
                ),
            });
        }

        let charset = declared_charset(&response);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(&display_url, e))?;

        debug!("Fetched {} bytes from {}", bytes.len(), display_url);

        let bytes = maybe_decompress(url, bytes.to_vec())?;
        Ok(decode_text(&bytes, charset.as_deref()))
    }

    async fn read_file(&self, path: &str) -> SourceResult<String> {
        debug!("Reading guide feed from file: {}", path);

        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SourceError::NotFound {
                path: path.to_string(),
            },
            _ => SourceError::transport(path, e.to_string()),
        })?;

        let bytes = maybe_decompress(path, bytes)?;
        Ok(decode_text(&bytes, None))
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch_text(&self, location: &str) -> SourceResult<String> {
        let location = location.trim();
        if UrlUtils::is_remote(location) {
            self.fetch_url(location).await
        } else {
            self.read_file(location).await
        }
    }
}

fn map_reqwest_error(display_url: &str, error: reqwest::Error) -> SourceError {
    if error.is_timeout() {
        SourceError::timeout(display_url)
    } else {
        SourceError::transport(
            display_url,
            UrlUtils::obfuscate_credentials(&error.to_string()),
        )
    }
}

fn declared_charset(response: &Response) -> Option<String> {
    let content_type = response.headers().get(CONTENT_TYPE)?.to_str().ok()?;
    charset_from_content_type(content_type)
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Decode with the declared charset, falling back to UTF-8 when the label
/// is unknown or the bytes do not fit it.
pub fn decode_text(bytes: &[u8], charset: Option<&str>) -> String {
    if let Some(encoding) = charset.and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes())) {
        let (text, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return text.into_owned();
        }
        debug!("Body is not valid {}, decoding as UTF-8", encoding.name());
    }

    let (text, _, _) = encoding_rs::UTF_8.decode(bytes);
    text.into_owned()
}

/// Delays before each download attempt; the first is normally zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::from_millis(&[0, 800, 2000])
    }
}

impl RetrySchedule {
    pub fn from_millis(delays: &[u64]) -> Self {
        Self {
            delays: delays.iter().copied().map(Duration::from_millis).collect(),
        }
    }

    /// Total number of attempts, never less than one
    pub fn attempts(&self) -> usize {
        self.delays.len().max(1)
    }

    fn delay_before(&self, attempt: usize) -> Duration {
        self.delays.get(attempt).copied().unwrap_or_default()
    }

    /// Fetch through `fetcher`, retrying only transfer failures.
    ///
    /// A body that arrived but turned out unusable (bad compression, missing
    /// file) is returned immediately.
    pub async fn fetch<F>(&self, fetcher: &F, location: &str) -> SourceResult<String>
    where
        F: FeedFetcher + ?Sized,
    {
        let attempts = self.attempts();
        let mut attempt = 0;

        loop {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match fetcher.fetch_text(location).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt + 1,
                        attempts,
                        UrlUtils::obfuscate_credentials(location),
                        e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
