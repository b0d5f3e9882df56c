use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::HttpConfig;
use crate::sources::RetrySchedule;
use crate::utils::url::UrlUtils;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Fetch politeness and retry settings for multi-source merges
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Host fragments of feed providers that block aggressive clients
    pub restricted_hosts: Vec<String>,
    pub restricted_concurrency: usize,
    pub restricted_stagger_ms: u64,
    /// Defaults to the available parallelism clamped to [4, 12]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normal_concurrency: Option<usize>,
    pub retry_delays_ms: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub past_window_minutes: i64,
    pub future_window_minutes: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            restricted_hosts: vec!["epgshare".to_string()],
            restricted_concurrency: 2,
            restricted_stagger_ms: 250,
            normal_concurrency: None,
            retry_delays_ms: vec![0, 800, 2000],
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            past_window_minutes: 60,
            future_window_minutes: 360,
        }
    }
}

impl MergeConfig {
    /// Whether a URL's host matches one of the restricted host fragments
    pub fn is_restricted(&self, url: &str) -> bool {
        let Some(host) = UrlUtils::host_of(url) else {
            return false;
        };
        self.restricted_hosts
            .iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .any(|h| !h.is_empty() && host.contains(&h))
    }

    pub fn restricted_concurrency(&self) -> usize {
        self.restricted_concurrency.max(1)
    }

    pub fn normal_concurrency(&self) -> usize {
        match self.normal_concurrency {
            Some(n) => n.max(1),
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .clamp(4, 12),
        }
    }

    /// Start delay for the `position`-th URL of the restricted group
    pub fn restricted_stagger(&self, position: usize) -> Duration {
        Duration::from_millis(self.restricted_stagger_ms.saturating_mul(position as u64))
    }

    pub fn retry_schedule(&self) -> RetrySchedule {
        RetrySchedule::from_millis(&self.retry_delays_ms)
    }
}

impl QueryConfig {
    pub fn past_window(&self) -> chrono::Duration {
        Self::window(self.past_window_minutes)
    }

    pub fn future_window(&self) -> chrono::Duration {
        Self::window(self.future_window_minutes)
    }

    /// Window of `minutes`, saturating instead of overflowing. Negative
    /// values become zero.
    pub fn window(minutes: i64) -> chrono::Duration {
        if minutes <= 0 {
            return chrono::Duration::zero();
        }
        chrono::Duration::try_minutes(minutes).unwrap_or(chrono::Duration::MAX)
    }
}

impl Config {
    /// Read the TOML config at `path`, writing the defaults there first when
    /// the file does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config_file = path.as_ref();

        if config_file.exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            if let Some(parent) = config_file.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(config_file, contents)?;
            Ok(default_config)
        }
    }
}
