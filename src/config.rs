//! Configuration types for timeline-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, time::Duration};

/// Main configuration for [`crate::TimelineArchiver`]
///
/// Fields are organized into logical sub-configs for maintainability:
/// - [`account`](AccountConfig) — target account and API endpoint
/// - [`storage`](StorageConfig) — archive and media directories
/// - [`fetch`](FetchConfig) — pagination and rate-limit policy
/// - [`retry`](RetryConfig) — transient-failure backoff policy
/// - [`media`](MediaConfig) — downloader binaries, concurrency, domain rules
///
/// All sub-config fields are flattened for backward-compatible serialization,
/// meaning the JSON/TOML format remains unchanged (no nesting).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target account and API endpoint
    #[serde(flatten)]
    pub account: AccountConfig,

    /// Archive and media directories
    #[serde(flatten)]
    pub storage: StorageConfig,

    /// Pagination and rate-limit policy
    #[serde(flatten)]
    pub fetch: FetchConfig,

    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Media download behavior
    #[serde(flatten)]
    pub media: MediaConfig,
}

impl Config {
    /// Validate the configuration, returning the first offending setting
    pub fn validate(&self) -> Result<()> {
        if self.account.handle.trim().is_empty() {
            return Err(Error::Config {
                message: "target account handle must not be empty".to_string(),
                key: Some("handle".to_string()),
            });
        }
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.fetch.page_size) {
            return Err(Error::Config {
                message: format!(
                    "page_size must be between {} and {}, got {}",
                    MIN_PAGE_SIZE, MAX_PAGE_SIZE, self.fetch.page_size
                ),
                key: Some("page_size".to_string()),
            });
        }
        if self.media.max_concurrent_downloads == 0 {
            return Err(Error::Config {
                message: "max_concurrent_downloads must be at least 1".to_string(),
                key: Some("max_concurrent_downloads".to_string()),
            });
        }
        Ok(())
    }
}

/// Smallest page the remote API will serve
pub const MIN_PAGE_SIZE: usize = 5;
/// Largest page the remote API will serve per distinct request
pub const MAX_PAGE_SIZE: usize = 100;

/// Target account and API endpoint configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Handle (screen name) of the account to archive
    #[serde(default)]
    pub handle: String,

    /// Base URL of the platform API (override for tests or proxies)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Profile banner URL supplied by the operator
    ///
    /// The API exposes no banner lookup, so the value is carried from
    /// configuration onto the author snapshot when set.
    #[serde(default)]
    pub banner_url: Option<String>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            handle: String::new(),
            api_base_url: default_api_base_url(),
            banner_url: None,
        }
    }
}

/// Caller-supplied API credentials
///
/// Acquisition and secure storage of tokens is the embedding application's
/// concern; the library only carries the value into request headers.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    /// Bearer token presented on every API request
    pub bearer_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log token material
        f.debug_struct("Credentials")
            .field("bearer_token", &"***")
            .finish()
    }
}

/// Archive and media directory configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the persisted record store (default: "./archive/texts")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory media files are downloaded into (default: "./archive/media")
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            media_dir: default_media_dir(),
        }
    }
}

/// Pagination and rate-limit policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Posts requested per timeline page (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum rate-limit waits tolerated for a single page before the pass
    /// aborts (default: 5)
    #[serde(default = "default_max_rate_limit_waits")]
    pub max_rate_limit_waits: u32,

    /// Wait applied when the API signals throttling without a usable
    /// retry-after value (default: 60 seconds)
    #[serde(default = "default_rate_limit_fallback", with = "duration_serde")]
    pub rate_limit_fallback: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_rate_limit_waits: default_max_rate_limit_waits(),
            rate_limit_fallback: default_rate_limit_fallback(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Media download behavior (binaries, concurrency, domain rules)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Maximum concurrent media downloads (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Maximum download attempts per task before it is marked failed (default: 3)
    #[serde(default = "default_max_download_retries")]
    pub max_download_retries: u32,

    /// Path to you-get executable (auto-detected if None)
    #[serde(default)]
    pub you_get_path: Option<PathBuf>,

    /// Path to a youtube-dl-compatible executable (auto-detected if None)
    #[serde(default)]
    pub youtube_dl_path: Option<PathBuf>,

    /// Path to ffmpeg for the transcoding post-step (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set
    /// (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// URL domain rules (skip lists, expansions, downloader selection)
    #[serde(default)]
    pub domain_rules: DomainRules,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
            max_download_retries: default_max_download_retries(),
            you_get_path: None,
            youtube_dl_path: None,
            ffmpeg_path: None,
            search_path: true,
            domain_rules: DomainRules::default(),
        }
    }
}

/// URL domain rules applied before a media URL is enqueued
///
/// Rules match on URL prefixes. A URL matching `skip` (or `local`) is never
/// enqueued; `map` rewrites shortened prefixes to their expanded form;
/// `redundant` strips trailing tokens that would otherwise split one media
/// item into several task keys; `downloaders` selects the external binary per
/// domain, falling back to `default_downloader`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomainRules {
    /// Prefixes of media already available locally (never enqueued)
    #[serde(default)]
    pub local: Vec<String>,

    /// Prefixes that cannot contain downloadable media (never enqueued)
    #[serde(default)]
    pub skip: Vec<String>,

    /// Shortened prefix → fully expanded prefix rewrites
    #[serde(default)]
    pub map: HashMap<String, String>,

    /// Prefix → redundant trailing tokens to strip (e.g. "/photo/1")
    #[serde(default)]
    pub redundant: HashMap<String, Vec<String>>,

    /// Prefix → downloader name overrides
    #[serde(default)]
    pub downloaders: HashMap<String, String>,

    /// Downloader used when no prefix override matches (default: "you-get")
    #[serde(default = "default_downloader")]
    pub default_downloader: String,
}

impl Default for DomainRules {
    fn default() -> Self {
        Self {
            local: Vec::new(),
            skip: Vec::new(),
            map: HashMap::new(),
            redundant: HashMap::new(),
            downloaders: HashMap::new(),
            default_downloader: default_downloader(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.twitter.com".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./archive/texts")
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("./archive/media")
}

fn default_page_size() -> usize {
    100
}

fn default_max_rate_limit_waits() -> u32 {
    5
}

fn default_rate_limit_fallback() -> Duration {
    Duration::from_secs(60)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_concurrent() -> usize {
    3
}

fn default_max_download_retries() -> u32 {
    3
}

fn default_downloader() -> String {
    "you-get".to_string()
}

fn default_true() -> bool {
    true
}

/// Duration (de)serialization as whole seconds
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_fails_validation_without_handle() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(k), .. } if k == "handle"));
    }

    #[test]
    fn config_with_handle_validates() {
        let config = Config {
            account: AccountConfig {
                handle: "alice".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn page_size_out_of_range_is_rejected() {
        let mut config = Config {
            account: AccountConfig {
                handle: "alice".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        config.fetch.page_size = 200;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(k), .. } if k == "page_size"));
    }

    #[test]
    fn zero_download_concurrency_is_rejected() {
        let mut config = Config {
            account: AccountConfig {
                handle: "alice".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        config.media.max_concurrent_downloads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_json_deserializes_with_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.fetch.page_size, 100);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.media.domain_rules.default_downloader, "you-get");
        assert_eq!(config.fetch.rate_limit_fallback, Duration::from_secs(60));
    }

    #[test]
    fn retry_durations_serialize_as_seconds() {
        let retry = RetryConfig::default();
        let json = serde_json::to_value(&retry).unwrap();
        assert_eq!(json["initial_delay"], 1);
        assert_eq!(json["max_delay"], 60);
    }

    #[test]
    fn credentials_debug_masks_token() {
        let creds = Credentials {
            bearer_token: "secret-token".to_string(),
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret-token"));
    }
}
