//! Media download queue
//!
//! A deduplicated set of (url → destination) download tasks fed by the
//! reconciler and drained through external downloader tools. URLs pass
//! through the configured domain rules before becoming task keys: skip lists
//! drop them, short-URL mappings and redundant-suffix stripping normalize
//! them so the same media item never yields two tasks, and per-domain
//! overrides select the downloader.
//!
//! Tasks are independent and idempotent, so the queue drains them with
//! bounded parallelism; per-task state transitions are serialized behind a
//! mutex. A failed task is reported but never aborts the overall sync.

mod downloader;

pub use downloader::{
    CliDownloader, DownloaderKind, FfmpegTranscoder, MediaDownloader, MediaPostProcessor,
    NoOpPostProcessor, YOU_GET, YOUTUBE_DL,
};

use crate::config::{DomainRules, MediaConfig};
use crate::error::{DownloadError, Error};
use crate::types::{Event, MediaStatus};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

/// A single media download task
#[derive(Clone, Debug)]
pub struct MediaTask {
    /// Normalized source URL (task key)
    pub url: String,
    /// Destination directory for the downloaded file(s)
    pub dest: PathBuf,
    /// Current task status
    pub status: MediaStatus,
    /// Download attempts made so far
    pub attempts: u32,
    /// Name of the downloader selected for this URL's domain
    pub downloader: String,
}

/// A task that exhausted its retries during a drain
#[derive(Clone, Debug)]
pub struct FailedDownload {
    /// Normalized source URL
    pub url: String,
    /// Attempts made before giving up
    pub attempts: u32,
    /// Last failure detail
    pub error: String,
}

/// Result of draining the queue once
#[derive(Clone, Debug, Default)]
pub struct DrainReport {
    /// Tasks that reached `done`
    pub downloaded: u64,
    /// Tasks that reached `failed`, with their last error
    pub failed: Vec<FailedDownload>,
}

/// Registry of available downloaders plus the post-processing hook
pub struct DownloaderRegistry {
    downloaders: HashMap<String, Arc<dyn MediaDownloader>>,
    post_processor: Arc<dyn MediaPostProcessor>,
}

impl std::fmt::Debug for DownloaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloaderRegistry")
            .field("downloaders", &self.downloaders.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl DownloaderRegistry {
    /// Create an empty registry with no post-processing
    pub fn new() -> Self {
        Self {
            downloaders: HashMap::new(),
            post_processor: Arc::new(NoOpPostProcessor),
        }
    }

    /// Register a downloader under its name
    pub fn register(&mut self, downloader: Arc<dyn MediaDownloader>) {
        self.downloaders
            .insert(downloader.name().to_string(), downloader);
    }

    /// Install the post-download processing hook
    pub fn set_post_processor(&mut self, post_processor: Arc<dyn MediaPostProcessor>) {
        self.post_processor = post_processor;
    }

    /// Build a registry from configuration, discovering binaries as needed
    ///
    /// Explicitly configured paths win; otherwise PATH is searched when
    /// `search_path` is set. Missing tools are simply not registered — their
    /// tasks fail with `NoDownloader` instead of blocking construction.
    pub fn from_config(config: &MediaConfig) -> Self {
        let mut registry = Self::new();

        let you_get = match &config.you_get_path {
            Some(path) => Some(CliDownloader::new(DownloaderKind::YouGet, path.clone())),
            None if config.search_path => CliDownloader::from_path(DownloaderKind::YouGet),
            None => None,
        };
        if let Some(dl) = you_get {
            registry.register(Arc::new(dl));
        }

        let youtube_dl = match &config.youtube_dl_path {
            Some(path) => Some(CliDownloader::new(DownloaderKind::YoutubeDl, path.clone())),
            None if config.search_path => CliDownloader::from_path(DownloaderKind::YoutubeDl),
            None => None,
        };
        if let Some(dl) = youtube_dl {
            registry.register(Arc::new(dl));
        }

        let transcoder = match &config.ffmpeg_path {
            Some(path) => Some(FfmpegTranscoder::new(path.clone())),
            None if config.search_path => FfmpegTranscoder::from_path(),
            None => None,
        };
        match transcoder {
            Some(t) => registry.set_post_processor(Arc::new(t)),
            None => tracing::debug!("ffmpeg not available, skipping transcode post-step"),
        }

        tracing::info!(
            downloaders = ?registry.downloaders.keys().collect::<Vec<_>>(),
            "Downloader registry initialized"
        );
        registry
    }

    fn get(&self, name: &str) -> Option<Arc<dyn MediaDownloader>> {
        self.downloaders.get(name).cloned()
    }
}

impl Default for DownloaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deduplicated media download queue
pub struct MediaQueue {
    media_dir: PathBuf,
    rules: DomainRules,
    max_retries: u32,
    concurrency: usize,
    tasks: Mutex<HashMap<String, MediaTask>>,
    event_tx: broadcast::Sender<Event>,
}

impl MediaQueue {
    /// Create a queue storing downloads under `media_dir`
    pub fn new(config: &MediaConfig, media_dir: PathBuf, event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            media_dir,
            rules: config.domain_rules.clone(),
            max_retries: config.max_download_retries.max(1),
            concurrency: config.max_concurrent_downloads.max(1),
            tasks: Mutex::new(HashMap::new()),
            event_tx,
        }
    }

    /// Enqueue a download task for `url` into the `dest_name` subdirectory
    ///
    /// Idempotent: re-enqueuing a URL whose task is already pending or done
    /// is a no-op. A previously failed task is re-armed so a later pass can
    /// retry it. URLs matching the skip rules are dropped. Returns whether a
    /// task is now pending for this URL.
    pub async fn enqueue(&self, url: &str, dest_name: &str) -> bool {
        let Some((normalized, downloader)) = resolve_url(&self.rules, url) else {
            tracing::debug!(url, "URL skipped by domain rules");
            return false;
        };

        let mut tasks = self.tasks.lock().await;
        match tasks.get_mut(&normalized) {
            Some(task) if task.status == MediaStatus::Failed => {
                // Re-arm so the next drain retries it with a fresh budget
                task.status = MediaStatus::Pending;
                task.attempts = 0;
                true
            }
            Some(_) => false,
            None => {
                tasks.insert(
                    normalized.clone(),
                    MediaTask {
                        url: normalized.clone(),
                        dest: self.media_dir.join(dest_name),
                        status: MediaStatus::Pending,
                        attempts: 0,
                        downloader,
                    },
                );
                self.event_tx
                    .send(Event::MediaQueued { url: normalized })
                    .ok();
                true
            }
        }
    }

    /// Number of tasks currently pending
    pub async fn pending_count(&self) -> usize {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|t| t.status == MediaStatus::Pending)
            .count()
    }

    /// Status of the task keyed by the (normalized) URL, if any
    pub async fn task_status(&self, url: &str) -> Option<MediaStatus> {
        self.tasks.lock().await.get(url).map(|t| t.status)
    }

    /// Dispatch all pending tasks through the registry
    ///
    /// Tasks run with bounded parallelism. Each task is attempted up to the
    /// configured retry cap, then marked failed and reported; failures never
    /// abort the drain.
    pub async fn drain(&self, registry: &DownloaderRegistry) -> DrainReport {
        let pending: Vec<MediaTask> = {
            let tasks = self.tasks.lock().await;
            tasks
                .values()
                .filter(|t| t.status == MediaStatus::Pending)
                .cloned()
                .collect()
        };

        if pending.is_empty() {
            return DrainReport::default();
        }

        tracing::info!(count = pending.len(), "Draining media download queue");

        let results: Vec<Option<FailedDownload>> = futures::stream::iter(pending)
            .map(|task| self.run_task(task, registry))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = DrainReport::default();
        for failure in results {
            match failure {
                None => report.downloaded += 1,
                Some(failed) => report.failed.push(failed),
            }
        }

        tracing::info!(
            downloaded = report.downloaded,
            failed = report.failed.len(),
            "Media download queue drained"
        );
        report
    }

    /// Run one task to completion; `None` means success
    async fn run_task(&self, task: MediaTask, registry: &DownloaderRegistry) -> Option<FailedDownload> {
        let Some(downloader) = registry.get(&task.downloader) else {
            let error = Error::Download(DownloadError::NoDownloader {
                url: task.url.clone(),
            });
            return Some(self.mark_failed(&task.url, 0, error.to_string()).await);
        };

        let mut last_error = String::new();
        for attempt in 1..=self.max_retries {
            match downloader.download(&task.url, &task.dest).await {
                Ok(()) => {
                    self.mark_done(&task.url, attempt).await;

                    // Degraded, not fatal: the download itself is archived
                    if let Err(e) = registry.post_processor.process(&task.dest).await {
                        tracing::warn!(url = %task.url, error = %e, "Media post-processing failed");
                    }
                    return None;
                }
                Err(e) => {
                    tracing::warn!(
                        url = %task.url,
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Media download attempt failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        Some(
            self.mark_failed(&task.url, self.max_retries, last_error)
                .await,
        )
    }

    async fn mark_done(&self, url: &str, attempts: u32) {
        let mut tasks = self.tasks.lock().await;
        if let Some(task) = tasks.get_mut(url) {
            task.status = MediaStatus::Done;
            task.attempts = attempts;
            self.event_tx
                .send(Event::MediaDone {
                    url: url.to_string(),
                    dest: task.dest.clone(),
                })
                .ok();
        }
    }

    async fn mark_failed(&self, url: &str, attempts: u32, error: String) -> FailedDownload {
        let mut tasks = self.tasks.lock().await;
        if let Some(task) = tasks.get_mut(url) {
            task.status = MediaStatus::Failed;
            task.attempts = attempts;
        }
        self.event_tx
            .send(Event::MediaFailed {
                url: url.to_string(),
                error: error.clone(),
                attempts,
            })
            .ok();
        FailedDownload {
            url: url.to_string(),
            attempts,
            error,
        }
    }
}

/// Apply the domain rules to a raw URL
///
/// Returns the normalized task key and the downloader name for it, or `None`
/// when the URL matches a skip/local rule.
fn resolve_url(rules: &DomainRules, url: &str) -> Option<(String, String)> {
    if matching_prefix(url, rules.skip.iter()).is_some()
        || matching_prefix(url, rules.local.iter()).is_some()
    {
        return None;
    }

    let mut url = url.to_string();
    if let Some(prefix) = matching_prefix(&url, rules.map.keys()) {
        let expanded = &rules.map[&prefix];
        url = format!("{}{}", expanded, &url[prefix.len()..]);
    }
    if let Some(prefix) = matching_prefix(&url, rules.redundant.keys()) {
        for token in &rules.redundant[&prefix] {
            url = remove_last(&url, token);
        }
    }

    let downloader = matching_prefix(&url, rules.downloaders.keys())
        .map(|p| rules.downloaders[&p].clone())
        .unwrap_or_else(|| rules.default_downloader.clone());

    Some((url, downloader))
}

/// First prefix in `prefixes` that `url` starts with
fn matching_prefix<'a>(url: &str, mut prefixes: impl Iterator<Item = &'a String>) -> Option<String> {
    prefixes.find(|p| url.starts_with(p.as_str())).cloned()
}

/// Remove the last occurrence of `token` from `s`
fn remove_last(s: &str, token: &str) -> String {
    match s.rfind(token) {
        Some(idx) => format!("{}{}", &s[..idx], &s[idx + token.len()..]),
        None => s.to_string(),
    }
}
