//! External downloader and transcoder invocation
//!
//! Media is fetched by external downloader executables rather than in-process
//! HTTP: the hosts involved need format negotiation, playlist resolution, and
//! cookie handling that dedicated tools already solve. The library only
//! defines the contract: given a URL and a destination directory, the tool
//! either produces files there or exits non-zero.

use crate::error::{DownloadError, Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Downloader name understood out of the box
pub const YOU_GET: &str = "you-get";
/// Downloader name for youtube-dl-compatible tools (yt-dlp works too)
pub const YOUTUBE_DL: &str = "youtube-dl";

/// Contract the media queue requires from a downloader
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Download `url` into `dest`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// `ExternalTool` if the process cannot be spawned or exits non-zero.
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;

    /// Name of this downloader (matches [`crate::config::DomainRules`] keys)
    fn name(&self) -> &str;
}

/// Which external tool a [`CliDownloader`] drives
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloaderKind {
    /// you-get
    YouGet,
    /// youtube-dl or a compatible fork
    YoutubeDl,
}

impl DownloaderKind {
    /// Parse a configured downloader name
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            YOU_GET => Ok(Self::YouGet),
            YOUTUBE_DL | "yt-dlp" => Ok(Self::YoutubeDl),
            other => Err(Error::Download(DownloadError::Unsupported(
                other.to_string(),
            ))),
        }
    }

    fn default_binary(self) -> &'static str {
        match self {
            Self::YouGet => YOU_GET,
            Self::YoutubeDl => YOUTUBE_DL,
        }
    }
}

/// CLI-based downloader invoking an external binary per task
pub struct CliDownloader {
    kind: DownloaderKind,
    binary_path: PathBuf,
}

impl CliDownloader {
    /// Create a downloader with an explicit binary path
    pub fn new(kind: DownloaderKind, binary_path: PathBuf) -> Self {
        Self { kind, binary_path }
    }

    /// Attempt to find the tool's default binary in PATH
    ///
    /// Returns `None` when the binary is not installed; the caller decides
    /// whether that makes the affected domain's tasks fail or be skipped.
    pub fn from_path(kind: DownloaderKind) -> Option<Self> {
        which::which(kind.default_binary())
            .ok()
            .map(|p| Self::new(kind, p))
    }
}

#[async_trait]
impl MediaDownloader for CliDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dest).await?;

        let mut command = Command::new(&self.binary_path);
        match self.kind {
            DownloaderKind::YouGet => {
                command
                    .arg("--skip-existing-file-size-check") // No overwrite
                    .arg(url)
                    .arg("-o") // Output directory
                    .arg(dest);
            }
            DownloaderKind::YoutubeDl => {
                command
                    .arg("-i") // Continues on download errors
                    .arg("-w") // No overwrite
                    .arg("--write-thumbnail") // Same filename as the video
                    .arg(url)
                    .arg("-o") // Output filename template
                    .arg(dest.join("%(title)s-%(id)s.%(ext)s"));
            }
        }

        let output = command.output().await.map_err(|e| {
            Error::ExternalTool(format!(
                "failed to execute {}: {}",
                self.binary_path.display(),
                e
            ))
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::ExternalTool(format!(
                "{} exited with {} for {}: {}",
                self.name(),
                output.status,
                url,
                String::from_utf8_lossy(&output.stderr)
                    .lines()
                    .last()
                    .unwrap_or("")
            )))
        }
    }

    fn name(&self) -> &str {
        match self.kind {
            DownloaderKind::YouGet => YOU_GET,
            DownloaderKind::YoutubeDl => YOUTUBE_DL,
        }
    }
}

/// Post-download processing hook (transcoding, thumbnailing)
#[async_trait]
pub trait MediaPostProcessor: Send + Sync {
    /// Process the files a completed task left in `dir`
    ///
    /// Failures are logged and degrade the result; they never fail the task.
    async fn process(&self, dir: &Path) -> Result<()>;
}

/// No-op post-processor used when no transcoder is available
pub struct NoOpPostProcessor;

#[async_trait]
impl MediaPostProcessor for NoOpPostProcessor {
    async fn process(&self, _dir: &Path) -> Result<()> {
        Ok(())
    }
}

/// ffmpeg-backed post-processor remuxing MKV downloads to MP4
///
/// Browsers rendering the HTML export generally cannot play MKV; a stream
/// copy into an MP4 container keeps the archive viewable without
/// re-encoding.
pub struct FfmpegTranscoder {
    binary_path: PathBuf,
}

impl FfmpegTranscoder {
    /// Create a transcoder with an explicit ffmpeg path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find ffmpeg in PATH
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }

    async fn remux(&self, src: &Path) -> Result<()> {
        let dst = src.with_extension("mp4");
        let output = Command::new(&self.binary_path)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y") // Overwrites output files without asking
            .arg("-i")
            .arg(src)
            .arg("-codec")
            .arg("copy") // Container change only, streams untouched
            .arg(&dst)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("failed to execute ffmpeg: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::ExternalTool(format!(
                "ffmpeg remux of {} failed: {}",
                src.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

#[async_trait]
impl MediaPostProcessor for FfmpegTranscoder {
    async fn process(&self, dir: &Path) -> Result<()> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("mkv") {
                self.remux(&path).await?;
            }
        }
        Ok(())
    }
}
