//! Error types for timeline-dl
//!
//! This module provides comprehensive error handling for the library, including:
//! - Domain-specific error types (Store, Download)
//! - A recoverability taxonomy consumed by the retry layer
//! - Context information (account handle, file path, source URL, etc.)

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for timeline-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for timeline-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "page_size")
        key: Option<String>,
    },

    /// Target account does not exist on the remote platform
    #[error("account not found: {0}")]
    NotFound(String),

    /// The remote API throttled the request
    ///
    /// The caller must suspend for at least `retry_after` before retrying.
    /// The fetcher never sleeps internally.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited {
        /// Minimum wait before the request may be retried
        retry_after: Duration,
    },

    /// Transient network failure (retryable with backoff)
    #[error("transient error: {0}")]
    Transient(String),

    /// Record store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Media download error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// A fetched record failed boundary validation and was quarantined
    #[error("invalid record {id}: {reason}")]
    InvalidRecord {
        /// Identifier of the rejected record
        id: String,
        /// Why the record was rejected
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (you-get, youtube-dl, ffmpeg, etc.)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Sync pass cancelled between pages
    #[error("sync pass cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Record store errors
///
/// Persistence errors are never retried automatically (retrying risks masking
/// corruption) and always surface to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Persisted state exists but cannot be read or parsed
    ///
    /// The store never silently discards unreadable state; the operator must
    /// inspect or restore the file.
    #[error("store file {} is corrupt: {reason}", path.display())]
    Corrupt {
        /// The unreadable store file
        path: PathBuf,
        /// Parse or read failure detail
        reason: String,
    },

    /// Another process (or pass) holds the store lock
    #[error("store at {} is locked by another writer", path.display())]
    Locked {
        /// The contended lock file
        path: PathBuf,
    },

    /// Atomic write failed before the replace step
    #[error("failed to persist {}: {reason}", path.display())]
    WriteFailed {
        /// The store file being written
        path: PathBuf,
        /// Underlying failure detail
        reason: String,
    },
}

/// Media download errors (per-task, non-fatal to the overall sync)
#[derive(Debug, Error)]
pub enum DownloadError {
    /// External downloader exited non-zero after all retries
    #[error("download of {url} failed after {attempts} attempt(s): {reason}")]
    Failed {
        /// Source URL of the media
        url: String,
        /// Attempts made before giving up
        attempts: u32,
        /// Last failure detail
        reason: String,
    },

    /// No downloader binary is available for the URL's domain
    #[error("no downloader available for {url}")]
    NoDownloader {
        /// URL that could not be dispatched
        url: String,
    },

    /// Configured downloader name is not recognized
    #[error("unsupported downloader: {0}")]
    Unsupported(String),
}
