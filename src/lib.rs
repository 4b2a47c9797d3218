//! # timeline-dl
//!
//! Incremental archiver library for one account's social-media timeline.
//!
//! ## Design Philosophy
//!
//! timeline-dl is designed to be:
//! - **Append-only** - Archived content is never edited or deleted; only
//!   engagement counters drift
//! - **Crash-safe** - Every page is durably merged before the cursor
//!   advances, so an interrupted pass replays at most one page
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use timeline_dl::{Config, Credentials, TimelineArchiver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.account.handle = "alice".to_string();
//!
//!     let credentials = Credentials {
//!         bearer_token: std::env::var("BEARER_TOKEN")?,
//!     };
//!
//!     let archiver = TimelineArchiver::new(config, credentials).await?;
//!
//!     // Subscribe to events
//!     let mut events = archiver.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = archiver.sync_once().await?;
//!     println!("archived {} new posts", summary.new_posts);
//!     archiver.export().await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// High-level archiver facade
pub mod archiver;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Text and HTML exporters
pub mod export;
/// Remote platform fetcher
pub mod fetcher;
/// Media download queue and external downloaders
pub mod media;
/// Sync pass orchestration
pub mod reconciler;
/// Retry logic with exponential backoff
pub mod retry;
/// Durable record store
pub mod store;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use archiver::{ArchiveStats, TimelineArchiver};
pub use config::{
    AccountConfig, Config, Credentials, DomainRules, FetchConfig, MediaConfig, RetryConfig,
    StorageConfig,
};
pub use error::{DownloadError, Error, Result, StoreError};
pub use export::{render_html, render_text};
pub use fetcher::{HttpFetcher, Page, RemoteFetcher};
pub use media::{
    CliDownloader, DownloaderKind, DownloaderRegistry, DrainReport, FfmpegTranscoder,
    MediaDownloader, MediaPostProcessor, MediaQueue, NoOpPostProcessor,
};
pub use reconciler::Reconciler;
pub use retry::{Clock, IsRetryable, TokioClock};
pub use store::{MergeOutcome, RecordStore};
pub use types::{
    AuthorId, AuthorMap, AuthorRecord, Cursor, Engagement, EntitySpan, Event, LinkDescriptor,
    MediaStatus, PassSummary, PostId, PostMap, PostRecord,
};
