//! High-level archiver facade
//!
//! [`TimelineArchiver`] wires the store, fetcher, reconciler, media queue,
//! and exporters together behind one handle. Construction validates the
//! configuration, acquires the store lock, and builds the downloader
//! registry; afterwards the archiver runs sync passes on demand and renders
//! exports from whatever state is durable.

use crate::config::{Config, Credentials};
use crate::error::Result;
use crate::export;
use crate::fetcher::{HttpFetcher, RemoteFetcher};
use crate::media::{DownloaderRegistry, MediaQueue};
use crate::reconciler::Reconciler;
use crate::retry::{Clock, TokioClock};
use crate::store::RecordStore;
use crate::types::{Event, PassSummary};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

/// Capacity of the broadcast event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Counts describing the durable archive state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Archived author snapshots
    pub authors: usize,
    /// Archived posts
    pub posts: usize,
    /// Whether an interrupted pass left a resume cursor behind
    pub pass_in_progress: bool,
}

/// One-stop handle over a single account's archive
///
/// Holds the store lock for its lifetime; a second archiver over the same
/// data directory fails to construct with `Locked`.
#[derive(Debug)]
pub struct TimelineArchiver {
    store: Mutex<RecordStore>,
    reconciler: Reconciler,
    registry: DownloaderRegistry,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl TimelineArchiver {
    /// Build an archiver talking to the real platform API
    ///
    /// # Errors
    ///
    /// `Config` if validation fails, `Store` if the data directory cannot be
    /// opened or another writer holds its lock.
    pub async fn new(config: Config, credentials: Credentials) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(
            &config.account,
            &config.fetch,
            &credentials,
        ));
        Self::with_fetcher(config, fetcher, Arc::new(TokioClock)).await
    }

    /// Build an archiver over a caller-supplied fetcher and clock
    ///
    /// This is the seam tests use to substitute scripted fetchers and
    /// non-sleeping clocks; behavior is otherwise identical to [`new`](Self::new).
    pub async fn with_fetcher(
        config: Config,
        fetcher: Arc<dyn RemoteFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.storage.media_dir).await?;
        let store = RecordStore::open(config.storage.data_dir.clone()).await?;

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let media = Arc::new(MediaQueue::new(
            &config.media,
            config.storage.media_dir.clone(),
            event_tx.clone(),
        ));
        let registry = DownloaderRegistry::from_config(&config.media);
        let cancel = CancellationToken::new();

        let reconciler = Reconciler::new(
            config,
            fetcher,
            clock,
            media,
            event_tx.clone(),
            cancel.clone(),
        );

        Ok(Self {
            store: Mutex::new(store),
            reconciler,
            registry,
            event_tx,
            cancel,
        })
    }

    /// Subscribe to sync progress events
    ///
    /// Events emitted while no receiver exists are dropped; slow receivers
    /// observe `Lagged` per the broadcast channel contract.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Run one sync pass to convergence
    ///
    /// Passes are serialized: a second call waits for the first to finish.
    pub async fn sync_once(&self) -> Result<PassSummary> {
        let mut store = self.store.lock().await;
        self.reconciler.run_pass(&mut store, &self.registry).await
    }

    /// Request cancellation of the in-flight pass
    ///
    /// The pass stops at the next page boundary with `Cancelled`; durable
    /// state stays consistent and the next pass resumes from the persisted
    /// cursor.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Write the text and HTML exports into the data directory
    pub async fn export(&self) -> Result<()> {
        let store = self.store.lock().await;
        export::export_all(&store).await
    }

    /// Render the archive as plain text
    pub async fn render_text(&self) -> String {
        let store = self.store.lock().await;
        export::render_text(&store)
    }

    /// Render the archive as a standalone HTML page
    pub async fn render_html(&self) -> String {
        let store = self.store.lock().await;
        export::render_html(&store)
    }

    /// Counts describing the current archive state
    pub async fn stats(&self) -> ArchiveStats {
        let store = self.store.lock().await;
        ArchiveStats {
            authors: store.authors().len(),
            posts: store.posts().len(),
            pass_in_progress: store.cursor().is_some(),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.account.handle = "alice".to_string();
        config.storage.data_dir = dir.join("texts");
        config.storage.media_dir = dir.join("media");
        config
    }

    #[tokio::test]
    async fn construction_validates_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.account.handle = String::new();

        let err = TimelineArchiver::new(
            config,
            Credentials {
                bearer_token: "t".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn second_archiver_over_same_directory_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = Credentials {
            bearer_token: "t".to_string(),
        };

        let _first = TimelineArchiver::new(config_in(dir.path()), credentials.clone())
            .await
            .unwrap();
        let err = TimelineArchiver::new(config_in(dir.path()), credentials)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Store(crate::error::StoreError::Locked { .. })
        ));
    }

    #[tokio::test]
    async fn fresh_archive_reports_empty_stats() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = TimelineArchiver::new(
            config_in(dir.path()),
            Credentials {
                bearer_token: "t".to_string(),
            },
        )
        .await
        .unwrap();

        let stats = archiver.stats().await;
        assert_eq!(stats, ArchiveStats::default());
    }

    #[tokio::test]
    async fn subscribe_before_sync_receives_no_stale_events() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = TimelineArchiver::new(
            config_in(dir.path()),
            Credentials {
                bearer_token: "t".to_string(),
            },
        )
        .await
        .unwrap();

        let mut rx = archiver.subscribe();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
