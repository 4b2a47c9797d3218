//! Sync reconciler
//!
//! Drives one incremental sync pass: refresh the author snapshot, page
//! backwards through the remote timeline merging each page into the store,
//! persist after every page, and stop once the fetched pages reach already-
//! archived territory. Crash safety comes from ordering alone — merge, save,
//! then advance the persisted cursor — so an interrupted pass replays at most
//! one already-merged page, and merges are idempotent.
//!
//! Rate limiting is handled here, not in the fetcher: a throttled page fetch
//! suspends the pass for the signaled wait and retries the same page, bounded
//! by the configured wait budget. Transient faults go through exponential
//! backoff instead.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::RemoteFetcher;
use crate::media::{DownloaderRegistry, MediaQueue};
use crate::retry::{Clock, fetch_with_retry};
use crate::store::RecordStore;
use crate::types::{AuthorRecord, Event, PassSummary, PostRecord};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Orchestrates one sync pass over the remote timeline
pub struct Reconciler {
    config: Config,
    fetcher: Arc<dyn RemoteFetcher>,
    clock: Arc<dyn Clock>,
    media: Arc<MediaQueue>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Create a reconciler wired to the given fetcher, clock, and media queue
    pub fn new(
        config: Config,
        fetcher: Arc<dyn RemoteFetcher>,
        clock: Arc<dyn Clock>,
        media: Arc<MediaQueue>,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            fetcher,
            clock,
            media,
            event_tx,
            cancel,
        }
    }

    /// Run one sync pass to convergence
    ///
    /// Fetches the author profile, then pages through the timeline starting
    /// from the persisted cursor (resuming an interrupted pass) or from the
    /// newest post. Each page is merged and saved before the cursor advances.
    /// On convergence the cursor is cleared and the media queue drained.
    ///
    /// # Errors
    ///
    /// `Cancelled` if the cancellation token fires between pages; fetch and
    /// store errors surface after their respective retry budgets are spent.
    /// Media failures are reported in the summary, never as errors.
    pub async fn run_pass(
        &self,
        store: &mut RecordStore,
        registry: &DownloaderRegistry,
    ) -> Result<PassSummary> {
        let handle = self.config.account.handle.clone();
        tracing::info!(handle, "Sync pass started");
        self.emit(Event::PassStarted {
            handle: handle.clone(),
        });

        let mut summary = PassSummary::default();

        let mut author = self
            .with_rate_limit_waits(|| self.fetcher.fetch_author(&handle))
            .await?;
        // The profile endpoint carries no banner; an operator-supplied URL
        // fills the gap
        if author.banner_url.is_none() {
            author.banner_url = self.config.account.banner_url.clone();
        }
        let author_id = author.id.clone();
        self.enqueue_author_media(&author).await;

        store.merge(Some(author), Vec::new());
        store.save().await?;
        summary.author_updated = true;
        self.emit(Event::AuthorMerged {
            id: author_id.clone(),
        });

        // A persisted cursor means the previous pass was interrupted mid-
        // pagination: resume it and run to exhaustion. Only a fresh pass may
        // stop at the archived boundary, otherwise a resumed first run would
        // mistake its own replayed page for old territory.
        let mut cursor = store.cursor().cloned();
        let resuming = cursor.is_some();
        if resuming {
            tracing::info!(cursor = ?cursor, "Resuming interrupted pass from persisted cursor");
        }

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Sync pass cancelled");
                return Err(Error::Cancelled);
            }

            let page = self
                .with_rate_limit_waits(|| self.fetcher.fetch_posts_page(&author_id, cursor.as_ref()))
                .await?;
            summary.pages_fetched += 1;

            // Boundary check runs against pre-merge state: the oldest post of
            // the page already archived with identical text means everything
            // older is archived too
            let boundary_reached = !resuming
                && page.posts.last().is_some_and(|oldest| {
                    store
                        .get_post(&oldest.id)
                        .is_some_and(|stored| stored.text == oldest.text)
                });

            for post in &page.posts {
                self.enqueue_post_media(post).await;
            }

            let outcome = store.merge(Vec::new(), page.posts);
            summary.new_posts += outcome.new_posts;
            summary.refreshed_posts += outcome.refreshed_posts;

            store.save().await?;
            self.emit(Event::PageMerged {
                page: summary.pages_fetched,
                new_posts: outcome.new_posts,
                refreshed_posts: outcome.refreshed_posts,
            });

            if boundary_reached || page.next_cursor.is_none() {
                store.save_cursor(None).await?;
                break;
            }
            store.save_cursor(page.next_cursor.clone()).await?;
            cursor = page.next_cursor;
        }

        let report = self.media.drain(registry).await;
        summary.media_downloaded = report.downloaded;
        summary.media_failed = report.failed.len() as u64;

        tracing::info!(
            new_posts = summary.new_posts,
            refreshed_posts = summary.refreshed_posts,
            pages = summary.pages_fetched,
            media_downloaded = summary.media_downloaded,
            media_failed = summary.media_failed,
            "Sync pass converged"
        );
        self.emit(Event::PassComplete {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    /// Run `operation` with transient-fault backoff plus rate-limit waiting
    ///
    /// A `RateLimited` result suspends for the signaled duration and retries
    /// the same operation; the number of waits per operation is bounded by
    /// `max_rate_limit_waits`, after which the error surfaces.
    async fn with_rate_limit_waits<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut waits = 0;
        loop {
            match fetch_with_retry(&self.config.retry, self.clock.as_ref(), &mut operation).await {
                Ok(value) => return Ok(value),
                Err(Error::RateLimited { retry_after }) => {
                    if waits >= self.config.fetch.max_rate_limit_waits {
                        tracing::error!(
                            waits,
                            "Rate limit wait budget exhausted, surfacing to caller"
                        );
                        return Err(Error::RateLimited { retry_after });
                    }
                    waits += 1;
                    tracing::info!(
                        wait_secs = retry_after.as_secs(),
                        waits,
                        max_waits = self.config.fetch.max_rate_limit_waits,
                        "Rate limited, pass suspended"
                    );
                    self.emit(Event::RateLimited { wait: retry_after });
                    self.clock.sleep(retry_after).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Queue avatar and banner downloads for the author snapshot
    async fn enqueue_author_media(&self, author: &AuthorRecord) {
        if let Some(url) = &author.avatar_url {
            self.media.enqueue(url, "avatar").await;
        }
        if let Some(url) = &author.banner_url {
            self.media.enqueue(url, "banner").await;
        }
    }

    /// Queue downloads for a post's attachments and embedded links
    ///
    /// Destinations are keyed by post id and item ordinal so re-observing the
    /// same post always targets the same directory.
    async fn enqueue_post_media(&self, post: &PostRecord) {
        let mut ordinal = 0usize;
        for url in &post.attachments {
            self.media
                .enqueue(url, &format!("{}_{}", post.id, ordinal))
                .await;
            ordinal += 1;
        }
        for link in &post.links {
            self.media
                .enqueue(&link.expanded_url, &format!("{}_{}", post.id, ordinal))
                .await;
            ordinal += 1;
        }
    }

    fn emit(&self, event: Event) {
        // Dropped silently when nobody is subscribed
        self.event_tx.send(event).ok();
    }
}
