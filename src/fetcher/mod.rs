//! Remote fetcher boundary
//!
//! Pulls pages of author and post records from the remote platform API,
//! abstracting pagination and rate-limit signaling behind the
//! [`RemoteFetcher`] trait. Implementations classify failures into the
//! crate's taxonomy (`NotFound` / `RateLimited` / `Transient`) and never
//! sleep internally — suspension is the reconciler's responsibility, which
//! keeps this component non-blocking and testable without real clocks.
//!
//! Records are validated here, at the boundary: malformed posts are
//! quarantined (skipped with a warning) rather than propagated inward.

mod http;

pub use http::HttpFetcher;

use crate::error::Result;
use crate::types::{AuthorId, AuthorRecord, Cursor, PostRecord};
use async_trait::async_trait;

/// One page of timeline posts, newest-first in remote order
#[derive(Clone, Debug, Default)]
pub struct Page {
    /// Posts in remote timeline order (newest first)
    pub posts: Vec<PostRecord>,
    /// Token for the next (older) page; `None` signals exhaustion
    pub next_cursor: Option<Cursor>,
}

/// Abstraction over the remote platform API
///
/// The production implementation is [`HttpFetcher`]; tests substitute
/// scripted fetchers. Implementations must be restartable by cursor: fetching
/// the same page twice yields the same posts (modulo counter drift).
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Single-shot author profile lookup by handle
    ///
    /// # Errors
    ///
    /// `NotFound` if the account does not exist, `RateLimited` if throttled
    /// (carrying the required wait), `Transient` for network faults.
    async fn fetch_author(&self, handle: &str) -> Result<AuthorRecord>;

    /// Fetch one page of the author's timeline
    ///
    /// `cursor == None` starts from the newest post. The returned page's
    /// `next_cursor` is `None` when the timeline is exhausted.
    async fn fetch_posts_page(&self, author: &AuthorId, cursor: Option<&Cursor>) -> Result<Page>;
}

/// Validate a post's link descriptors against the stored invariant
///
/// Checks `0 <= start < end <= text.chars().count()` for every descriptor and
/// that no two descriptors of the same post overlap. Returns the reason on
/// failure so callers can log the quarantine decision.
pub fn validate_post(post: &PostRecord) -> std::result::Result<(), String> {
    let text_len = post.text.chars().count();

    for link in &post.links {
        if link.start >= link.end {
            return Err(format!(
                "link '{}' has empty or inverted span {}..{}",
                link.url, link.start, link.end
            ));
        }
        if link.end > text_len {
            return Err(format!(
                "link '{}' span {}..{} exceeds text length {}",
                link.url, link.start, link.end, text_len
            ));
        }
    }

    let mut spans: Vec<(usize, usize)> = post.links.iter().map(|l| (l.start, l.end)).collect();
    spans.sort_unstable();
    for pair in spans.windows(2) {
        if pair[1].0 < pair[0].1 {
            return Err(format!(
                "link spans {}..{} and {}..{} overlap",
                pair[0].0, pair[0].1, pair[1].0, pair[1].1
            ));
        }
    }

    Ok(())
}
