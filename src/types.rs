//! Core types for timeline-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Unique identifier for an archived post
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub String);

impl PostId {
    /// Create a new PostId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PostId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Unique identifier for an archived account
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(pub String);

impl AuthorId {
    /// Create a new AuthorId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AuthorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AuthorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Opaque pagination token marking sync progress through the remote timeline
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    /// Create a new Cursor
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the inner token value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Keyed map of archived author profiles
pub type AuthorMap = BTreeMap<AuthorId, AuthorRecord>;

/// Keyed map of archived posts
pub type PostMap = BTreeMap<PostId, PostRecord>;

/// Cached profile snapshot of the archived account
///
/// Mutable: overwritten wholesale on each sync pass (latest snapshot wins,
/// no history kept).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthorRecord {
    /// Opaque account identifier
    pub id: AuthorId,
    /// Account handle (screen name)
    pub handle: String,
    /// Friendly display name
    pub display_name: String,
    /// Account creation timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Profile description (bio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Location free-text from the profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// URL of the avatar image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// URL of the profile banner image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner_url: Option<String>,
    /// Number of posts (including reposts) published by this account
    #[serde(default)]
    pub post_count: u64,
    /// Number of accounts following this account
    #[serde(default)]
    pub follower_count: u64,
    /// Number of accounts this account follows
    #[serde(default)]
    pub following_count: u64,
    /// Number of lists that include this account
    #[serde(default)]
    pub listed_count: u64,
}

/// Immutable-content, mutable-counters record of a single archived item
///
/// Content fields (`text`, `links`, `hashtags`, `mentions`, `created_at`,
/// `attachments`) are frozen at first capture; only [`Engagement`] counters
/// are refreshed by later sync passes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    /// Opaque post identifier
    pub id: PostId,
    /// Identifier of the authoring account (weak reference, never dangled by deletion)
    pub author_id: AuthorId,
    /// Creation timestamp of the post
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Raw text body
    pub text: String,
    /// Embedded link descriptors, in order of appearance
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LinkDescriptor>,
    /// Hashtag spans recognized in the text
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashtags: Vec<EntitySpan>,
    /// Mention spans recognized in the text
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<EntitySpan>,
    /// Media URLs attached directly to the post
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    /// Name of the app the post was published from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Engagement counters (drift over time, refreshed on every pass)
    #[serde(default)]
    pub engagement: Engagement,
}

/// Engagement counters of a post
///
/// These drift over time and are the only post fields updated after first
/// capture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    /// Number of replies
    #[serde(default)]
    pub reply_count: u64,
    /// Number of shares (reposts without comment)
    #[serde(default)]
    pub share_count: u64,
    /// Number of likes
    #[serde(default)]
    pub like_count: u64,
    /// Number of quotes (reposts with comment)
    #[serde(default)]
    pub quote_count: u64,
}

/// An embedded link recognized within a post's text
///
/// Invariant: `0 <= start < end <= text.chars().count()`, and descriptors of
/// the same post do not overlap. Enforced at the fetch boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDescriptor {
    /// The URL as published (usually shortened)
    pub url: String,
    /// The fully resolved URL
    pub expanded_url: String,
    /// The URL as displayed in clients
    pub display_url: String,
    /// Start character offset (zero-based, inclusive) into the post text
    pub start: usize,
    /// End character offset (zero-based, exclusive) into the post text
    pub end: usize,
}

/// A hashtag or mention span recognized within a post's text
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpan {
    /// The recognized token, without its sigil (`#`/`@`)
    pub tag: String,
    /// Start character offset (zero-based, inclusive)
    pub start: usize,
    /// End character offset (zero-based, exclusive)
    pub end: usize,
}

/// Media download task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    /// Waiting for (or undergoing) dispatch
    Pending,
    /// Downloaded successfully
    Done,
    /// Gave up after exhausting retries
    Failed,
}

/// Summary of one completed sync pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    /// Whether the author profile snapshot was created or replaced
    pub author_updated: bool,
    /// Posts observed for the first time
    pub new_posts: u64,
    /// Already-archived posts whose engagement counters were refreshed
    pub refreshed_posts: u64,
    /// Pages fetched from the remote timeline
    pub pages_fetched: u64,
    /// Media tasks completed during this pass
    pub media_downloaded: u64,
    /// Media tasks that exhausted their retries during this pass
    pub media_failed: u64,
}

/// Event emitted during a sync pass
///
/// Consumers subscribe via [`crate::TimelineArchiver::subscribe`]; events are
/// broadcast and dropped silently when no subscriber is listening.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A sync pass started
    PassStarted {
        /// Handle of the account being archived
        handle: String,
    },

    /// The author profile snapshot was merged
    AuthorMerged {
        /// Account identifier
        id: AuthorId,
    },

    /// A timeline page was merged and persisted
    PageMerged {
        /// 1-based page ordinal within this pass
        page: u64,
        /// Posts in the page observed for the first time
        new_posts: u64,
        /// Posts in the page whose counters were refreshed
        refreshed_posts: u64,
    },

    /// The remote API throttled the fetch; the pass is waiting
    RateLimited {
        /// Wait imposed before the current page is retried
        #[serde(with = "crate::config::duration_serde")]
        wait: Duration,
    },

    /// A media download task was enqueued
    MediaQueued {
        /// Normalized source URL
        url: String,
    },

    /// A media download task completed
    MediaDone {
        /// Normalized source URL
        url: String,
        /// Destination directory of the downloaded file(s)
        dest: PathBuf,
    },

    /// A media download task exhausted its retries
    MediaFailed {
        /// Normalized source URL
        url: String,
        /// Last failure detail
        error: String,
        /// Attempts made
        attempts: u32,
    },

    /// The sync pass converged
    PassComplete {
        /// Pass result summary
        summary: PassSummary,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_id_serializes_transparently() {
        let id = PostId::new("1234567890");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"1234567890\"");
    }

    #[test]
    fn post_record_roundtrips_with_optional_fields_absent() {
        let post = PostRecord {
            id: PostId::new("1"),
            author_id: AuthorId::new("42"),
            created_at: None,
            text: "hello".to_string(),
            links: Vec::new(),
            hashtags: Vec::new(),
            mentions: Vec::new(),
            attachments: Vec::new(),
            source: None,
            engagement: Engagement::default(),
        };
        let json = serde_json::to_string(&post).unwrap();
        // Empty collections and unset options are omitted from the archive
        assert!(!json.contains("links"));
        assert!(!json.contains("created_at"));
        let back: PostRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, post);
    }

    #[test]
    fn engagement_defaults_to_zero() {
        let e: Engagement = serde_json::from_str("{}").unwrap();
        assert_eq!(e.reply_count, 0);
        assert_eq!(e.like_count, 0);
    }

    #[test]
    fn event_tags_with_snake_case_type() {
        let event = Event::PassStarted {
            handle: "alice".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"pass_started\""));
    }
}
