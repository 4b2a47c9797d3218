//! HTTP implementation of the remote fetcher against the platform's v2 API

use super::{Page, RemoteFetcher, validate_post};
use crate::config::{AccountConfig, Credentials, FetchConfig};
use crate::error::{Error, Result};
use crate::types::{
    AuthorId, AuthorRecord, Cursor, Engagement, EntitySpan, LinkDescriptor, PostId, PostRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Fields requested for author lookups
const USER_FIELDS: &str =
    "created_at,description,location,profile_image_url,protected,public_metrics";
/// Fields requested for timeline pages
const TWEET_FIELDS: &str = "created_at,public_metrics,source,entities,attachments";
/// Expansions needed to resolve attachment media keys into URLs
const MEDIA_EXPANSIONS: &str = "attachments.media_keys";
/// Media fields requested alongside the expansion
const MEDIA_FIELDS: &str = "url,preview_image_url";

/// Remote fetcher backed by the platform's HTTP API
///
/// Rate limiting surfaces as [`Error::RateLimited`] with the wait the server
/// demanded (or the configured fallback); the fetcher itself never sleeps.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    bearer_token: String,
    page_size: usize,
    rate_limit_fallback: Duration,
}

impl HttpFetcher {
    /// Build a fetcher from configuration and caller-supplied credentials
    pub fn new(account: &AccountConfig, fetch: &FetchConfig, credentials: &Credentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: account.api_base_url.trim_end_matches('/').to_string(),
            bearer_token: credentials.bearer_token.clone(),
            page_size: fetch.page_size,
            rate_limit_fallback: fetch.rate_limit_fallback,
        }
    }

    async fn get(&self, url: String, context: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(context.to_string()));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_from(&response).unwrap_or(self.rate_limit_fallback);
            return Err(Error::RateLimited { retry_after });
        }
        if status.is_server_error() {
            return Err(Error::Transient(format!(
                "server returned {status} for {context}"
            )));
        }
        Err(Error::Other(format!(
            "unexpected status {status} for {context}"
        )))
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch_author(&self, handle: &str) -> Result<AuthorRecord> {
        let url = format!(
            "{}/2/users/by/username/{}?user.fields={}",
            self.base_url, handle, USER_FIELDS
        );
        let envelope: UserEnvelope = self
            .get(url, &format!("author '{handle}'"))
            .await?
            .json()
            .await
            .map_err(classify_request_error)?;

        // The API answers 200 with an errors array for suspended/absent users
        let Some(user) = envelope.data else {
            return Err(Error::NotFound(handle.to_string()));
        };

        Ok(parse_author(user))
    }

    async fn fetch_posts_page(&self, author: &AuthorId, cursor: Option<&Cursor>) -> Result<Page> {
        let mut url = format!(
            "{}/2/users/{}/tweets?max_results={}&tweet.fields={}&expansions={}&media.fields={}",
            self.base_url, author, self.page_size, TWEET_FIELDS, MEDIA_EXPANSIONS, MEDIA_FIELDS
        );
        if let Some(cursor) = cursor {
            url.push_str("&pagination_token=");
            url.push_str(cursor.as_str());
        }

        let envelope: TimelineEnvelope = self
            .get(url, &format!("timeline of {author}"))
            .await?
            .json()
            .await
            .map_err(classify_request_error)?;

        Ok(parse_timeline(author, envelope))
    }
}

/// Classify reqwest failures: timeouts and connection faults are transient
fn classify_request_error(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::Transient(e.to_string())
    } else {
        Error::Network(e)
    }
}

/// Extract the wait the server demanded from a 429 response
fn retry_after_from(response: &reqwest::Response) -> Option<Duration> {
    if let Some(secs) = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        return Some(Duration::from_secs(secs));
    }
    // Fallback: x-rate-limit-reset is an absolute epoch second
    let reset = response
        .headers()
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())?;
    let now = Utc::now().timestamp();
    Some(Duration::from_secs(reset.saturating_sub(now).max(1) as u64))
}

fn parse_author(user: UserPayload) -> AuthorRecord {
    let metrics = user.public_metrics.unwrap_or_default();
    AuthorRecord {
        id: AuthorId::new(user.id),
        handle: user.username,
        display_name: user.name,
        created_at: user.created_at,
        description: user.description,
        location: user.location,
        // The API serves a thumbnail variant; strip the suffix for full size
        avatar_url: user
            .profile_image_url
            .map(|u| u.replace("_normal", "")),
        banner_url: None,
        post_count: metrics.tweet_count,
        follower_count: metrics.followers_count,
        following_count: metrics.following_count,
        listed_count: metrics.listed_count,
    }
}

/// Convert a timeline envelope into a [`Page`], quarantining malformed posts
fn parse_timeline(author: &AuthorId, envelope: TimelineEnvelope) -> Page {
    let media_urls: std::collections::HashMap<String, String> = envelope
        .includes
        .and_then(|i| i.media)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|m| {
            let url = m.url.or(m.preview_image_url)?;
            Some((m.media_key, url))
        })
        .collect();

    let mut posts = Vec::new();
    for tweet in envelope.data.unwrap_or_default() {
        let post = parse_post(author, tweet, &media_urls);
        match validate_post(&post) {
            Ok(()) => posts.push(post),
            Err(reason) => {
                // Quarantine: never propagate loosely-validated records inward
                tracing::warn!(post_id = %post.id, reason = %reason, "Quarantined malformed post");
            }
        }
    }

    Page {
        posts,
        next_cursor: envelope
            .meta
            .and_then(|m| m.next_token)
            .map(Cursor::new),
    }
}

fn parse_post(
    author: &AuthorId,
    tweet: TweetPayload,
    media_urls: &std::collections::HashMap<String, String>,
) -> PostRecord {
    let metrics = tweet.public_metrics.unwrap_or_default();
    let entities = tweet.entities.unwrap_or_default();

    let attachments = tweet
        .attachments
        .and_then(|a| a.media_keys)
        .unwrap_or_default()
        .iter()
        .filter_map(|key| media_urls.get(key).cloned())
        .collect();

    PostRecord {
        id: PostId::new(tweet.id),
        author_id: author.clone(),
        created_at: tweet.created_at,
        text: tweet.text,
        links: entities
            .urls
            .unwrap_or_default()
            .into_iter()
            .map(|u| LinkDescriptor {
                expanded_url: u.expanded_url.unwrap_or_else(|| u.url.clone()),
                display_url: u.display_url.unwrap_or_else(|| u.url.clone()),
                url: u.url,
                start: u.start,
                end: u.end,
            })
            .collect(),
        hashtags: entities
            .hashtags
            .unwrap_or_default()
            .into_iter()
            .map(|h| EntitySpan {
                tag: h.tag,
                start: h.start,
                end: h.end,
            })
            .collect(),
        mentions: entities
            .mentions
            .unwrap_or_default()
            .into_iter()
            .map(|m| EntitySpan {
                tag: m.username,
                start: m.start,
                end: m.end,
            })
            .collect(),
        attachments,
        source: tweet.source,
        engagement: Engagement {
            reply_count: metrics.reply_count,
            share_count: metrics.retweet_count,
            like_count: metrics.like_count,
            quote_count: metrics.quote_count,
        },
    }
}

// ---------------------------------------------------------------------------
// Wire payloads (duck-typed API shapes converted to tagged records here)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    data: Option<UserPayload>,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    name: String,
    username: String,
    created_at: Option<DateTime<Utc>>,
    description: Option<String>,
    location: Option<String>,
    profile_image_url: Option<String>,
    public_metrics: Option<UserMetrics>,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetrics {
    #[serde(default)]
    followers_count: u64,
    #[serde(default)]
    following_count: u64,
    #[serde(default)]
    tweet_count: u64,
    #[serde(default)]
    listed_count: u64,
}

#[derive(Debug, Deserialize)]
struct TimelineEnvelope {
    data: Option<Vec<TweetPayload>>,
    includes: Option<Includes>,
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct TweetPayload {
    id: String,
    text: String,
    created_at: Option<DateTime<Utc>>,
    source: Option<String>,
    public_metrics: Option<TweetMetrics>,
    entities: Option<Entities>,
    attachments: Option<Attachments>,
}

#[derive(Debug, Default, Deserialize)]
struct TweetMetrics {
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    reply_count: u64,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    quote_count: u64,
}

#[derive(Debug, Default, Deserialize)]
struct Entities {
    urls: Option<Vec<UrlEntity>>,
    hashtags: Option<Vec<TagEntity>>,
    mentions: Option<Vec<MentionEntity>>,
}

#[derive(Debug, Deserialize)]
struct UrlEntity {
    start: usize,
    end: usize,
    url: String,
    expanded_url: Option<String>,
    display_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagEntity {
    start: usize,
    end: usize,
    tag: String,
}

#[derive(Debug, Deserialize)]
struct MentionEntity {
    start: usize,
    end: usize,
    username: String,
}

#[derive(Debug, Deserialize)]
struct Attachments {
    media_keys: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct Includes {
    media: Option<Vec<MediaPayload>>,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    media_key: String,
    url: Option<String>,
    preview_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    next_token: Option<String>,
}
