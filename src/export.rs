//! Archive exporters
//!
//! Renders the archived maps into human-readable artifacts: a plain-text
//! digest and a standalone HTML page. Exports are pure functions of the
//! store's read API, written atomically next to the store files. Posts are
//! rendered newest first; shortened link text is replaced by the resolved
//! URLs using the archived span offsets.

use crate::error::{Error, Result, StoreError};
use crate::store::RecordStore;
use crate::types::{LinkDescriptor, PostRecord};
use std::fmt::Write as _;
use std::path::Path;

/// Filename of the plain-text export
pub const TEXT_EXPORT_FILENAME: &str = "timeline.txt";
/// Filename of the HTML export
pub const HTML_EXPORT_FILENAME: &str = "timeline.html";

/// Write both export artifacts into the store's data directory
pub async fn export_all(store: &RecordStore) -> Result<()> {
    export_text(store, &store.dir().join(TEXT_EXPORT_FILENAME)).await?;
    export_html(store, &store.dir().join(HTML_EXPORT_FILENAME)).await?;
    Ok(())
}

/// Render the archive as plain text and write it to `path`
pub async fn export_text(store: &RecordStore, path: &Path) -> Result<()> {
    let rendered = render_text(store);
    write_atomic(path, rendered.as_bytes()).await?;
    tracing::info!(path = %path.display(), "Text export written");
    Ok(())
}

/// Render the archive as a standalone HTML page and write it to `path`
pub async fn export_html(store: &RecordStore, path: &Path) -> Result<()> {
    let rendered = render_html(store);
    write_atomic(path, rendered.as_bytes()).await?;
    tracing::info!(path = %path.display(), "HTML export written");
    Ok(())
}

/// Render the archive as plain text, newest post first
pub fn render_text(store: &RecordStore) -> String {
    let mut out = String::new();

    for author in store.authors().values() {
        let _ = writeln!(out, "{} (@{})", author.display_name, author.handle);
        if let Some(description) = &author.description {
            let _ = writeln!(out, "{description}");
        }
        let _ = writeln!(
            out,
            "{} posts, {} followers, {} following",
            author.post_count, author.follower_count, author.following_count
        );
        out.push('\n');
    }

    for post in posts_newest_first(store) {
        if let Some(ts) = post.created_at {
            let _ = writeln!(out, "[{}] {}", ts.format("%Y-%m-%d %H:%M"), post.id);
        } else {
            let _ = writeln!(out, "[unknown date] {}", post.id);
        }
        let _ = writeln!(out, "{}", expand_links(&post.text, &post.links));
        for url in &post.attachments {
            let _ = writeln!(out, "  media: {url}");
        }
        let e = &post.engagement;
        let _ = writeln!(
            out,
            "  {} replies, {} shares, {} likes, {} quotes",
            e.reply_count, e.share_count, e.like_count, e.quote_count
        );
        out.push('\n');
    }

    out
}

/// Render the archive as a standalone HTML page, newest post first
pub fn render_html(store: &RecordStore) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");

    let title = store
        .authors()
        .values()
        .next()
        .map(|a| format!("@{}", a.handle))
        .unwrap_or_else(|| "timeline".to_string());
    let _ = writeln!(
        out,
        "<title>{}</title>",
        html_escape::encode_text(&title)
    );
    out.push_str(STYLE);
    out.push_str("</head>\n<body>\n");

    for author in store.authors().values() {
        out.push_str("<header class=\"profile\">\n");
        if let Some(banner) = &author.banner_url {
            let _ = writeln!(
                out,
                "<img class=\"banner\" src=\"{}\" alt=\"banner\">",
                html_escape::encode_double_quoted_attribute(banner)
            );
        }
        if let Some(avatar) = &author.avatar_url {
            let _ = writeln!(
                out,
                "<img class=\"avatar\" src=\"{}\" alt=\"avatar\">",
                html_escape::encode_double_quoted_attribute(avatar)
            );
        }
        let _ = writeln!(
            out,
            "<h1>{} <small>@{}</small></h1>",
            html_escape::encode_text(&author.display_name),
            html_escape::encode_text(&author.handle)
        );
        if let Some(description) = &author.description {
            let _ = writeln!(out, "<p>{}</p>", html_escape::encode_text(description));
        }
        let _ = writeln!(
            out,
            "<p class=\"stats\">{} posts &middot; {} followers &middot; {} following</p>",
            author.post_count, author.follower_count, author.following_count
        );
        out.push_str("</header>\n");
    }

    out.push_str("<main>\n");
    for post in posts_newest_first(store) {
        out.push_str("<article class=\"post\">\n");
        if let Some(ts) = post.created_at {
            let _ = writeln!(
                out,
                "<time datetime=\"{}\">{}</time>",
                ts.to_rfc3339(),
                ts.format("%Y-%m-%d %H:%M")
            );
        }
        let _ = writeln!(out, "<p>{}</p>", linkify(post));
        for url in &post.attachments {
            let _ = writeln!(
                out,
                "<p class=\"media\"><a href=\"{}\">{}</a></p>",
                html_escape::encode_double_quoted_attribute(url),
                html_escape::encode_text(url)
            );
        }
        let e = &post.engagement;
        let _ = writeln!(
            out,
            "<footer>{} replies &middot; {} shares &middot; {} likes &middot; {} quotes</footer>",
            e.reply_count, e.share_count, e.like_count, e.quote_count
        );
        out.push_str("</article>\n");
    }
    out.push_str("</main>\n</body>\n</html>\n");

    out
}

const STYLE: &str = "<style>\n\
    body { font-family: sans-serif; max-width: 40em; margin: 0 auto; }\n\
    .avatar { width: 4em; border-radius: 50%; }\n\
    .banner { width: 100%; }\n\
    .post { border-top: 1px solid #ccc; padding: 0.5em 0; }\n\
    .post footer, .stats { color: #666; font-size: 0.85em; }\n\
    </style>\n";

/// Posts sorted newest first
///
/// Ordered by timestamp when present, falling back to the identifier (ids are
/// assigned in publication order by the platform).
fn posts_newest_first(store: &RecordStore) -> Vec<&PostRecord> {
    let mut posts: Vec<&PostRecord> = store.posts().values().collect();
    posts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    posts
}

/// Replace shortened link text with the resolved URLs
///
/// Spans are character offsets; replacements run right-to-left so earlier
/// offsets stay valid.
fn expand_links(text: &str, links: &[LinkDescriptor]) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    let mut sorted: Vec<&LinkDescriptor> = links.iter().collect();
    sorted.sort_by_key(|l| std::cmp::Reverse(l.start));

    for link in sorted {
        if link.end <= chars.len() {
            chars.splice(link.start..link.end, link.expanded_url.chars());
        }
    }
    chars.into_iter().collect()
}

/// Render a post's text as escaped HTML with links as anchors
fn linkify(post: &PostRecord) -> String {
    let chars: Vec<char> = post.text.chars().collect();
    let mut sorted: Vec<&LinkDescriptor> = post.links.iter().collect();
    sorted.sort_by_key(|l| l.start);

    let mut out = String::new();
    let mut pos = 0usize;
    for link in sorted {
        if link.end > chars.len() || link.start < pos {
            continue;
        }
        let before: String = chars[pos..link.start].iter().collect();
        out.push_str(&html_escape::encode_text(&before));
        let _ = write!(
            out,
            "<a href=\"{}\">{}</a>",
            html_escape::encode_double_quoted_attribute(&link.expanded_url),
            html_escape::encode_text(&link.display_url)
        );
        pos = link.end;
    }
    let rest: String = chars[pos..].iter().collect();
    out.push_str(&html_escape::encode_text(&rest));
    out
}

/// Write `bytes` to `path` through a temporary sibling and rename
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await.map_err(|e| {
        Error::Store(StoreError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    })?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        Error::Store(StoreError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuthorId, AuthorRecord, Engagement, PostId};
    use chrono::{TimeZone, Utc};

    fn link(short: &str, expanded: &str, start: usize, end: usize) -> LinkDescriptor {
        LinkDescriptor {
            url: short.to_string(),
            expanded_url: expanded.to_string(),
            display_url: expanded.trim_start_matches("https://").to_string(),
            start,
            end,
        }
    }

    fn post(id: &str, text: &str, ts_hour: u32) -> PostRecord {
        PostRecord {
            id: PostId::new(id),
            author_id: AuthorId::new("42"),
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, ts_hour, 0, 0).unwrap()),
            text: text.to_string(),
            links: Vec::new(),
            hashtags: Vec::new(),
            mentions: Vec::new(),
            attachments: Vec::new(),
            source: None,
            engagement: Engagement::default(),
        }
    }

    fn author() -> AuthorRecord {
        AuthorRecord {
            id: AuthorId::new("42"),
            handle: "alice".to_string(),
            display_name: "Alice <Archivist>".to_string(),
            created_at: None,
            description: Some("archiving things".to_string()),
            location: None,
            avatar_url: Some("https://img.example.com/alice.jpg".to_string()),
            banner_url: None,
            post_count: 2,
            follower_count: 10,
            following_count: 5,
            listed_count: 0,
        }
    }

    async fn store_with(posts: Vec<PostRecord>) -> (tempfile::TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::open(dir.path()).await.unwrap();
        store.merge(vec![author()], posts);
        (dir, store)
    }

    #[test]
    fn expand_links_replaces_span_with_resolved_url() {
        let links = vec![link("https://t.co/x", "https://example.com/full", 5, 19)];
        assert_eq!(
            expand_links("see: https://t.co/x !", &links),
            "see: https://example.com/full !"
        );
    }

    #[test]
    fn expand_links_handles_multiple_right_to_left() {
        let links = vec![
            link("https://t.co/a", "https://a.example.com", 0, 3),
            link("https://t.co/b", "https://b.example.com", 8, 11),
        ];
        assert_eq!(
            expand_links("aaa and bbb", &links),
            "https://a.example.com and https://b.example.com"
        );
    }

    #[test]
    fn expand_links_uses_char_offsets() {
        // Multibyte chars before the span must not shift it
        let links = vec![link("https://t.co/x", "https://example.com", 4, 7)];
        assert_eq!(expand_links("héé xxx", &links), "héé https://example.com");
    }

    #[tokio::test]
    async fn text_export_is_newest_first() {
        let (_dir, store) = store_with(vec![post("1", "older", 1), post("2", "newer", 2)]).await;
        let rendered = render_text(&store);
        let older_at = rendered.find("older").unwrap();
        let newer_at = rendered.find("newer").unwrap();
        assert!(newer_at < older_at);
    }

    #[tokio::test]
    async fn html_export_escapes_markup_in_content() {
        let (_dir, store) = store_with(vec![post("1", "<script>alert(1)</script>", 1)]).await;
        let rendered = render_html(&store);
        assert!(!rendered.contains("<script>alert"));
        assert!(rendered.contains("&lt;script&gt;"));
        // Display name carries angle brackets too
        assert!(rendered.contains("Alice &lt;Archivist&gt;"));
    }

    #[tokio::test]
    async fn html_export_linkifies_spans() {
        let mut p = post("1", "see https://t.co/x now", 1);
        p.links = vec![link("https://t.co/x", "https://example.com/page", 4, 18)];
        let (_dir, store) = store_with(vec![p]).await;
        let rendered = render_html(&store);
        assert!(rendered.contains("<a href=\"https://example.com/page\">"));
        assert!(!rendered.contains("https://t.co/x"));
    }

    #[tokio::test]
    async fn export_files_are_written_to_disk() {
        let (dir, store) = store_with(vec![post("1", "hello", 1)]).await;
        export_all(&store).await.unwrap();

        let text = tokio::fs::read_to_string(dir.path().join(TEXT_EXPORT_FILENAME))
            .await
            .unwrap();
        assert!(text.contains("hello"));
        let html = tokio::fs::read_to_string(dir.path().join(HTML_EXPORT_FILENAME))
            .await
            .unwrap();
        assert!(html.contains("<!DOCTYPE html>"));
    }

    #[tokio::test]
    async fn empty_store_exports_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        assert!(render_text(&store).is_empty());
        assert!(render_html(&store).contains("<title>timeline</title>"));
    }
}
