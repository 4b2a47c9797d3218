//! Durable record store for the archived author and post maps
//!
//! The store owns the two entity maps plus the pagination cursor, persisted as
//! JSON files in the configured data directory. All writes go through a
//! write-to-temp-then-rename discipline so an interrupted save never corrupts
//! the previously durable state. An advisory lock file enforces the
//! single-writer rule: two concurrent passes merging and saving would race on
//! the persisted files.
//!
//! Merge semantics implement the archive's content freeze: author snapshots
//! are overwritten wholesale, posts are insert-only except for their
//! engagement counters. Records are never deleted.

use crate::error::{Error, Result, StoreError};
use crate::types::{AuthorMap, AuthorRecord, Cursor, PostId, PostMap, PostRecord};
use std::path::{Path, PathBuf};

/// Filename of the persisted author map
const AUTHORS_FILENAME: &str = "authors.json";
/// Filename of the persisted post map
const POSTS_FILENAME: &str = "posts.json";
/// Filename of the persisted pagination cursor
const CURSOR_FILENAME: &str = "cursor.json";
/// Advisory lock file guarding against concurrent writers
const LOCK_FILENAME: &str = "store.lock";

/// Outcome of merging one batch of fetched records into the store
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Authors created or overwritten
    pub authors_merged: u64,
    /// Posts observed for the first time
    pub new_posts: u64,
    /// Already-archived posts whose engagement counters were refreshed
    pub refreshed_posts: u64,
}

/// Durable keyed storage for the author and post maps
///
/// The store is the exclusive owner of both maps; the reconciler is the only
/// writer and the exporter consumes the read API only. Opening the store
/// acquires an advisory lock released on drop.
#[derive(Debug)]
pub struct RecordStore {
    dir: PathBuf,
    authors: AuthorMap,
    posts: PostMap,
    cursor: Option<Cursor>,
    _lock: StoreLock,
}

impl RecordStore {
    /// Open (or initialize) the store in `dir`
    ///
    /// A missing directory or missing store files are treated as a first run
    /// and yield empty maps. Files that exist but cannot be parsed surface as
    /// [`StoreError::Corrupt`]; the store never silently discards unreadable
    /// state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another writer holds the lock file.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to create store directory '{}': {}", dir.display(), e),
            ))
        })?;

        let lock = StoreLock::acquire(dir.join(LOCK_FILENAME))?;

        let authors: AuthorMap = load_json(&dir.join(AUTHORS_FILENAME)).await?;
        let posts: PostMap = load_json(&dir.join(POSTS_FILENAME)).await?;
        let cursor: Option<Cursor> = load_json(&dir.join(CURSOR_FILENAME)).await?;

        tracing::info!(
            dir = %dir.display(),
            authors = authors.len(),
            posts = posts.len(),
            has_cursor = cursor.is_some(),
            "Record store opened"
        );

        Ok(Self {
            dir,
            authors,
            posts,
            cursor,
            _lock: lock,
        })
    }

    /// Merge fetched records into the in-memory maps
    ///
    /// Authors are overwritten wholesale (latest snapshot wins). Posts are
    /// inserted if absent; for posts already archived, only the engagement
    /// counters update — text, links, spans, and timestamp stay frozen at
    /// first capture, so a later text-altering API response is never treated
    /// as an edit.
    ///
    /// Merging the same batch twice produces the same state as merging it
    /// once.
    pub fn merge(
        &mut self,
        authors: impl IntoIterator<Item = AuthorRecord>,
        posts: impl IntoIterator<Item = PostRecord>,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for author in authors {
            self.authors.insert(author.id.clone(), author);
            outcome.authors_merged += 1;
        }

        for post in posts {
            match self.posts.get_mut(&post.id) {
                Some(existing) => {
                    if existing.engagement != post.engagement {
                        existing.engagement = post.engagement;
                    }
                    outcome.refreshed_posts += 1;
                }
                None => {
                    self.posts.insert(post.id.clone(), post);
                    outcome.new_posts += 1;
                }
            }
        }

        outcome
    }

    /// Atomically persist both maps
    ///
    /// Each file is written to a temporary sibling and renamed into place, so
    /// a crash mid-write leaves the prior persisted state readable.
    pub async fn save(&self) -> Result<()> {
        save_json(&self.dir.join(AUTHORS_FILENAME), &self.authors).await?;
        save_json(&self.dir.join(POSTS_FILENAME), &self.posts).await?;
        tracing::debug!(
            authors = self.authors.len(),
            posts = self.posts.len(),
            "Record store persisted"
        );
        Ok(())
    }

    /// Persist the pagination cursor
    ///
    /// Called only after the corresponding page has been durably merged via
    /// [`save`](Self::save); the merge-then-cursor order bounds crash replay
    /// to one already-merged (idempotent) page.
    pub async fn save_cursor(&mut self, cursor: Option<Cursor>) -> Result<()> {
        save_json(&self.dir.join(CURSOR_FILENAME), &cursor).await?;
        self.cursor = cursor;
        Ok(())
    }

    /// The cursor persisted by the last incomplete pass, if any
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Read API: all archived author snapshots
    pub fn authors(&self) -> &AuthorMap {
        &self.authors
    }

    /// Read API: all archived posts
    pub fn posts(&self) -> &PostMap {
        &self.posts
    }

    /// Look up a single archived post
    pub fn get_post(&self, id: &PostId) -> Option<&PostRecord> {
        self.posts.get(id)
    }

    /// Directory this store persists into
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Advisory lock file held for the lifetime of an open store
///
/// Created with `create_new` so a second opener fails instead of racing.
/// Removed on drop; a stale lock after a hard crash must be removed by the
/// operator (reported via the `Locked` error path).
#[derive(Debug)]
struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire(path: PathBuf) -> Result<Self> {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::Store(StoreError::Locked { path }))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove store lock file");
        }
    }
}

/// Read and parse a JSON store file, treating a missing file as default
async fn load_json<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => {
            return Err(Error::Store(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }));
        }
    };

    serde_json::from_slice(&bytes).map_err(|e| {
        Error::Store(StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    })
}

/// Serialize `value` and atomically replace `path` with it
async fn save_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
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
