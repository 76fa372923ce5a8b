//! SQLite-backed store.
//!
//! Each call runs on the blocking pool under a bounded timeout, so a locked
//! or slow database cannot stall the async loops.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::{
    title_key, Candidate, CandidateDraft, Content, NewScheduledPost, PostStatus, ScheduledPost,
};

use super::schema::SCHEMA;
use super::{CandidateText, Result, Store, StoreError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const POST_COLUMNS: &str = "id, text, image_ref, target_at, status, created_at, published_at";

const CANDIDATE_COLUMNS: &str =
    "id, title, body, category, source_url, image_ref, is_approved, is_published, found_at";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    timeout: Duration,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init(conn)
    }

    /// Private in-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Bound every call by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("connection lock poisoned: {e}")))?;
            f(&guard)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(StoreError::Unavailable(format!("store task failed: {e}"))),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_scheduled_post(&self, post: &NewScheduledPost) -> Result<i64> {
        let text = post.text().to_string();
        let image = post.image().map(str::to_string);
        let target_at = format_ts(post.target_at());
        let created_at = format_ts(Utc::now());

        self.call(move |conn| {
            conn.execute(
                "INSERT INTO scheduled_posts (text, image_ref, target_at, status, created_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4)",
                params![text, image, target_at, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn record_published_post(&self, content: &Content, published_at: DateTime<Utc>) -> Result<i64> {
        let text = content.text.clone();
        let image = content.image.clone();
        let at = format_ts(published_at);

        self.call(move |conn| {
            conn.execute(
                "INSERT INTO scheduled_posts (text, image_ref, target_at, status, created_at, published_at)
                 VALUES (?1, ?2, ?3, 'published', ?3, ?3)",
                params![text, image, at],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn get_scheduled_post(&self, id: i64) -> Result<Option<ScheduledPost>> {
        self.call(move |conn| {
            let post = conn
                .query_row(
                    &format!("SELECT {POST_COLUMNS} FROM scheduled_posts WHERE id = ?1"),
                    params![id],
                    post_from_row,
                )
                .optional()?;
            Ok(post)
        })
        .await
    }

    async fn list_due_pending(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledPost>> {
        let now = format_ts(now);

        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {POST_COLUMNS} FROM scheduled_posts
                 WHERE status = 'pending' AND target_at <= ?1
                 ORDER BY target_at ASC, id ASC"
            ))?;
            let posts = stmt
                .query_map(params![now], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(posts)
        })
        .await
    }

    async fn list_pending(&self) -> Result<Vec<ScheduledPost>> {
        self.call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {POST_COLUMNS} FROM scheduled_posts
                 WHERE status = 'pending'
                 ORDER BY target_at ASC, id ASC"
            ))?;
            let posts = stmt
                .query_map([], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(posts)
        })
        .await
    }

    async fn mark_published(&self, id: i64) -> Result<()> {
        let now = format_ts(Utc::now());

        self.call(move |conn| {
            // COALESCE keeps the first publication time on repeated calls
            let changed = conn.execute(
                "UPDATE scheduled_posts
                 SET status = 'published', published_at = COALESCE(published_at, ?2)
                 WHERE id = ?1",
                params![id, now],
            )?;
            if changed == 0 {
                return Err(StoreError::post_not_found(id));
            }
            Ok(())
        })
        .await
    }

    async fn create_candidate(&self, draft: &CandidateDraft, found_at: DateTime<Utc>) -> Result<i64> {
        let draft = draft.clone();
        let key = title_key(&draft.title);
        let found_at = format_ts(found_at);

        self.call(move |conn| {
            conn.execute(
                "INSERT INTO candidates (title, title_key, body, category, source_url, image_ref, found_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    draft.title,
                    key,
                    draft.body,
                    draft.category,
                    draft.source_url,
                    draft.image_url,
                    found_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn get_candidate(&self, id: i64) -> Result<Option<Candidate>> {
        self.call(move |conn| {
            let candidate = conn
                .query_row(
                    &format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = ?1"),
                    params![id],
                    candidate_from_row,
                )
                .optional()?;
            Ok(candidate)
        })
        .await
    }

    async fn update_candidate_body(&self, id: i64, body: &str) -> Result<()> {
        let body = body.to_string();
        self.update_candidate(id, "UPDATE candidates SET body = ?2 WHERE id = ?1", Some(body))
            .await
    }

    async fn delete_candidate(&self, id: i64) -> Result<()> {
        self.update_candidate(id, "DELETE FROM candidates WHERE id = ?1", None)
            .await
    }

    async fn mark_candidate_approved(&self, id: i64) -> Result<()> {
        self.update_candidate(id, "UPDATE candidates SET is_approved = 1 WHERE id = ?1", None)
            .await
    }

    async fn mark_candidate_published(&self, id: i64) -> Result<()> {
        self.update_candidate(id, "UPDATE candidates SET is_published = 1 WHERE id = ?1", None)
            .await
    }

    async fn mark_candidate_delivered(&self, id: i64) -> Result<()> {
        self.update_candidate(
            id,
            "UPDATE candidates SET is_approved = 1, is_published = 1 WHERE id = ?1",
            None,
        )
        .await
    }

    async fn list_recent_candidates(&self, limit: usize) -> Result<Vec<Candidate>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CANDIDATE_COLUMNS} FROM candidates
                 ORDER BY found_at DESC, id DESC
                 LIMIT ?1"
            ))?;
            let candidates = stmt
                .query_map(params![limit], candidate_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(candidates)
        })
        .await
    }

    async fn list_candidate_texts(&self) -> Result<Vec<CandidateText>> {
        self.call(|conn| {
            let mut stmt = conn.prepare("SELECT title, body FROM candidates")?;
            let texts = stmt
                .query_map([], |row| {
                    Ok(CandidateText {
                        title: row.get(0)?,
                        body: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(texts)
        })
        .await
    }

    async fn exists_similar_candidate(&self, title: &str, body_prefix: &str) -> Result<bool> {
        let key = title_key(title);
        let prefix = body_prefix.trim().to_string();

        self.call(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(
                     SELECT 1 FROM candidates
                     WHERE (?1 <> '' AND title_key = ?1)
                        OR (?2 <> '' AND instr(body, ?2) > 0)
                 )",
                params![key, prefix],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }
}

impl SqliteStore {
    /// Run a single-row candidate statement; zero affected rows is NotFound
    async fn update_candidate(&self, id: i64, sql: &'static str, value: Option<String>) -> Result<()> {
        self.call(move |conn| {
            let changed = match value {
                Some(value) => conn.execute(sql, params![id, value])?,
                None => conn.execute(sql, params![id])?,
            };
            if changed == 0 {
                return Err(StoreError::candidate_not_found(id));
            }
            Ok(())
        })
        .await
    }
}

/// Fixed-width UTC timestamps, so text comparison matches time order
fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_ts(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => parse_ts(row, idx).map(Some),
        None => Ok(None),
    }
}

fn post_from_row(row: &Row) -> rusqlite::Result<ScheduledPost> {
    let status: String = row.get(4)?;
    let status = PostStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            Box::new(StoreError::Corrupt(format!("unknown post status: {status}"))),
        )
    })?;

    Ok(ScheduledPost {
        id: row.get(0)?,
        text: row.get(1)?,
        image: row.get(2)?,
        target_at: parse_ts(row, 3)?,
        status,
        created_at: parse_ts(row, 5)?,
        published_at: parse_opt_ts(row, 6)?,
    })
}

fn candidate_from_row(row: &Row) -> rusqlite::Result<Candidate> {
    Ok(Candidate {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        category: row.get(3)?,
        source_url: row.get(4)?,
        image_url: row.get(5)?,
        is_approved: row.get::<_, i64>(6)? != 0,
        is_published: row.get::<_, i64>(7)? != 0,
        found_at: parse_ts(row, 8)?,
    })
}
