//! Durable state for scheduled posts and discovered candidates.
//!
//! The [`Store`] trait is the only way the pipeline touches persisted state.
//! Implementations never retry: transient failures come back as retryable
//! [`StoreError`]s and the calling loop tries again on its next iteration.

pub mod schema;
pub mod sqlite;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Candidate, CandidateDraft, Content, NewScheduledPost, ScheduledPost};

pub use sqlite::SqliteStore;

/// Errors surfaced by a store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("{kind} not found: #{id}")]
    NotFound { kind: &'static str, id: i64 },

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Connectivity problems are worth retrying; missing rows are not
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    pub(crate) fn post_not_found(id: i64) -> Self {
        Self::NotFound {
            kind: "Scheduled post",
            id,
        }
    }

    pub(crate) fn candidate_not_found(id: i64) -> Self {
        Self::NotFound {
            kind: "Candidate",
            id,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Stored title and body of a candidate, used to seed the fingerprint index
#[derive(Debug, Clone)]
pub struct CandidateText {
    pub title: String,
    pub body: String,
}

/// Persistence operations needed by the pipeline
#[async_trait]
pub trait Store: Send + Sync {
    // Scheduled posts

    /// Persist a validated post with status `Pending`
    async fn create_scheduled_post(&self, post: &NewScheduledPost) -> Result<i64>;

    /// Record content that was published immediately (audit trail)
    async fn record_published_post(&self, content: &Content, published_at: DateTime<Utc>) -> Result<i64>;

    async fn get_scheduled_post(&self, id: i64) -> Result<Option<ScheduledPost>>;

    /// `Pending` posts with target time <= `now`, earliest first, ties by id
    async fn list_due_pending(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledPost>>;

    /// All `Pending` posts, earliest first
    async fn list_pending(&self) -> Result<Vec<ScheduledPost>>;

    /// Idempotent: marking an already published post is a no-op
    async fn mark_published(&self, id: i64) -> Result<()>;

    // Candidates

    async fn create_candidate(&self, draft: &CandidateDraft, found_at: DateTime<Utc>) -> Result<i64>;

    async fn get_candidate(&self, id: i64) -> Result<Option<Candidate>>;

    async fn update_candidate_body(&self, id: i64, body: &str) -> Result<()>;

    async fn delete_candidate(&self, id: i64) -> Result<()>;

    async fn mark_candidate_approved(&self, id: i64) -> Result<()>;

    async fn mark_candidate_published(&self, id: i64) -> Result<()>;

    /// Set the approved and published flags in one write
    async fn mark_candidate_delivered(&self, id: i64) -> Result<()>;

    /// Most recently discovered first
    async fn list_recent_candidates(&self, limit: usize) -> Result<Vec<Candidate>>;

    /// Title and body of every stored candidate
    async fn list_candidate_texts(&self) -> Result<Vec<CandidateText>>;

    /// True when a stored candidate has the same normalized title, or a body
    /// containing `body_prefix`. An empty title never matches on title and
    /// an empty prefix never matches on body.
    async fn exists_similar_candidate(&self, title: &str, body_prefix: &str) -> Result<bool>;
}
