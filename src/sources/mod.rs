//! Content sources feeding discovery.
//!
//! A source produces drafts on demand. It knows nothing about deduplication
//! or storage; the discovery coordinator takes care of both.

pub mod feed;
pub mod templates;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::CandidateDraft;

pub use feed::FeedSource;
pub use templates::TemplateSource;

/// A producer of candidate drafts
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &str;

    /// Produce up to `max_count` drafts. Returning fewer (or none) is fine.
    async fn produce(&self, max_count: usize) -> Result<Vec<CandidateDraft>>;
}
