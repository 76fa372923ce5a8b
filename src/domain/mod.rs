//! Domain types for the herald publishing pipeline.
//!
//! This module contains the core data structures:
//! - Content: Deliverable text with an optional image reference
//! - ScheduledPost: Operator-authored posts with a fixed delivery time
//! - Candidate: Discovered content moving through moderation

pub mod candidate;
pub mod content;
pub mod post;

use thiserror::Error;

// Re-export commonly used types
pub use candidate::{
    title_key, Candidate, CandidateDraft, CandidateState, Decision, SessionId, TransitionError,
};
pub use content::{Content, MAX_CAPTION_CHARS, MAX_TEXT_CHARS};
pub use post::{parse_target_time, NewScheduledPost, PostStatus, ScheduledPost};

/// Input rejected at the point of creation; nothing is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Message text is empty")]
    EmptyText,

    #[error("Message text is too long: {len} > {limit} characters")]
    TextTooLong { len: usize, limit: usize },

    #[error("Target time {target} is not in the future (now: {now})")]
    NotInFuture { target: String, now: String },

    #[error("Malformed date: {0} (expected RFC 3339 or \"YYYY-MM-DD HH:MM\")")]
    MalformedTime(String),

    #[error("Candidate draft has neither title nor body")]
    EmptyDraft,
}
