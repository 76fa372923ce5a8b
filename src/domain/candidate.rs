//! Discovered content and its moderation lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::content::Content;
use super::ValidationError;

/// Identifies an operator conversation (the chat the operator writes from)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized title used for duplicate lookups: trimmed, lowercased,
/// inner whitespace collapsed.
pub fn title_key(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Content produced by a source adapter, before deduplication and storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDraft {
    pub title: String,
    pub body: String,
    pub category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl CandidateDraft {
    pub fn new(title: impl Into<String>, body: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            category: category.into(),
            source_url: None,
            image_url: None,
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into()).filter(|u: &String| !u.is_empty());
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into()).filter(|u: &String| !u.is_empty());
        self
    }

    /// Drafts need at least a title or a body to be worth moderating
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() && self.body.trim().is_empty() {
            return Err(ValidationError::EmptyDraft);
        }
        Ok(())
    }
}

/// A persisted candidate awaiting (or past) moderation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub category: String,
    pub source_url: Option<String>,
    pub image_url: Option<String>,
    pub is_approved: bool,
    pub is_published: bool,
    pub found_at: DateTime<Utc>,
}

impl Candidate {
    /// Lifecycle state derived from the stored flags.
    ///
    /// `Editing` is never stored; the moderation machine overlays it from
    /// its session map.
    pub fn stored_state(&self) -> CandidateState {
        match (self.is_approved, self.is_published) {
            (_, true) => CandidateState::Published,
            (true, false) => CandidateState::Approved,
            (false, false) => CandidateState::PendingModeration,
        }
    }

    /// Content to hand to the delivery engine. A title-only candidate
    /// publishes its title.
    pub fn content(&self) -> Content {
        let text = if self.body.trim().is_empty() {
            self.title.clone()
        } else {
            self.body.clone()
        };

        Content {
            text,
            image: self.image_url.clone(),
        }
    }
}

/// Operator decisions on a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
    Edit,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Edit => "edit",
        }
    }

    /// Button payload for this decision on a candidate, e.g. `approve_12`
    pub fn callback_data(&self, candidate_id: i64) -> String {
        format!("{}_{}", self.as_str(), candidate_id)
    }

    /// Inverse of [`Decision::callback_data`]
    pub fn parse_callback(data: &str) -> Option<(Decision, i64)> {
        let (action, id) = data.split_once('_')?;
        let decision = action.parse().ok()?;
        let id = id.parse().ok()?;
        Some((decision, id))
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "edit" => Ok(Self::Edit),
            other => Err(format!("Unknown decision: {other} (use approve, reject or edit)")),
        }
    }
}

/// Lifecycle of a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum CandidateState {
    /// Produced by a source, not yet stored
    Discovered,

    /// Stored and presented to the operator
    PendingModeration,

    /// The operator asked to edit; the next text from `session` replaces the body
    Editing { session: SessionId },

    /// Approved but delivery has not been confirmed
    Approved,

    /// Delivered to the channel (terminal)
    Published,

    /// Rejected and deleted (terminal)
    Rejected,
}

/// A decision or edit that the current state does not allow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot {action} a candidate that is {state}")]
pub struct TransitionError {
    pub state: CandidateState,
    pub action: &'static str,
}

impl CandidateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::Rejected)
    }

    /// Next state for an operator decision.
    ///
    /// Approve yields `Published`: the caller only commits it after the
    /// delivery succeeded. A decision on an `Editing` candidate abandons the
    /// edit.
    pub fn decide(self, decision: Decision, session: SessionId) -> Result<CandidateState, TransitionError> {
        match self {
            Self::PendingModeration | Self::Editing { .. } => Ok(match decision {
                Decision::Approve => Self::Published,
                Decision::Reject => Self::Rejected,
                Decision::Edit => Self::Editing { session },
            }),
            state => Err(TransitionError {
                state,
                action: decision.as_str(),
            }),
        }
    }

    /// Next state when replacement text arrives
    pub fn receive_text(self) -> Result<CandidateState, TransitionError> {
        match self {
            Self::Editing { .. } => Ok(Self::PendingModeration),
            state => Err(TransitionError {
                state,
                action: "submit text for",
            }),
        }
    }
}

impl fmt::Display for CandidateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovered => f.write_str("discovered"),
            Self::PendingModeration => f.write_str("pending moderation"),
            Self::Editing { session } => write!(f, "being edited in session {session}"),
            Self::Approved => f.write_str("approved"),
            Self::Published => f.write_str("published"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}
