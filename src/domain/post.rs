//! Operator-authored posts with a fixed delivery time.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::content::{validate_text, Content};
use super::ValidationError;

/// Publication status of a scheduled post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    /// Waiting for its target time
    Pending,

    /// Delivered to the channel (terminal)
    Published,
}

impl PostStatus {
    /// Stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Published => "published",
        }
    }

    /// Parse the stored representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "published" => Some(Self::Published),
            _ => None,
        }
    }
}

/// A persisted scheduled post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub id: i64,
    pub text: String,
    pub image: Option<String>,
    pub target_at: DateTime<Utc>,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ScheduledPost {
    /// Due means "target time has been reached", not "exactly now"
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == PostStatus::Pending && self.target_at <= now
    }

    /// Content to hand to the delivery engine
    pub fn content(&self) -> Content {
        Content {
            text: self.text.clone(),
            image: self.image.clone(),
        }
    }
}

/// A validated request to schedule a post.
///
/// Can only be built through [`NewScheduledPost::new`], so anything reaching
/// the store already has non-empty text and a future target time.
#[derive(Debug, Clone)]
pub struct NewScheduledPost {
    content: Content,
    target_at: DateTime<Utc>,
}

impl NewScheduledPost {
    pub fn new(
        text: impl Into<String>,
        image: Option<String>,
        target_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let text = text.into();
        validate_text(&text)?;

        if target_at <= now {
            return Err(ValidationError::NotInFuture {
                target: target_at.to_rfc3339(),
                now: now.to_rfc3339(),
            });
        }

        Ok(Self {
            content: Content::new(text, image)?,
            target_at,
        })
    }

    pub fn text(&self) -> &str {
        &self.content.text
    }

    pub fn image(&self) -> Option<&str> {
        self.content.image.as_deref()
    }

    pub fn target_at(&self) -> DateTime<Utc> {
        self.target_at
    }
}

/// Parse an operator-entered delivery time.
///
/// Accepts RFC 3339 (`2026-10-19T18:00:00+03:00`) or a local wall-clock time
/// (`2026-10-19 18:00`).
pub fn parse_target_time(input: &str) -> Result<DateTime<Utc>, ValidationError> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Local
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| ValidationError::MalformedTime(input.to_string()));
        }
    }

    Err(ValidationError::MalformedTime(input.to_string()))
}
