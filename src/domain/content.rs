//! Deliverable content shared by scheduled posts and approved candidates.

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Maximum message length accepted by the broadcast destination
pub const MAX_TEXT_CHARS: usize = 4096;

/// Maximum caption length for an image message
pub const MAX_CAPTION_CHARS: usize = 1024;

/// Text plus an optional image reference (URL or local path)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub text: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Content {
    /// Create validated content. Blank image references are dropped.
    pub fn new(text: impl Into<String>, image: Option<String>) -> Result<Self, ValidationError> {
        let text = text.into();
        validate_text(&text)?;

        Ok(Self {
            text,
            image: image.filter(|i| !i.trim().is_empty()),
        })
    }

    /// Whether the text fits into an image caption
    pub fn fits_caption(&self) -> bool {
        self.text.chars().count() <= MAX_CAPTION_CHARS
    }
}

/// Reject empty or oversized message text
pub fn validate_text(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyText);
    }

    let len = text.chars().count();
    if len > MAX_TEXT_CHARS {
        return Err(ValidationError::TextTooLong {
            len,
            limit: MAX_TEXT_CHARS,
        });
    }

    Ok(())
}
