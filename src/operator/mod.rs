//! Operator interaction.
//!
//! Turns inbound operator events (button presses, freeform text) into agent
//! intents and every result into an explicit acknowledgment. Events from any
//! chat other than the admin chat are ignored.

pub mod telegram;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::{Agent, ModerationError, Outcome};
use crate::domain::{Decision, SessionId};

pub use telegram::UpdatePoller;

/// Something the operator did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorEvent {
    /// An inline button press with its callback data
    Button { session: SessionId, data: String },

    /// A freeform message
    Text { session: SessionId, text: String },
}

impl OperatorEvent {
    pub fn session(&self) -> SessionId {
        match self {
            Self::Button { session, .. } | Self::Text { session, .. } => *session,
        }
    }
}

/// Reply to an operator event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// Short popup shown on the pressed button
    pub notice: String,

    /// Message sent to the operator's chat
    pub message: String,
}

impl Ack {
    fn new(notice: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            notice: notice.into(),
            message: message.into(),
        }
    }
}

const HELP: &str = "🤖 Moderation bot\n\n\
New posts arrive here as previews with three buttons:\n\
✅ Publish sends the post to the channel\n\
✏️ Edit asks you for a corrected text\n\
❌ Reject deletes the post";

/// Acknowledgment for a moderation result
pub fn acknowledge(id: i64, result: &Result<Outcome, ModerationError>) -> Ack {
    match result {
        Ok(Outcome::Published { id, receipt }) => {
            let mut message = format!("✅ Post #{} published to the channel 📢", id);
            if let Some(reason) = &receipt.image_skipped {
                message.push_str(&format!("\n(image skipped: {})", reason));
            }
            Ack::new("Published", message)
        }
        Ok(Outcome::Rejected { id }) => Ack::new(
            "Rejected",
            format!("❌ Post #{} rejected and deleted", id),
        ),
        Ok(Outcome::Editing { id, current_body }) => Ack::new(
            "Editing",
            format!(
                "✏️ EDITING POST #{}\n\nCurrent text:\n{}\n\n📝 Send the corrected text as your next message:",
                id, current_body
            ),
        ),
        Ok(Outcome::Updated { candidate }) => Ack::new(
            "Updated",
            format!("✅ Text of post #{} updated. A new preview follows.", candidate.id),
        ),
        Err(ModerationError::Delivery(e)) => Ack::new(
            "Publication failed",
            format!(
                "❌ Publication of post #{} failed: {}\nThe post is still pending; press Publish again to retry.",
                id, e
            ),
        ),
        Err(e @ (ModerationError::NotFound(_) | ModerationError::Stale { .. })) => {
            Ack::new("Nothing to do", format!("⚠️ {}", e))
        }
        Err(e) => Ack::new("Error", format!("❌ {}", e)),
    }
}

/// Routes operator events to the agent
pub struct OperatorBridge {
    agent: Arc<Agent>,
    admin: SessionId,
}

impl OperatorBridge {
    pub fn new(agent: Arc<Agent>, admin: SessionId) -> Self {
        Self { agent, admin }
    }

    pub fn is_authorized(&self, session: SessionId) -> bool {
        session == self.admin
    }

    /// Handle one event. `None` means the event is ignored without a reply.
    pub async fn handle(&self, event: OperatorEvent) -> Option<Ack> {
        let session = event.session();
        if !self.is_authorized(session) {
            warn!(%session, "Ignoring event from unauthorized chat");
            return None;
        }

        match event {
            OperatorEvent::Button { data, .. } => {
                let Some((decision, id)) = Decision::parse_callback(&data) else {
                    debug!(data = %data, "Unknown callback");
                    return Some(Ack::new("Unknown action", format!("⚠️ Unknown action: {}", data)));
                };

                let result = self.agent.decide(id, decision, session).await;
                Some(acknowledge(id, &result))
            }
            OperatorEvent::Text { text, .. } => {
                if text.trim_start().starts_with('/') {
                    return Some(Ack::new("Help", HELP));
                }

                match self.agent.receive_text(session, &text).await {
                    Err(ModerationError::NoEditSession(_)) => Some(Ack::new(
                        "Nothing to edit",
                        "ℹ️ Nothing is being edited. Use the buttons under a preview to publish, edit or reject it.",
                    )),
                    result => {
                        let id = match &result {
                            Ok(Outcome::Updated { candidate }) => candidate.id,
                            _ => 0,
                        };
                        Some(acknowledge(id, &result))
                    }
                }
            }
        }
    }
}
