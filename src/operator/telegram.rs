//! Telegram long-polling as the operator event source.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::adapters::telegram::{TelegramClient, Update};
use crate::core::AgentContext;
use crate::domain::SessionId;

use super::{OperatorBridge, OperatorEvent};

/// Seconds a single getUpdates call waits for new events
pub const POLL_SECONDS: u64 = 25;

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Operator event extracted from an update, with the callback to acknowledge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub event: OperatorEvent,
    pub callback_query_id: Option<String>,
}

impl Inbound {
    pub fn from_update(update: &Update) -> Option<Self> {
        if let Some(query) = &update.callback_query {
            let chat = query.message.as_ref()?.chat.id;
            return Some(Self {
                event: OperatorEvent::Button {
                    session: SessionId(chat),
                    data: query.data.clone().unwrap_or_default(),
                },
                callback_query_id: Some(query.id.clone()),
            });
        }

        let message = update.message.as_ref()?;
        let text = message.text.as_ref()?;
        Some(Self {
            event: OperatorEvent::Text {
                session: SessionId(message.chat.id),
                text: text.clone(),
            },
            callback_query_id: None,
        })
    }
}

/// A chat seen in updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub id: i64,
    pub kind: String,
    pub name: String,
}

/// Distinct chats that appear in `updates`, by id
pub fn known_chats(updates: &[Update]) -> Vec<ChatSummary> {
    let mut chats = BTreeMap::new();

    let messages = updates.iter().flat_map(|u| {
        [
            u.message.as_ref(),
            u.channel_post.as_ref(),
            u.callback_query.as_ref().and_then(|q| q.message.as_ref()),
        ]
    });

    for message in messages.flatten() {
        let chat = &message.chat;
        let name = chat
            .title
            .clone()
            .or_else(|| chat.username.as_ref().map(|u| format!("@{}", u)))
            .unwrap_or_default();

        chats.entry(chat.id).or_insert_with(|| ChatSummary {
            id: chat.id,
            kind: chat.kind.clone(),
            name,
        });
    }

    chats.into_values().collect()
}

/// Feeds Telegram updates to the operator bridge and sends the replies
pub struct UpdatePoller {
    client: Arc<TelegramClient>,
    bridge: Arc<OperatorBridge>,
}

impl UpdatePoller {
    pub fn new(client: Arc<TelegramClient>, bridge: Arc<OperatorBridge>) -> Self {
        Self { client, bridge }
    }

    /// Poll until shutdown. An in-flight poll is abandoned on shutdown; an
    /// event already being handled finishes first.
    pub async fn run(&self, ctx: Arc<AgentContext>) {
        info!("Operator poller started");

        let mut offset = 0;
        let mut shutdown = ctx.shutdown();

        while ctx.is_running() {
            let polled = tokio::select! {
                r = self.client.get_updates(offset, POLL_SECONDS) => r,
                _ = shutdown.requested() => break,
            };

            let updates = match polled {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "Polling failed");
                    tokio::select! {
                        _ = tokio::time::sleep(RETRY_DELAY) => continue,
                        _ = shutdown.requested() => break,
                    }
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                self.dispatch(&update).await;
            }
        }

        info!("Operator poller stopped");
    }

    async fn dispatch(&self, update: &Update) {
        let Some(inbound) = Inbound::from_update(update) else {
            debug!(update_id = update.update_id, "Update without operator event");
            return;
        };

        let session = inbound.event.session();
        let Some(ack) = self.bridge.handle(inbound.event).await else {
            return;
        };

        if let Some(query_id) = &inbound.callback_query_id {
            if let Err(e) = self.client.answer_callback_query(query_id, &ack.notice).await {
                debug!(error = %e, "Failed to answer callback");
            }
        }

        if let Err(e) = self
            .client
            .send_message(&session.to_string(), &ack.message, &[])
            .await
        {
            warn!(%session, error = %e, "Failed to send acknowledgment");
        }
    }
}
