//! Telegram Bot API adapter.
//!
//! One client serves three roles: broadcasting to the channel, talking to the
//! operator (previews with inline buttons), and long-polling operator updates.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use super::{ActionButton, Broadcaster, ImageData, OperatorNotifier};

/// Telegram Bot API client
pub struct TelegramClient {
    /// Bot token
    bot_token: String,
    /// HTTP client
    client: reqwest::Client,
}

/// Response from Telegram API
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Message result from sendMessage/sendPhoto
#[derive(Debug, Deserialize)]
struct MessageResult {
    message_id: i64,
}

/// Configuration for Telegram client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Channel to publish to (`@name` or numeric id)
    pub channel_id: String,
    /// Operator chat for moderation
    pub admin_chat_id: Option<i64>,
}

/// Inbound update from getUpdates
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
    pub channel_post: Option<IncomingMessage>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub data: Option<String>,
    pub message: Option<IncomingMessage>,
}

impl TelegramClient {
    /// Create a new Telegram client with a request timeout
    pub fn new(bot_token: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { bot_token, client })
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let result: TelegramResponse<T> = response
            .json()
            .await
            .context("Failed to parse Telegram response")?;

        if !result.ok {
            anyhow::bail!(
                "Telegram API error: {}",
                result.description.unwrap_or_default()
            );
        }

        result.result.context("Telegram response without result")
    }

    /// Send a text message, optionally with inline buttons
    pub async fn send_message(&self, chat_id: &str, text: &str, actions: &[ActionButton]) -> Result<i64> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        if !actions.is_empty() {
            let row: Vec<_> = actions
                .iter()
                .map(|a| serde_json::json!({ "text": a.label, "callback_data": a.callback_data }))
                .collect();
            body["reply_markup"] = serde_json::json!({ "inline_keyboard": [row] });
        }

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .context("Failed to send Telegram message")?;

        let result: MessageResult = Self::parse(response).await?;
        Ok(result.message_id)
    }

    /// Upload a photo with a caption
    pub async fn send_photo(&self, chat_id: &str, image: ImageData, caption: &str) -> Result<i64> {
        let mut file_part = Part::bytes(image.bytes).file_name(image.file_name);
        if let Some(mime) = image.mime.as_deref() {
            file_part = file_part.mime_str(mime)?;
        }

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", file_part);

        let response = self
            .client
            .post(self.api_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .context("Failed to send Telegram photo")?;

        let result: MessageResult = Self::parse(response).await?;
        Ok(result.message_id)
    }

    /// Acknowledge a button press (shows a short notice to the operator)
    pub async fn answer_callback_query(&self, query_id: &str, text: &str) -> Result<()> {
        let response = self
            .client
            .post(self.api_url("answerCallbackQuery"))
            .json(&serde_json::json!({
                "callback_query_id": query_id,
                "text": text,
            }))
            .send()
            .await
            .context("Failed to answer callback query")?;

        let _: bool = Self::parse(response).await?;
        Ok(())
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64, poll_seconds: u64) -> Result<Vec<Update>> {
        let response = self
            .client
            .post(self.api_url("getUpdates"))
            // The long poll must outlive the client-wide timeout
            .timeout(Duration::from_secs(poll_seconds + 10))
            .json(&serde_json::json!({
                "offset": offset,
                "timeout": poll_seconds,
                "allowed_updates": ["message", "channel_post", "callback_query"],
            }))
            .send()
            .await
            .context("Failed to fetch Telegram updates")?;

        Self::parse(response).await
    }
}

/// Publishes to the configured channel
pub struct ChannelBroadcaster {
    client: std::sync::Arc<TelegramClient>,
    channel_id: String,
}

impl ChannelBroadcaster {
    pub fn new(client: std::sync::Arc<TelegramClient>, channel_id: String) -> Self {
        Self { client, channel_id }
    }
}

#[async_trait]
impl Broadcaster for ChannelBroadcaster {
    fn name(&self) -> &str {
        &self.channel_id
    }

    async fn send_text(&self, text: &str) -> Result<i64> {
        self.client.send_message(&self.channel_id, text, &[]).await
    }

    async fn send_image(&self, image: ImageData, caption: &str) -> Result<i64> {
        self.client.send_photo(&self.channel_id, image, caption).await
    }
}

/// The operator's private chat with the bot
pub struct OperatorChat {
    client: std::sync::Arc<TelegramClient>,
    chat_id: i64,
}

impl OperatorChat {
    pub fn new(client: std::sync::Arc<TelegramClient>, chat_id: i64) -> Self {
        Self { client, chat_id }
    }
}

#[async_trait]
impl OperatorNotifier for OperatorChat {
    async fn present(&self, text: &str, actions: &[ActionButton]) -> Result<()> {
        self.client
            .send_message(&self.chat_id.to_string(), text, actions)
            .await?;
        Ok(())
    }

    async fn notify(&self, text: &str) -> Result<()> {
        self.client
            .send_message(&self.chat_id.to_string(), text, &[])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url() {
        let client = TelegramClient::new("TOKEN".to_string(), Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.api_url("sendMessage"),
            "https://api.telegram.org/botTOKEN/sendMessage"
        );
    }

    #[test]
    fn test_update_deserialization() {
        let json = r#"{
            "update_id": 10,
            "callback_query": {
                "id": "abc",
                "data": "approve_5",
                "message": {"message_id": 7, "chat": {"id": 42, "type": "private"}, "text": "preview"}
            }
        }"#;

        let update: Update = serde_json::from_str(json).unwrap();
        let query = update.callback_query.unwrap();
        assert_eq!(query.data.as_deref(), Some("approve_5"));
        assert_eq!(query.message.unwrap().chat.id, 42);
        assert!(update.message.is_none());
    }

    #[test]
    fn test_error_response() {
        let json = r#"{"ok": false, "description": "Bad Request: chat not found"}"#;
        let response: TelegramResponse<MessageResult> = serde_json::from_str(json).unwrap();
        assert!(!response.ok);
        assert_eq!(response.description.as_deref(), Some("Bad Request: chat not found"));
    }
}
