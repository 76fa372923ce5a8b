//! Adapter interfaces for external systems.
//!
//! The pipeline only sees these capabilities; the Telegram Bot API client
//! and the image fetcher are the production implementations.

pub mod images;
pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

// Re-export the concrete adapters
pub use images::HttpImageFetcher;
pub use telegram::{ChannelBroadcaster, OperatorChat, TelegramClient, TelegramConfig};

/// Image bytes ready to upload
#[derive(Debug, Clone)]
pub struct ImageData {
    pub bytes: Vec<u8>,

    /// File name sent with the upload
    pub file_name: String,

    /// MIME type, if known
    pub mime: Option<String>,
}

/// An action button attached to an operator message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionButton {
    pub label: String,
    pub callback_data: String,
}

/// The broadcast destination (a channel)
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Human-readable destination name
    fn name(&self) -> &str;

    /// Send a text message, returning the message id
    async fn send_text(&self, text: &str) -> Result<i64>;

    /// Send an image with a caption, returning the message id
    async fn send_image(&self, image: ImageData, caption: &str) -> Result<i64>;
}

/// Fetches image bytes for an image reference (URL or path). Single attempt.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<ImageData>;
}

/// The operator's conversation
#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    /// Send a message with action buttons (one row)
    async fn present(&self, text: &str, actions: &[ActionButton]) -> Result<()>;

    /// Send a plain message
    async fn notify(&self, text: &str) -> Result<()>;
}
