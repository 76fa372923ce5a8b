//! Delivery of content to the broadcast destination.
//!
//! An image is an enhancement: it gets one bounded fetch attempt and any
//! failure there degrades the message to text-only. Whether a delivery
//! succeeded depends only on the final send.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::adapters::{Broadcaster, ImageData, ImageFetcher};
use crate::domain::Content;

use super::limits::Limits;

/// The final send failed
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Send to {destination} failed: {reason}")]
    Send { destination: String, reason: String },

    #[error("Send to {destination} timed out after {elapsed:?}")]
    Timeout { destination: String, elapsed: Duration },
}

/// How a message ended up being sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    Text,
    ImageWithCaption,
}

/// Confirmation of a successful delivery
#[derive(Debug, Clone)]
pub struct Receipt {
    pub message_id: i64,
    pub mode: DeliveryMode,

    /// Why an attached image was left out, if it was
    pub image_skipped: Option<String>,
}

pub struct DeliveryEngine {
    broadcaster: Arc<dyn Broadcaster>,
    images: Arc<dyn ImageFetcher>,
    limits: Limits,
}

impl DeliveryEngine {
    pub fn new(broadcaster: Arc<dyn Broadcaster>, images: Arc<dyn ImageFetcher>, limits: Limits) -> Self {
        Self {
            broadcaster,
            images,
            limits,
        }
    }

    pub fn destination(&self) -> &str {
        self.broadcaster.name()
    }

    /// Send content, with its image when one can be fetched in time
    #[instrument(skip_all, fields(destination = %self.broadcaster.name(), has_image = content.image.is_some()))]
    pub async fn deliver(&self, content: &Content) -> Result<Receipt, DeliveryError> {
        let skipped = match content.image.as_deref() {
            None => None,
            Some(_) if !content.fits_caption() => {
                Some("text exceeds the caption limit".to_string())
            }
            Some(reference) => match self.fetch_image(reference).await {
                Ok(image) => match self.send_image(image, &content.text).await {
                    Ok(receipt) => return Ok(receipt),
                    // A timed-out upload may still have landed; a text retry could duplicate it
                    Err(e @ DeliveryError::Timeout { .. }) => return Err(e),
                    Err(e) => Some(e.to_string()),
                },
                Err(reason) => Some(reason),
            },
        };

        if let Some(reason) = &skipped {
            warn!(reason = %reason, "Image skipped, sending text only");
        }

        let message_id = self
            .bounded(self.broadcaster.send_text(&content.text))
            .await?;

        debug!(message_id, "Text delivered");
        Ok(Receipt {
            message_id,
            mode: DeliveryMode::Text,
            image_skipped: skipped,
        })
    }

    async fn fetch_image(&self, reference: &str) -> Result<ImageData, String> {
        let limit = self.limits.image_timeout();
        match timeout(limit, self.images.fetch(reference)).await {
            Ok(Ok(image)) => Ok(image),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(_) => Err(format!("image fetch timed out after {:?}", limit)),
        }
    }

    async fn send_image(&self, image: ImageData, caption: &str) -> Result<Receipt, DeliveryError> {
        let message_id = self
            .bounded(self.broadcaster.send_image(image, caption))
            .await?;

        debug!(message_id, "Image delivered");
        Ok(Receipt {
            message_id,
            mode: DeliveryMode::ImageWithCaption,
            image_skipped: None,
        })
    }

    /// Run a send under the send timeout
    async fn bounded<F>(&self, send: F) -> Result<i64, DeliveryError>
    where
        F: std::future::Future<Output = anyhow::Result<i64>>,
    {
        let limit = self.limits.send_timeout();
        match timeout(limit, send).await {
            Ok(Ok(id)) => Ok(id),
            Ok(Err(e)) => Err(DeliveryError::Send {
                destination: self.destination().to_string(),
                reason: format!("{:#}", e),
            }),
            Err(_) => Err(DeliveryError::Timeout {
                destination: self.destination().to_string(),
                elapsed: limit,
            }),
        }
    }
}
