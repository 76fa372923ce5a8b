//! Scheduled delivery loop.
//!
//! Every tick publishes all due pending posts in target-time order. A post
//! that fails to deliver stays pending and is retried on the next tick.
//! The operator is told about each post that went out.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use crate::adapters::OperatorNotifier;
use crate::domain::ScheduledPost;
use crate::store::{Store, StoreError};

use super::context::AgentContext;
use super::delivery::DeliveryEngine;

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Posts delivered and marked published
    pub published: Vec<i64>,

    /// Posts whose delivery failed (still pending)
    pub failed: Vec<i64>,

    /// Posts delivered but not marked; they will be delivered again
    pub unmarked: Vec<i64>,
}

impl TickReport {
    pub fn due(&self) -> usize {
        self.published.len() + self.failed.len() + self.unmarked.len()
    }
}

pub struct SchedulerLoop {
    store: Arc<dyn Store>,
    delivery: Arc<DeliveryEngine>,
    notifier: Arc<dyn OperatorNotifier>,
    interval: Duration,
}

impl SchedulerLoop {
    pub fn new(
        store: Arc<dyn Store>,
        delivery: Arc<DeliveryEngine>,
        notifier: Arc<dyn OperatorNotifier>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            delivery,
            notifier,
            interval,
        }
    }

    /// Deliver every post due at `now`
    #[instrument(skip(self), fields(now = %now.to_rfc3339()))]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, StoreError> {
        let due = self.store.list_due_pending(now).await?;
        let mut report = TickReport::default();

        for post in due {
            match self.delivery.deliver(&post.content()).await {
                Ok(receipt) => match self.store.mark_published(post.id).await {
                    Ok(()) => {
                        info!(post_id = post.id, message_id = receipt.message_id, "Scheduled post published");
                        self.announce(&post, receipt.image_skipped.as_deref()).await;
                        report.published.push(post.id);
                    }
                    Err(e) => {
                        error!(post_id = post.id, error = %e, "Delivered but not marked published");
                        report.unmarked.push(post.id);
                    }
                },
                Err(e) => {
                    warn!(post_id = post.id, error = %e, "Delivery failed, will retry");
                    report.failed.push(post.id);
                }
            }
        }

        Ok(report)
    }

    async fn announce(&self, post: &ScheduledPost, image_skipped: Option<&str>) {
        let mut text = format!("🕐 Scheduled post #{} published to the channel 📢", post.id);
        if let Some(reason) = image_skipped {
            text.push_str(&format!("\n(image skipped: {})", reason));
        }
        if let Err(e) = self.notifier.notify(&text).await {
            warn!(post_id = post.id, error = %e, "Failed to notify operator");
        }
    }

    /// Tick on the configured interval until shutdown
    pub async fn run(&self, ctx: Arc<AgentContext>) {
        info!(interval = ?self.interval, "Scheduler loop started");

        let mut ticker = ctx.ticker(self.interval);
        while ticker.tick().await {
            match self.tick(Utc::now()).await {
                Ok(report) if report.due() > 0 => {
                    info!(
                        published = report.published.len(),
                        failed = report.failed.len(),
                        "Scheduler tick"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, retryable = e.is_retryable(), "Scheduler tick failed"),
            }
        }

        info!("Scheduler loop stopped");
    }
}
