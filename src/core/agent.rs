//! The publishing agent.
//!
//! Wires the store, delivery engine, fingerprint index, moderation machine,
//! discovery coordinator and scheduler together, exposes the operator intents
//! as plain async calls, and runs the background loops.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::adapters::{Broadcaster, ImageFetcher, OperatorNotifier};
use crate::domain::{
    Candidate, CandidateState, Content, Decision, NewScheduledPost, ScheduledPost, SessionId,
    ValidationError,
};
use crate::sources::ContentSource;
use crate::store::{Store, StoreError};

use super::context::AgentContext;
use super::delivery::{DeliveryEngine, DeliveryError, Receipt};
use super::discovery::{DiscoveryCoordinator, DiscoverySettings};
use super::fingerprint::{DedupSettings, FingerprintIndex};
use super::limits::Limits;
use super::moderation::{ModerationError, ModerationMachine, Outcome};
use super::scheduler::{SchedulerLoop, TickReport};

/// Failure of an operator intent
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Moderation(#[from] ModerationError),
}

/// Tunables for the agent
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub scheduler_interval: Duration,
    pub discovery: DiscoverySettings,
    pub dedup: DedupSettings,
    pub limits: Limits,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            scheduler_interval: Duration::from_secs(30),
            discovery: DiscoverySettings::default(),
            dedup: DedupSettings::default(),
            limits: Limits::default(),
        }
    }
}

/// External collaborators the agent is built from
pub struct AgentParts {
    pub store: Arc<dyn Store>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub images: Arc<dyn ImageFetcher>,
    pub notifier: Arc<dyn OperatorNotifier>,
    pub sources: Vec<Arc<dyn ContentSource>>,
}

pub struct Agent {
    store: Arc<dyn Store>,
    delivery: Arc<DeliveryEngine>,
    index: Arc<FingerprintIndex>,
    moderation: Arc<ModerationMachine>,
    discovery: Arc<DiscoveryCoordinator>,
    scheduler: Arc<SchedulerLoop>,
    ctx: Arc<AgentContext>,
}

impl Agent {
    pub fn new(parts: AgentParts, settings: AgentSettings) -> Self {
        let AgentParts {
            store,
            broadcaster,
            images,
            notifier,
            sources,
        } = parts;

        let delivery = Arc::new(DeliveryEngine::new(broadcaster, images, settings.limits.clone()));
        let index = Arc::new(FingerprintIndex::new(store.clone(), settings.dedup.clone()));
        let moderation = Arc::new(ModerationMachine::new(
            store.clone(),
            delivery.clone(),
            notifier.clone(),
        ));
        let discovery = Arc::new(DiscoveryCoordinator::new(
            sources,
            index.clone(),
            store.clone(),
            moderation.clone(),
            settings.discovery.clone(),
            settings.limits.clone(),
        ));
        let scheduler = Arc::new(SchedulerLoop::new(
            store.clone(),
            delivery.clone(),
            notifier,
            settings.scheduler_interval,
        ));

        Self {
            store,
            delivery,
            index,
            moderation,
            discovery,
            scheduler,
            ctx: Arc::new(AgentContext::new()),
        }
    }

    pub fn context(&self) -> Arc<AgentContext> {
        Arc::clone(&self.ctx)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Load fingerprints of every stored candidate. Call once at startup.
    pub async fn seed_index(&self) -> Result<usize, StoreError> {
        self.index.seed_from_store().await
    }

    /// Create a post for delivery at `target_at`
    #[instrument(skip(self, text, image))]
    pub async fn schedule_create(
        &self,
        text: &str,
        image: Option<String>,
        target_at: DateTime<Utc>,
    ) -> Result<ScheduledPost, AgentError> {
        let post = NewScheduledPost::new(text, image, target_at, Utc::now())?;
        let id = self.store.create_scheduled_post(&post).await?;
        info!(post_id = id, target = %target_at.to_rfc3339(), "Post scheduled");

        self.store
            .get_scheduled_post(id)
            .await?
            .ok_or_else(|| StoreError::post_not_found(id).into())
    }

    /// Deliver right away and keep an audit record
    #[instrument(skip(self, text, image))]
    pub async fn publish_now(&self, text: &str, image: Option<String>) -> Result<Receipt, AgentError> {
        let content = Content::new(text, image)?;
        let receipt = self.delivery.deliver(&content).await?;

        if let Err(e) = self.store.record_published_post(&content, Utc::now()).await {
            warn!(error = %e, "Published but audit record failed");
        }

        info!(message_id = receipt.message_id, "Published immediately");
        Ok(receipt)
    }

    pub async fn list_pending(&self) -> Result<Vec<ScheduledPost>, AgentError> {
        Ok(self.store.list_pending().await?)
    }

    pub async fn list_candidates(&self, limit: usize) -> Result<Vec<Candidate>, AgentError> {
        Ok(self.store.list_recent_candidates(limit).await?)
    }

    pub async fn candidate_state(&self, id: i64) -> Result<CandidateState, ModerationError> {
        self.moderation.state(id).await
    }

    pub async fn decide(
        &self,
        id: i64,
        decision: Decision,
        session: SessionId,
    ) -> Result<Outcome, ModerationError> {
        self.moderation.decide(id, decision, session).await
    }

    pub async fn submit_edited_text(&self, id: i64, text: &str) -> Result<Outcome, ModerationError> {
        self.moderation.submit_edited_text(id, text).await
    }

    /// Freeform text from an operator session
    pub async fn receive_text(&self, session: SessionId, text: &str) -> Result<Outcome, ModerationError> {
        self.moderation.receive_text(session, text).await
    }

    /// Run discovery once and present what was found
    pub async fn discover(&self, max: usize) -> Vec<Candidate> {
        self.discovery.discover(max).await
    }

    /// Run one scheduler iteration
    pub async fn tick_scheduler(&self, now: DateTime<Utc>) -> Result<TickReport, StoreError> {
        self.scheduler.tick(now).await
    }

    /// Run the scheduler and discovery loops until Ctrl+C or [`AgentContext::stop`]
    pub async fn run(&self) -> Result<()> {
        match self.seed_index().await {
            Ok(count) => info!(fingerprints = count, "Fingerprint index ready"),
            Err(e) => warn!(error = %e, "Could not seed fingerprint index; relying on store checks"),
        }

        let scheduler = {
            let scheduler = self.scheduler.clone();
            let ctx = self.context();
            tokio::spawn(async move { scheduler.run(ctx).await })
        };

        let discovery = {
            let discovery = self.discovery.clone();
            let ctx = self.context();
            tokio::spawn(async move { discovery.run(ctx).await })
        };

        let mut shutdown = self.ctx.shutdown();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Interrupt received, stopping"),
            _ = shutdown.requested() => info!("Stop requested"),
        }
        self.ctx.stop();

        // Loops finish their current iteration first
        for (name, handle) in [("scheduler", scheduler), ("discovery", discovery)] {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "Loop task ended abnormally");
            }
        }

        info!("Agent stopped");
        Ok(())
    }
}
