//! Discovery coordinator.
//!
//! Asks the registered sources for drafts, keeps only the ones the
//! fingerprint index has not seen, stores them and hands them to moderation.
//! Sources are visited round-robin, starting one further along on every
//! invocation, and a fixed attempt budget bounds each run.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::domain::{Candidate, CandidateDraft};
use crate::sources::ContentSource;
use crate::store::Store;

use super::context::AgentContext;
use super::fingerprint::FingerprintIndex;
use super::limits::Limits;
use super::moderation::ModerationMachine;

/// Discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Seconds between periodic runs (default: 43200, twice a day)
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// Candidates accepted per run (default: 3)
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Passes over the sources per run (default: 5)
    #[serde(default = "default_attempt_budget")]
    pub attempt_budget: usize,

    /// Pause between consecutive previews in milliseconds (default: 2000)
    #[serde(default = "default_preview_pacing_ms")]
    pub preview_pacing_ms: u64,

    /// Enable the template source (default: true)
    #[serde(default = "default_templates")]
    pub templates: bool,

    /// RSS/Atom feed URLs
    #[serde(default)]
    pub feeds: Vec<String>,
}

fn default_interval_seconds() -> u64 {
    43_200
}
fn default_max_candidates() -> usize {
    3
}
fn default_attempt_budget() -> usize {
    5
}
fn default_preview_pacing_ms() -> u64 {
    2_000
}
fn default_templates() -> bool {
    true
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            max_candidates: default_max_candidates(),
            attempt_budget: default_attempt_budget(),
            preview_pacing_ms: default_preview_pacing_ms(),
            templates: default_templates(),
            feeds: Vec::new(),
        }
    }
}

impl DiscoverySettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }

    pub fn preview_pacing(&self) -> Duration {
        Duration::from_millis(self.preview_pacing_ms)
    }
}

pub struct DiscoveryCoordinator {
    sources: Vec<Arc<dyn ContentSource>>,
    index: Arc<FingerprintIndex>,
    store: Arc<dyn Store>,
    moderation: Arc<ModerationMachine>,
    settings: DiscoverySettings,
    limits: Limits,
    cursor: AtomicUsize,
}

impl DiscoveryCoordinator {
    pub fn new(
        sources: Vec<Arc<dyn ContentSource>>,
        index: Arc<FingerprintIndex>,
        store: Arc<dyn Store>,
        moderation: Arc<ModerationMachine>,
        settings: DiscoverySettings,
        limits: Limits,
    ) -> Self {
        Self {
            sources,
            index,
            store,
            moderation,
            settings,
            limits,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// Sources in visiting order for this invocation
    fn rotation(&self) -> Vec<Arc<dyn ContentSource>> {
        let n = self.sources.len();
        if n == 0 {
            return Vec::new();
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % n;
        self.sources[start..]
            .iter()
            .chain(&self.sources[..start])
            .cloned()
            .collect()
    }

    /// Find, store and present up to `max` new candidates
    pub async fn discover(&self, max: usize) -> Vec<Candidate> {
        let accepted = self.collect(max).await;

        for (i, candidate) in accepted.iter().enumerate() {
            if i > 0 {
                sleep(self.settings.preview_pacing()).await;
            }
            if let Err(e) = self.moderation.submit(candidate).await {
                warn!(candidate_id = candidate.id, error = %e, "Failed to present candidate");
            }
        }

        accepted
    }

    /// Find and store up to `max` new candidates without presenting them
    #[instrument(skip(self))]
    pub async fn collect(&self, max: usize) -> Vec<Candidate> {
        let mut accepted = Vec::new();
        let order = self.rotation();
        if order.is_empty() || max == 0 {
            return accepted;
        }

        for attempt in 1..=self.settings.attempt_budget.max(1) {
            let before = accepted.len();

            for source in &order {
                if accepted.len() >= max {
                    break;
                }

                let wanted = max - accepted.len();
                let drafts = match timeout(self.limits.source_timeout(), source.produce(wanted)).await {
                    Ok(Ok(drafts)) => drafts,
                    Ok(Err(e)) => {
                        warn!(source = source.name(), error = %e, "Source failed");
                        continue;
                    }
                    Err(_) => {
                        warn!(source = source.name(), "Source timed out");
                        continue;
                    }
                };

                debug!(source = source.name(), drafts = drafts.len(), "Source produced drafts");

                for draft in drafts {
                    if accepted.len() >= max {
                        break;
                    }
                    if let Some(candidate) = self.accept(draft).await {
                        accepted.push(candidate);
                    }
                }
            }

            debug!(attempt, new = accepted.len() - before, "Discovery attempt finished");
            if accepted.len() >= max {
                break;
            }
        }

        info!(found = accepted.len(), "Discovery finished");
        accepted
    }

    /// Persist a draft if it is valid and new
    async fn accept(&self, draft: CandidateDraft) -> Option<Candidate> {
        if let Err(e) = draft.validate() {
            debug!(error = %e, "Draft skipped");
            return None;
        }

        match self.index.is_new(&draft).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(title = %draft.title, "Duplicate skipped");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Duplicate check failed, draft skipped");
                return None;
            }
        }

        let found_at = Utc::now();
        let id = match self.store.create_candidate(&draft, found_at).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Failed to store candidate");
                return None;
            }
        };
        self.index.remember(&draft);

        info!(candidate_id = id, title = %draft.title, "New candidate");
        Some(Candidate {
            id,
            title: draft.title,
            body: draft.body,
            category: draft.category,
            source_url: draft.source_url,
            image_url: draft.image_url,
            is_approved: false,
            is_published: false,
            found_at,
        })
    }

    /// Periodic discovery until shutdown
    pub async fn run(&self, ctx: Arc<AgentContext>) {
        info!(interval = ?self.settings.interval(), "Discovery loop started");

        let mut ticker = ctx.ticker(self.settings.interval());
        while ticker.tick().await {
            let found = self.discover(self.settings.max_candidates).await;
            info!(found = found.len(), "Periodic discovery done");
        }

        info!("Discovery loop stopped");
    }
}
