//! Moderation state machine for discovered candidates.
//!
//! Stored flags give the durable part of a candidate's state. `Editing` lives
//! only in the session map held here: one entry per operator session, the
//! latest edit request winning. Transitions are validated by
//! [`CandidateState`] before anything is written.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Local;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::adapters::{ActionButton, OperatorNotifier};
use crate::domain::content::validate_text;
use crate::domain::{Candidate, CandidateState, Content, Decision, SessionId, ValidationError};
use crate::store::{Store, StoreError};

use super::delivery::{DeliveryEngine, DeliveryError, Receipt};

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Post #{0} not found (already rejected or never existed)")]
    NotFound(i64),

    #[error("Post #{id} is already {state}")]
    Stale { id: i64, state: CandidateState },

    #[error("Post #{0} is not being edited")]
    NotEditing(i64),

    #[error("No edit in progress for session {0}")]
    NoEditSession(SessionId),

    #[error("Post #{0} is already being processed")]
    Busy(i64),

    #[error("Publication failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ModerationError {
    fn from_store(id: i64, e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Result of a successful decision or edit
#[derive(Debug, Clone)]
pub enum Outcome {
    Published { id: i64, receipt: Receipt },
    Rejected { id: i64 },
    Editing { id: i64, current_body: String },
    Updated { candidate: Candidate },
}

/// A rendered moderation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub candidate_id: i64,
    pub text: String,
}

impl Preview {
    pub fn render(candidate: &Candidate) -> Self {
        let found = candidate.found_at.with_timezone(&Local);
        let text = format!(
            "📰 POST PREVIEW #{}\n\n{}\n\n⏰ Found: {}",
            candidate.id,
            candidate.content().text,
            found.format("%H:%M %d.%m.%Y")
        );

        Self {
            candidate_id: candidate.id,
            text,
        }
    }

    pub fn actions(&self) -> Vec<ActionButton> {
        [
            ("✅ Publish", Decision::Approve),
            ("✏️ Edit", Decision::Edit),
            ("❌ Reject", Decision::Reject),
        ]
        .into_iter()
        .map(|(label, decision)| ActionButton {
            label: label.to_string(),
            callback_data: decision.callback_data(self.candidate_id),
        })
        .collect()
    }
}

/// Removes the in-flight marker when a decision finishes
struct InFlight<'a> {
    set: &'a Mutex<HashSet<i64>>,
    id: i64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ModerationMachine {
    store: Arc<dyn Store>,
    delivery: Arc<DeliveryEngine>,
    notifier: Arc<dyn OperatorNotifier>,
    editing: Mutex<HashMap<SessionId, i64>>,
    in_flight: Mutex<HashSet<i64>>,
}

impl ModerationMachine {
    pub fn new(
        store: Arc<dyn Store>,
        delivery: Arc<DeliveryEngine>,
        notifier: Arc<dyn OperatorNotifier>,
    ) -> Self {
        Self {
            store,
            delivery,
            notifier,
            editing: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Present a candidate to the operator with approve/edit/reject actions
    pub async fn submit(&self, candidate: &Candidate) -> anyhow::Result<()> {
        let preview = Preview::render(candidate);
        self.notifier.present(&preview.text, &preview.actions()).await?;
        info!(candidate_id = candidate.id, "Candidate sent for moderation");
        Ok(())
    }

    /// Current lifecycle state, overlaying any edit session on the stored flags
    pub async fn state(&self, id: i64) -> Result<CandidateState, ModerationError> {
        let candidate = self.load(id).await?;
        Ok(self.current_state(&candidate))
    }

    /// Session currently editing `id`, if any
    pub fn editing_session(&self, id: i64) -> Option<SessionId> {
        lock(&self.editing)
            .iter()
            .find(|(_, candidate)| **candidate == id)
            .map(|(session, _)| *session)
    }

    fn current_state(&self, candidate: &Candidate) -> CandidateState {
        let stored = candidate.stored_state();
        if stored != CandidateState::PendingModeration {
            return stored;
        }
        match self.editing_session(candidate.id) {
            Some(session) => CandidateState::Editing { session },
            None => stored,
        }
    }

    async fn load(&self, id: i64) -> Result<Candidate, ModerationError> {
        self.store
            .get_candidate(id)
            .await?
            .ok_or(ModerationError::NotFound(id))
    }

    fn clear_edits_for(&self, id: i64) {
        lock(&self.editing).retain(|_, candidate| *candidate != id);
    }

    fn begin(&self, id: i64) -> Result<InFlight<'_>, ModerationError> {
        if !lock(&self.in_flight).insert(id) {
            return Err(ModerationError::Busy(id));
        }
        Ok(InFlight {
            set: &self.in_flight,
            id,
        })
    }

    /// Apply an operator decision
    #[instrument(skip(self, session))]
    pub async fn decide(
        &self,
        id: i64,
        decision: Decision,
        session: SessionId,
    ) -> Result<Outcome, ModerationError> {
        let _guard = self.begin(id)?;

        let candidate = self.load(id).await?;
        let next = self
            .current_state(&candidate)
            .decide(decision, session)
            .map_err(|e| ModerationError::Stale { id, state: e.state })?;

        match next {
            CandidateState::Published => self.publish(&candidate).await,
            CandidateState::Rejected => {
                self.store
                    .delete_candidate(id)
                    .await
                    .map_err(|e| ModerationError::from_store(id, e))?;
                self.clear_edits_for(id);
                info!("Candidate rejected and deleted");
                Ok(Outcome::Rejected { id })
            }
            CandidateState::Editing { session } => {
                // One marker per session: a new request replaces the old one
                let mut editing = lock(&self.editing);
                editing.retain(|_, candidate| *candidate != id);
                editing.insert(session, id);
                drop(editing);
                info!(%session, "Edit started");
                Ok(Outcome::Editing {
                    id,
                    current_body: candidate.body,
                })
            }
            other => Err(ModerationError::Stale { id, state: other }),
        }
    }

    async fn publish(&self, candidate: &Candidate) -> Result<Outcome, ModerationError> {
        let id = candidate.id;
        let stored = candidate.content();
        let content = Content::new(stored.text, stored.image)?;

        // Failure leaves the candidate pending; the operator re-triggers
        let receipt = self.delivery.deliver(&content).await.map_err(|e| {
            warn!(candidate_id = id, error = %e, "Publication failed");
            e
        })?;

        if let Err(e) = self.store.mark_candidate_delivered(id).await {
            error!(
                candidate_id = id,
                message_id = receipt.message_id,
                error = %e,
                "Delivered but not marked published"
            );
            return Err(ModerationError::from_store(id, e));
        }

        self.clear_edits_for(id);
        info!(candidate_id = id, message_id = receipt.message_id, "Candidate published");
        Ok(Outcome::Published { id, receipt })
    }

    /// Text typed by an operator session; applies to the candidate it is editing
    pub async fn receive_text(&self, session: SessionId, text: &str) -> Result<Outcome, ModerationError> {
        let id = lock(&self.editing)
            .get(&session)
            .copied()
            .ok_or(ModerationError::NoEditSession(session))?;

        self.apply_edit(session, id, text).await
    }

    /// Replacement text addressed to a candidate directly
    pub async fn submit_edited_text(&self, id: i64, text: &str) -> Result<Outcome, ModerationError> {
        let session = self
            .editing_session(id)
            .ok_or(ModerationError::NotEditing(id))?;

        self.apply_edit(session, id, text).await
    }

    #[instrument(skip(self, text))]
    async fn apply_edit(&self, session: SessionId, id: i64, text: &str) -> Result<Outcome, ModerationError> {
        validate_text(text)?;
        let _guard = self.begin(id)?;

        let candidate = match self.load(id).await {
            Err(ModerationError::NotFound(id)) => {
                self.clear_edits_for(id);
                return Err(ModerationError::NotFound(id));
            }
            other => other?,
        };

        self.current_state(&candidate)
            .receive_text()
            .map_err(|e| ModerationError::Stale { id, state: e.state })?;

        self.store
            .update_candidate_body(id, text)
            .await
            .map_err(|e| ModerationError::from_store(id, e))?;

        {
            let mut editing = lock(&self.editing);
            if editing.get(&session) == Some(&id) {
                editing.remove(&session);
            }
        }

        let updated = self.load(id).await?;
        info!("Candidate text updated");

        if let Err(e) = self.submit(&updated).await {
            warn!(error = %e, "Failed to re-present edited candidate");
        }

        Ok(Outcome::Updated { candidate: updated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candidate(id: i64, body: &str) -> Candidate {
        Candidate {
            id,
            title: "Sputnik".into(),
            body: body.into(),
            category: "history".into(),
            source_url: None,
            image_url: None,
            is_approved: false,
            is_published: false,
            found_at: Utc.with_ymd_and_hms(2024, 10, 4, 19, 28, 0).unwrap(),
        }
    }

    #[test]
    fn test_preview_render() {
        let preview = Preview::render(&candidate(5, "The first satellite"));

        assert!(preview.text.starts_with("📰 POST PREVIEW #5\n\nThe first satellite\n\n⏰ Found: "));
        let callbacks: Vec<_> = preview.actions().into_iter().map(|a| a.callback_data).collect();
        assert_eq!(callbacks, vec!["approve_5", "edit_5", "reject_5"]);
    }

    #[test]
    fn test_preview_title_only() {
        let preview = Preview::render(&candidate(1, ""));
        assert!(preview.text.contains("\n\nSputnik\n\n"));
    }

    #[test]
    fn test_from_store_maps_not_found() {
        let err = ModerationError::from_store(3, StoreError::candidate_not_found(3));
        assert!(matches!(err, ModerationError::NotFound(3)));
    }
}
