//! Near-duplicate detection for discovered content.
//!
//! A fingerprint is a short SHA-256 digest of the normalized title plus a
//! bounded prefix of the body. Membership in the in-memory set answers the
//! common case in O(1); on a miss the store is asked whether a candidate with
//! the same title, or a body containing this draft's opening text, already
//! exists. The set is a cache and can be rebuilt from the store at any time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::{title_key, CandidateDraft};
use crate::store::{CandidateText, Store, StoreError};

/// Dedup thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupSettings {
    /// Body characters hashed into the fingerprint (default: 200)
    #[serde(default = "default_body_prefix_chars")]
    pub body_prefix_chars: usize,

    /// Body characters used for the store substring check (default: 120)
    #[serde(default = "default_similarity_prefix_chars")]
    pub similarity_prefix_chars: usize,

    /// Treat a stored candidate with the same normalized title as a
    /// duplicate, whatever its body (default: true)
    #[serde(default = "default_match_titles")]
    pub match_titles: bool,
}

fn default_body_prefix_chars() -> usize {
    200
}
fn default_similarity_prefix_chars() -> usize {
    120
}
fn default_match_titles() -> bool {
    true
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            body_prefix_chars: default_body_prefix_chars(),
            similarity_prefix_chars: default_similarity_prefix_chars(),
            match_titles: default_match_titles(),
        }
    }
}

/// First `chars` characters of the trimmed body
pub fn body_prefix(body: &str, chars: usize) -> String {
    body.trim().chars().take(chars).collect()
}

/// Fingerprint of a title/body pair (first 16 hex chars of SHA-256).
///
/// Whitespace in the body prefix is collapsed so reflowed text hashes the same.
pub fn fingerprint(title: &str, body: &str, prefix_chars: usize) -> String {
    let prefix = body_prefix(body, prefix_chars)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut hasher = Sha256::new();
    hasher.update(title_key(title).as_bytes());
    hasher.update(b"\n");
    hasher.update(prefix.as_bytes());
    let result = hasher.finalize();

    hex::encode(&result[..8])
}

pub struct FingerprintIndex {
    seen: Mutex<HashSet<String>>,
    store: Arc<dyn Store>,
    settings: DedupSettings,
}

impl FingerprintIndex {
    pub fn new(store: Arc<dyn Store>, settings: DedupSettings) -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            store,
            settings,
        }
    }

    fn fingerprint_of(&self, title: &str, body: &str) -> String {
        fingerprint(title, body, self.settings.body_prefix_chars)
    }

    fn with_seen<T>(&self, f: impl FnOnce(&mut HashSet<String>) -> T) -> T {
        let mut seen = self
            .seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut seen)
    }

    /// Load fingerprints for already stored candidates
    pub fn seed<I>(&self, texts: I) -> usize
    where
        I: IntoIterator<Item = CandidateText>,
    {
        let fingerprints: Vec<String> = texts
            .into_iter()
            .map(|t| self.fingerprint_of(&t.title, &t.body))
            .collect();

        self.with_seen(|seen| {
            seen.extend(fingerprints);
            seen.len()
        })
    }

    /// Seed from every candidate currently in the store
    pub async fn seed_from_store(&self) -> Result<usize, StoreError> {
        let texts = self.store.list_candidate_texts().await?;
        let count = self.seed(texts);
        debug!(fingerprints = count, "Fingerprint index seeded");
        Ok(count)
    }

    /// True when neither the local set nor the store knows similar content
    pub async fn is_new(&self, draft: &CandidateDraft) -> Result<bool, StoreError> {
        let fp = self.fingerprint_of(&draft.title, &draft.body);
        if self.with_seen(|seen| seen.contains(&fp)) {
            return Ok(false);
        }

        let prefix = body_prefix(&draft.body, self.settings.similarity_prefix_chars);
        let title = if self.settings.match_titles {
            draft.title.as_str()
        } else {
            ""
        };
        let similar = self.store.exists_similar_candidate(title, &prefix).await?;

        if similar {
            // Cache the hit so the next lookup stays local
            self.with_seen(|seen| seen.insert(fp));
        }

        Ok(!similar)
    }

    /// Record a draft after it has been persisted
    pub fn remember(&self, draft: &CandidateDraft) {
        let fp = self.fingerprint_of(&draft.title, &draft.body);
        self.with_seen(|seen| seen.insert(fp));
    }

    pub fn len(&self) -> usize {
        self.with_seen(|seen| seen.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use chrono::Utc;

    fn index() -> (FingerprintIndex, Arc<SqliteStore>) {
        index_with(DedupSettings::default())
    }

    fn index_with(settings: DedupSettings) -> (FingerprintIndex, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let index = FingerprintIndex::new(store.clone(), settings);
        (index, store)
    }

    #[test]
    fn test_fingerprint_format() {
        let fp = fingerprint("Sputnik", "body", 200);
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_ignores_tail_beyond_prefix() {
        let a = fingerprint("Radio", "abcdef tail one", 6);
        let b = fingerprint("Radio", "abcdef tail two", 6);
        assert_eq!(a, b);
        assert_ne!(a, fingerprint("Radio", "abcdeX tail one", 6));
    }

    #[test]
    fn test_fingerprint_normalizes_title_and_whitespace() {
        assert_eq!(
            fingerprint("  Sputnik ", "first\n  satellite", 200),
            fingerprint("sputnik", "first satellite", 200)
        );
    }

    #[tokio::test]
    async fn test_remembered_draft_is_not_new() {
        let (index, _store) = index();
        let draft = CandidateDraft::new("Sputnik", "First satellite", "history");

        assert!(index.is_new(&draft).await.unwrap());
        index.remember(&draft);
        assert!(!index.is_new(&draft).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_fallback_catches_hash_miss() {
        let (index, store) = index();
        // Inserted by "another process": the local set never saw it
        store
            .create_candidate(
                &CandidateDraft::new("Vostok 1", "Yuri Gagarin orbits the Earth in 108 minutes", "history"),
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(index.is_empty());

        let same_title = CandidateDraft::new("vostok 1", "Completely different wording", "history");
        assert!(!index.is_new(&same_title).await.unwrap());

        let same_opening = CandidateDraft::new("Gagarin", "Yuri Gagarin orbits", "history");
        assert!(!index.is_new(&same_opening).await.unwrap());

        let unrelated = CandidateDraft::new("Apollo 11", "Moon landing", "history");
        assert!(index.is_new(&unrelated).await.unwrap());
    }

    #[tokio::test]
    async fn test_title_match_can_be_disabled() {
        let (index, store) = index_with(DedupSettings {
            match_titles: false,
            ..Default::default()
        });
        store
            .create_candidate(&CandidateDraft::new("Post about radio", "A body", "history"), Utc::now())
            .await
            .unwrap();

        let new_body = CandidateDraft::new("Post about radio", "Totally unrelated text", "history");
        assert!(index.is_new(&new_body).await.unwrap());

        let same_opening = CandidateDraft::new("Radio", "A body", "history");
        assert!(!index.is_new(&same_opening).await.unwrap());
    }

    #[test]
    fn test_dedup_settings_yaml() {
        let settings: DedupSettings = serde_yaml::from_str("match_titles: false").unwrap();
        assert!(!settings.match_titles);
        assert_eq!(settings.body_prefix_chars, 200);
        assert!(DedupSettings::default().match_titles);
    }

    #[tokio::test]
    async fn test_seed_from_store() {
        let (index, store) = index();
        let draft = CandidateDraft::new("Telephone", "Bell, 1876", "history");
        store.create_candidate(&draft, Utc::now()).await.unwrap();

        assert_eq!(index.seed_from_store().await.unwrap(), 1);
        assert_eq!(index.len(), 1);
        assert!(!index.is_new(&draft).await.unwrap());
    }
}
