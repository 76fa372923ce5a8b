//! Recording fakes shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use herald::adapters::{ActionButton, Broadcaster, ImageData, ImageFetcher, OperatorNotifier};
use herald::core::{Agent, AgentParts, AgentSettings, DiscoverySettings};
use herald::domain::{Candidate, CandidateDraft, Content, NewScheduledPost, ScheduledPost};
use herald::sources::ContentSource;
use herald::store::{self, CandidateText, SqliteStore, Store, StoreError};

/// One message that reached the fake channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub text: String,
    pub with_image: bool,
}

/// Channel that records sends and can be told to fail
#[derive(Default)]
pub struct RecordingBroadcaster {
    pub sent: Mutex<Vec<Sent>>,
    pub fail_sends: AtomicBool,
    pub attempts: AtomicUsize,
    pub delay_ms: AtomicU64,
}

impl RecordingBroadcaster {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_sends.store(failing, Ordering::SeqCst);
    }

    /// Make every send take this long
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn record(&self, text: &str, with_image: bool) -> Result<i64> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("channel unavailable");
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(Sent {
            text: text.to_string(),
            with_image,
        });
        Ok(sent.len() as i64)
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    fn name(&self) -> &str {
        "@test_channel"
    }

    async fn send_text(&self, text: &str) -> Result<i64> {
        self.record(text, false).await
    }

    async fn send_image(&self, _image: ImageData, caption: &str) -> Result<i64> {
        self.record(caption, true).await
    }
}

/// Image fetcher: references containing "404" fail, others return a few bytes
#[derive(Default)]
pub struct FakeImages {
    pub fetched: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageFetcher for FakeImages {
    async fn fetch(&self, reference: &str) -> Result<ImageData> {
        self.fetched.lock().unwrap().push(reference.to_string());
        if reference.contains("404") {
            anyhow::bail!("HTTP 404 Not Found");
        }
        Ok(ImageData {
            bytes: vec![0xFF, 0xD8, 0xFF],
            file_name: "image.jpg".into(),
            mime: Some("image/jpeg".into()),
        })
    }
}

/// Operator chat that records previews and messages
#[derive(Default)]
pub struct RecordingNotifier {
    pub previews: Mutex<Vec<(String, Vec<ActionButton>)>>,
    pub messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn previews(&self) -> Vec<(String, Vec<ActionButton>)> {
        self.previews.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl OperatorNotifier for RecordingNotifier {
    async fn present(&self, text: &str, actions: &[ActionButton]) -> Result<()> {
        self.previews
            .lock()
            .unwrap()
            .push((text.to_string(), actions.to_vec()));
        Ok(())
    }

    async fn notify(&self, text: &str) -> Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Source returning the same drafts on every call, up to the requested count
pub struct FixedSource {
    pub name: String,
    pub drafts: Vec<CandidateDraft>,
    pub calls: AtomicUsize,
}

impl FixedSource {
    pub fn new(name: &str, drafts: Vec<CandidateDraft>) -> Self {
        Self {
            name: name.to_string(),
            drafts,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for FixedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce(&self, max_count: usize) -> Result<Vec<CandidateDraft>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.drafts.iter().take(max_count).cloned().collect())
    }
}

/// Source that always fails
pub struct BrokenSource;

#[async_trait]
impl ContentSource for BrokenSource {
    fn name(&self) -> &str {
        "broken"
    }

    async fn produce(&self, _max_count: usize) -> Result<Vec<CandidateDraft>> {
        anyhow::bail!("upstream down")
    }
}

/// Store wrapper that can be told to fail its next candidate delivery mark
pub struct FlakyStore {
    inner: Arc<SqliteStore>,
    fail_next_mark: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<SqliteStore>) -> Self {
        Self {
            inner,
            fail_next_mark: AtomicBool::new(false),
        }
    }

    pub fn fail_next_mark(&self) {
        self.fail_next_mark.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn create_scheduled_post(&self, post: &NewScheduledPost) -> store::Result<i64> {
        self.inner.create_scheduled_post(post).await
    }

    async fn record_published_post(&self, content: &Content, published_at: DateTime<Utc>) -> store::Result<i64> {
        self.inner.record_published_post(content, published_at).await
    }

    async fn get_scheduled_post(&self, id: i64) -> store::Result<Option<ScheduledPost>> {
        self.inner.get_scheduled_post(id).await
    }

    async fn list_due_pending(&self, now: DateTime<Utc>) -> store::Result<Vec<ScheduledPost>> {
        self.inner.list_due_pending(now).await
    }

    async fn list_pending(&self) -> store::Result<Vec<ScheduledPost>> {
        self.inner.list_pending().await
    }

    async fn mark_published(&self, id: i64) -> store::Result<()> {
        self.inner.mark_published(id).await
    }

    async fn create_candidate(&self, draft: &CandidateDraft, found_at: DateTime<Utc>) -> store::Result<i64> {
        self.inner.create_candidate(draft, found_at).await
    }

    async fn get_candidate(&self, id: i64) -> store::Result<Option<Candidate>> {
        self.inner.get_candidate(id).await
    }

    async fn update_candidate_body(&self, id: i64, body: &str) -> store::Result<()> {
        self.inner.update_candidate_body(id, body).await
    }

    async fn delete_candidate(&self, id: i64) -> store::Result<()> {
        self.inner.delete_candidate(id).await
    }

    async fn mark_candidate_approved(&self, id: i64) -> store::Result<()> {
        self.inner.mark_candidate_approved(id).await
    }

    async fn mark_candidate_published(&self, id: i64) -> store::Result<()> {
        self.inner.mark_candidate_published(id).await
    }

    async fn mark_candidate_delivered(&self, id: i64) -> store::Result<()> {
        if self.fail_next_mark.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.mark_candidate_delivered(id).await
    }

    async fn list_recent_candidates(&self, limit: usize) -> store::Result<Vec<Candidate>> {
        self.inner.list_recent_candidates(limit).await
    }

    async fn list_candidate_texts(&self) -> store::Result<Vec<CandidateText>> {
        self.inner.list_candidate_texts().await
    }

    async fn exists_similar_candidate(&self, title: &str, body_prefix: &str) -> store::Result<bool> {
        self.inner.exists_similar_candidate(title, body_prefix).await
    }
}

/// An agent over an in-memory store with recording fakes
pub struct Harness {
    pub agent: Arc<Agent>,
    pub store: Arc<SqliteStore>,
    pub faults: Arc<FlakyStore>,
    pub channel: Arc<RecordingBroadcaster>,
    pub images: Arc<FakeImages>,
    pub operator: Arc<RecordingNotifier>,
}

pub fn harness(sources: Vec<Arc<dyn ContentSource>>) -> Harness {
    harness_with(sources, |_| {})
}

pub fn harness_with(
    sources: Vec<Arc<dyn ContentSource>>,
    configure: impl FnOnce(&mut AgentSettings),
) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let faults = Arc::new(FlakyStore::new(store.clone()));
    let channel = Arc::new(RecordingBroadcaster::default());
    let images = Arc::new(FakeImages::default());
    let operator = Arc::new(RecordingNotifier::default());

    let mut settings = AgentSettings {
        discovery: DiscoverySettings {
            preview_pacing_ms: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    configure(&mut settings);

    let agent = Arc::new(Agent::new(
        AgentParts {
            store: faults.clone(),
            broadcaster: channel.clone(),
            images: images.clone(),
            notifier: operator.clone(),
            sources,
        },
        settings,
    ));

    Harness {
        agent,
        store,
        faults,
        channel,
        images,
        operator,
    }
}

pub fn draft(title: &str, body: &str) -> CandidateDraft {
    CandidateDraft::new(title, body, "history")
}
