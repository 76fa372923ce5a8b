//! RSS/Atom feed scraping.
//!
//! Entries from all configured feeds are merged newest first. Each call
//! continues where the previous one stopped, so repeated discovery attempts
//! walk deeper into the feeds instead of offering the same head entries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use feed_rs::model::Entry;
use feed_rs::parser;
use tracing::{debug, warn};

use crate::domain::CandidateDraft;

use super::ContentSource;

/// Body length kept from an entry so the post still fits an image caption
const MAX_BODY_CHARS: usize = 900;

pub struct FeedSource {
    client: reqwest::Client,
    urls: Vec<String>,
    cursor: AtomicUsize,
}

impl FeedSource {
    pub fn new(urls: Vec<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("herald/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            urls,
            cursor: AtomicUsize::new(0),
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<CandidateDraft>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch feed: {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch feed {}: HTTP {}", url, response.status());
        }

        let bytes = response.bytes().await?;
        parse_feed(&bytes)
    }
}

/// Parse a feed document into drafts, newest first
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<CandidateDraft>> {
    let feed = parser::parse(bytes).context("Failed to parse feed")?;
    let category = feed
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "news".to_string());

    let mut entries = feed.entries;
    entries.sort_by_key(|e| std::cmp::Reverse(e.published.or(e.updated)));

    Ok(entries
        .into_iter()
        .filter_map(|entry| entry_to_draft(entry, &category))
        .collect())
}

fn entry_to_draft(entry: Entry, category: &str) -> Option<CandidateDraft> {
    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .unwrap_or_default();

    // Content first, then the summary
    let html = entry
        .content
        .as_ref()
        .and_then(|c| c.body.as_ref())
        .or_else(|| entry.summary.as_ref().map(|s| &s.content));

    let text = html
        .and_then(|html| html2text::from_read(html.as_bytes(), 80).ok())
        .map(|t| truncate(t.trim(), MAX_BODY_CHARS))
        .unwrap_or_default();

    let link = entry.links.first().map(|l| l.href.clone());
    let body = match &link {
        Some(link) if !text.is_empty() => format!("{}\n\n{}", text, link),
        _ => text,
    };

    let mut draft = CandidateDraft::new(title, body, category);
    if let Some(link) = link {
        draft = draft.with_source_url(link);
    }
    if let Some(image) = image_of(&entry) {
        draft = draft.with_image_url(image);
    }

    draft.validate().ok().map(|_| draft)
}

/// First image among media content, thumbnails, and enclosure links
fn image_of(entry: &Entry) -> Option<String> {
    let media = entry.media.iter().flat_map(|m| {
        m.content
            .iter()
            .filter(|c| {
                c.content_type
                    .as_ref()
                    .map(|t| t.to_string().starts_with("image/"))
                    .unwrap_or(false)
            })
            .filter_map(|c| c.url.as_ref().map(|u| u.to_string()))
            .chain(m.thumbnails.iter().map(|t| t.image.uri.clone()))
    });

    let enclosure = entry.links.iter().filter_map(|l| {
        let is_image = l
            .media_type
            .as_deref()
            .map(|t| t.starts_with("image/"))
            .unwrap_or(false);
        (l.rel.as_deref() == Some("enclosure") && is_image).then(|| l.href.clone())
    });

    media.chain(enclosure).next()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

#[async_trait]
impl ContentSource for FeedSource {
    fn name(&self) -> &str {
        "feeds"
    }

    async fn produce(&self, max_count: usize) -> Result<Vec<CandidateDraft>> {
        if max_count == 0 || self.urls.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::new();
        for url in &self.urls {
            match self.fetch(url).await {
                Ok(drafts) => {
                    debug!(url = %url, entries = drafts.len(), "Feed fetched");
                    all.extend(drafts);
                }
                Err(e) => warn!(url = %url, error = %e, "Feed fetch failed"),
            }
        }

        if all.is_empty() {
            return Ok(all);
        }

        let len = all.len();
        let start = self.cursor.fetch_add(max_count, Ordering::Relaxed) % len;
        Ok(all
            .into_iter()
            .cycle()
            .skip(start)
            .take(max_count.min(len))
            .collect())
    }
}
