//! Discovery Integration Tests
//!
//! Near-duplicate drafts are never stored twice, new candidates are presented
//! to the operator, and failing sources do not stop discovery.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use herald::core::fingerprint;
use herald::sources::{ContentSource, TemplateSource};
use herald::store::Store;

use common::{draft, harness, harness_with, BrokenSource, FixedSource};

#[tokio::test]
async fn test_identical_titles_stored_once() {
    let source = Arc::new(FixedSource::new(
        "fixed",
        vec![
            draft("Sputnik", "The first artificial satellite, launched in 1957."),
            draft("Sputnik", "Sputnik 1 orbited Earth for three weeks."),
        ],
    ));
    let h = harness(vec![source]);

    let found = h.agent.discover(3).await;

    assert_eq!(found.len(), 1);
    let stored = h.store.list_recent_candidates(10).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].title, "Sputnik");
}

#[tokio::test]
async fn test_repeated_discovery_never_duplicates() {
    let source = Arc::new(FixedSource::new(
        "fixed",
        vec![
            draft("Telephone", "Bell patents the telephone in 1876."),
            draft("Airplane", "The Wright brothers fly in 1903."),
            draft("Television", "The first public TV demonstration in 1927."),
        ],
    ));
    let templates: Arc<dyn ContentSource> = Arc::new(TemplateSource::with_seed(11));
    let h = harness(vec![source, templates]);

    for _ in 0..6 {
        h.agent.discover(3).await;
    }

    let stored = h.store.list_recent_candidates(1000).await.unwrap();
    let mut seen = HashSet::new();
    for c in &stored {
        let fp = fingerprint(&c.title, &c.body, 200);
        assert!(seen.insert(fp), "duplicate candidate stored: {}", c.title);
    }

    let titles: HashSet<_> = stored.iter().map(|c| c.title.to_lowercase()).collect();
    assert_eq!(titles.len(), stored.len(), "identical titles stored twice");
}

#[tokio::test]
async fn test_new_candidates_presented_for_moderation() {
    let source = Arc::new(FixedSource::new(
        "fixed",
        vec![
            draft("Radio", "Popov and Marconi, 1895."),
            draft("Metro", "London Underground opens in 1863."),
        ],
    ));
    let h = harness(vec![source]);

    let found = h.agent.discover(3).await;
    assert_eq!(found.len(), 2);

    let previews = h.operator.previews();
    assert_eq!(previews.len(), 2);
    for (candidate, (text, actions)) in found.iter().zip(&previews) {
        assert!(text.starts_with(&format!("📰 POST PREVIEW #{}", candidate.id)));
        assert!(text.contains(&candidate.body));
        let callbacks: Vec<_> = actions.iter().map(|a| a.callback_data.clone()).collect();
        assert_eq!(
            callbacks,
            vec![
                format!("approve_{}", candidate.id),
                format!("edit_{}", candidate.id),
                format!("reject_{}", candidate.id),
            ]
        );
    }
}

#[tokio::test]
async fn test_stops_at_max_candidates() {
    let source = Arc::new(FixedSource::new(
        "fixed",
        (0..10)
            .map(|i| draft(&format!("Invention {}", i), &format!("Body number {}", i)))
            .collect(),
    ));
    let h = harness(vec![source]);

    let found = h.agent.discover(2).await;

    assert_eq!(found.len(), 2);
    assert_eq!(h.store.list_recent_candidates(100).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_broken_source_does_not_stop_others() {
    let good = Arc::new(FixedSource::new("good", vec![draft("Internet", "ARPANET, 1969.")]));
    let broken: Arc<dyn ContentSource> = Arc::new(BrokenSource);
    let h = harness(vec![broken, good.clone()]);

    let found = h.agent.discover(1).await;

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title, "Internet");
}

#[tokio::test]
async fn test_attempt_budget_bounds_exhausted_sources() {
    let source = Arc::new(FixedSource::new("fixed", vec![draft("Photography", "Niépce, 1826.")]));
    let h = harness_with(vec![source.clone()], |s| s.discovery.attempt_budget = 4);

    assert_eq!(h.agent.discover(3).await.len(), 1);
    assert_eq!(source.calls(), 4);

    // Everything is known now; the run still ends after the budget
    assert!(h.agent.discover(3).await.is_empty());
    assert_eq!(source.calls(), 8);
}

#[tokio::test]
async fn test_sources_rotate_between_invocations() {
    let a = Arc::new(FixedSource::new(
        "a",
        (0..5).map(|i| draft(&format!("A{}", i), &format!("alpha {}", i))).collect(),
    ));
    let b = Arc::new(FixedSource::new(
        "b",
        (0..5).map(|i| draft(&format!("B{}", i), &format!("beta {}", i))).collect(),
    ));
    let h = harness(vec![a.clone(), b.clone()]);

    let first = h.agent.discover(1).await;
    let second = h.agent.discover(1).await;

    assert!(first[0].title.starts_with('A'));
    assert!(second[0].title.starts_with('B'));
}

#[tokio::test]
async fn test_store_fallback_catches_foreign_insert() {
    let h = harness(vec![Arc::new(FixedSource::new(
        "fixed",
        vec![draft("Vostok 1", "Yuri Gagarin orbits the Earth in 108 minutes.")],
    ))]);

    // Inserted behind the agent's back: the in-memory index never saw it
    h.store
        .create_candidate(
            &draft("Vostok-1 flight", "Yuri Gagarin orbits the Earth in 108 minutes."),
            Utc::now(),
        )
        .await
        .unwrap();

    assert!(h.agent.discover(3).await.is_empty());
    assert_eq!(h.store.list_recent_candidates(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_seeded_index_skips_known_content() {
    let known = draft("Computer", "ENIAC, 1946.");
    let h = harness(vec![Arc::new(FixedSource::new("fixed", vec![known.clone()]))]);
    h.store.create_candidate(&known, Utc::now()).await.unwrap();

    assert_eq!(h.agent.seed_index().await.unwrap(), 1);
    assert!(h.agent.discover(3).await.is_empty());
}

#[tokio::test]
async fn test_template_source_keeps_producing() {
    let templates: Arc<dyn ContentSource> = Arc::new(TemplateSource::with_seed(1));
    let h = harness(vec![templates]);

    let mut total = 0;
    for _ in 0..10 {
        total += h.agent.discover(3).await.len();
    }

    assert!(total >= 20, "only {} candidates accepted", total);
    assert_eq!(h.store.list_recent_candidates(1000).await.unwrap().len(), total);
}

#[tokio::test]
async fn test_same_title_new_body_accepted_without_title_matching() {
    let source = Arc::new(FixedSource::new(
        "fixed",
        vec![
            draft("Sputnik", "The first artificial satellite, launched in 1957."),
            draft("Sputnik", "Sputnik 1 orbited Earth for three weeks."),
            draft("Sputnik", "The first artificial satellite, launched in 1957."),
        ],
    ));
    let h = harness_with(vec![source], |s| s.dedup.match_titles = false);

    let found = h.agent.discover(3).await;

    // The exact repeat still collides on its fingerprint
    assert_eq!(found.len(), 2);
    assert_eq!(h.store.list_recent_candidates(10).await.unwrap().len(), 2);
}
