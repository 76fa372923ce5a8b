//! Short "history of firsts" posts synthesized from fixed templates.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::domain::CandidateDraft;

use super::ContentSource;

pub const CATEGORY: &str = "history";

/// Title and body patterns; the title carries the variable parts so that
/// different posts get different titles
const TEMPLATES: &[(&str, &str)] = &[
    (
        "The first {subject} ({year})",
        "🏆 The first {subject} in history\n• Year: {year}\n• Place: {place}\n• {achievement}\n\n#first #{tag}",
    ),
    (
        "Breakthrough: {subject} ({year})",
        "💡 A historic breakthrough: {subject}\n• When: {year}\n• Who: {who}\n• {what}\n\n#breakthrough #{tag}",
    ),
    (
        "Record: {subject} ({year})",
        "🚀 A record result: {subject}\n• Date: {year}\n• Record: {record}\n• {impact}\n\n#record #{tag}",
    ),
];

const SUBJECTS: &[&str] = &[
    "telephone",
    "computer",
    "airplane",
    "automobile",
    "television",
    "radio",
    "internet",
    "electricity",
    "photography",
    "space flight",
    "metro",
];

const PLACES: &[&str] = &["USA", "Russia", "Germany", "France", "United Kingdom", "Japan"];

const YEARS: &[&str] = &["1876", "1903", "1927", "1957", "1969", "1983", "1991", "1998"];

const ACHIEVEMENTS: &[&str] = &[
    "The first working device was built",
    "A successful experiment was carried out",
    "A world record was set",
    "A patent was granted for the invention",
];

const WHO: &[&str] = &[
    "a group of scientists",
    "a self-taught engineer",
    "a research institute",
];

const WHAT: &[&str] = &[
    "A new technology was developed",
    "A revolutionary prototype was built",
    "An unknown theory was proven",
];

const RECORDS: &[&str] = &["top speed", "highest precision", "record efficiency"];

const IMPACTS: &[&str] = &[
    "It changed everyday life",
    "It opened up new possibilities",
    "It became the basis for new discoveries",
];

pub struct TemplateSource {
    rng: Mutex<StdRng>,
}

impl Default for TemplateSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateSource {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic output for a given seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn generate<R: Rng>(rng: &mut R) -> CandidateDraft {
        let (title, template) = TEMPLATES.choose(rng).copied().unwrap_or_default();
        let subject = pick(rng, SUBJECTS);
        let year = pick(rng, YEARS);

        let fill = |pattern: &str| {
            pattern
                .replace("{subject}", subject)
                .replace("{year}", year)
                .replace("{tag}", &subject.replace(' ', "_"))
        };

        let body = fill(template)
            .replace("{place}", pick(rng, PLACES))
            .replace("{achievement}", pick(rng, ACHIEVEMENTS))
            .replace("{who}", pick(rng, WHO))
            .replace("{what}", pick(rng, WHAT))
            .replace("{record}", pick(rng, RECORDS))
            .replace("{impact}", pick(rng, IMPACTS));

        CandidateDraft::new(fill(title), body, CATEGORY)
    }
}

fn pick<R: Rng>(rng: &mut R, list: &[&'static str]) -> &'static str {
    list.choose(rng).copied().unwrap_or_default()
}

#[async_trait]
impl ContentSource for TemplateSource {
    fn name(&self) -> &str {
        "templates"
    }

    async fn produce(&self, max_count: usize) -> Result<Vec<CandidateDraft>> {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        Ok((0..max_count).map(|_| Self::generate(&mut *rng)).collect())
    }
}
