use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Input ---

/// Raw business row from the listing search or an existing dataset.
/// Immutable input to both pipelines; `place_id` is the global primary key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessRecord {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub website: Option<String>,
    /// Listing photo URL, used only as an image-discovery fallback.
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

// --- Scoring ---

/// Result of scoring one text blob against the weighted term table.
/// Recomputed per page, never persisted on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreResult {
    pub score: u32,
    /// Distinct matched terms, sorted for reproducible output.
    pub matched_terms: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    None,
    Service,
    Testing,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::None => write!(f, "none"),
            Tier::Service => write!(f, "service"),
            Tier::Testing => write!(f, "testing"),
        }
    }
}

// --- Verification ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlStatus {
    Ok,
    NoWebsite,
    CrawlFailed,
    NotRelevant,
    Error,
}

impl std::fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrawlStatus::Ok => write!(f, "OK"),
            CrawlStatus::NoWebsite => write!(f, "NO_WEBSITE"),
            CrawlStatus::CrawlFailed => write!(f, "CRAWL_FAILED"),
            CrawlStatus::NotRelevant => write!(f, "NOT_RELEVANT"),
            CrawlStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Which crawl pass produced the verifying evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchedOn {
    Homepage,
    Internal,
    Both,
}

/// Outcome of the two-pass verifier for one business.
/// Created once per business per run; owned by the verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub website: Option<String>,
    pub crawl_status: CrawlStatus,
    #[serde(default)]
    pub crawl_error: Option<String>,
    pub score: u32,
    /// Union of matched terms across all crawled pages, `|`-joined, sorted.
    pub matched_terms: String,
    #[serde(default)]
    pub matched_on: Option<MatchedOn>,
    #[serde(default)]
    pub best_evidence_url: Option<String>,
    pub tier: Tier,
    pub pages_crawled: u32,
    pub verified_at: DateTime<Utc>,
}

impl VerificationRecord {
    /// A business verifies when its homepage crawl succeeded and the best
    /// per-page score met the run threshold.
    pub fn is_verified(&self) -> bool {
        self.crawl_status == CrawlStatus::Ok && self.tier != Tier::None
    }
}

// --- Image enrichment ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOrigin {
    Crawled,
    Fallback,
}

impl std::fmt::Display for ImageOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageOrigin::Crawled => write!(f, "crawled"),
            ImageOrigin::Fallback => write!(f, "fallback"),
        }
    }
}

/// Candidate image URL discovered for one business. Transient — lives only
/// for the duration of that business's enrichment pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub url: String,
    pub origin: ImageOrigin,
}

/// One classifier verdict, order-aligned with the submitted image batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub relevant: bool,
    /// 0-100.
    pub confidence: u8,
    pub reason: String,
}

impl Verdict {
    /// The fail-closed default used when the classifier response is missing
    /// or malformed.
    pub fn pessimistic(reason: &str) -> Self {
        Self {
            relevant: false,
            confidence: 0,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedImage {
    pub url: String,
    pub confidence: u8,
    pub reason: String,
    pub origin: ImageOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Enriched,
    /// Candidates survived filtering but none passed the classifier.
    NoImagesPassed,
    /// Nothing survived discovery + filtering.
    NoCandidates,
    DryRun,
    Error,
}

impl std::fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrichmentStatus::Enriched => write!(f, "enriched"),
            EnrichmentStatus::NoImagesPassed => write!(f, "no_images_passed"),
            EnrichmentStatus::NoCandidates => write!(f, "no_candidates"),
            EnrichmentStatus::DryRun => write!(f, "dry_run"),
            EnrichmentStatus::Error => write!(f, "error"),
        }
    }
}

/// Final enrichment row for one business: up to three selected images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub place_id: String,
    pub name: String,
    pub status: EnrichmentStatus,
    pub images_found: u32,
    pub images_evaluated: u32,
    pub images: Vec<SelectedImage>,
    #[serde(default)]
    pub selected_at: Option<DateTime<Utc>>,
}

impl EnrichedRecord {
    pub fn empty(place_id: &str, name: &str, status: EnrichmentStatus) -> Self {
        Self {
            place_id: place_id.to_string(),
            name: name.to_string(),
            status,
            images_found: 0,
            images_evaluated: 0,
            images: Vec::new(),
            selected_at: None,
        }
    }
}

// --- Checkpoint ---

/// Durable progress ledger shared by both pipelines. Keyed by opaque ids;
/// carries no business knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    pub processed_ids: Vec<String>,
    pub counters: BTreeMap<String, u64>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            processed_ids: Vec::new(),
            counters: BTreeMap::new(),
            started_at: now,
            updated_at: now,
        }
    }
}

impl Default for CheckpointState {
    fn default() -> Self {
        Self::new()
    }
}
