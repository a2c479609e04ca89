//! Default term tables and thresholds for backflow-service screening.
//!
//! Everything here is data. Runs build an immutable [`ScoringConfig`] from
//! these defaults (or overrides) and pass it into the scorer and verifier —
//! there is no process-wide mutable state.

use std::collections::{BTreeMap, HashSet};

use typed_builder::TypedBuilder;

/// Weighted evidence terms. Matching is case-insensitive substring
/// containment, so multi-word terms must be lowercase here.
const DEFAULT_TERM_WEIGHTS: &[(&str, u32)] = &[
    // High value terms (exact service names)
    ("backflow testing", 3),
    ("backflow tester", 3),
    ("backflow test", 3),
    ("backflow inspection", 2),
    ("backflow preventer", 2),
    ("backflow prevention", 2),
    ("backflow installation", 2),
    ("backflow repair", 2),
    ("backflow service", 2),
    ("backflow certification", 2),
    ("backflow certified", 2),
    // Medium value terms
    ("cross connection", 1),
    ("cross-connection", 1),
    ("cross connection control", 2),
    ("rpz", 1),
    ("rpz testing", 2),
    ("reduced pressure zone", 1),
    ("reduced pressure", 1),
    ("dcva", 1),
    ("double check valve", 1),
    ("double-check valve", 1),
    ("pvb", 1),
    ("pressure vacuum breaker", 1),
    // Context terms (lower value)
    ("backflow", 1),
    ("back flow", 1),
    ("irrigation backflow", 2),
    ("sprinkler backflow", 2),
    ("test report", 1),
    ("annual test", 1),
];

/// Terms that indicate an explicit, confirmable testing offering rather
/// than a passing mention. Required (beyond score) for the testing tier.
const DEFAULT_STRONG_EVIDENCE: &[&str] = &[
    "backflow testing",
    "backflow tester",
    "backflow test",
    "rpz testing",
    "backflow inspection",
    "backflow certification",
    "backflow certified",
    "annual backflow test",
    "test report",
    "cross connection control",
];

/// Tokens that mark a same-domain link as a likely service page.
pub const SERVICE_PAGE_INDICATORS: &[&str] = &[
    "backflow",
    "rpz",
    "cross",
    "service",
    "services",
    "plumbing",
    "testing",
    "preventer",
    "irrigation",
    "sprinkler",
    "prevention",
    "repair",
    "installation",
];

/// Immutable scoring configuration, built once per run.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ScoringConfig {
    /// term -> weight. BTreeMap so iteration (and thus matched-term output)
    /// is deterministic.
    #[builder(default = default_term_weights())]
    pub term_weights: BTreeMap<String, u32>,
    #[builder(default = default_strong_evidence())]
    pub strong_evidence: HashSet<String>,
    /// Minimum best-page score for a business to verify at all.
    #[builder(default = 2)]
    pub service_threshold: u32,
    /// Minimum score for the testing tier (with a strong-evidence match).
    #[builder(default = 4)]
    pub testing_threshold: u32,
    /// Hard score ceiling, guarding against keyword stuffing.
    #[builder(default = 10)]
    pub score_cap: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn default_term_weights() -> BTreeMap<String, u32> {
    DEFAULT_TERM_WEIGHTS
        .iter()
        .map(|(term, weight)| (term.to_string(), *weight))
        .collect()
}

fn default_strong_evidence() -> HashSet<String> {
    DEFAULT_STRONG_EVIDENCE
        .iter()
        .map(|t| t.to_string())
        .collect()
}
