//! Weighted term scorer and tier assignment.

use sitescreen_common::{ScoreResult, Tier};

use crate::terms::ScoringConfig;

/// Score a text blob against the weighted term table.
///
/// Matching is case-insensitive substring containment — a term matches if it
/// appears anywhere in the lowercased text. The score is the sum of weights
/// of all distinct matching terms, capped at `config.score_cap`. Matched
/// terms come back sorted so output is reproducible.
pub fn score_text(text: &str, config: &ScoringConfig) -> ScoreResult {
    if text.is_empty() {
        return ScoreResult::default();
    }

    let lower = text.to_lowercase();
    let mut matched_terms = Vec::new();
    let mut score: u32 = 0;

    for (term, weight) in &config.term_weights {
        if lower.contains(term.as_str()) {
            matched_terms.push(term.clone());
            score += weight;
        }
    }

    // BTreeMap iteration is already ordered; the sort states the contract.
    matched_terms.sort();

    ScoreResult {
        score: score.min(config.score_cap),
        matched_terms,
    }
}

/// Assign a tier from a score and its matched terms.
///
/// Testing requires both the stricter threshold and at least one
/// strong-evidence term — the term condition is a hard gate, not a weight.
pub fn assign_tier(score: u32, matched_terms: &[String], config: &ScoringConfig) -> Tier {
    let has_strong_term = matched_terms
        .iter()
        .any(|t| config.strong_evidence.contains(t.as_str()));

    if score >= config.testing_threshold && has_strong_term {
        Tier::Testing
    } else if score >= config.service_threshold {
        Tier::Service
    } else {
        Tier::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ScoringConfig {
        ScoringConfig::default()
    }

    // --- score_text ---

    #[test]
    fn empty_text_scores_zero() {
        let result = score_text("", &config());
        assert_eq!(result.score, 0);
        assert!(result.matched_terms.is_empty());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let result = score_text("We offer BACKFLOW TESTING services", &config());
        assert!(result.matched_terms.contains(&"backflow testing".to_string()));
    }

    #[test]
    fn substring_matching_counts_contained_terms() {
        // "backflow testing" contains both "backflow testing", "backflow
        // test", and "backflow" — all three match.
        let result = score_text("backflow testing", &config());
        assert!(result.matched_terms.contains(&"backflow testing".to_string()));
        assert!(result.matched_terms.contains(&"backflow test".to_string()));
        assert!(result.matched_terms.contains(&"backflow".to_string()));
    }

    #[test]
    fn repeated_terms_count_once() {
        let once = score_text("rpz", &config());
        let thrice = score_text("rpz rpz rpz", &config());
        assert_eq!(once.score, thrice.score);
    }

    #[test]
    fn score_is_monotonic_in_distinct_terms() {
        let cfg = config();
        let fewer = score_text("we service dcva assemblies", &cfg);
        let more = score_text("we service dcva and pvb assemblies", &cfg);
        assert!(more.score >= fewer.score);
        assert!(more.matched_terms.len() > fewer.matched_terms.len());
    }

    #[test]
    fn score_is_capped() {
        let text = "backflow testing backflow tester backflow inspection \
                    backflow preventer backflow prevention backflow installation \
                    backflow repair backflow service backflow certification \
                    rpz testing cross connection control pressure vacuum breaker";
        let result = score_text(text, &config());
        assert_eq!(result.score, 10);
    }

    #[test]
    fn matched_terms_are_sorted() {
        let result = score_text("we do rpz testing and backflow repair", &config());
        let mut sorted = result.matched_terms.clone();
        sorted.sort();
        assert_eq!(result.matched_terms, sorted);
    }

    #[test]
    fn identical_input_is_deterministic() {
        let text = "annual test reports for rpz and dcva devices";
        assert_eq!(score_text(text, &config()), score_text(text, &config()));
    }

    // --- assign_tier ---

    #[test]
    fn testing_tier_needs_strong_evidence() {
        let cfg = config();
        // Score 4 via weak terms only — no strong-evidence match.
        let weak: Vec<String> = ["rpz", "dcva", "pvb", "backflow"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(assign_tier(4, &weak, &cfg), Tier::Service);

        let strong = vec!["backflow testing".to_string()];
        assert_eq!(assign_tier(4, &strong, &cfg), Tier::Testing);
    }

    #[test]
    fn below_service_threshold_is_none_regardless_of_terms() {
        let cfg = config();
        let strong = vec!["backflow testing".to_string()];
        assert_eq!(assign_tier(1, &strong, &cfg), Tier::None);
    }

    #[test]
    fn strong_term_below_testing_threshold_is_service() {
        let cfg = config();
        let strong = vec!["backflow testing".to_string()];
        assert_eq!(assign_tier(3, &strong, &cfg), Tier::Service);
    }

    #[test]
    fn spec_scenario_homepage_terms() {
        // "backflow testing" (3) + "rpz" (1): substring matching also hits
        // "backflow test" (3) and "backflow" (1) → score 8, testing tier.
        let cfg = config();
        let result = score_text("We provide backflow testing and rpz service", &cfg);
        assert!(result.score >= 4);
        assert_eq!(
            assign_tier(result.score, &result.matched_terms, &cfg),
            Tier::Testing
        );
    }
}
