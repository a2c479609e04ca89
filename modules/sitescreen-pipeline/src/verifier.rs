//! Two-pass website verifier: homepage crawl, score, then guided internal
//! crawl when the homepage alone is inconclusive.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use typed_builder::TypedBuilder;

use sitescreen_common::{
    BusinessRecord, CrawlStatus, MatchedOn, Tier, VerificationRecord,
};

use crate::fetcher::PageFetcher;
use crate::links::rank_internal_links;
use crate::scorer::{assign_tier, score_text};
use crate::terms::{ScoringConfig, SERVICE_PAGE_INDICATORS};

#[derive(Debug, Clone, TypedBuilder)]
pub struct VerifyConfig {
    /// Homepage plus up to (max_pages - 1) internal pages.
    #[builder(default = 4)]
    pub max_pages: usize,
    #[builder(default)]
    pub scoring: ScoringConfig,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

pub struct Verifier {
    fetcher: Arc<dyn PageFetcher>,
    config: VerifyConfig,
}

impl Verifier {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: VerifyConfig) -> Self {
        Self { fetcher, config }
    }

    /// Verify one business. Never fails: every outcome, including crawl
    /// failure, is expressed in the returned record.
    pub async fn verify(&self, business: &BusinessRecord) -> VerificationRecord {
        let mut record = base_record(business);
        let threshold = self.config.scoring.service_threshold;

        let Some(website) = normalize_url(business.website.as_deref()) else {
            record.crawl_status = CrawlStatus::NoWebsite;
            return record;
        };
        record.website = Some(website.clone());

        // Pass 1: homepage.
        let homepage = match self.fetcher.fetch(&website).await {
            Ok(page) => page,
            Err(e) => {
                warn!(url = %website, error = %e, "Homepage fetch failed");
                record.crawl_status = CrawlStatus::CrawlFailed;
                record.crawl_error = Some(format!("{e:#}"));
                return record;
            }
        };
        record.pages_crawled = 1;

        let homepage_score = score_text(&homepage.text, &self.config.scoring);
        let mut matched: Vec<String> = homepage_score.matched_terms.clone();
        let mut best_score = homepage_score.score;
        let mut best_url = website.clone();

        info!(
            url = %website,
            score = homepage_score.score,
            matches = homepage_score.matched_terms.len(),
            "Homepage scored"
        );

        if homepage_score.score >= threshold {
            finish_verified(
                &mut record,
                best_score,
                &matched,
                MatchedOn::Homepage,
                &best_url,
                &self.config.scoring,
            );
            return record;
        }

        // Pass 2: ranked internal pages, if the budget allows and the
        // homepage produced extractable links.
        let budget = self.config.max_pages.saturating_sub(1);
        let links = if budget > 0 && !homepage.html.is_empty() {
            rank_internal_links(&homepage.html, &website, SERVICE_PAGE_INDICATORS, budget)
        } else {
            Vec::new()
        };

        if !links.is_empty() {
            info!(url = %website, candidates = links.len(), "Crawling internal pages");

            for link in &links {
                let page = match self.fetcher.fetch(&link.url).await {
                    Ok(page) => page,
                    Err(e) => {
                        // Internal page failures are non-fatal: skip and
                        // continue with the remaining candidates.
                        warn!(url = %link.url, error = %e, "Internal page fetch failed, skipping");
                        continue;
                    }
                };
                record.pages_crawled += 1;

                let page_score = score_text(&page.text, &self.config.scoring);
                if page_score.score > 0 {
                    info!(
                        url = %link.url,
                        score = page_score.score,
                        matches = page_score.matched_terms.len(),
                        "Internal page scored"
                    );
                    // Union of evidence terms across pages; the score itself
                    // stays per-page so repeats are never double-counted.
                    for term in page_score.matched_terms {
                        if !matched.contains(&term) {
                            matched.push(term);
                        }
                    }
                    if page_score.score > best_score {
                        best_score = page_score.score;
                        best_url = link.url.clone();
                    }
                }

                if best_score >= threshold * 2 {
                    info!(url = %link.url, score = best_score, "Unambiguous evidence, stopping early");
                    break;
                }
            }
        }

        if best_score >= threshold {
            let matched_on = if homepage_score.score > 0 {
                MatchedOn::Both
            } else {
                MatchedOn::Internal
            };
            finish_verified(
                &mut record,
                best_score,
                &matched,
                matched_on,
                &best_url,
                &self.config.scoring,
            );
        } else {
            record.crawl_status = CrawlStatus::NotRelevant;
            record.score = best_score;
            matched.sort();
            record.matched_terms = matched.join("|");
            info!(url = %website, score = best_score, "No sufficient evidence");
        }

        record
    }
}

fn finish_verified(
    record: &mut VerificationRecord,
    score: u32,
    matched: &[String],
    matched_on: MatchedOn,
    evidence_url: &str,
    scoring: &ScoringConfig,
) {
    record.crawl_status = CrawlStatus::Ok;
    record.score = score;
    let mut terms = matched.to_vec();
    terms.sort();
    record.matched_terms = terms.join("|");
    record.matched_on = Some(matched_on);
    record.best_evidence_url = Some(evidence_url.to_string());
    record.tier = assign_tier(score, matched, scoring);
    info!(
        url = record.website.as_deref().unwrap_or(""),
        score,
        tier = %record.tier,
        matched_on = ?matched_on,
        "Verified"
    );
}

fn base_record(business: &BusinessRecord) -> VerificationRecord {
    VerificationRecord {
        place_id: business.place_id.clone(),
        name: business.name.clone(),
        website: business.website.clone(),
        crawl_status: CrawlStatus::Ok,
        crawl_error: None,
        score: 0,
        matched_terms: String::new(),
        matched_on: None,
        best_evidence_url: None,
        tier: Tier::None,
        pages_crawled: 0,
        verified_at: Utc::now(),
    }
}

/// Normalize a raw website value for crawling: trim, prepend a scheme when
/// absent, and require a parseable non-empty host.
pub fn normalize_url(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    let parsed = url::Url::parse(&with_scheme).ok()?;
    if parsed.host_str().map_or(true, str::is_empty) {
        return None;
    }
    Some(with_scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_prepends_scheme() {
        assert_eq!(
            normalize_url(Some("example.com")),
            Some("https://example.com".to_string())
        );
    }

    #[test]
    fn normalize_keeps_existing_scheme() {
        assert_eq!(
            normalize_url(Some("http://example.com/about")),
            Some("http://example.com/about".to_string())
        );
    }

    #[test]
    fn normalize_rejects_empty_and_hostless() {
        assert_eq!(normalize_url(None), None);
        assert_eq!(normalize_url(Some("")), None);
        assert_eq!(normalize_url(Some("   ")), None);
        assert_eq!(normalize_url(Some("https://")), None);
    }

    #[test]
    fn normalize_trims_whitespace() {
        assert_eq!(
            normalize_url(Some("  example.com  ")),
            Some("https://example.com".to_string())
        );
    }
}
