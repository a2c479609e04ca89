//! Three-stage image candidate pipeline: discovery, heuristic filtering,
//! vision classification.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use sitescreen_common::{
    BusinessRecord, EnrichedRecord, EnrichmentStatus, ImageCandidate, ImageOrigin, SelectedImage,
    Verdict,
};
use vision_client::{ImagePayload, VisionClient};

use crate::discovery::{extract_image_urls, extract_service_links};
use crate::download::{DownloadedImage, ImageDownloader};
use crate::fetcher::PageFetcher;
use crate::filter::filter_candidates;
use crate::verifier::normalize_url;

/// Cost-efficient default for batch relevance filtering.
pub const DEFAULT_VISION_MODEL: &str = "claude-haiku-4-5-20251001";

const VISION_SYSTEM_PROMPT: &str = r#"You are evaluating images for a plumbing / backflow testing services directory.

For each image decide:
1. relevant — true when the image shows something related to plumbing or
   backflow testing: plumbers or technicians working; backflow preventers,
   water meters, RPZ valves, pipes, fittings; service vans with company
   branding; shop or office exterior; equipment and tools.
   Not relevant: stock water photos, abstract art, food, unrelated people,
   city skylines, generic home exteriors with no service context.
2. confidence — integer 0-100 (how certain you are).
3. reason — brief explanation, at most 12 words.

Record one verdict per image, in the SAME ORDER as the images provided."#;

#[derive(Debug, Clone, TypedBuilder)]
pub struct EnrichConfig {
    /// Homepage + best evidence + extra service pages crawled in Stage A.
    #[builder(default = 4)]
    pub max_pages: usize,
    /// Max candidates that survive Stage B into classification.
    #[builder(default = 6)]
    pub max_candidates: usize,
    /// Images per classifier call.
    #[builder(default = 3)]
    pub classify_batch_size: usize,
    /// Max images kept per business.
    #[builder(default = 3)]
    pub max_selected: usize,
    /// Minimum classifier confidence (0-100) to accept an image.
    #[builder(default = 60)]
    pub confidence_threshold: u8,
    /// When false, Stage A is skipped and only the fallback photo is used.
    #[builder(default = true)]
    pub crawl_enabled: bool,
    /// Discover and filter candidates but skip classifier calls.
    #[builder(default = false)]
    pub dry_run: bool,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Classification collaborator seam. Implementations must return verdicts
/// order-aligned with the submitted images; the pipeline still treats the
/// result as unreliable and fails closed on short or failed responses.
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    async fn classify(&self, images: &[DownloadedImage]) -> Result<Vec<Verdict>>;
}

/// Claude-backed classifier.
pub struct VisionClassifier {
    client: VisionClient,
}

impl VisionClassifier {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: VisionClient::new(api_key, model),
        }
    }
}

#[async_trait]
impl ImageClassifier for VisionClassifier {
    async fn classify(&self, images: &[DownloadedImage]) -> Result<Vec<Verdict>> {
        let payloads: Vec<ImagePayload> = images
            .iter()
            .map(|image| ImagePayload {
                url: image.url.clone(),
                bytes: image.bytes.to_vec(),
                media_type: image.media_type.clone(),
            })
            .collect();

        let verdicts = self
            .client
            .classify_batch(VISION_SYSTEM_PROMPT, &payloads)
            .await?;

        Ok(verdicts
            .into_iter()
            .map(|v| Verdict {
                relevant: v.relevant,
                confidence: v.confidence.min(100),
                reason: v.reason,
            })
            .collect())
    }
}

pub struct ImagePipeline {
    fetcher: Arc<dyn PageFetcher>,
    downloader: Arc<dyn ImageDownloader>,
    classifier: Arc<dyn ImageClassifier>,
    /// Gate on concurrent classifier calls, sized independently of batch
    /// size and of the fetch gate.
    vision_gate: Arc<Semaphore>,
    config: EnrichConfig,
}

impl ImagePipeline {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        downloader: Arc<dyn ImageDownloader>,
        classifier: Arc<dyn ImageClassifier>,
        vision_concurrency: usize,
        config: EnrichConfig,
    ) -> Self {
        Self {
            fetcher,
            downloader,
            classifier,
            vision_gate: Arc::new(Semaphore::new(vision_concurrency)),
            config,
        }
    }

    /// Run the full discovery → filter → classify pipeline for one business.
    /// Never fails: every outcome is expressed in the returned record.
    pub async fn enrich(
        &self,
        business: &BusinessRecord,
        best_evidence_url: Option<&str>,
    ) -> EnrichedRecord {
        let mut record = EnrichedRecord::empty(
            &business.place_id,
            &business.name,
            EnrichmentStatus::NoCandidates,
        );

        // Stage A: discovery.
        let mut candidates: Vec<ImageCandidate> = Vec::new();
        if self.config.crawl_enabled {
            if let Some(website) = normalize_url(business.website.as_deref()) {
                candidates = self.discover(&website, best_evidence_url).await;
            }
        }

        if candidates.is_empty() {
            if let Some(photo) = business.photo.as_deref() {
                if photo.starts_with("http") {
                    debug!(name = %business.name, "Using listing photo fallback");
                    candidates.push(ImageCandidate {
                        url: photo.to_string(),
                        origin: ImageOrigin::Fallback,
                    });
                }
            }
        }

        // Stage B: heuristic filter + candidate cap.
        let mut candidates = filter_candidates(candidates);
        candidates.truncate(self.config.max_candidates);
        record.images_found = candidates.len() as u32;

        if candidates.is_empty() {
            info!(name = %business.name, "No candidates after filter");
            return record;
        }

        if self.config.dry_run {
            record.status = EnrichmentStatus::DryRun;
            record.images_evaluated = candidates.len() as u32;
            info!(name = %business.name, candidates = candidates.len(), "Dry run, skipping classification");
            return record;
        }

        // Stage C: classification in fixed-size sub-batches.
        let mut selected: Vec<SelectedImage> = Vec::new();
        let mut evaluated: u32 = 0;

        for chunk in candidates.chunks(self.config.classify_batch_size) {
            if evaluated as usize >= self.config.max_candidates
                || selected.len() >= self.config.max_selected
            {
                break;
            }

            let downloads =
                futures::future::join_all(chunk.iter().map(|c| self.downloader.download(&c.url)))
                    .await;
            let images: Vec<DownloadedImage> = downloads.into_iter().flatten().collect();
            if images.is_empty() {
                continue;
            }

            let verdicts = self.classify_batch(&business.name, &images).await;
            evaluated += images.len() as u32;

            for (image, verdict) in images.iter().zip(verdicts.iter()) {
                if verdict.relevant
                    && verdict.confidence >= self.config.confidence_threshold
                    && selected.len() < self.config.max_selected
                {
                    let origin = candidates
                        .iter()
                        .find(|c| c.url == image.url)
                        .map(|c| c.origin)
                        .unwrap_or(ImageOrigin::Crawled);
                    selected.push(SelectedImage {
                        url: image.url.clone(),
                        confidence: verdict.confidence,
                        reason: verdict.reason.clone(),
                        origin,
                    });
                }
            }
        }

        record.images_evaluated = evaluated;
        if selected.is_empty() {
            record.status = EnrichmentStatus::NoImagesPassed;
            info!(name = %business.name, evaluated, "No images passed the classifier");
        } else {
            record.status = EnrichmentStatus::Enriched;
            record.selected_at = Some(Utc::now());
            info!(name = %business.name, selected = selected.len(), "Images selected");
            record.images = selected;
        }

        record
    }

    /// Crawl the homepage, the best-evidence page, and service-linked pages
    /// discovered along the way, collecting raw image URLs. Page failures
    /// just skip that page.
    async fn discover(&self, website: &str, best_evidence_url: Option<&str>) -> Vec<ImageCandidate> {
        let mut pages: Vec<String> = vec![website.to_string()];
        if let Some(best) = best_evidence_url {
            if !best.is_empty() && best != website {
                pages.push(best.to_string());
            }
        }

        let mut crawled: HashSet<String> = HashSet::new();
        let mut urls: Vec<String> = Vec::new();
        let mut i = 0;

        while i < pages.len() && i < self.config.max_pages {
            let page_url = pages[i].clone();
            i += 1;
            if !crawled.insert(page_url.clone()) {
                continue;
            }

            let page = match self.fetcher.fetch(&page_url).await {
                Ok(page) => page,
                Err(e) => {
                    debug!(url = %page_url, error = %e, "Discovery crawl failed, skipping page");
                    continue;
                }
            };

            let found = extract_image_urls(&page.html, &page_url);
            debug!(url = %page_url, images = found.len(), "Images discovered");
            urls.extend(found);

            if pages.len() < self.config.max_pages {
                for link in extract_service_links(&page.html, &page_url) {
                    if pages.len() >= self.config.max_pages {
                        break;
                    }
                    if !crawled.contains(&link) && !pages.contains(&link) {
                        pages.push(link);
                    }
                }
            }
        }

        urls.into_iter()
            .map(|url| ImageCandidate {
                url,
                origin: ImageOrigin::Crawled,
            })
            .collect()
    }

    /// One classifier call behind the vision gate. Short responses are
    /// padded with pessimistic verdicts, over-long ones truncated, and a
    /// failed call yields all-pessimistic verdicts — fail closed, never
    /// fail open.
    async fn classify_batch(&self, name: &str, images: &[DownloadedImage]) -> Vec<Verdict> {
        let _permit = match self.vision_gate.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(name, "Vision semaphore closed");
                return vec![Verdict::pessimistic("vision unavailable"); images.len()];
            }
        };

        match self.classifier.classify(images).await {
            Ok(mut verdicts) => {
                if verdicts.len() != images.len() {
                    warn!(
                        name,
                        submitted = images.len(),
                        returned = verdicts.len(),
                        "Verdict count mismatch, padding pessimistically"
                    );
                }
                verdicts.truncate(images.len());
                while verdicts.len() < images.len() {
                    verdicts.push(Verdict::pessimistic("missing verdict"));
                }
                verdicts
            }
            Err(e) => {
                warn!(name, error = %e, "Classifier call failed, failing closed");
                vec![Verdict::pessimistic("vision error"); images.len()]
            }
        }
    }
}
