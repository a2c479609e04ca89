//! Checkpointed batch orchestrator shared by the verification and
//! enrichment pipelines.
//!
//! Splits the remaining work queue into fixed-size batches, runs each
//! batch's items concurrently, flushes rows and the checkpoint once per
//! batch, and converts per-item failures into `error` rows instead of
//! aborting the batch.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{error, info};
use typed_builder::TypedBuilder;

use sitescreen_common::{
    BusinessRecord, CrawlStatus, EnrichedRecord, EnrichmentStatus, Tier, VerificationRecord,
};

use crate::checkpoint::Checkpoint;
use crate::sink::RowSink;

#[derive(Debug, Clone, TypedBuilder)]
pub struct BatchOptions {
    #[builder(default = 25)]
    pub batch_size: usize,
    /// Politeness pause between batches.
    #[builder(default = Duration::from_millis(300))]
    pub inter_batch_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// An input item the orchestrator can queue and checkpoint.
pub trait BatchItem: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn display_name(&self) -> &str;
}

/// How a finished row routes and counts.
pub struct Outcome {
    pub label: String,
    /// Accepted rows go to the primary sink, the rest to the rejected sink.
    pub accepted: bool,
}

/// An output row the orchestrator can sink and tally.
pub trait OutcomeRow: Send + 'static {
    fn outcome(&self) -> Outcome;
    /// Row recorded when the item's future failed. The id still lands in
    /// the checkpoint so resume never loops on a permanently broken item.
    fn error_row(id: &str, name: &str, message: &str) -> Self;
}

/// Per-outcome counts for a finished run.
#[derive(Debug, Default)]
pub struct RunTotals {
    pub processed: u64,
    pub by_outcome: BTreeMap<String, u64>,
}

impl RunTotals {
    pub fn count(&self, label: &str) -> u64 {
        self.by_outcome.get(label).copied().unwrap_or(0)
    }
}

impl std::fmt::Display for RunTotals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Run Complete ===")?;
        writeln!(f, "Processed: {}", self.processed)?;
        for (label, count) in &self.by_outcome {
            writeln!(f, "  {label}: {count}")?;
        }
        Ok(())
    }
}

/// Drive `process` over every not-yet-processed item.
///
/// Within a batch items run concurrently with no ordering guarantee; the
/// fetch and vision semaphores inside the collaborators bound external
/// rates independently of the batch size. The checkpoint is written only
/// after a full batch, so a crash replays at most one batch on resume.
pub async fn run_batches<T, R, F, Fut>(
    options: &BatchOptions,
    items: Vec<T>,
    checkpoint: &mut Checkpoint,
    accepted: &mut dyn RowSink<R>,
    rejected: &mut dyn RowSink<R>,
    process: F,
) -> Result<RunTotals>
where
    T: BatchItem,
    R: OutcomeRow,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let input_count = items.len();
    let remaining: Vec<T> = items
        .into_iter()
        .filter(|item| !checkpoint.is_processed(item.id()))
        .collect();
    if remaining.len() < input_count {
        info!(
            skipped = input_count - remaining.len(),
            remaining = remaining.len(),
            "Skipping already-processed items"
        );
    }

    let mut totals = RunTotals::default();
    if remaining.is_empty() {
        info!("No records to process");
        return Ok(totals);
    }

    let total_batches = remaining.len().div_ceil(options.batch_size);
    info!(
        records = remaining.len(),
        batch_size = options.batch_size,
        total_batches,
        "Starting batch run"
    );

    for (batch_idx, batch) in remaining.chunks(options.batch_size).enumerate() {
        info!(
            batch = batch_idx + 1,
            total_batches,
            size = batch.len(),
            "Processing batch"
        );

        let results: Vec<(String, String, Result<R>)> =
            stream::iter(batch.iter().map(|item| {
                let id = item.id().to_string();
                let name = item.display_name().to_string();
                let fut = process(item.clone());
                async move { (id, name, fut.await) }
            }))
            .buffer_unordered(batch.len().max(1))
            .collect()
            .await;

        let mut accepted_rows: Vec<R> = Vec::new();
        let mut rejected_rows: Vec<R> = Vec::new();

        for (id, name, result) in results {
            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    error!(id = %id, name = %name, error = %e, "Item failed, recording error outcome");
                    R::error_row(&id, &name, &format!("{e:#}"))
                }
            };

            let outcome = row.outcome();
            checkpoint.record(&id, &outcome.label);
            *totals.by_outcome.entry(outcome.label).or_insert(0) += 1;
            totals.processed += 1;

            if outcome.accepted {
                accepted_rows.push(row);
            } else {
                rejected_rows.push(row);
            }
        }

        accepted.append(&accepted_rows).await?;
        rejected.append(&rejected_rows).await?;
        checkpoint.persist()?;
        info!(
            batch = batch_idx + 1,
            total_batches,
            processed = totals.processed,
            "Batch complete, checkpoint saved"
        );

        if batch_idx + 1 < total_batches && !options.inter_batch_delay.is_zero() {
            tokio::time::sleep(options.inter_batch_delay).await;
        }
    }

    Ok(totals)
}

// --- Trait impls for the two pipelines ---

impl BatchItem for BusinessRecord {
    fn id(&self) -> &str {
        &self.place_id
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

/// One enrichment work item: the business plus the evidence URL its
/// verification pass produced.
#[derive(Debug, Clone)]
pub struct EnrichTask {
    pub business: BusinessRecord,
    pub best_evidence_url: Option<String>,
}

impl BatchItem for EnrichTask {
    fn id(&self) -> &str {
        &self.business.place_id
    }

    fn display_name(&self) -> &str {
        &self.business.name
    }
}

impl OutcomeRow for VerificationRecord {
    fn outcome(&self) -> Outcome {
        let label = match self.crawl_status {
            CrawlStatus::Ok => "verified",
            CrawlStatus::NoWebsite => "no_website",
            CrawlStatus::CrawlFailed => "crawl_failed",
            CrawlStatus::NotRelevant => "not_relevant",
            CrawlStatus::Error => "error",
        };
        Outcome {
            label: label.to_string(),
            accepted: self.is_verified(),
        }
    }

    fn error_row(id: &str, name: &str, message: &str) -> Self {
        VerificationRecord {
            place_id: id.to_string(),
            name: name.to_string(),
            website: None,
            crawl_status: CrawlStatus::Error,
            crawl_error: Some(message.to_string()),
            score: 0,
            matched_terms: String::new(),
            matched_on: None,
            best_evidence_url: None,
            tier: Tier::None,
            pages_crawled: 0,
            verified_at: Utc::now(),
        }
    }
}

impl OutcomeRow for EnrichedRecord {
    fn outcome(&self) -> Outcome {
        Outcome {
            label: self.status.to_string(),
            accepted: self.status == EnrichmentStatus::Enriched,
        }
    }

    fn error_row(id: &str, name: &str, _message: &str) -> Self {
        EnrichedRecord::empty(id, name, EnrichmentStatus::Error)
    }
}
