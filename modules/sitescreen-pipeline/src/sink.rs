//! Row-oriented output sinks. One core pipeline, two storage backends:
//! append-only CSV files and Postgres (see `store`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use sitescreen_common::{EnrichedRecord, SelectedImage, VerificationRecord};

/// Append-only destination for output rows; flushed once per batch.
#[async_trait]
pub trait RowSink<R>: Send {
    async fn append(&mut self, rows: &[R]) -> Result<()>;
}

/// Rows that can flatten themselves into a CSV-friendly shape.
pub trait CsvRow {
    type Flat: Serialize;
    fn to_flat(&self) -> Self::Flat;
}

/// CSV sink that appends per batch, writing the header only when it
/// creates the file.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove a stale output file, for fresh (non-resume) runs.
    pub fn remove_file(path: &Path) {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "Failed to remove stale output");
            }
        }
    }

    fn write_rows<R: CsvRow>(&self, rows: &[R]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let write_header = !self.path.exists();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);

        for row in rows {
            writer
                .serialize(row.to_flat())
                .with_context(|| format!("Failed to write row to {}", self.path.display()))?;
        }
        writer.flush().context("Failed to flush CSV writer")?;

        Ok(())
    }
}

#[async_trait]
impl<R: CsvRow + Send + Sync> RowSink<R> for CsvSink {
    async fn append(&mut self, rows: &[R]) -> Result<()> {
        self.write_rows(rows)
    }
}

// --- Flat row shapes ---

impl CsvRow for VerificationRecord {
    type Flat = VerificationRecord;

    fn to_flat(&self) -> VerificationRecord {
        self.clone()
    }
}

/// Enrichment row flattened to image_1..image_3 columns.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedCsvRow {
    pub place_id: String,
    pub name: String,
    pub enrichment_status: String,
    pub images_found: u32,
    pub images_evaluated: u32,
    pub images_selected: u32,
    pub image_1_url: Option<String>,
    pub image_1_source: Option<String>,
    pub image_1_confidence: Option<u8>,
    pub image_1_reason: Option<String>,
    pub image_2_url: Option<String>,
    pub image_2_source: Option<String>,
    pub image_2_confidence: Option<u8>,
    pub image_2_reason: Option<String>,
    pub image_3_url: Option<String>,
    pub image_3_source: Option<String>,
    pub image_3_confidence: Option<u8>,
    pub image_3_reason: Option<String>,
    pub selected_at: Option<String>,
}

impl CsvRow for EnrichedRecord {
    type Flat = EnrichedCsvRow;

    fn to_flat(&self) -> EnrichedCsvRow {
        let image = |i: usize| -> Option<&SelectedImage> { self.images.get(i) };
        EnrichedCsvRow {
            place_id: self.place_id.clone(),
            name: self.name.clone(),
            enrichment_status: self.status.to_string(),
            images_found: self.images_found,
            images_evaluated: self.images_evaluated,
            images_selected: self.images.len() as u32,
            image_1_url: image(0).map(|s| s.url.clone()),
            image_1_source: image(0).map(|s| s.origin.to_string()),
            image_1_confidence: image(0).map(|s| s.confidence),
            image_1_reason: image(0).map(|s| s.reason.clone()),
            image_2_url: image(1).map(|s| s.url.clone()),
            image_2_source: image(1).map(|s| s.origin.to_string()),
            image_2_confidence: image(1).map(|s| s.confidence),
            image_2_reason: image(1).map(|s| s.reason.clone()),
            image_3_url: image(2).map(|s| s.url.clone()),
            image_3_source: image(2).map(|s| s.origin.to_string()),
            image_3_confidence: image(2).map(|s| s.confidence),
            image_3_reason: image(2).map(|s| s.reason.clone()),
            selected_at: self.selected_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sitescreen_common::{CrawlStatus, EnrichmentStatus, ImageOrigin, Tier};

    fn verification(id: &str) -> VerificationRecord {
        VerificationRecord {
            place_id: id.to_string(),
            name: "Acme Plumbing".to_string(),
            website: Some("https://acme.example".to_string()),
            crawl_status: CrawlStatus::Ok,
            crawl_error: None,
            score: 5,
            matched_terms: "backflow|rpz".to_string(),
            matched_on: None,
            best_evidence_url: None,
            tier: Tier::Service,
            pages_crawled: 2,
            verified_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn header_written_once_across_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verified.csv");
        let mut sink = CsvSink::new(&path);

        sink.append(&[verification("a")]).await.unwrap();
        sink.append(&[verification("b"), verification("c")])
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header_count = content
            .lines()
            .filter(|l| l.starts_with("place_id"))
            .count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 4);
    }

    #[tokio::test]
    async fn empty_batch_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verified.csv");
        let mut sink = CsvSink::new(&path);

        let rows: Vec<VerificationRecord> = Vec::new();
        sink.append(&rows).await.unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn enriched_row_flattens_images() {
        let record = EnrichedRecord {
            place_id: "p1".to_string(),
            name: "Acme".to_string(),
            status: EnrichmentStatus::Enriched,
            images_found: 4,
            images_evaluated: 3,
            images: vec![sitescreen_common::SelectedImage {
                url: "https://acme.example/crew.jpg".to_string(),
                confidence: 90,
                reason: "technician at valve".to_string(),
                origin: ImageOrigin::Crawled,
            }],
            selected_at: Some(Utc::now()),
        };

        let flat = record.to_flat();
        assert_eq!(flat.enrichment_status, "enriched");
        assert_eq!(flat.images_selected, 1);
        assert_eq!(flat.image_1_url.as_deref(), Some("https://acme.example/crew.jpg"));
        assert_eq!(flat.image_1_source.as_deref(), Some("crawled"));
        assert!(flat.image_2_url.is_none());
    }
}
