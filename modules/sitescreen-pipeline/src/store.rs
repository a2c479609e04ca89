//! Postgres-backed driver: candidate loading and row sinks over the
//! `providers` table. The pipeline core never sees which backend is in use.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

use sitescreen_common::{BusinessRecord, EnrichedRecord, VerificationRecord};

use crate::orchestrator::EnrichTask;
use crate::sink::RowSink;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to Postgres")?;
        Ok(Self { pool })
    }

    /// All providers, for a verification run.
    pub async fn load_providers(&self) -> Result<Vec<BusinessRecord>> {
        let rows = sqlx::query(
            "SELECT place_id, name, website, photo, category, description
             FROM providers
             ORDER BY place_id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load providers")?;

        let records = rows
            .into_iter()
            .map(business_from_row)
            .collect::<Result<Vec<_>>>()?;
        info!(count = records.len(), "Loaded providers from Postgres");
        Ok(records)
    }

    /// Providers that still lack selected images, with any best-evidence
    /// URL their verification pass recorded.
    pub async fn providers_missing_images(&self) -> Result<Vec<EnrichTask>> {
        let rows = sqlx::query(
            "SELECT place_id, name, website, photo, category, description, best_evidence_url
             FROM providers
             WHERE image_urls IS NULL OR jsonb_array_length(image_urls) = 0
             ORDER BY place_id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load providers missing images")?;

        let tasks = rows
            .into_iter()
            .map(|row| {
                let best_evidence_url: Option<String> = row.try_get("best_evidence_url")?;
                Ok(EnrichTask {
                    business: business_from_row(row)?,
                    best_evidence_url,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        info!(count = tasks.len(), "Loaded providers missing images");
        Ok(tasks)
    }

    pub async fn write_verification(&self, record: &VerificationRecord) -> Result<()> {
        sqlx::query(
            "UPDATE providers
             SET crawl_status = $2,
                 crawl_error = $3,
                 backflow_score = $4,
                 matched_terms = $5,
                 best_evidence_url = $6,
                 tier = $7,
                 pages_crawled = $8,
                 verified_at = $9
             WHERE place_id = $1",
        )
        .bind(&record.place_id)
        .bind(record.crawl_status.to_string())
        .bind(&record.crawl_error)
        .bind(record.score as i32)
        .bind(&record.matched_terms)
        .bind(&record.best_evidence_url)
        .bind(record.tier.to_string())
        .bind(record.pages_crawled as i32)
        .bind(record.verified_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to write verification for {}", record.place_id))?;
        Ok(())
    }

    pub async fn write_enrichment(&self, record: &EnrichedRecord) -> Result<()> {
        let urls: Vec<&str> = record.images.iter().map(|img| img.url.as_str()).collect();
        let image_urls = serde_json::to_value(&urls)?;
        let image_meta = serde_json::to_value(&record.images)?;

        sqlx::query(
            "UPDATE providers
             SET image_urls = $2,
                 image_meta = $3,
                 enrichment_status = $4,
                 image_selected_at = $5
             WHERE place_id = $1",
        )
        .bind(&record.place_id)
        .bind(image_urls)
        .bind(image_meta)
        .bind(record.status.to_string())
        .bind(record.selected_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to write enrichment for {}", record.place_id))?;
        Ok(())
    }
}

fn business_from_row(row: sqlx::postgres::PgRow) -> Result<BusinessRecord> {
    Ok(BusinessRecord {
        place_id: row.try_get("place_id")?,
        name: row.try_get("name")?,
        website: row.try_get("website")?,
        photo: row.try_get("photo")?,
        category: row.try_get("category")?,
        description: row.try_get("description")?,
    })
}

// --- Postgres sinks ---

pub struct PgVerificationSink {
    store: Arc<PgStore>,
}

impl PgVerificationSink {
    pub fn new(store: Arc<PgStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RowSink<VerificationRecord> for PgVerificationSink {
    async fn append(&mut self, rows: &[VerificationRecord]) -> Result<()> {
        for row in rows {
            self.store.write_verification(row).await?;
        }
        Ok(())
    }
}

pub struct PgEnrichedSink {
    store: Arc<PgStore>,
}

impl PgEnrichedSink {
    pub fn new(store: Arc<PgStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RowSink<EnrichedRecord> for PgEnrichedSink {
    async fn append(&mut self, rows: &[EnrichedRecord]) -> Result<()> {
        for row in rows {
            self.store.write_enrichment(row).await?;
        }
        Ok(())
    }
}
