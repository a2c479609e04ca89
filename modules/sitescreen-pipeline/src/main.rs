use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sitescreen_common::{BusinessRecord, Config, SitescreenError};
use sitescreen_pipeline::checkpoint::Checkpoint;
use sitescreen_pipeline::download::HttpImageDownloader;
use sitescreen_pipeline::enrich::{
    EnrichConfig, ImagePipeline, VisionClassifier, DEFAULT_VISION_MODEL,
};
use sitescreen_pipeline::fetcher::HttpFetcher;
use sitescreen_pipeline::orchestrator::{run_batches, BatchOptions, EnrichTask, RunTotals};
use sitescreen_pipeline::report::write_report;
use sitescreen_pipeline::sink::CsvSink;
use sitescreen_pipeline::store::{PgEnrichedSink, PgStore, PgVerificationSink};
use sitescreen_pipeline::terms::ScoringConfig;
use sitescreen_pipeline::verifier::{Verifier, VerifyConfig};

/// 5 MB hard cap on candidate image downloads.
const IMAGE_MAX_BYTES: usize = 5 * 1024 * 1024;
/// Per-image download timeout.
const IMAGE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(
    name = "sitescreen",
    about = "Verify service offerings from business websites and select photo evidence"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed input records from the Maps listing search API
    Search(SearchArgs),
    /// Two-pass website verification against the weighted term table
    Verify(VerifyArgs),
    /// Image discovery, heuristic filtering and vision selection
    Enrich(EnrichArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Csv,
    Postgres,
}

#[derive(Args)]
struct SharedArgs {
    /// Storage backend for inputs and outputs
    #[arg(long, value_enum, default_value_t = Backend::Csv)]
    backend: Backend,

    /// Businesses per batch; the checkpoint is written after each batch
    #[arg(long, default_value_t = 25)]
    batch_size: usize,

    /// Sleep between batches, in milliseconds
    #[arg(long, default_value_t = 300)]
    sleep_ms: u64,

    /// Resume from the checkpoint, skipping already-processed ids
    #[arg(long)]
    resume: bool,

    /// Max concurrent page fetches
    #[arg(long, default_value_t = 4)]
    fetch_concurrency: usize,

    /// Per-page fetch timeout, in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Args)]
struct SearchArgs {
    /// Search query, repeatable, e.g. --query "backflow testing Minneapolis MN"
    #[arg(long, required = true)]
    query: Vec<String>,

    /// Max results per query
    #[arg(long, default_value_t = 100)]
    limit: u32,

    #[arg(long, default_value = "data/places.csv")]
    output: PathBuf,
}

#[derive(Args)]
struct VerifyArgs {
    #[command(flatten)]
    shared: SharedArgs,

    /// Input CSV of business records (csv backend)
    #[arg(long, default_value = "data/places.csv")]
    input: PathBuf,

    #[arg(long, default_value = "data/verified.csv")]
    output: PathBuf,

    #[arg(long, default_value = "data/rejected_by_verifier.csv")]
    rejected: PathBuf,

    #[arg(long, default_value = "data/verifier_report.md")]
    report: PathBuf,

    #[arg(long, default_value = "data/verifier_state.json")]
    state: PathBuf,

    /// Max pages crawled per site (homepage + internal)
    #[arg(long, default_value_t = 4)]
    max_pages: usize,

    /// Min best-page score to verify
    #[arg(long, default_value_t = 2)]
    threshold: u32,

    /// Min score for tier=testing (with strong evidence)
    #[arg(long, default_value_t = 4)]
    testing_threshold: u32,

    /// Skip records without websites entirely
    #[arg(long)]
    only_with_website: bool,
}

#[derive(Args)]
struct EnrichArgs {
    #[command(flatten)]
    shared: SharedArgs,

    /// Input CSV of verified businesses (csv backend)
    #[arg(long, default_value = "data/verified.csv")]
    input: PathBuf,

    #[arg(long, default_value = "data/images_enriched.csv")]
    output: PathBuf,

    #[arg(long, default_value = "data/images_rejected.csv")]
    rejected: PathBuf,

    #[arg(long, default_value = "data/image_enrichment_report.md")]
    report: PathBuf,

    #[arg(long, default_value = "data/image_state.json")]
    state: PathBuf,

    /// Minimum vision confidence (0-100) to accept an image
    #[arg(long, default_value_t = 60)]
    vision_threshold: u8,

    /// Max concurrent classifier calls
    #[arg(long, default_value_t = 2)]
    vision_concurrency: usize,

    /// Claude model for vision classification
    #[arg(long, default_value = DEFAULT_VISION_MODEL)]
    model: String,

    /// Skip crawling; use only the listing photo fallback
    #[arg(long)]
    no_crawl: bool,

    /// Discover and filter candidates but skip paid classifier calls
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("sitescreen_pipeline=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Search(args) => run_search(args).await,
        Command::Verify(args) => run_verify(args).await,
        Command::Enrich(args) => run_enrich(args).await,
    }
}

async fn run_search(args: SearchArgs) -> Result<()> {
    info!("Sitescreen listing search starting...");
    let config = Config::verify_from_env();
    let api_key = config
        .outscraper_api_key
        .as_deref()
        .unwrap_or_else(|| panic!("OUTSCRAPER_API_KEY environment variable is required"));
    let client = listing_client::ListingClient::new(api_key);

    let mut seen = std::collections::HashSet::new();
    let mut records: Vec<BusinessRecord> = Vec::new();
    for query in &args.query {
        let places = client.search_places(query, args.limit).await?;
        info!(query = %query, count = places.len(), "Query complete");
        for place in places {
            if seen.insert(place.place_id.clone()) {
                records.push(BusinessRecord {
                    place_id: place.place_id,
                    name: place.name,
                    website: place.site,
                    photo: place.photo,
                    category: place.category,
                    description: place.description,
                });
            }
        }
    }

    if let Some(dir) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("Failed to open {}", args.output.display()))?;
    for record in &records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!(records = records.len(), path = %args.output.display(), "Seed records written");
    Ok(())
}

async fn run_verify(args: VerifyArgs) -> Result<()> {
    info!("Sitescreen verifier starting...");
    let config = Config::verify_from_env();

    let mut businesses = match args.shared.backend {
        Backend::Csv => read_businesses(&args.input)?,
        Backend::Postgres => {
            let store = PgStore::connect(config.require_database_url()).await?;
            store.load_providers().await?
        }
    };
    let input_count = businesses.len();
    info!(records = input_count, "Loaded input records");

    if args.only_with_website {
        businesses.retain(|b| b.website.as_deref().is_some_and(|w| !w.trim().is_empty()));
        info!(records = businesses.len(), "Filtered to records with websites");
    }

    if !args.shared.resume {
        Checkpoint::remove_file(&args.state);
        if args.shared.backend == Backend::Csv {
            CsvSink::remove_file(&args.output);
            CsvSink::remove_file(&args.rejected);
        }
    }
    let mut checkpoint = Checkpoint::load(&args.state, args.shared.resume);

    let scoring = ScoringConfig::builder()
        .service_threshold(args.threshold)
        .testing_threshold(args.testing_threshold)
        .build();
    let fetcher = Arc::new(HttpFetcher::new(
        Duration::from_secs(args.shared.timeout_secs),
        args.shared.fetch_concurrency,
    ));
    let verifier = Arc::new(Verifier::new(
        fetcher,
        VerifyConfig::builder()
            .max_pages(args.max_pages)
            .scoring(scoring)
            .build(),
    ));

    let options = BatchOptions::builder()
        .batch_size(args.shared.batch_size)
        .inter_batch_delay(Duration::from_millis(args.shared.sleep_ms))
        .build();

    let process = |business: BusinessRecord| {
        let verifier = Arc::clone(&verifier);
        async move { Ok(verifier.verify(&business).await) }
    };

    let totals = match args.shared.backend {
        Backend::Csv => {
            let mut accepted = CsvSink::new(&args.output);
            let mut rejected = CsvSink::new(&args.rejected);
            run_batches(
                &options,
                businesses,
                &mut checkpoint,
                &mut accepted,
                &mut rejected,
                process,
            )
            .await?
        }
        Backend::Postgres => {
            let store = Arc::new(PgStore::connect(config.require_database_url()).await?);
            let mut accepted = PgVerificationSink::new(Arc::clone(&store));
            let mut rejected = PgVerificationSink::new(store);
            run_batches(
                &options,
                businesses,
                &mut checkpoint,
                &mut accepted,
                &mut rejected,
                process,
            )
            .await?
        }
    };

    finish_run(&args.report, "Website Verification Report", input_count, &totals)
}

async fn run_enrich(args: EnrichArgs) -> Result<()> {
    info!("Sitescreen image enrichment starting...");
    // The vision credential is required up front unless this is a dry run.
    let config = if args.dry_run {
        Config::verify_from_env()
    } else {
        Config::from_env()
    };

    let tasks = match args.shared.backend {
        Backend::Csv => read_enrich_tasks(&args.input)?,
        Backend::Postgres => {
            let store = PgStore::connect(config.require_database_url()).await?;
            store.providers_missing_images().await?
        }
    };
    let input_count = tasks.len();
    info!(records = input_count, "Loaded input records");

    if !args.shared.resume {
        Checkpoint::remove_file(&args.state);
        if args.shared.backend == Backend::Csv {
            CsvSink::remove_file(&args.output);
            CsvSink::remove_file(&args.rejected);
        }
    }
    let mut checkpoint = Checkpoint::load(&args.state, args.shared.resume);

    let fetcher = Arc::new(HttpFetcher::new(
        Duration::from_secs(args.shared.timeout_secs),
        args.shared.fetch_concurrency,
    ));
    let downloader = Arc::new(HttpImageDownloader::new(IMAGE_TIMEOUT, IMAGE_MAX_BYTES));
    let classifier = Arc::new(VisionClassifier::new(
        &config.anthropic_api_key,
        &args.model,
    ));
    let enrich_config = EnrichConfig::builder()
        .confidence_threshold(args.vision_threshold)
        .crawl_enabled(!args.no_crawl)
        .dry_run(args.dry_run)
        .build();
    let pipeline = Arc::new(ImagePipeline::new(
        fetcher,
        downloader,
        classifier,
        args.vision_concurrency,
        enrich_config,
    ));

    let options = BatchOptions::builder()
        .batch_size(args.shared.batch_size)
        .inter_batch_delay(Duration::from_millis(args.shared.sleep_ms))
        .build();

    let process = |task: EnrichTask| {
        let pipeline = Arc::clone(&pipeline);
        async move {
            Ok(pipeline
                .enrich(&task.business, task.best_evidence_url.as_deref())
                .await)
        }
    };

    let totals = match args.shared.backend {
        Backend::Csv => {
            let mut accepted = CsvSink::new(&args.output);
            let mut rejected = CsvSink::new(&args.rejected);
            run_batches(
                &options,
                tasks,
                &mut checkpoint,
                &mut accepted,
                &mut rejected,
                process,
            )
            .await?
        }
        Backend::Postgres => {
            let store = Arc::new(PgStore::connect(config.require_database_url()).await?);
            let mut accepted = PgEnrichedSink::new(Arc::clone(&store));
            let mut rejected = PgEnrichedSink::new(store);
            run_batches(
                &options,
                tasks,
                &mut checkpoint,
                &mut accepted,
                &mut rejected,
                process,
            )
            .await?
        }
    };

    finish_run(&args.report, "Image Enrichment Report", input_count, &totals)
}

fn finish_run(
    report: &Path,
    title: &str,
    input_count: usize,
    totals: &RunTotals,
) -> Result<()> {
    write_report(report, title, input_count, totals)?;
    info!("{totals}");
    Ok(())
}

fn read_businesses(path: &Path) -> Result<Vec<BusinessRecord>> {
    if !path.exists() {
        return Err(
            SitescreenError::Config(format!("input file not found: {}", path.display())).into(),
        );
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open input CSV: {}", path.display()))?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: BusinessRecord = row.context("Failed to parse input row")?;
        records.push(record);
    }
    Ok(records)
}

/// Enrichment input row: business fields plus the evidence URL a prior
/// verification run recorded. Works for both places.csv and verified.csv.
#[derive(Debug, Deserialize)]
struct EnrichInputRow {
    place_id: String,
    name: String,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    photo: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    best_evidence_url: Option<String>,
}

fn read_enrich_tasks(path: &Path) -> Result<Vec<EnrichTask>> {
    if !path.exists() {
        return Err(
            SitescreenError::Config(format!("input file not found: {}", path.display())).into(),
        );
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open input CSV: {}", path.display()))?;
    let mut tasks = Vec::new();
    for row in reader.deserialize() {
        let row: EnrichInputRow = row.context("Failed to parse input row")?;
        tasks.push(EnrichTask {
            business: BusinessRecord {
                place_id: row.place_id,
                name: row.name,
                website: row.website,
                photo: row.photo,
                category: row.category,
                description: row.description,
            },
            best_evidence_url: row.best_evidence_url.filter(|u| !u.is_empty()),
        });
    }
    Ok(tasks)
}
