//! Page-fetch collaborator: trait seam plus the default HTTP implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sitescreen_common::SitescreenError;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};
use tokio::sync::Semaphore;
use tracing::{info, warn};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; SitescreenBot/1.0)";

/// One fetched page: Readability-extracted text for scoring, raw HTML for
/// link and image extraction.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
    fn name(&self) -> &str;
}

/// Plain HTTP fetcher. A semaphore caps concurrent fetches independently of
/// batch size; failures are never retried — a failed page is terminal for
/// that page within the item's attempt.
pub struct HttpFetcher {
    client: reqwest::Client,
    semaphore: Semaphore,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_concurrent: usize) -> Self {
        info!(
            timeout_secs = timeout.as_secs(),
            max_concurrent, "HttpFetcher initialized"
        );
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            semaphore: Semaphore::new(max_concurrent),
            timeout,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| anyhow::anyhow!("Fetch semaphore closed"))?;

        info!(url, fetcher = "http", "Fetching page");

        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("Request failed for {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(
                SitescreenError::Fetch(format!("HTTP {} for {url}", status.as_u16())).into(),
            );
        }

        let html = resp
            .text()
            .await
            .with_context(|| format!("Failed to read body for {url}"))?;

        let text = html_to_text(html.as_bytes(), Some(url));
        if text.trim().is_empty() {
            warn!(url, fetcher = "http", "Empty content after extraction");
        }

        info!(url, fetcher = "http", bytes = html.len(), "Fetched successfully");

        Ok(FetchedPage {
            url: url.to_string(),
            text,
            html,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Convert raw HTML bytes into clean markdown using Readability extraction.
pub(crate) fn html_to_text(html: &[u8], url: Option<&str>) -> String {
    let parsed_url = url.and_then(|u| url::Url::parse(u).ok());
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html,
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };

    transform_content_input(input, &config)
}
