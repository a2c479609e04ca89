//! In-memory collaborator doubles for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;

use sitescreen_common::Verdict;

use crate::download::{DownloadedImage, ImageDownloader};
use crate::enrich::ImageClassifier;
use crate::fetcher::{FetchedPage, PageFetcher};

// --- Page fetcher ---

#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, FetchedPage>,
    failures: HashMap<String, String>,
    pub calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, text: &str, html: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            FetchedPage {
                url: url.to_string(),
                text: text.to_string(),
                html: html.to_string(),
            },
        );
        self
    }

    pub fn with_failure(mut self, url: &str, message: &str) -> Self {
        self.failures.insert(url.to_string(), message.to_string());
        self
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(message) = self.failures.get(url) {
            return Err(anyhow!("{message}"));
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("HTTP 404 for {url}"))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// --- Image downloader ---

/// Serves canned JPEG stubs for registered URLs; everything else fails to
/// download (drops silently, like the real thing).
#[derive(Default)]
pub struct MockDownloader {
    images: HashMap<String, DownloadedImage>,
}

impl MockDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, url: &str) -> Self {
        self.images.insert(
            url.to_string(),
            DownloadedImage {
                url: url.to_string(),
                bytes: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0]),
                media_type: "image/jpeg".to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl ImageDownloader for MockDownloader {
    async fn download(&self, url: &str) -> Option<DownloadedImage> {
        self.images.get(url).cloned()
    }
}

// --- Classifier ---

enum CannedResponse {
    Verdicts(Vec<Verdict>),
    Error(String),
}

/// Replays canned responses in order, one per classify call. When the
/// queue runs dry it returns an empty verdict list, which the pipeline
/// must treat as an all-pessimistic short response.
#[derive(Default)]
pub struct MockClassifier {
    responses: Mutex<VecDeque<CannedResponse>>,
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verdicts(self, verdicts: Vec<Verdict>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(CannedResponse::Verdicts(verdicts));
        self
    }

    pub fn with_error(self, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(CannedResponse::Error(message.to_string()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageClassifier for MockClassifier {
    async fn classify(&self, images: &[DownloadedImage]) -> Result<Vec<Verdict>> {
        self.calls
            .lock()
            .unwrap()
            .push(images.iter().map(|i| i.url.clone()).collect());

        match self.responses.lock().unwrap().pop_front() {
            Some(CannedResponse::Verdicts(verdicts)) => Ok(verdicts),
            Some(CannedResponse::Error(message)) => Err(anyhow!("{message}")),
            None => Ok(Vec::new()),
        }
    }
}

/// Shorthand for building verdicts in tests.
pub fn verdict(relevant: bool, confidence: u8, reason: &str) -> Verdict {
    Verdict {
        relevant,
        confidence,
        reason: reason.to_string(),
    }
}
