pub mod error;
pub mod types;

pub use error::{ListingError, Result};
pub use types::{PlaceResult, SearchRequestData, SearchResultsData};

use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

const BASE_URL: &str = "https://api.app.outscraper.com";

/// Max attempts for transient (429/5xx) API failures.
const MAX_ATTEMPTS: u32 = 4;
/// Base backoff duration. Actual delay is base * 2^attempt + jitter.
const RETRY_BASE: Duration = Duration::from_secs(5);
/// Delay between result polls for an async search.
const POLL_INTERVAL: Duration = Duration::from_secs(15);

pub struct ListingClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ListingClient {
    pub fn new(api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Submit a Maps search asynchronously. Returns immediately with a
    /// request id to poll.
    pub async fn submit_search(&self, query: &str, limit: u32) -> Result<SearchRequestData> {
        let url = format!(
            "{}/maps/search-v3?query={}&limit={}&async=true",
            self.base_url,
            urlencode(query),
            limit
        );
        let body = self.get_with_retry(&url).await?;
        let data: SearchRequestData = serde_json::from_str(&body)?;
        info!(query, request_id = %data.id, "Listing search submitted");
        Ok(data)
    }

    /// Poll until a submitted search completes, then return its place rows
    /// flattened across queries.
    pub async fn wait_for_results(&self, request_id: &str) -> Result<Vec<PlaceResult>> {
        loop {
            let url = format!("{}/requests/{}", self.base_url, request_id);
            let body = self.get_with_retry(&url).await?;
            let data: SearchResultsData = serde_json::from_str(&body)?;

            match data.status.as_str() {
                "Success" => {
                    let places: Vec<PlaceResult> = data.data.into_iter().flatten().collect();
                    info!(request_id, count = places.len(), "Listing search complete");
                    return Ok(places);
                }
                "Pending" | "Running" => {
                    debug!(request_id, status = %data.status, "Search still in progress");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                other => return Err(ListingError::RequestFailed(other.to_string())),
            }
        }
    }

    /// Search end-to-end: submit, poll, fetch rows.
    pub async fn search_places(&self, query: &str, limit: u32) -> Result<Vec<PlaceResult>> {
        let request = self.submit_search(query, limit).await?;
        self.wait_for_results(&request.id).await
    }

    /// GET with exponential backoff on 429/5xx, per the provider's rate
    /// limiting guidance.
    async fn get_with_retry(&self, url: &str) -> Result<String> {
        for attempt in 0..MAX_ATTEMPTS {
            let resp = self
                .client
                .get(url)
                .header("X-API-KEY", &self.api_key)
                .send()
                .await?;

            let status = resp.status();
            if status.is_success() {
                return Ok(resp.text().await?);
            }

            let message = resp.text().await.unwrap_or_default();
            let retryable = status.as_u16() == 429 || status.is_server_error();
            if retryable && attempt + 1 < MAX_ATTEMPTS {
                let backoff = RETRY_BASE * 2u32.pow(attempt);
                let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
                warn!(
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    backoff_secs = backoff.as_secs(),
                    "Listing API transient error, retrying after backoff"
                );
                tokio::time::sleep(backoff + jitter).await;
                continue;
            }

            return Err(ListingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        unreachable!("retry loop returns on final attempt")
    }
}

/// Minimal percent-encoding for query strings. Only what Maps queries need.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_spaces_and_specials() {
        assert_eq!(urlencode("backflow testing, MN"), "backflow+testing%2C+MN");
        assert_eq!(urlencode("rpz-valves"), "rpz-valves");
    }

    #[test]
    fn results_payload_flattens_queries() {
        let raw = serde_json::json!({
            "status": "Success",
            "data": [
                [{"place_id": "a", "name": "A Plumbing"}],
                [{"place_id": "b", "name": "B Backflow", "site": "https://b.com"}]
            ]
        });
        let data: SearchResultsData = serde_json::from_value(raw).unwrap();
        let places: Vec<PlaceResult> = data.data.into_iter().flatten().collect();
        assert_eq!(places.len(), 2);
        assert_eq!(places[1].site.as_deref(), Some("https://b.com"));
    }
}
