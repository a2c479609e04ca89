pub mod error;
mod wire;

pub use error::{Result, VisionError};

use std::time::Duration;

use base64::Engine;
use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use wire::{ChatRequest, ContentBlock, ImageSource, ToolDefinitionWire, WireMessage};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Max attempts for transient (429/5xx) API failures.
const MAX_ATTEMPTS: u32 = 3;
/// Base backoff duration. Actual delay is base * 2^attempt + jitter.
const RETRY_BASE: Duration = Duration::from_secs(2);

/// One image submitted for classification.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub url: String,
    pub bytes: Vec<u8>,
    /// e.g. "image/jpeg". The caller is responsible for the allowlist.
    pub media_type: String,
}

/// One relevance verdict, order-aligned with the submitted batch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImageVerdict {
    /// Whether the image shows something relevant to the target service.
    pub relevant: bool,
    /// Classifier confidence, 0-100.
    pub confidence: u8,
    /// Brief justification, a few words.
    pub reason: String,
}

/// What the model returns through the forced tool call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct VerdictList {
    /// One verdict per image, in the same order the images were provided.
    #[serde(default)]
    verdicts: Vec<ImageVerdict>,
}

/// Claude messages client specialized for batch image classification.
/// Returns verdicts in submission order; the caller must still treat short
/// or failed responses as unreliable and fail closed.
pub struct VisionClient {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl VisionClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            http,
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Classify a batch of images in one API call.
    ///
    /// 429/5xx responses are retried with exponential backoff and jitter up
    /// to MAX_ATTEMPTS; any other failure surfaces immediately. The returned
    /// vector may be shorter than the input if the model under-produces —
    /// padding is the caller's concern.
    pub async fn classify_batch(
        &self,
        system_prompt: &str,
        images: &[ImagePayload],
    ) -> Result<Vec<ImageVerdict>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let mut blocks = vec![ContentBlock::Text {
            text: format!("Evaluate the following {} image(s):", images.len()),
        }];
        for (i, image) in images.iter().enumerate() {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
            blocks.push(ContentBlock::Text {
                text: format!("Image {}:", i + 1),
            });
            blocks.push(ContentBlock::Image {
                source: ImageSource::base64(&image.media_type, encoded),
            });
        }

        let schema = serde_json::to_value(schemars::schema_for!(VerdictList))?;
        let request = ChatRequest::new(&self.model)
            .system(system_prompt)
            .message(WireMessage::user(blocks))
            .temperature(0.0)
            .forced_tool(ToolDefinitionWire {
                name: "record_verdicts".to_string(),
                description: "Record one relevance verdict per image, in order.".to_string(),
                input_schema: schema,
            });

        let response = self.chat_with_retry(&request).await?;

        let input = response.tool_input().ok_or_else(|| {
            VisionError::Malformed("no tool_use block in response".to_string())
        })?;
        let list: VerdictList = serde_json::from_value(input.clone())?;

        debug!(
            submitted = images.len(),
            returned = list.verdicts.len(),
            model = %self.model,
            "Vision batch classified"
        );
        Ok(list.verdicts)
    }

    async fn chat_with_retry(&self, request: &ChatRequest) -> Result<wire::ChatResponse> {
        let url = format!("{}/messages", self.base_url);

        for attempt in 0..MAX_ATTEMPTS {
            let resp = self
                .http
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(request)
                .send()
                .await?;

            let status = resp.status();
            if status.is_success() {
                return Ok(resp.json().await?);
            }

            let message = resp.text().await.unwrap_or_default();
            let retryable = status.as_u16() == 429 || status.is_server_error();
            if retryable && attempt + 1 < MAX_ATTEMPTS {
                let backoff = RETRY_BASE * 2u32.pow(attempt);
                let jitter = Duration::from_millis(rand::rng().random_range(0..500));
                warn!(
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    backoff_secs = backoff.as_secs(),
                    "Vision API transient error, retrying after backoff"
                );
                tokio::time::sleep(backoff + jitter).await;
                continue;
            }

            return Err(VisionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        unreachable!("retry loop returns on final attempt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_list_tolerates_missing_field() {
        let list: VerdictList = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(list.verdicts.is_empty());
    }

    #[test]
    fn verdict_list_parses_in_order() {
        let list: VerdictList = serde_json::from_value(serde_json::json!({
            "verdicts": [
                {"relevant": true, "confidence": 90, "reason": "technician at valve"},
                {"relevant": false, "confidence": 80, "reason": "stock water photo"}
            ]
        }))
        .unwrap();
        assert_eq!(list.verdicts.len(), 2);
        assert!(list.verdicts[0].relevant);
        assert_eq!(list.verdicts[1].confidence, 80);
    }

    #[test]
    fn client_stores_model() {
        let client = VisionClient::new("sk-ant-test", "claude-haiku-4-5-20251001");
        assert_eq!(client.model(), "claude-haiku-4-5-20251001");
    }
}
