//! Bounded image download for classification candidates.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; SitescreenBot/1.0)";

/// Media types forwarded to the classifier.
const ALLOWED_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Types rejected outright even when the URL extension filter missed them.
const REJECTED_TYPES: &[&str] = &["image/svg+xml", "image/x-icon", "image/vnd.microsoft.icon"];

#[derive(Debug, Clone)]
pub struct DownloadedImage {
    pub url: String,
    pub bytes: Bytes,
    pub media_type: String,
}

/// Bounded-download seam. `None` means the candidate is dropped silently —
/// never counted as a classifier failure, never retried.
#[async_trait]
pub trait ImageDownloader: Send + Sync {
    async fn download(&self, url: &str) -> Option<DownloadedImage>;
}

pub struct HttpImageDownloader {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpImageDownloader {
    pub fn new(timeout: Duration, max_bytes: usize) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            timeout,
            max_bytes,
        }
    }

}

#[async_trait]
impl ImageDownloader for HttpImageDownloader {
    /// Any failure — network error, non-200, disallowed content type,
    /// oversized body — drops the candidate with a debug log.
    async fn download(&self, url: &str) -> Option<DownloadedImage> {
        let resp = match self.client.get(url).timeout(self.timeout).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(url, error = %e, "Image download failed");
                return None;
            }
        };

        if resp.status() != reqwest::StatusCode::OK {
            debug!(url, status = resp.status().as_u16(), "Image download non-200");
            return None;
        }

        let media_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_lowercase())
            .unwrap_or_default();

        let Some(media_type) = normalize_media_type(&media_type) else {
            debug!(url, media_type, "Disallowed image content type");
            return None;
        };

        let data = match resp.bytes().await {
            Ok(data) => data,
            Err(e) => {
                debug!(url, error = %e, "Image body read failed");
                return None;
            }
        };

        if data.len() > self.max_bytes {
            debug!(url, bytes = data.len(), "Image exceeds size cap");
            return None;
        }

        Some(DownloadedImage {
            url: url.to_string(),
            bytes: data,
            media_type,
        })
    }
}

/// Map a raw content type onto the classifier allowlist. `image/jpg` is a
/// common server misspelling of `image/jpeg`.
fn normalize_media_type(raw: &str) -> Option<String> {
    if !raw.starts_with("image/") || REJECTED_TYPES.contains(&raw) {
        return None;
    }
    let normalized = if raw == "image/jpg" { "image/jpeg" } else { raw };
    ALLOWED_TYPES
        .contains(&normalized)
        .then(|| normalized.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpg_normalizes_to_jpeg() {
        assert_eq!(
            normalize_media_type("image/jpg"),
            Some("image/jpeg".to_string())
        );
    }

    #[test]
    fn svg_and_ico_are_rejected_at_content_type_level() {
        assert_eq!(normalize_media_type("image/svg+xml"), None);
        assert_eq!(normalize_media_type("image/x-icon"), None);
        assert_eq!(normalize_media_type("image/vnd.microsoft.icon"), None);
    }

    #[test]
    fn non_image_types_are_rejected() {
        assert_eq!(normalize_media_type("text/html"), None);
        assert_eq!(normalize_media_type(""), None);
    }

    #[test]
    fn allowlisted_types_pass_through() {
        for t in ["image/jpeg", "image/png", "image/gif", "image/webp"] {
            assert_eq!(normalize_media_type(t), Some(t.to_string()));
        }
    }

    #[test]
    fn unknown_image_subtypes_are_rejected() {
        assert_eq!(normalize_media_type("image/tiff"), None);
    }
}
