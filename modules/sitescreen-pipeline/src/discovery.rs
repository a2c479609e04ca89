//! Image candidate discovery from raw HTML: `<img>` sources, srcset
//! entries, and Open Graph / Twitter meta images.

use std::sync::LazyLock;

use regex::Regex;

use crate::links::is_same_domain;

static IMG_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<img\s[^>]*>").expect("valid regex"));

static SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\ssrc\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

static SRCSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\ssrcset\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

static META_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\s[^>]*>").expect("valid regex"));

static META_PROP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:property|name)\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

static META_CONTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)content\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

/// Same-domain paths likely to carry real service photos, used to pick the
/// extra pages crawled during image discovery.
static SERVICE_PAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)/(about|services?|gallery|photos?|portfolio|work|projects?|",
        r"backflow|plumbing|hvac|heating|cooling|team|our[-_]work|",
        r"completed|before[-_]after|testimonials?)",
    ))
    .expect("valid regex")
});

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

fn resolve(raw: &str, base: Option<&url::Url>) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let resolved = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        base?.join(trimmed).ok()?.to_string()
    };
    resolved.starts_with("http").then_some(resolved)
}

/// All candidate absolute image URLs found in HTML, in document order.
/// Duplicates are left in — the heuristic filter owns deduplication.
pub fn extract_image_urls(html: &str, base_url: &str) -> Vec<String> {
    let base = url::Url::parse(base_url).ok();
    let mut urls = Vec::new();

    for tag in IMG_TAG_RE.find_iter(html) {
        let tag = tag.as_str();

        if let Some(cap) = SRC_RE.captures(tag) {
            if let Some(resolved) = resolve(&cap[1], base.as_ref()) {
                urls.push(resolved);
            }
        }

        if let Some(cap) = SRCSET_RE.captures(tag) {
            // Each comma-separated srcset entry is "url [descriptor]";
            // keep the URL token.
            for part in cap[1].split(',') {
                if let Some(token) = part.split_whitespace().next() {
                    if let Some(resolved) = resolve(token, base.as_ref()) {
                        urls.push(resolved);
                    }
                }
            }
        }
    }

    for tag in META_TAG_RE.find_iter(html) {
        let tag = tag.as_str();
        let Some(prop) = META_PROP_RE.captures(tag) else {
            continue;
        };
        let prop = prop[1].to_lowercase();
        if prop == "og:image" || prop == "twitter:image" || prop == "twitter:image:src" {
            if let Some(content) = META_CONTENT_RE.captures(tag) {
                let content = content[1].trim();
                if content.starts_with("http") {
                    urls.push(content.to_string());
                }
            }
        }
    }

    urls
}

/// Same-domain links to likely photo-bearing pages, deduplicated in
/// first-seen order. Independent of the verifier's ranked link extraction.
pub fn extract_service_links(html: &str, base_url: &str) -> Vec<String> {
    let base = url::Url::parse(base_url).ok();
    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();

    for cap in HREF_RE.captures_iter(html) {
        let Some(resolved) = resolve(&cap[1], base.as_ref()) else {
            continue;
        };
        if !is_same_domain(base_url, &resolved) {
            continue;
        }
        let Ok(parsed) = url::Url::parse(&resolved) else {
            continue;
        };
        if SERVICE_PAGE_RE.is_match(parsed.path()) && seen.insert(resolved.clone()) {
            links.push(resolved);
        }
    }

    links
}
