//! Same-domain link extraction and relevance ranking for guided crawling.

use std::sync::LazyLock;

use regex::Regex;

/// Matches anchor tags, capturing the href and the anchor body.
/// `(?is)` so the body may span lines; inner tags are stripped afterwards.
static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#)
        .expect("valid regex")
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// A same-domain link ranked by service-page likelihood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedLink {
    pub url: String,
    pub anchor: String,
    pub relevance: u32,
}

/// Host of a URL, lowercased, with a leading `www.` stripped.
pub(crate) fn extract_domain(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.trim_start_matches("www.").to_string())
}

pub(crate) fn is_same_domain(a: &str, b: &str) -> bool {
    match (extract_domain(a), extract_domain(b)) {
        (Some(da), Some(db)) => da == db,
        _ => false,
    }
}

/// Resolve a raw href against a base URL, stripping any fragment.
fn resolve_href(raw: &str, base: Option<&url::Url>) -> Option<String> {
    let mut parsed = if raw.starts_with("http://") || raw.starts_with("https://") {
        url::Url::parse(raw).ok()?
    } else {
        base?.join(raw).ok()?
    };
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Extract same-domain links from homepage HTML and rank them by how likely
/// they are to be service pages: +2 per indicator token in the URL, +1 per
/// indicator in the anchor text. Zero-scoring links are dropped. The sort is
/// stable and descending, so ties keep document order. Returns at most
/// `max_links` entries.
pub fn rank_internal_links(
    html: &str,
    base_url: &str,
    indicators: &[&str],
    max_links: usize,
) -> Vec<RankedLink> {
    let base = url::Url::parse(base_url).ok();
    let base_trimmed = base_url.trim_end_matches('/');

    let mut seen = std::collections::HashSet::new();
    let mut links: Vec<RankedLink> = Vec::new();

    for cap in ANCHOR_RE.captures_iter(html) {
        let Some(url) = resolve_href(&cap[1], base.as_ref()) else {
            continue;
        };

        if !is_same_domain(base_url, &url) {
            continue;
        }
        if url.trim_end_matches('/') == base_trimmed {
            continue;
        }
        if !seen.insert(url.clone()) {
            continue;
        }

        let anchor = TAG_RE
            .replace_all(&cap[2], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let url_lower = url.to_lowercase();

        let mut relevance = 0;
        for indicator in indicators {
            if url_lower.contains(indicator) {
                relevance += 2;
            }
            if anchor.contains(indicator) {
                relevance += 1;
            }
        }

        if relevance > 0 {
            links.push(RankedLink {
                url,
                anchor,
                relevance,
            });
        }
    }

    links.sort_by(|a, b| b.relevance.cmp(&a.relevance));
    links.truncate(max_links);
    links
}
