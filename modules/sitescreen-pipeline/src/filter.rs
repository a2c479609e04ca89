//! Heuristic junk filter for image candidate URLs.
//!
//! Cheap pre-pass that runs before any download or classifier spend — it
//! must never fetch bytes to make its decision.

use std::sync::LazyLock;

use regex::Regex;

use sitescreen_common::ImageCandidate;

/// Path substrings associated with logos, icons, social badges, navigation
/// chrome, and tracking pixels.
static JUNK_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)(",
        r"logo|favicon|icon|sprite|badge|social|payment|map|avatar|",
        r"placeholder|loading|spinner|arrow|bullet|star-rating|",
        r"flag|1x1|pixel|tracking|analytics|\bads?\b|banner|",
        r"facebook|twitter|instagram|youtube|linkedin|pinterest|yelp|tiktok|",
        r"background|bg[-_]|pattern|texture|separator|divider|",
        r"header[-_]|footer[-_]|nav[-_]|menu[-_]|sidebar[-_]",
        r")",
    ))
    .expect("valid regex")
});

/// Dimension hint embedded in a filename stem, e.g. "crew-150x100".
static DIM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[-_x])(\d{2,4})[-_x](\d{2,4})(?:$|[-_.])").expect("valid regex")
});

const JUNK_EXTENSIONS: &[&str] = &["svg", "ico", "gif", "bmp", "tiff"];

/// Pixel floor: a URL hinting at dimensions where both sides are below this
/// is presumed to be an icon or thumbnail.
const MIN_DIMENSION: u32 = 200;

/// True when the URL embeds a width×height hint with both sides under the
/// floor.
fn dimension_too_small(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    let path = parsed.path();
    let stem = path
        .rsplit('/')
        .next()
        .map(|name| name.split('.').next().unwrap_or(name))
        .unwrap_or("");

    if let Some(cap) = DIM_RE.captures(stem) {
        let (Ok(w), Ok(h)) = (cap[1].parse::<u32>(), cap[2].parse::<u32>()) else {
            return false;
        };
        return w < MIN_DIMENSION && h < MIN_DIMENSION;
    }
    false
}

/// Heuristic check — true means this URL is likely a logo/icon/junk image.
pub fn is_junk_url(url: &str) -> bool {
    if url.is_empty() || url.starts_with("data:") {
        return true;
    }

    if let Ok(parsed) = url::Url::parse(url) {
        let path = parsed.path().to_lowercase();
        if let Some(ext) = path.rsplit('.').next() {
            if path.contains('.') && JUNK_EXTENSIONS.contains(&ext) {
                return true;
            }
        }
    }

    if JUNK_URL_RE.is_match(url) {
        return true;
    }

    dimension_too_small(url)
}

/// Drop junk candidates and exact-URL duplicates, preserving first-seen
/// order.
pub fn filter_candidates(candidates: Vec<ImageCandidate>) -> Vec<ImageCandidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()) && !is_junk_url(&c.url))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitescreen_common::ImageOrigin;

    fn candidate(url: &str) -> ImageCandidate {
        ImageCandidate {
            url: url.to_string(),
            origin: ImageOrigin::Crawled,
        }
    }

    // --- is_junk_url ---

    #[test]
    fn svg_extension_is_junk() {
        assert!(is_junk_url("https://x.com/logo.svg"));
        assert!(is_junk_url("https://x.com/assets/art.SVG"));
    }

    #[test]
    fn photo_with_large_dimensions_is_kept() {
        assert!(!is_junk_url("https://x.com/photos/crew-200x300.jpg"));
    }

    #[test]
    fn data_uri_is_junk() {
        assert!(is_junk_url("data:image/png;base64,iVBOR"));
    }

    #[test]
    fn junk_path_patterns() {
        assert!(is_junk_url("https://x.com/images/favicon-32.png"));
        assert!(is_junk_url("https://x.com/nav_arrow.png"));
        assert!(is_junk_url("https://x.com/img/facebook-share.png"));
        assert!(is_junk_url("https://x.com/header_bg.jpg"));
    }

    #[test]
    fn small_dimension_hint_is_junk() {
        assert!(is_junk_url("https://x.com/photos/thumb-150x100.jpg"));
        assert!(is_junk_url("https://x.com/work_50x50.webp"));
    }

    #[test]
    fn one_large_dimension_is_kept() {
        // Only both-below-floor hints are presumed thumbnails.
        assert!(!is_junk_url("https://x.com/photos/site-150x400.jpg"));
    }

    #[test]
    fn ordinary_photos_are_kept() {
        assert!(!is_junk_url("https://x.com/photos/team-at-work.jpg"));
        assert!(!is_junk_url("https://x.com/uploads/2023/van.webp"));
    }

    // --- filter_candidates ---

    #[test]
    fn dedup_preserves_first_seen_order() {
        let input = vec![
            candidate("https://x.com/a.jpg"),
            candidate("https://x.com/b.jpg"),
            candidate("https://x.com/a.jpg"),
            candidate("https://x.com/c.jpg"),
        ];
        let urls: Vec<String> = filter_candidates(input).into_iter().map(|c| c.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://x.com/a.jpg".to_string(),
                "https://x.com/b.jpg".to_string(),
                "https://x.com/c.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn junk_is_removed_in_bulk() {
        let input = vec![
            candidate("https://x.com/logo.svg"),
            candidate("https://x.com/photos/job.jpg"),
            candidate("data:image/gif;base64,R0lG"),
        ];
        let kept = filter_candidates(input);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, "https://x.com/photos/job.jpg");
    }
}
