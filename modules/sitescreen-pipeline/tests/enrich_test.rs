//! Image candidate pipeline behavior: discovery, filtering, fail-closed
//! classification, and selection caps.

use std::sync::Arc;

use sitescreen_common::{BusinessRecord, EnrichmentStatus, ImageOrigin};
use sitescreen_pipeline::enrich::{EnrichConfig, ImagePipeline};
use sitescreen_pipeline::testing::{verdict, MockClassifier, MockDownloader, MockFetcher};

const HOME: &str = "https://acme.example";

fn business(website: Option<&str>, photo: Option<&str>) -> BusinessRecord {
    BusinessRecord {
        place_id: "p1".to_string(),
        name: "Acme Plumbing".to_string(),
        website: website.map(String::from),
        photo: photo.map(String::from),
        category: None,
        description: None,
    }
}

fn img(url: &str) -> String {
    format!(r#"<img src="{url}">"#)
}

fn six_image_homepage() -> String {
    (1..=6)
        .map(|i| img(&format!("https://acme.example/photos/job-{i}.jpg")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn downloader_for(urls: &[&str]) -> Arc<MockDownloader> {
    let mut downloader = MockDownloader::new();
    for url in urls {
        downloader = downloader.with_image(url);
    }
    Arc::new(downloader)
}

fn pipeline(
    fetcher: MockFetcher,
    downloader: Arc<MockDownloader>,
    classifier: Arc<MockClassifier>,
    config: EnrichConfig,
) -> ImagePipeline {
    ImagePipeline::new(Arc::new(fetcher), downloader, classifier, 2, config)
}

#[tokio::test]
async fn threshold_filters_selections_in_sub_batch_order() {
    // Six candidates, classifier returns three "relevant" verdicts with
    // confidences [90, 40, 75] and threshold 60 → exactly two selected
    // (90 then 75), in that relative order.
    let fetcher = MockFetcher::new().with_page(HOME, "", &six_image_homepage());
    let urls: Vec<String> = (1..=6)
        .map(|i| format!("https://acme.example/photos/job-{i}.jpg"))
        .collect();
    let downloader = downloader_for(&urls.iter().map(String::as_str).collect::<Vec<_>>());

    let classifier = Arc::new(
        MockClassifier::new()
            .with_verdicts(vec![
                verdict(true, 90, "technician at rpz valve"),
                verdict(true, 40, "blurry pipe photo"),
                verdict(false, 85, "stock water droplet"),
            ])
            .with_verdicts(vec![
                verdict(true, 75, "branded service van"),
                verdict(false, 70, "city skyline"),
                verdict(false, 60, "unrelated people"),
            ]),
    );

    let record = pipeline(fetcher, downloader, classifier.clone(), EnrichConfig::default())
        .enrich(&business(Some(HOME), None), None)
        .await;

    assert_eq!(record.status, EnrichmentStatus::Enriched);
    assert_eq!(record.images_found, 6);
    assert_eq!(record.images_evaluated, 6);
    assert_eq!(record.images.len(), 2);
    assert_eq!(record.images[0].url, urls[0]);
    assert_eq!(record.images[0].confidence, 90);
    assert_eq!(record.images[1].url, urls[3]);
    assert_eq!(record.images[1].confidence, 75);
    assert_eq!(classifier.call_count(), 2);
}

#[tokio::test]
async fn selection_stops_at_three_without_further_sub_batches() {
    let fetcher = MockFetcher::new().with_page(HOME, "", &six_image_homepage());
    let urls: Vec<String> = (1..=6)
        .map(|i| format!("https://acme.example/photos/job-{i}.jpg"))
        .collect();
    let downloader = downloader_for(&urls.iter().map(String::as_str).collect::<Vec<_>>());

    let classifier = Arc::new(MockClassifier::new().with_verdicts(vec![
        verdict(true, 95, "crew at work"),
        verdict(true, 90, "valve close-up"),
        verdict(true, 88, "service van"),
    ]));

    let record = pipeline(fetcher, downloader, classifier.clone(), EnrichConfig::default())
        .enrich(&business(Some(HOME), None), None)
        .await;

    assert_eq!(record.images.len(), 3);
    assert_eq!(record.images_evaluated, 3);
    // The second sub-batch is never submitted once three are selected.
    assert_eq!(classifier.call_count(), 1);
}

#[tokio::test]
async fn classifier_failure_fails_closed() {
    let fetcher = MockFetcher::new().with_page(HOME, "", &six_image_homepage());
    let urls: Vec<String> = (1..=6)
        .map(|i| format!("https://acme.example/photos/job-{i}.jpg"))
        .collect();
    let downloader = downloader_for(&urls.iter().map(String::as_str).collect::<Vec<_>>());

    let classifier = Arc::new(
        MockClassifier::new()
            .with_error("vision API 500")
            .with_error("vision API 500"),
    );

    let record = pipeline(fetcher, downloader, classifier, EnrichConfig::default())
        .enrich(&business(Some(HOME), None), None)
        .await;

    assert_eq!(record.status, EnrichmentStatus::NoImagesPassed);
    assert_eq!(record.images_evaluated, 6);
    assert!(record.images.is_empty());
}

#[tokio::test]
async fn short_verdict_list_pads_pessimistically() {
    let html = [img("https://acme.example/a.jpg"), img("https://acme.example/b.jpg")].join("");
    let fetcher = MockFetcher::new().with_page(HOME, "", &html);
    let downloader = downloader_for(&["https://acme.example/a.jpg", "https://acme.example/b.jpg"]);

    // One verdict for two submitted images: the second fails closed.
    let classifier =
        Arc::new(MockClassifier::new().with_verdicts(vec![verdict(true, 90, "real photo")]));

    let record = pipeline(fetcher, downloader, classifier, EnrichConfig::default())
        .enrich(&business(Some(HOME), None), None)
        .await;

    assert_eq!(record.images.len(), 1);
    assert_eq!(record.images[0].url, "https://acme.example/a.jpg");
}

#[tokio::test]
async fn failed_downloads_are_dropped_silently() {
    let html = [img("https://acme.example/a.jpg"), img("https://acme.example/b.jpg")].join("");
    let fetcher = MockFetcher::new().with_page(HOME, "", &html);
    // Only one of the two candidates actually downloads.
    let downloader = downloader_for(&["https://acme.example/b.jpg"]);

    let classifier =
        Arc::new(MockClassifier::new().with_verdicts(vec![verdict(true, 80, "real photo")]));

    let record = pipeline(fetcher, downloader, classifier.clone(), EnrichConfig::default())
        .enrich(&business(Some(HOME), None), None)
        .await;

    assert_eq!(record.images_evaluated, 1);
    assert_eq!(record.images.len(), 1);
    assert_eq!(record.images[0].url, "https://acme.example/b.jpg");
    assert_eq!(classifier.calls.lock().unwrap()[0], vec!["https://acme.example/b.jpg"]);
}

#[tokio::test]
async fn junk_is_filtered_before_classification() {
    let html = [
        img("https://acme.example/logo.svg"),
        img("https://acme.example/icons/facebook.png"),
        img("https://acme.example/photos/crew.jpg"),
    ]
    .join("");
    let fetcher = MockFetcher::new().with_page(HOME, "", &html);
    let downloader = downloader_for(&["https://acme.example/photos/crew.jpg"]);

    let classifier =
        Arc::new(MockClassifier::new().with_verdicts(vec![verdict(true, 90, "crew photo")]));

    let record = pipeline(fetcher, downloader, classifier.clone(), EnrichConfig::default())
        .enrich(&business(Some(HOME), None), None)
        .await;

    assert_eq!(record.images_found, 1);
    assert_eq!(classifier.calls.lock().unwrap()[0], vec!["https://acme.example/photos/crew.jpg"]);
}

#[tokio::test]
async fn fallback_photo_used_when_discovery_is_empty() {
    let fetcher = MockFetcher::new().with_page(HOME, "", "<p>no images here</p>");
    let fallback = "https://lh5.googleusercontent.example/p/photo-p1.jpg";
    let downloader = downloader_for(&[fallback]);

    let classifier =
        Arc::new(MockClassifier::new().with_verdicts(vec![verdict(true, 70, "storefront")]));

    let record = pipeline(fetcher, downloader, classifier, EnrichConfig::default())
        .enrich(&business(Some(HOME), Some(fallback)), None)
        .await;

    assert_eq!(record.status, EnrichmentStatus::Enriched);
    assert_eq!(record.images[0].origin, ImageOrigin::Fallback);
}

#[tokio::test]
async fn crawl_disabled_skips_discovery_entirely() {
    let fetcher = MockFetcher::new();
    let fallback = "https://lh5.googleusercontent.example/p/photo-p1.jpg";
    let downloader = downloader_for(&[fallback]);
    let classifier =
        Arc::new(MockClassifier::new().with_verdicts(vec![verdict(true, 70, "storefront")]));

    let config = EnrichConfig::builder().crawl_enabled(false).build();
    let fetcher_arc = Arc::new(fetcher);
    let pipeline = ImagePipeline::new(
        fetcher_arc.clone(),
        downloader,
        classifier,
        2,
        config,
    );
    let record = pipeline
        .enrich(&business(Some(HOME), Some(fallback)), None)
        .await;

    assert_eq!(record.status, EnrichmentStatus::Enriched);
    assert!(fetcher_arc.fetched_urls().is_empty());
}

#[tokio::test]
async fn no_candidates_when_nothing_survives() {
    let fetcher = MockFetcher::new().with_page(HOME, "", "<p>bare page</p>");
    let downloader = Arc::new(MockDownloader::new());
    let classifier = Arc::new(MockClassifier::new());

    let record = pipeline(fetcher, downloader, classifier.clone(), EnrichConfig::default())
        .enrich(&business(Some(HOME), None), None)
        .await;

    assert_eq!(record.status, EnrichmentStatus::NoCandidates);
    assert_eq!(record.images_found, 0);
    assert_eq!(classifier.call_count(), 0);
}

#[tokio::test]
async fn dry_run_skips_classifier_calls() {
    let fetcher = MockFetcher::new().with_page(HOME, "", &six_image_homepage());
    let downloader = Arc::new(MockDownloader::new());
    let classifier = Arc::new(MockClassifier::new());

    let config = EnrichConfig::builder().dry_run(true).build();
    let record = pipeline(fetcher, downloader, classifier.clone(), config)
        .enrich(&business(Some(HOME), None), None)
        .await;

    assert_eq!(record.status, EnrichmentStatus::DryRun);
    assert_eq!(record.images_evaluated, 6);
    assert_eq!(classifier.call_count(), 0);
}

#[tokio::test]
async fn best_evidence_page_contributes_candidates() {
    let evidence = "https://acme.example/services/backflow";
    let fetcher = MockFetcher::new()
        .with_page(HOME, "", "<p>no images</p>")
        .with_page(evidence, "", &img("https://acme.example/photos/rig.jpg"));
    let downloader = downloader_for(&["https://acme.example/photos/rig.jpg"]);
    let classifier =
        Arc::new(MockClassifier::new().with_verdicts(vec![verdict(true, 90, "test rig")]));

    let record = pipeline(fetcher, downloader, classifier, EnrichConfig::default())
        .enrich(&business(Some(HOME), None), Some(evidence))
        .await;

    assert_eq!(record.status, EnrichmentStatus::Enriched);
    assert_eq!(record.images[0].url, "https://acme.example/photos/rig.jpg");
    assert_eq!(record.images[0].origin, ImageOrigin::Crawled);
}

#[tokio::test]
async fn candidate_cap_limits_evaluation() {
    // Eight discovered, cap six: only six reach the classifier even when
    // every verdict is negative.
    let html = (1..=8)
        .map(|i| img(&format!("https://acme.example/photos/job-{i}.jpg")))
        .collect::<Vec<_>>()
        .join("");
    let fetcher = MockFetcher::new().with_page(HOME, "", &html);
    let urls: Vec<String> = (1..=8)
        .map(|i| format!("https://acme.example/photos/job-{i}.jpg"))
        .collect();
    let downloader = downloader_for(&urls.iter().map(String::as_str).collect::<Vec<_>>());
    let classifier = Arc::new(
        MockClassifier::new()
            .with_verdicts(vec![
                verdict(false, 90, "no"),
                verdict(false, 90, "no"),
                verdict(false, 90, "no"),
            ])
            .with_verdicts(vec![
                verdict(false, 90, "no"),
                verdict(false, 90, "no"),
                verdict(false, 90, "no"),
            ]),
    );

    let record = pipeline(fetcher, downloader, classifier.clone(), EnrichConfig::default())
        .enrich(&business(Some(HOME), None), None)
        .await;

    assert_eq!(record.images_found, 6);
    assert_eq!(record.images_evaluated, 6);
    assert_eq!(record.status, EnrichmentStatus::NoImagesPassed);
    assert_eq!(classifier.call_count(), 2);
}
