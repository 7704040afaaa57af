//! Page-analysis run over synthetic rasters.
//!
//! A canned `PageAnalyzer` stands in for the vision model, so these tests
//! exercise detection, clustering, matching, cropping and the analysis
//! artifact without pdfium or network access.

use async_trait::async_trait;
use edgequake_pdf2deck::provider::PARSE_FAILURE_SUMMARY;
use edgequake_pdf2deck::{
    analyze_rasters, load_analysis, save_analysis, BBox, DeckConfig, DeckProgressCallback,
    ImageProposal, PageAnalysis, PageAnalyzer, PageError, RunContext,
};
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

struct CannedAnalyzer {
    answers: HashMap<usize, PageAnalysis>,
    delay_ms: HashMap<usize, u64>,
}

#[async_trait]
impl PageAnalyzer for CannedAnalyzer {
    async fn analyze(&self, page_num: usize, _image: &DynamicImage) -> PageAnalysis {
        if let Some(ms) = self.delay_ms.get(&page_num) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        self.answers
            .get(&page_num)
            .cloned()
            .unwrap_or_else(|| PageAnalysis::failed(PARSE_FAILURE_SUMMARY))
    }
}

fn proposal(desc: &str, coords: [f64; 4], is_cluster: bool) -> ImageProposal {
    ImageProposal {
        description: desc.into(),
        relevance: "product shot".into(),
        coordinates_pct: coords.to_vec(),
        is_cluster,
    }
}

fn fill(page: &mut RgbImage, x: std::ops::Range<u32>, y: std::ops::Range<u32>, colour: [u8; 3]) {
    for yy in y {
        for xx in x.clone() {
            page.put_pixel(xx, yy, Rgb(colour));
        }
    }
}

/// 1000×1000 white page: one photo block and a two-tile row below it.
fn brochure_page() -> DynamicImage {
    let mut page = RgbImage::from_pixel(1000, 1000, Rgb([255, 255, 255]));
    fill(&mut page, 100..500, 200..500, [30, 90, 160]);
    fill(&mut page, 100..300, 600..800, [160, 60, 30]);
    fill(&mut page, 340..540, 600..800, [40, 140, 60]);
    DynamicImage::ImageRgb8(page)
}

fn blank_page() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(1000, 1000, Rgb([255, 255, 255])))
}

fn brochure_analysis() -> PageAnalysis {
    PageAnalysis {
        page_summary: "Oak casement windows".into(),
        key_points: vec!["Triple glazing".into(), "FSC oak".into()],
        relevant_images: vec![
            proposal("casement window", [11.0, 21.0, 49.0, 49.0], false),
            // Same photo, slightly different guess.
            proposal("casement window front", [12.0, 22.0, 48.0, 48.0], false),
            proposal("colour swatches", [10.0, 60.0, 54.0, 80.0], true),
            // Nothing detected here: cropped from the guess itself.
            proposal("installer portrait", [60.0, 10.0, 90.0, 40.0], false),
        ],
    }
}

fn pages() -> Vec<(usize, Result<DynamicImage, PageError>)> {
    vec![
        (0, Ok(brochure_page())),
        (
            1,
            Err(PageError::RenderFailed {
                page: 2,
                detail: "bitmap allocation failed".into(),
            }),
        ),
        (2, Ok(blank_page())),
    ]
}

fn analyzer() -> Arc<CannedAnalyzer> {
    Arc::new(CannedAnalyzer {
        answers: HashMap::from([(1, brochure_analysis())]),
        // Page 1 finishes last.
        delay_ms: HashMap::from([(1, 80)]),
    })
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn records_are_ordered_and_failures_stay_per_page() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(dir.path());
    ctx.prepare().await.unwrap();
    let config = DeckConfig::builder().concurrency(3).build().unwrap();

    let output = analyze_rasters(pages(), analyzer(), &ctx, &config).await;

    let nums: Vec<usize> = output.pages.iter().map(|p| p.page_num).collect();
    assert_eq!(nums, vec![1, 2, 3]);

    assert!(matches!(
        output.pages[1].error,
        Some(PageError::RenderFailed { page: 2, .. })
    ));
    assert!(output.pages[1].images.is_empty());

    // An undecodable model reply is a processed page with nothing on it.
    assert_eq!(output.pages[2].page_summary, PARSE_FAILURE_SUMMARY);
    assert!(output.pages[2].images.is_empty());
    assert!(output.pages[2].error.is_none());

    assert_eq!(output.stats.total_pages, 3);
    assert_eq!(output.stats.processed_pages, 2);
    assert_eq!(output.stats.failed_pages, 1);
}

#[tokio::test]
async fn proposals_are_reconciled_into_distinct_crops() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(dir.path());
    ctx.prepare().await.unwrap();
    let config = DeckConfig::default();

    let output = analyze_rasters(pages(), analyzer(), &ctx, &config).await;
    let page = &output.pages[0];

    // Four proposals, two of them on the same photo.
    assert_eq!(page.images.len(), 3, "{:#?}", page.images);
    let boxes: Vec<BBox> = page.images.iter().map(|i| i.actual_bbox).collect();
    assert_ne!(boxes[0], boxes[1]);
    assert_ne!(boxes[1], boxes[2]);

    let photo = &page.images[0];
    assert_eq!(photo.description, "casement window");
    assert!(!photo.is_cluster);
    assert!(photo.actual_bbox.x1 <= 100 && photo.actual_bbox.x2 >= 500);
    assert!(photo.actual_bbox.y1 <= 200 && photo.actual_bbox.y2 >= 500);

    let swatches = &page.images[1];
    assert!(swatches.is_cluster);
    assert!(swatches.actual_bbox.x1 <= 100 && swatches.actual_bbox.x2 >= 540);

    let portrait = &page.images[2];
    assert_eq!(portrait.actual_bbox, BBox::new(600, 100, 900, 400));
    assert_eq!(portrait.vlm_coords_pct, [60.0, 10.0, 90.0, 40.0]);

    assert_eq!(output.stats.images_extracted, 3);
    assert_eq!(output.stats.cluster_images, 1);
    assert_eq!(output.stats.fallback_images, 1);

    for (k, image) in page.images.iter().enumerate() {
        let expected = ctx.image_path(1, k + 1);
        assert_eq!(image.saved_path, expected.to_string_lossy());
        let crop = image::open(&expected).unwrap();
        assert!(crop.width() <= config.max_image_width);
    }
}

#[tokio::test]
async fn analysis_artifact_survives_a_reload() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(dir.path());
    ctx.prepare().await.unwrap();

    let output = analyze_rasters(pages(), analyzer(), &ctx, &DeckConfig::default()).await;
    save_analysis(&output.pages, &ctx.analysis_path).await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&ctx.analysis_path).unwrap()).unwrap();
    assert_eq!(raw[0]["page_num"], 1);
    assert_eq!(raw[0]["images"][2]["actual_bbox"], serde_json::json!([600, 100, 900, 400]));
    assert!(raw[0].get("error").is_none());
    assert!(raw[1].get("error").is_some());

    let reloaded = load_analysis(&ctx.analysis_path).await.unwrap();
    assert_eq!(reloaded, output.pages);
}

#[derive(Default)]
struct Counting {
    started: AtomicUsize,
    completed: AtomicUsize,
    errored: AtomicUsize,
    summary: Mutex<Option<(usize, usize)>>,
}

impl DeckProgressCallback for Counting {
    fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_complete(&self, _page_num: usize, _total_pages: usize, _image_count: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
        self.errored.fetch_add(1, Ordering::SeqCst);
    }
    fn on_analysis_complete(&self, total_pages: usize, images_extracted: usize) {
        *self.summary.lock().unwrap() = Some((total_pages, images_extracted));
    }
}

#[tokio::test]
async fn progress_events_cover_every_page() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(dir.path());
    ctx.prepare().await.unwrap();

    let counting = Arc::new(Counting::default());
    let config = DeckConfig::builder()
        .progress_callback(counting.clone())
        .build()
        .unwrap();

    analyze_rasters(pages(), analyzer(), &ctx, &config).await;

    assert_eq!(counting.started.load(Ordering::SeqCst), 2);
    assert_eq!(counting.completed.load(Ordering::SeqCst), 2);
    assert_eq!(counting.errored.load(Ordering::SeqCst), 1);
    assert_eq!(*counting.summary.lock().unwrap(), Some((3, 3)));
}
