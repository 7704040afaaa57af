//! End-to-end tests for edgequake-pdf2deck.
//!
//! These render real brochures from `./test_cases/` with pdfium and make
//! live model calls. They are gated behind the `E2E_ENABLED` environment
//! variable so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 LD_LIBRARY_PATH=. cargo test --test e2e -- --nocapture

use edgequake_pdf2deck::{
    analyze_pdf, generate_presentation_from_file, run_pipeline, DeckConfig, PageSelection,
    Pdf2DeckError, RunContext,
};
use std::collections::HashSet;
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set or there is no PDF at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn brochure() -> PathBuf {
    test_cases_dir().join("brochure.pdf")
}

// ── Input errors (no model, no pdfium) ───────────────────────────────────────

#[tokio::test]
async fn missing_file_is_reported_before_any_model_call() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(dir.path());
    let err = analyze_pdf("/definitely/not/here.pdf", &ctx, &DeckConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2DeckError::FileNotFound { .. }), "{err}");
}

#[tokio::test]
async fn non_pdf_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let fake = dir.path().join("notes.pdf");
    std::fs::write(&fake, b"just some text").unwrap();
    let ctx = RunContext::new(dir.path().join("out"));

    let err = analyze_pdf(fake.to_string_lossy(), &ctx, &DeckConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2DeckError::NotAPdf { .. }), "{err}");
}

// ── Live runs ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn analyze_first_pages_of_brochure() {
    let path = e2e_skip_unless_ready!(brochure());
    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(dir.path());
    let config = DeckConfig::builder()
        .pages(PageSelection::Range(1, 3))
        .build()
        .unwrap();

    let output = analyze_pdf(path.to_string_lossy(), &ctx, &config)
        .await
        .expect("analysis should succeed");

    assert_eq!(output.pages.len(), 3);
    assert!(ctx.analysis_path.exists());
    for page in &output.pages {
        assert!(!page.page_summary.is_empty(), "page {} has no summary", page.page_num);
        for image in &page.images {
            assert!(PathBuf::from(&image.saved_path).exists());
            assert!(image.actual_bbox.area() > 0);
        }
    }
    println!("{:#?}", output.stats);
}

#[tokio::test]
async fn full_pipeline_binds_only_source_page_images() {
    let path = e2e_skip_unless_ready!(brochure());
    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(dir.path());
    let config = DeckConfig::builder()
        .pages(PageSelection::Range(1, 6))
        .build()
        .unwrap();

    let output = run_pipeline(path.to_string_lossy(), &ctx, &config)
        .await
        .expect("pipeline should succeed");

    assert!(ctx.presentation_path.exists());
    assert!(!output.presentation.sections.is_empty());

    for section in &output.presentation.sections {
        let allowed: HashSet<&str> = output
            .analysis
            .pages
            .iter()
            .filter(|p| section.source_pages.contains(&p.page_num))
            .flat_map(|p| p.images.iter().map(|i| i.saved_path.as_str()))
            .collect();
        for image in &section.images {
            assert!(
                allowed.contains(image.as_str()),
                "section '{}' references {} outside pages {:?}",
                section.title,
                image,
                section.source_pages
            );
        }
    }
}

#[tokio::test]
async fn presentation_can_be_regenerated_from_analysis() {
    let path = e2e_skip_unless_ready!(brochure());
    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(dir.path());
    let config = DeckConfig::builder()
        .pages(PageSelection::Range(1, 4))
        .build()
        .unwrap();

    analyze_pdf(path.to_string_lossy(), &ctx, &config)
        .await
        .expect("analysis should succeed");

    let second = dir.path().join("presentation_retry.json");
    let presentation = generate_presentation_from_file(&ctx.analysis_path, &second, &config)
        .await
        .expect("presentation should succeed");
    assert_eq!(presentation.metadata.total_pages, 4);
    assert!(second.exists());
}
