//! Page-analysis run: PDF → page rasters → vision analysis → reconciled crops.
//!
//! Writes `images/page_{n}_img_{k}.jpg` and `analysis_results.json` under the
//! run's output directory. No single page aborts the run: render failures
//! and extraction failures end up on that page's [`PageRecord::error`].

use crate::config::DeckConfig;
use crate::error::{PageError, Pdf2DeckError};
use crate::output::{AnalysisOutput, AnalysisStats, PageRecord};
use crate::pipeline::page::{process_page_image, PageOutcome};
use crate::pipeline::{input, render};
use crate::provider::{resolve_page_analyzer, PageAnalyzer};
use crate::session::{write_atomic, RunContext};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Analyse a PDF file or URL and persist the analysis artifact.
///
/// # Errors
/// Only fatal errors: unreadable input, unopenable PDF, empty page
/// selection, no vision provider, or a failed artifact write.
pub async fn analyze_pdf(
    input_str: impl AsRef<str>,
    ctx: &RunContext,
    config: &DeckConfig,
) -> Result<AnalysisOutput, Pdf2DeckError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting analysis: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let analyzer = resolve_page_analyzer(config)?;
    ctx.prepare().await?;

    let render_start = Instant::now();
    let rendered = render::render_pages(
        resolved.path(),
        config.dpi,
        config.max_rendered_pixels,
        config.password.as_deref(),
        &config.pages,
    )
    .await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} of {} pages in {}ms",
        rendered.pages.len(),
        rendered.total_pages,
        render_duration_ms
    );

    let mut output = analyze_rasters(rendered.pages, analyzer, ctx, config).await;
    output.stats.total_pages = rendered.total_pages;
    output.stats.render_duration_ms = render_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    save_analysis(&output.pages, &ctx.analysis_path).await?;
    info!(
        "Analysis complete: {}/{} pages, {} images, {}ms",
        output.stats.processed_pages,
        output.stats.total_pages,
        output.stats.images_extracted,
        output.stats.total_duration_ms
    );
    Ok(output)
}

/// Analyse already-rendered pages. `pages` holds `(page_index_0based, raster)`.
///
/// Results are ordered by page number regardless of completion order.
/// `stats.total_pages` is the number of pages given.
pub async fn analyze_rasters(
    pages: Vec<(usize, Result<DynamicImage, PageError>)>,
    analyzer: Arc<dyn PageAnalyzer>,
    ctx: &RunContext,
    config: &DeckConfig,
) -> AnalysisOutput {
    let start = Instant::now();
    let total = pages.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_analysis_start(total);
    }

    let outcomes: Vec<PageOutcome> = stream::iter(pages.into_iter().map(|(idx, raster)| {
        let analyzer = Arc::clone(&analyzer);
        let ctx = ctx.clone();
        let config = config.clone();
        async move { analyze_one(idx + 1, total, raster, analyzer, ctx, config).await }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    let mut stats = AnalysisStats {
        total_pages: total,
        ..AnalysisStats::default()
    };
    let mut records: Vec<PageRecord> = outcomes
        .into_iter()
        .map(|o| {
            if o.record.error.is_some() {
                stats.failed_pages += 1;
            } else {
                stats.processed_pages += 1;
            }
            stats.images_extracted += o.record.images.len();
            stats.cluster_images += o.cluster_images;
            stats.fallback_images += o.fallback_images;
            o.record
        })
        .collect();
    records.sort_by_key(|r| r.page_num);
    stats.total_duration_ms = start.elapsed().as_millis() as u64;

    if let Some(ref cb) = config.progress_callback {
        cb.on_analysis_complete(total, stats.images_extracted);
    }

    AnalysisOutput {
        pages: records,
        stats,
    }
}

async fn analyze_one(
    page_num: usize,
    total: usize,
    raster: Result<DynamicImage, PageError>,
    analyzer: Arc<dyn PageAnalyzer>,
    ctx: RunContext,
    config: DeckConfig,
) -> PageOutcome {
    let failed = |summary: String, key_points: Vec<String>, e: PageError| {
        warn!("{}", e);
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_error(page_num, total, &e.to_string());
        }
        PageOutcome {
            record: PageRecord {
                page_num,
                page_summary: summary,
                key_points,
                images: vec![],
                error: Some(e),
            },
            cluster_images: 0,
            fallback_images: 0,
        }
    };

    let image = match raster {
        Ok(image) => image,
        Err(e) => return failed(String::new(), vec![], e),
    };
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page_num, total);
    }

    let analysis = analyzer.analyze(page_num, &image).await;
    // Kept so a page whose crops fail still carries the model's description.
    let summary = analysis.page_summary.clone();
    let key_points = analysis.key_points.clone();

    let task_config = config.clone();
    let joined = tokio::task::spawn_blocking(move || {
        process_page_image(page_num, &image, analysis, &ctx, &task_config)
    })
    .await;

    let outcome = joined.unwrap_or_else(|e| {
        Err(PageError::ExtractionFailed {
            page: page_num,
            detail: format!("page task panicked: {e}"),
        })
    });

    match outcome {
        Ok(o) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_complete(page_num, total, o.record.images.len());
            }
            o
        }
        Err(e) => failed(summary, key_points, e),
    }
}

/// Write the analysis artifact (a JSON array of page records).
pub async fn save_analysis(pages: &[PageRecord], path: &Path) -> Result<(), Pdf2DeckError> {
    let json = serde_json::to_vec_pretty(pages)
        .map_err(|e| Pdf2DeckError::Internal(format!("serialise analysis: {e}")))?;
    write_atomic(path, &json).await
}

/// Read an analysis artifact written by [`save_analysis`].
pub async fn load_analysis(path: &Path) -> Result<Vec<PageRecord>, Pdf2DeckError> {
    let unreadable = |detail: String| Pdf2DeckError::AnalysisUnreadable {
        path: path.to_path_buf(),
        detail,
    };
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| unreadable(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| unreadable(e.to_string()))
}
