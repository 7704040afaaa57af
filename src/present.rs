//! Presentation run: analysis records → `presentation.json`.
//!
//! Stages, in order: small-image filter, image index, theme planning,
//! structure planning, per-section writing, binding. The two planning calls
//! are fatal. A section whose writing call fails is skipped.

use crate::analyze::{analyze_pdf, load_analysis};
use crate::config::DeckConfig;
use crate::error::Pdf2DeckError;
use crate::output::{AnalysisOutput, GeneratedSection, PageRecord, Presentation, PresentationMetadata};
use crate::pipeline::bind::bind_section;
use crate::pipeline::index::{filter_small_images, ImageIndex};
use crate::pipeline::plan::{analyze_themes, create_structure};
use crate::pipeline::section::generate_section;
use crate::progress::PresentationStage;
use crate::provider::resolve_text_generator;
use crate::session::{write_atomic, RunContext};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Both artifacts of a full run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub analysis: AnalysisOutput,
    pub presentation: Presentation,
}

fn stage(config: &DeckConfig, stage: PresentationStage) {
    info!("Stage: {}", stage.label());
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage(stage);
    }
}

/// Build a presentation from page records. Nothing is written.
///
/// # Errors
/// [`Pdf2DeckError::PlanningFailed`] when theme or structure planning fails,
/// or [`Pdf2DeckError::ProviderNotConfigured`] when no text model resolves.
pub async fn generate_presentation(
    pages: &[PageRecord],
    config: &DeckConfig,
) -> Result<Presentation, Pdf2DeckError> {
    stage(config, PresentationStage::FilterImages);
    let (pages, removed) = filter_small_images(pages, config.min_image_area);
    if removed > 0 {
        info!(
            "Filtered {} image(s) below {} px²",
            removed, config.min_image_area
        );
    }

    stage(config, PresentationStage::BuildIndex);
    let index = ImageIndex::build(&pages);
    info!(
        "Indexed {} images across {} pages",
        index.total_images(),
        pages.len()
    );

    let generator = resolve_text_generator(config)?;

    stage(config, PresentationStage::Themes);
    let themes = analyze_themes(generator.as_ref(), &pages, config).await?;

    stage(config, PresentationStage::Structure);
    let plans = create_structure(generator.as_ref(), &themes, &pages, config).await?;

    stage(config, PresentationStage::Sections);
    let total_sections = plans.len();
    let results: Vec<Option<GeneratedSection>> =
        stream::iter(plans.iter().enumerate().map(|(i, plan)| {
            let generator = generator.as_ref();
            let pages = &pages;
            let index = &index;
            async move {
                let result = generate_section(generator, plan, pages, index, config).await;
                let section = match result {
                    Ok(mut section) => {
                        bind_section(
                            &mut section,
                            index,
                            plan.target_images(config.default_target_images),
                        );
                        Some(section)
                    }
                    Err(e) => {
                        warn!("Section {} '{}' skipped: {}", i + 1, plan.title, e);
                        None
                    }
                };
                if let Some(ref cb) = config.progress_callback {
                    cb.on_section_complete(i + 1, total_sections, &plan.title, section.is_some());
                }
                section
            }
        }))
        .buffered(config.concurrency)
        .collect()
        .await;

    let sections: Vec<GeneratedSection> = results.into_iter().flatten().collect();
    let images_used = sections
        .iter()
        .flat_map(|s| s.images.iter().map(String::as_str))
        .collect::<HashSet<_>>()
        .len();

    let metadata = PresentationMetadata {
        total_pages: pages.len(),
        total_images_available: index.total_images(),
        total_sections: sections.len(),
        images_used,
        themes_identified: themes.themes.len(),
    };
    info!(
        "Presentation: {} sections, {} images used of {}",
        metadata.total_sections, metadata.images_used, metadata.total_images_available
    );

    Ok(Presentation {
        title: themes.document_title,
        document_type: themes.document_type,
        sections,
        metadata,
    })
}

/// Read an analysis artifact, build the presentation and write it.
///
/// On failure `output_path` receives `{"error": "<message>"}` and the error
/// is still returned. The analysis artifact is never touched.
pub async fn generate_presentation_from_file(
    analysis_path: &Path,
    output_path: &Path,
    config: &DeckConfig,
) -> Result<Presentation, Pdf2DeckError> {
    let result = match load_analysis(analysis_path).await {
        Ok(pages) => generate_presentation(&pages, config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(presentation) => {
            let json = serde_json::to_vec_pretty(&presentation)
                .map_err(|e| Pdf2DeckError::Internal(format!("serialise presentation: {e}")))?;
            write_atomic(output_path, &json).await?;
            info!("Wrote {}", output_path.display());
            Ok(presentation)
        }
        Err(e) => {
            warn!("Presentation failed: {}", e);
            let body = serde_json::json!({ "error": e.to_string() });
            let json = serde_json::to_vec_pretty(&body)
                .map_err(|se| Pdf2DeckError::Internal(format!("serialise error artifact: {se}")))?;
            write_atomic(output_path, &json).await?;
            Err(e)
        }
    }
}

/// PDF (path or URL) → `analysis_results.json` → `presentation.json`.
pub async fn run_pipeline(
    input: impl AsRef<str>,
    ctx: &RunContext,
    config: &DeckConfig,
) -> Result<PipelineOutput, Pdf2DeckError> {
    let analysis = analyze_pdf(input, ctx, config).await?;
    let presentation =
        generate_presentation_from_file(&ctx.analysis_path, &ctx.presentation_path, config).await?;
    Ok(PipelineOutput {
        analysis,
        presentation,
    })
}
