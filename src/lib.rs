//! # edgequake-pdf2deck
//!
//! Turn a PDF brochure into a themed slide presentation with image bindings.
//!
//! A vision model reads each page raster and proposes the relevant images as
//! rough percentage boxes. Classical region detection (blur, Canny, dilation,
//! outer contours) finds the real picture blocks on the raster, nearby blocks
//! are merged into grid clusters, and each proposal is snapped to its best
//! matching region before cropping. A text model then plans themes and
//! sections, and writes each section from its own source pages. Every image a
//! section ends up with is checked against the index of crops on those pages.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Render    rasterise pages via pdfium (spawn_blocking)
//!  ├─ 3. Analyse   vision model per page (concurrent)
//!  ├─ 4. Reconcile detect → cluster → match → crop → images/*.jpg
//!  │              └─ analysis_results.json
//!  ├─ 5. Plan      themes, then sections (two sequential calls)
//!  ├─ 6. Write     one call per section, source pages only
//!  └─ 7. Bind      validate and rank images → presentation.json
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2deck::{run_pipeline, DeckConfig, RunContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = DeckConfig::default();
//!     let ctx = RunContext::new("out/brochure");
//!     let output = run_pipeline("brochure.pdf", &ctx, &config).await?;
//!     println!("{} sections", output.presentation.sections.len());
//!     Ok(())
//! }
//! ```
//!
//! The two halves also run on their own: [`analyze_pdf`] stops after
//! `analysis_results.json`, and [`generate_presentation_from_file`] starts
//! from one.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2deck` binary (clap + anyhow + tracing-subscriber) |
//!
//! ```toml
//! edgequake-pdf2deck = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod present;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze_pdf, analyze_rasters, load_analysis, save_analysis};
pub use config::{DeckConfig, DeckConfigBuilder, PageSelection, RegionConfig};
pub use error::{ModelError, PageError, Pdf2DeckError, PlanningStage};
pub use output::{
    AnalysisOutput, AnalysisStats, BBox, ExtractedImage, GeneratedSection, PageRecord,
    Presentation, PresentationMetadata,
};
pub use present::{generate_presentation, generate_presentation_from_file, run_pipeline, PipelineOutput};
pub use progress::{DeckProgressCallback, NoopProgressCallback, ProgressCallback, PresentationStage};
pub use provider::{ImageProposal, PageAnalysis, PageAnalyzer, TextGenerator};
pub use session::RunContext;
