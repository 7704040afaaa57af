//! Progress-callback trait for run, page, stage and section events.
//!
//! Inject an [`Arc<dyn DeckProgressCallback>`] via
//! [`crate::config::DeckConfigBuilder::progress_callback`]. Callers forward
//! events wherever they like (terminal bar, channel, database row); the
//! library only guarantees the call order documented on each method.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2deck::{DeckConfig, DeckProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     images: AtomicUsize,
//! }
//!
//! impl DeckProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, _page_num: usize, _total_pages: usize, image_count: usize) {
//!         self.images.fetch_add(image_count, Ordering::SeqCst);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { images: AtomicUsize::new(0) });
//! let config = DeckConfig::builder()
//!     .progress_callback(cb as Arc<dyn DeckProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Named steps of the presentation run, reported through
/// [`DeckProgressCallback::on_stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationStage {
    FilterImages,
    BuildIndex,
    Themes,
    Structure,
    Sections,
}

impl PresentationStage {
    pub fn label(&self) -> &'static str {
        match self {
            PresentationStage::FilterImages => "Filtering small images",
            PresentationStage::BuildIndex => "Building image index",
            PresentationStage::Themes => "Analyzing document themes",
            PresentationStage::Structure => "Creating presentation structure",
            PresentationStage::Sections => "Generating section content",
        }
    }
}

/// Called by both runs as they progress.
///
/// Implementations must be `Send + Sync`: page and section events arrive
/// concurrently from worker tasks. All methods default to no-ops.
pub trait DeckProgressCallback: Send + Sync {
    /// Called once before any page is rendered, with the number of selected pages.
    fn on_analysis_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the page is sent to the vision model.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page's crops are persisted.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, image_count: usize) {
        let _ = (page_num, total_pages, image_count);
    }

    /// Called when a page fails to render or extract.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after all selected pages were attempted.
    fn on_analysis_complete(&self, total_pages: usize, images_extracted: usize) {
        let _ = (total_pages, images_extracted);
    }

    /// Called when a presentation stage begins.
    fn on_stage(&self, stage: PresentationStage) {
        let _ = stage;
    }

    /// Called as each section's content has been written and validated.
    ///
    /// `generated` is false when the section was skipped.
    fn on_section_complete(&self, index: usize, total_sections: usize, title: &str, generated: bool) {
        let _ = (index, total_sections, title, generated);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl DeckProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DeckConfig`].
pub type ProgressCallback = Arc<dyn DeckProgressCallback>;
