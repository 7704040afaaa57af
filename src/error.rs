//! Error types for the edgequake-pdf2deck library.
//!
//! Three error types map onto three failure scopes:
//!
//! * [`Pdf2DeckError`]: **Fatal** for a run: the input cannot be read, the
//!   PDF cannot be opened, no provider is configured, or a planning stage
//!   (themes / structure) failed. Returned as `Err(Pdf2DeckError)` from the
//!   top-level `analyze_*` / `generate_*` / `run_pipeline` functions.
//!
//! * [`PageError`]: **Non-fatal**: one page failed to render or process.
//!   Stored on the [`crate::output::PageRecord`]; every other page continues.
//!
//! * [`ModelError`]: a single generation call failed (transport, timeout) or
//!   returned something that is not the JSON we asked for. Call sites decide
//!   whether it degrades to an empty result or escalates to
//!   [`Pdf2DeckError::PlanningFailed`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2deck library.
#[derive(Debug, Error)]
pub enum Pdf2DeckError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the binary, set PDFIUM_LIB_PATH=/path/to/dir, or\n\
install it on the system library path.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A planning stage (themes or structure) produced no usable result.
    ///
    /// The page-analysis artifact is untouched, so the presentation stage can
    /// be retried with `--from-analysis`.
    #[error("Failed to {stage}: {detail}")]
    PlanningFailed { stage: PlanningStage, detail: String },

    // ── Artifact errors ───────────────────────────────────────────────────
    /// `analysis_results.json` could not be read or decoded.
    #[error("Failed to load analysis artifact '{path}': {detail}")]
    AnalysisUnreadable { path: PathBuf, detail: String },

    /// Could not create or write an output file or directory.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The two sequential planning calls whose failure aborts a presentation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PlanningStage {
    Themes,
    Structure,
}

impl std::fmt::Display for PlanningStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanningStage::Themes => f.write_str("analyze document themes"),
            PlanningStage::Structure => f.write_str("create presentation structure"),
        }
    }
}

/// A non-fatal error for a single page.
///
/// The page is still emitted in the analysis artifact (with no images) so
/// page numbering stays dense and downstream planning sees every page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Region detection, cropping or writing crops failed.
    #[error("Page {page}: image extraction failed: {detail}")]
    ExtractionFailed { page: usize, detail: String },
}

/// Failure of one generation call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    /// Network, auth, or rate-limit failure after all retries.
    #[error("model call failed after {retries} retries: {detail}")]
    Call { retries: u32, detail: String },

    /// The call did not return within the configured timeout.
    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The response was not the JSON shape the call site expected.
    #[error("model response is not valid JSON: {detail}")]
    Format { detail: String },
}
