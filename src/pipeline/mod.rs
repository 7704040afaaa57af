//! Pipeline stages for brochure analysis and presentation generation.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Page analysis
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ (PageAnalyzer) ──▶ detect ──▶ cluster ──▶ matcher ──▶ page
//! (URL/path) (pdfium)  (base64)    vision model      (canny)    (merge)     (score)    (crop+write)
//! ```
//!
//! ## Presentation
//!
//! ```text
//! index ──▶ plan (themes, structure) ──▶ section (per section) ──▶ bind (validate, rank)
//! ```
//!
//! [`llm`] and [`parse`] are shared by every model call: retry with
//! timeout, then lenient JSON decoding.

pub mod bind;
pub mod cluster;
pub mod detect;
pub mod encode;
pub mod index;
pub mod input;
pub mod llm;
pub mod matcher;
pub mod page;
pub mod parse;
pub mod plan;
pub mod render;
pub mod section;
