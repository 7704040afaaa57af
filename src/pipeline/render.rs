//! PDF rasterisation via pdfium, in `spawn_blocking`.
//!
//! Pages are rendered at `dpi / 72` scale (PDF user space is 72 units per
//! inch), so pixel thresholds in [`crate::config::RegionConfig`] mean the
//! same thing on every document. A page whose longest edge would exceed
//! `max_pixels` is scaled down to that edge instead; an A0 poster at 150 DPI
//! would otherwise be about 12,000 × 17,000 px. A page that fails to render
//! is reported as a [`PageError`] and the remaining pages continue.

use crate::config::PageSelection;
use crate::error::{PageError, Pdf2DeckError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Rendered rasters for the selected pages, in page order.
pub struct RenderedDocument {
    pub total_pages: usize,
    /// `(page_index_0based, raster or error)`.
    pub pages: Vec<(usize, Result<DynamicImage, PageError>)>,
}

/// Bind to pdfium: next to the binary, then `PDFIUM_LIB_PATH`, then the system library.
pub fn create_pdfium() -> Result<Pdfium, Pdf2DeckError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            let dir = std::env::var("PDFIUM_LIB_PATH").unwrap_or_else(|_| "./vendor/pdfium/lib/".into());
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Pdf2DeckError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Render the selected pages of a PDF.
///
/// Fails only when the document cannot be opened or the selection matches no page.
pub async fn render_pages(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
    selection: &PageSelection,
) -> Result<RenderedDocument, Pdf2DeckError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);
    let selection = selection.clone();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, dpi, max_pixels, password.as_deref(), &selection)
    })
    .await
    .map_err(|e| Pdf2DeckError::Internal(format!("Render task panicked: {}", e)))?
}

fn open_error(pdf_path: &Path, password: Option<&str>, e: PdfiumError) -> Pdf2DeckError {
    let err_str = format!("{:?}", e);
    if err_str.to_lowercase().contains("password") {
        if password.is_some() {
            Pdf2DeckError::WrongPassword {
                path: pdf_path.to_path_buf(),
            }
        } else {
            Pdf2DeckError::PasswordRequired {
                path: pdf_path.to_path_buf(),
            }
        }
    } else {
        Pdf2DeckError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: err_str,
        }
    }
}

/// Points-to-pixels factor for a page: `dpi / 72`, lowered so the longest
/// edge stays within `max_pixels`.
pub fn render_scale(dpi: u32, width_pts: f32, height_pts: f32, max_pixels: u32) -> f32 {
    let scale = dpi as f32 / 72.0;
    let longest = width_pts.max(height_pts);
    if longest <= 0.0 || longest * scale <= max_pixels as f32 {
        return scale;
    }
    max_pixels as f32 / longest
}

fn render_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
    selection: &PageSelection,
) -> Result<RenderedDocument, Pdf2DeckError> {
    let pdfium = create_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| open_error(pdf_path, password, e))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let indices = selection.to_indices(total_pages);
    if indices.is_empty() {
        let page = match selection {
            PageSelection::Single(p) => *p,
            PageSelection::Range(start, _) => *start,
            PageSelection::Set(set) => set.first().copied().unwrap_or(0),
            PageSelection::All => 0,
        };
        return Err(Pdf2DeckError::PageOutOfRange {
            page,
            total: total_pages,
        });
    }

    let rendered = indices
        .into_iter()
        .map(|idx| {
            let result = render_one(&pages, idx, dpi, max_pixels).map_err(|e| {
                PageError::RenderFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            });
            if let Ok(ref image) = result {
                debug!(
                    "Rendered page {} → {}x{} px",
                    idx + 1,
                    image.width(),
                    image.height()
                );
            }
            (idx, result)
        })
        .collect();

    Ok(RenderedDocument {
        total_pages,
        pages: rendered,
    })
}

fn render_one(
    pages: &PdfPages,
    idx: usize,
    dpi: u32,
    max_pixels: u32,
) -> Result<DynamicImage, PdfiumError> {
    let page = pages.get(idx as u16)?;
    let scale = render_scale(dpi, page.width().value, page.height().value, max_pixels);
    if scale < dpi as f32 / 72.0 {
        warn!(
            "Page {}: {:.0}x{:.0} pt exceeds {} px at {} DPI, rendering at scale {:.2}",
            idx + 1,
            page.width().value,
            page.height().value,
            max_pixels,
            dpi,
            scale
        );
    }
    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let bitmap = page.render_with_config(&render_config)?;
    Ok(bitmap.as_image())
}
