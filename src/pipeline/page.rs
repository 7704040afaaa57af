//! Page processing: turn one page raster plus its analysis into persisted crops.
//!
//! Per page: detect → cluster → for each proposal, match (or fall back) →
//! skip boxes already used on this page → crop with padding → resize and
//! encode → write `images/page_{n}_img_{k}.jpg`.
//!
//! Everything here is synchronous and CPU-bound; [`crate::analyze`] runs it
//! in `spawn_blocking`, one task per page, so each task owns its raster and
//! region list.

use super::cluster::cluster_regions;
use super::detect::{detect_regions, CandidateRegion};
use super::encode::encode_crop;
use super::matcher::{fallback_bbox, find_best_region};
use crate::config::{DeckConfig, RegionConfig};
use crate::error::PageError;
use crate::output::{BBox, ExtractedImage, PageRecord};
use crate::provider::{ImageProposal, PageAnalysis};
use crate::session::RunContext;
use image::DynamicImage;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// How a crop box was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    /// A detected region (possibly a cluster) matched the proposal.
    Matched,
    /// Nothing was close enough; the proposal's own box was used.
    Fallback,
}

/// One crop decided for a page, before it is cut and written.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub bbox: BBox,
    pub is_cluster: bool,
    pub cluster_count: usize,
    pub source: SelectionSource,
    pub coords_pct: [f64; 4],
    pub description: String,
    pub relevance: String,
}

/// Result of processing one page.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub record: PageRecord,
    pub cluster_images: usize,
    pub fallback_images: usize,
}

fn proposal_coords(proposal: &ImageProposal) -> Option<[f64; 4]> {
    let c = &proposal.coordinates_pct;
    if c.len() != 4 || c.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some([c[0], c[1], c[2], c[3]])
}

/// Decide the crop boxes for a page. No two selections share a box.
pub fn select_regions(
    page: &DynamicImage,
    proposals: &[ImageProposal],
    config: &RegionConfig,
) -> Vec<Selection> {
    if proposals.is_empty() {
        return Vec::new();
    }
    let (w, h) = (page.width(), page.height());
    let detected = detect_regions(page, config);
    let regions = cluster_regions(&detected, w, h, config);
    let clusters = regions.iter().filter(|r| r.is_cluster).count();
    debug!(
        "{} detected regions, {} after merging ({} clusters)",
        detected.len(),
        regions.len(),
        clusters
    );
    reconcile(proposals, &regions, w, h, config)
}

/// Match every proposal against already-clustered regions.
pub fn reconcile(
    proposals: &[ImageProposal],
    regions: &[CandidateRegion],
    page_width: u32,
    page_height: u32,
    config: &RegionConfig,
) -> Vec<Selection> {
    let mut used: HashSet<BBox> = HashSet::new();
    let mut out = Vec::new();

    for (idx, proposal) in proposals.iter().enumerate() {
        let Some(coords) = proposal_coords(proposal) else {
            info!("Skipping image {}: invalid coordinates", idx + 1);
            continue;
        };

        let selection = if let Some(region) =
            find_best_region(&coords, regions, page_width, page_height, config)
        {
            Selection {
                bbox: region.bbox,
                is_cluster: region.is_cluster,
                cluster_count: region.cluster_count,
                source: SelectionSource::Matched,
                coords_pct: coords,
                description: proposal.description.clone(),
                relevance: proposal.relevance.clone(),
            }
        } else if let Some(bbox) = fallback_bbox(&coords, page_width, page_height, config) {
            Selection {
                bbox,
                is_cluster: proposal.is_cluster,
                cluster_count: 1,
                source: SelectionSource::Fallback,
                coords_pct: coords,
                description: proposal.description.clone(),
                relevance: proposal.relevance.clone(),
            }
        } else {
            info!("No matching region for image {}", idx + 1);
            continue;
        };

        if !used.insert(selection.bbox) {
            info!("Skipping duplicate region for image {}", idx + 1);
            continue;
        }
        out.push(selection);
    }

    out
}

/// Cut `bbox` out of the page, grown by `padding` on each side and clamped.
pub fn crop_with_padding(page: &DynamicImage, bbox: &BBox, padding: u32) -> DynamicImage {
    let (w, h) = (page.width(), page.height());
    let x1 = bbox.x1.saturating_sub(padding).min(w);
    let y1 = bbox.y1.saturating_sub(padding).min(h);
    let x2 = bbox.x2.saturating_add(padding).min(w);
    let y2 = bbox.y2.saturating_add(padding).min(h);
    page.crop_imm(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1))
}

fn save_crop(
    page_num: usize,
    crop: &DynamicImage,
    path: &Path,
    config: &DeckConfig,
) -> Result<(), PageError> {
    let bytes = encode_crop(crop, config.max_image_width, config.image_quality).map_err(|e| {
        PageError::ExtractionFailed {
            page: page_num,
            detail: format!("encode failed: {e}"),
        }
    })?;
    std::fs::write(path, &bytes).map_err(|e| PageError::ExtractionFailed {
        page: page_num,
        detail: format!("write {} failed: {e}", path.display()),
    })
}

/// Remove crops already written for a page whose record becomes an error record.
fn discard_crops(page_num: usize, images: &[ExtractedImage]) {
    for image in images {
        if let Err(e) = std::fs::remove_file(&image.saved_path) {
            warn!(
                "Page {}: could not remove {}: {}",
                page_num, image.saved_path, e
            );
        }
    }
}

/// Run the full per-page chain and persist the crops.
///
/// On error no crop of this page is left on disk.
pub fn process_page_image(
    page_num: usize,
    page: &DynamicImage,
    analysis: PageAnalysis,
    ctx: &RunContext,
    config: &DeckConfig,
) -> Result<PageOutcome, PageError> {
    let selections = select_regions(page, &analysis.relevant_images, &config.regions);

    let mut images = Vec::with_capacity(selections.len());
    let mut cluster_images = 0;
    let mut fallback_images = 0;

    for selection in selections {
        let crop = crop_with_padding(page, &selection.bbox, config.regions.crop_padding_px);
        if crop.width() == 0 || crop.height() == 0 {
            continue;
        }
        let path = ctx.image_path(page_num, images.len() + 1);
        if let Err(e) = save_crop(page_num, &crop, &path, config) {
            discard_crops(page_num, &images);
            return Err(e);
        }

        if selection.is_cluster {
            cluster_images += 1;
        }
        if selection.source == SelectionSource::Fallback {
            fallback_images += 1;
        }
        debug!(
            "Page {}: saved {} ({:?}, cluster of {})",
            page_num,
            path.display(),
            selection.source,
            selection.cluster_count
        );

        images.push(ExtractedImage {
            saved_path: path.to_string_lossy().into_owned(),
            description: selection.description,
            relevance: selection.relevance,
            vlm_coords_pct: selection.coords_pct,
            actual_bbox: selection.bbox,
            is_cluster: selection.is_cluster,
        });
    }

    Ok(PageOutcome {
        record: PageRecord {
            page_num,
            page_summary: analysis.page_summary,
            key_points: analysis.key_points,
            images,
            error: None,
        },
        cluster_images,
        fallback_images,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn proposal(coords: Vec<f64>) -> ImageProposal {
        ImageProposal {
            description: "photo".into(),
            relevance: "hero".into(),
            coordinates_pct: coords,
            is_cluster: false,
        }
    }

    #[test]
    fn two_proposals_on_one_region_yield_one_selection() {
        let regions = [CandidateRegion::single(BBox::new(100, 100, 400, 400))];
        let proposals = [
            proposal(vec![10.0, 10.0, 40.0, 40.0]),
            proposal(vec![12.0, 12.0, 38.0, 38.0]),
        ];
        let out = reconcile(&proposals, &regions, 1000, 1000, &RegionConfig::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, SelectionSource::Matched);
    }

    #[test]
    fn unmatched_proposal_falls_back_or_is_skipped() {
        let proposals = [
            proposal(vec![50.0, 50.0, 80.0, 80.0]), // large: fallback crop
            proposal(vec![1.0, 1.0, 3.0, 3.0]),     // tiny: skipped
            proposal(vec![1.0, 2.0]),               // malformed: skipped
        ];
        let out = reconcile(&proposals, &[], 1000, 1000, &RegionConfig::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, SelectionSource::Fallback);
        assert_eq!(out[0].bbox, BBox::new(500, 500, 800, 800));
    }

    #[test]
    fn duplicate_fallback_boxes_are_dropped() {
        let proposals = [
            proposal(vec![50.0, 50.0, 80.0, 80.0]),
            proposal(vec![50.0, 50.0, 80.0, 80.0]),
        ];
        let out = reconcile(&proposals, &[], 1000, 1000, &RegionConfig::default());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn padding_is_clamped_to_page() {
        let page = DynamicImage::ImageRgb8(RgbImage::new(200, 100));
        let crop = crop_with_padding(&page, &BBox::new(2, 10, 198, 99), 5);
        assert_eq!((crop.width(), crop.height()), (200, 95));
        let crop = crop_with_padding(&page, &BBox::new(50, 20, 100, 60), 5);
        assert_eq!((crop.width(), crop.height()), (60, 50));
    }

    #[test]
    fn processed_page_writes_numbered_crops() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = RunContext::new(dir.path());
        std::fs::create_dir_all(&ctx.images_dir).unwrap();

        let mut page = RgbImage::from_pixel(1000, 1000, Rgb([255, 255, 255]));
        for y in 200..500 {
            for x in 100..500 {
                page.put_pixel(x, y, Rgb([30, 90, 160]));
            }
        }
        let analysis = PageAnalysis {
            page_summary: "Window range".into(),
            key_points: vec!["Triple glazing".into()],
            relevant_images: vec![
                proposal(vec![11.0, 21.0, 49.0, 49.0]),
                proposal(vec![60.0, 60.0, 90.0, 90.0]),
            ],
        };

        let outcome = process_page_image(
            3,
            &DynamicImage::ImageRgb8(page),
            analysis,
            &ctx,
            &DeckConfig::default(),
        )
        .unwrap();

        let images = &outcome.record.images;
        assert_eq!(images.len(), 2);
        assert_eq!(outcome.fallback_images, 1);
        assert!(images[0].saved_path.ends_with("page_3_img_1.jpg"));
        assert!(images[1].saved_path.ends_with("page_3_img_2.jpg"));
        assert!(std::path::Path::new(&images[0].saved_path).exists());
        assert_ne!(images[0].actual_bbox, images[1].actual_bbox);
        assert_eq!(images[1].actual_bbox, BBox::new(600, 600, 900, 900));
    }

    #[test]
    fn failed_write_leaves_no_crops_behind() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = RunContext::new(dir.path());
        std::fs::create_dir_all(&ctx.images_dir).unwrap();
        // A directory where the second crop should go makes its write fail.
        std::fs::create_dir_all(ctx.image_path(4, 2)).unwrap();

        let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(1000, 1000, Rgb([255, 255, 255])));
        let analysis = PageAnalysis {
            page_summary: "Accessories".into(),
            key_points: vec![],
            relevant_images: vec![
                proposal(vec![10.0, 10.0, 40.0, 40.0]),
                proposal(vec![60.0, 60.0, 90.0, 90.0]),
            ],
        };

        let err = process_page_image(4, &page, analysis, &ctx, &DeckConfig::default()).unwrap_err();
        assert!(matches!(err, PageError::ExtractionFailed { page: 4, .. }));
        assert!(!ctx.image_path(4, 1).exists());
    }
}
