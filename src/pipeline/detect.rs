//! Region detection: classical CV over a page raster.
//!
//! ```text
//! gray ─▶ gaussian blur ─▶ canny ─▶ dilate (7×7 ×3 ≈ L∞ radius 9) ─▶ outer contours ─▶ boxes
//! ```
//!
//! Dilation bridges the broken edges of photos and diagrams into solid blobs,
//! so each figure yields one outer contour. Boxes are then filtered by
//! [`filter_and_rank`]: the area floor removes logos and icons, the aspect
//! cap removes rule lines and text rows.

use crate::config::RegionConfig;
use crate::output::BBox;
use image::{DynamicImage, GrayImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;
use tracing::debug;

/// A rectangular area that may hold a figure, or a merged group of them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateRegion {
    pub bbox: BBox,
    pub center: (f64, f64),
    pub area: u64,
    pub is_cluster: bool,
    /// Number of detected regions merged into this one (1 for singletons).
    pub cluster_count: usize,
}

impl CandidateRegion {
    pub fn single(bbox: BBox) -> Self {
        Self {
            bbox,
            center: bbox.center(),
            area: bbox.area(),
            is_cluster: false,
            cluster_count: 1,
        }
    }
}

/// Detect candidate regions on a page, largest area first.
pub fn detect_regions(page: &DynamicImage, config: &RegionConfig) -> Vec<CandidateRegion> {
    let gray = page.to_luma8();
    let mask = edge_mask(&gray, config);
    let boxes = outer_contour_boxes(&mask);
    let regions = filter_and_rank(&boxes, gray.width(), gray.height(), config);
    debug!(
        "{} contours → {} candidate regions",
        boxes.len(),
        regions.len()
    );
    regions
}

fn edge_mask(gray: &GrayImage, config: &RegionConfig) -> GrayImage {
    let blurred = gaussian_blur_f32(gray, config.blur_sigma);
    let edges = canny(&blurred, config.canny_low, config.canny_high);
    dilate(&edges, Norm::LInf, config.dilation_radius)
}

/// Bounding boxes of the top-level outer contours of a binary mask.
///
/// `x2`/`y2` are exclusive, so a contour spanning columns 10..=49 gives width 40.
pub fn outer_contour_boxes(mask: &GrayImage) -> Vec<BBox> {
    find_contours::<u32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| {
            let first = c.points.first()?;
            let (mut x1, mut y1, mut x2, mut y2) = (first.x, first.y, first.x, first.y);
            for p in &c.points {
                x1 = x1.min(p.x);
                y1 = y1.min(p.y);
                x2 = x2.max(p.x);
                y2 = y2.max(p.y);
            }
            Some(BBox::new(x1, y1, x2 + 1, y2 + 1))
        })
        .collect()
}

/// Keep plausible figure boxes and sort them by area, largest first.
///
/// A box survives when its area is at least `min_area_fraction` of the page,
/// both sides exceed `min_side_px`, and its aspect ratio stays below
/// `max_aspect_ratio`.
pub fn filter_and_rank(
    boxes: &[BBox],
    page_width: u32,
    page_height: u32,
    config: &RegionConfig,
) -> Vec<CandidateRegion> {
    let min_area = page_width as f64 * page_height as f64 * config.min_area_fraction;

    let mut regions: Vec<CandidateRegion> = boxes
        .iter()
        .filter(|b| {
            let (w, h) = (b.width(), b.height());
            if w <= config.min_side_px || h <= config.min_side_px {
                return false;
            }
            if (b.area() as f64) < min_area {
                return false;
            }
            let aspect = w.max(h) as f64 / w.min(h) as f64;
            aspect < config.max_aspect_ratio
        })
        .map(|b| CandidateRegion::single(*b))
        .collect();

    regions.sort_by(|a, b| b.area.cmp(&a.area));
    regions
}
