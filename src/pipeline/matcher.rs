//! Region matching: reconcile a model's percentage box with detected regions.
//!
//! For every candidate whose center lies within `max_distance_pct` of the
//! page diagonal from the proposal center:
//!
//! ```text
//! score = distance × (2 − min(area, proposal_area) / max(area, proposal_area))
//! ```
//!
//! The lowest score wins; ties keep the earlier candidate. The area ratio is
//! 0 when the proposal area is not positive. When nothing is in range,
//! [`fallback_bbox`] crops the proposal itself if it is large enough.

use super::detect::CandidateRegion;
use crate::config::RegionConfig;
use crate::output::BBox;

/// Proposal box converted to (fractional) pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl PixelBox {
    pub fn from_pct(pct: &[f64; 4], page_width: u32, page_height: u32) -> Self {
        let (w, h) = (page_width as f64, page_height as f64);
        Self {
            x1: pct[0] * w / 100.0,
            y1: pct[1] * h / 100.0,
            x2: pct[2] * w / 100.0,
            y2: pct[3] * h / 100.0,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Signed area; inverted boxes are negative.
    pub fn area(&self) -> f64 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }
}

/// `min/max` of the two areas, or 0 for a non-positive proposal area.
pub fn area_ratio(region_area: f64, proposal_area: f64) -> f64 {
    if proposal_area <= 0.0 {
        return 0.0;
    }
    let hi = region_area.max(proposal_area);
    if hi <= 0.0 {
        return 0.0;
    }
    region_area.min(proposal_area) / hi
}

pub fn match_score(distance: f64, region_area: f64, proposal_area: f64) -> f64 {
    distance * (2.0 - area_ratio(region_area, proposal_area))
}

/// Pick the best candidate for a proposal, if any is close enough.
pub fn find_best_region<'a>(
    pct: &[f64; 4],
    regions: &'a [CandidateRegion],
    page_width: u32,
    page_height: u32,
    config: &RegionConfig,
) -> Option<&'a CandidateRegion> {
    let proposal = PixelBox::from_pct(pct, page_width, page_height);
    let (cx, cy) = proposal.center();
    let proposal_area = proposal.area();

    let diagonal = (page_width as f64).hypot(page_height as f64);
    let max_distance = diagonal * config.max_distance_pct / 100.0;

    let mut best: Option<(&CandidateRegion, f64)> = None;
    for region in regions {
        let distance = (region.center.0 - cx).hypot(region.center.1 - cy);
        if distance > max_distance {
            continue;
        }
        let score = match_score(distance, region.area as f64, proposal_area);
        if best.is_none_or(|(_, s)| score < s) {
            best = Some((region, score));
        }
    }
    best.map(|(r, _)| r)
}

/// Pixel box of the proposal itself, used when no region matched.
///
/// Coordinates are truncated to whole pixels and clamped to the page. Returns
/// `None` when the box covers less than `fallback_min_area_fraction` of the page.
pub fn fallback_bbox(
    pct: &[f64; 4],
    page_width: u32,
    page_height: u32,
    config: &RegionConfig,
) -> Option<BBox> {
    let p = PixelBox::from_pct(pct, page_width, page_height);
    let clamp_x = |v: f64| v.clamp(0.0, page_width as f64) as u32;
    let clamp_y = |v: f64| v.clamp(0.0, page_height as f64) as u32;
    let bbox = BBox::new(clamp_x(p.x1), clamp_y(p.y1), clamp_x(p.x2), clamp_y(p.y2));

    let min_area = page_width as f64 * page_height as f64 * config.fallback_min_area_fraction;
    if bbox.area() == 0 || (bbox.area() as f64) < min_area {
        return None;
    }
    Some(bbox)
}
