//! Region clustering: merge nearby candidate regions into one cluster region.
//!
//! Two boxes are nearby when the Euclidean length of their per-axis gaps
//! ([`BBox::gap_distance`]) is strictly below `cluster_distance_pct` of the
//! longer page side. The seed pass walks regions in order; each unmerged seed
//! absorbs every later unmerged region nearby to it. Passes repeat until one
//! merges nothing, so the output never contains a nearby pair.

use super::detect::CandidateRegion;
use crate::config::RegionConfig;
use tracing::debug;

/// Merge threshold in pixels for a page.
pub fn merge_threshold(page_width: u32, page_height: u32, config: &RegionConfig) -> f64 {
    page_width.max(page_height) as f64 * config.cluster_distance_pct / 100.0
}

pub fn is_nearby(a: &CandidateRegion, b: &CandidateRegion, threshold: f64) -> bool {
    a.bbox.gap_distance(&b.bbox) < threshold
}

/// Merge nearby regions. Singletons pass through unchanged.
pub fn cluster_regions(
    regions: &[CandidateRegion],
    page_width: u32,
    page_height: u32,
    config: &RegionConfig,
) -> Vec<CandidateRegion> {
    let threshold = merge_threshold(page_width, page_height, config);
    let mut current = regions.to_vec();
    let mut passes = 0;

    loop {
        passes += 1;
        let (next, merged_any) = seed_pass(&current, threshold);
        current = next;
        if !merged_any {
            break;
        }
    }

    debug!(
        "Clustered {} regions into {} ({} passes)",
        regions.len(),
        current.len(),
        passes
    );
    current
}

fn seed_pass(regions: &[CandidateRegion], threshold: f64) -> (Vec<CandidateRegion>, bool) {
    let mut merged = vec![false; regions.len()];
    let mut out = Vec::with_capacity(regions.len());
    let mut merged_any = false;

    for i in 0..regions.len() {
        if merged[i] {
            continue;
        }
        let seed = &regions[i];
        let mut envelope = seed.bbox;
        let mut count = seed.cluster_count;
        let mut members = 1;

        for j in (i + 1)..regions.len() {
            if merged[j] || !is_nearby(seed, &regions[j], threshold) {
                continue;
            }
            merged[j] = true;
            envelope = envelope.envelope(&regions[j].bbox);
            count += regions[j].cluster_count;
            members += 1;
        }

        if members > 1 {
            merged_any = true;
            out.push(CandidateRegion {
                bbox: envelope,
                center: envelope.center(),
                area: envelope.area(),
                is_cluster: true,
                cluster_count: count,
            });
        } else {
            out.push(*seed);
        }
    }

    (out, merged_any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::BBox;

    fn region(x1: u32, y1: u32, x2: u32, y2: u32) -> CandidateRegion {
        CandidateRegion::single(BBox::new(x1, y1, x2, y2))
    }

    #[test]
    fn two_close_boxes_merge_into_envelope() {
        let regions = [region(10, 10, 50, 50), region(55, 12, 90, 52)];
        let out = cluster_regions(&regions, 1000, 1000, &RegionConfig::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox, BBox::new(10, 10, 90, 52));
        assert!(out[0].is_cluster);
        assert_eq!(out[0].cluster_count, 2);
        assert_eq!(out[0].area, 80 * 42);
    }

    #[test]
    fn distant_boxes_stay_single() {
        let regions = [region(0, 0, 100, 100), region(300, 300, 400, 400)];
        let out = cluster_regions(&regions, 1000, 1000, &RegionConfig::default());
        assert_eq!(out, regions.to_vec());
    }

    #[test]
    fn threshold_is_strict() {
        // gap exactly 50 on a 1000 px page does not merge
        let regions = [region(0, 0, 100, 100), region(150, 0, 250, 100)];
        let out = cluster_regions(&regions, 1000, 1000, &RegionConfig::default());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn merged_envelope_absorbs_new_neighbours_on_later_pass() {
        // c is only near the envelope of a+b, not near the seed a
        let regions = [
            region(0, 0, 100, 100),
            region(140, 0, 240, 100),
            region(280, 0, 380, 100),
        ];
        let out = cluster_regions(&regions, 1000, 1000, &RegionConfig::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox, BBox::new(0, 0, 380, 100));
        assert_eq!(out[0].cluster_count, 3);
    }

    #[test]
    fn clustering_is_idempotent() {
        let regions = [
            region(10, 10, 50, 50),
            region(55, 12, 90, 52),
            region(400, 400, 600, 600),
            region(640, 420, 800, 600),
            region(100, 800, 200, 900),
        ];
        let cfg = RegionConfig::default();
        let once = cluster_regions(&regions, 1000, 1000, &cfg);
        let twice = cluster_regions(&once, 1000, 1000, &cfg);
        assert_eq!(once, twice);
    }
}
