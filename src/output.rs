//! Artifact types produced by the two runs.
//!
//! Both artifacts are plain JSON so a failed presentation run can be retried
//! from the persisted analysis without re-rendering or re-calling the vision
//! model:
//!
//! ```text
//! analysis_results.json  [ PageRecord, ... ]          (page analysis run)
//! presentation.json      Presentation                 (presentation run)
//! images/page_{n}_img_{k}.jpg                          (crops)
//! ```

use crate::error::PageError;
use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle `[x1, y1, x2, y2]`, `x2`/`y2` exclusive.
///
/// Serialised as a four-element array. Used as the dedup key for crops on a
/// page, so equality is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct BBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.x1 as f64 + self.x2 as f64) / 2.0,
            (self.y1 as f64 + self.y2 as f64) / 2.0,
        )
    }

    /// Smallest box containing both.
    pub fn envelope(&self, other: &BBox) -> BBox {
        BBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Euclidean length of the per-axis gaps between two boxes.
    ///
    /// An axis on which the boxes overlap (or touch) contributes zero.
    pub fn gap_distance(&self, other: &BBox) -> f64 {
        let h_gap = if self.x2 < other.x1 {
            other.x1 - self.x2
        } else if other.x2 < self.x1 {
            self.x1 - other.x2
        } else {
            0
        };
        let v_gap = if self.y2 < other.y1 {
            other.y1 - self.y2
        } else if other.y2 < self.y1 {
            self.y1 - other.y2
        } else {
            0
        };
        ((h_gap as f64).powi(2) + (v_gap as f64).powi(2)).sqrt()
    }
}

impl From<[u32; 4]> for BBox {
    fn from(v: [u32; 4]) -> Self {
        BBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [u32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// A reconciled, persisted crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedImage {
    /// Where the re-encoded crop was written.
    pub saved_path: String,
    pub description: String,
    #[serde(default)]
    pub relevance: String,
    /// The vision model's box, in page percentages.
    pub vlm_coords_pct: [f64; 4],
    /// The pixel box that was actually cropped (before padding).
    pub actual_bbox: BBox,
    #[serde(default)]
    pub is_cluster: bool,
}

/// One page of the analysis artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// 1-based page number.
    pub page_num: usize,
    pub page_summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub images: Vec<ExtractedImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PageError>,
}

/// Counters for one page-analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisStats {
    /// Pages in the document.
    pub total_pages: usize,
    /// Pages that produced a record without a [`PageError`].
    pub processed_pages: usize,
    pub failed_pages: usize,
    pub images_extracted: usize,
    /// Crops that came from a merged cluster region.
    pub cluster_images: usize,
    /// Crops taken straight from the model's box because nothing was detected nearby.
    pub fallback_images: usize,
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of a page-analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    /// Ordered by page number.
    pub pages: Vec<PageRecord>,
    pub stats: AnalysisStats,
}

/// One slide of the generated presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSection {
    pub title: String,
    pub content: String,
    /// Crop paths; after validation every one belongs to a page in `source_pages`.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub key_takeaways: Vec<String>,
    #[serde(default)]
    pub source_pages: Vec<usize>,
    #[serde(default)]
    pub is_product_section: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresentationMetadata {
    pub total_pages: usize,
    pub total_images_available: usize,
    pub total_sections: usize,
    /// Distinct crop paths referenced by any section.
    pub images_used: usize,
    pub themes_identified: usize,
}

/// The presentation artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    pub title: String,
    pub document_type: String,
    pub sections: Vec<GeneratedSection>,
    #[serde(rename = "_metadata")]
    pub metadata: PresentationMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_serialises_as_array() {
        let b = BBox::new(130, 190, 580, 600);
        assert_eq!(serde_json::to_string(&b).unwrap(), "[130,190,580,600]");
        let back: BBox = serde_json::from_str("[1,2,3,4]").unwrap();
        assert_eq!(back, BBox::new(1, 2, 3, 4));
    }

    #[test]
    fn bbox_geometry() {
        let b = BBox::new(130, 190, 580, 600);
        assert_eq!(b.width(), 450);
        assert_eq!(b.height(), 410);
        assert_eq!(b.area(), 184_500);
        assert_eq!(b.center(), (355.0, 395.0));
    }

    #[test]
    fn gap_distance_overlapping_is_zero() {
        let a = BBox::new(0, 0, 100, 100);
        let b = BBox::new(50, 50, 150, 150);
        assert_eq!(a.gap_distance(&b), 0.0);
    }

    #[test]
    fn gap_distance_diagonal() {
        let a = BBox::new(0, 0, 10, 10);
        let b = BBox::new(13, 14, 20, 20);
        assert_eq!(a.gap_distance(&b), 5.0);
        assert_eq!(b.gap_distance(&a), 5.0);
    }

    #[test]
    fn presentation_metadata_key_is_underscored() {
        let p = Presentation {
            title: "Deck".into(),
            document_type: "brochure".into(),
            sections: vec![],
            metadata: PresentationMetadata::default(),
        };
        let v = serde_json::to_value(&p).unwrap();
        assert!(v.get("_metadata").is_some());
        assert!(v.get("metadata").is_none());
    }

    #[test]
    fn page_record_without_error_omits_field() {
        let rec = PageRecord {
            page_num: 1,
            page_summary: "Cover".into(),
            key_points: vec![],
            images: vec![],
            error: None,
        };
        let v = serde_json::to_value(&rec).unwrap();
        assert!(v.get("error").is_none());
    }
}
