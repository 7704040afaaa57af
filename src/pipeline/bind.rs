//! Section image binding: validate the model's picks, then re-rank.
//!
//! Both passes are pure functions of the section and the read-only
//! [`ImageIndex`]:
//!
//! 1. [`validate_image_bindings`] drops any path not indexed on one of the
//!    section's source pages and backfills from those pages up to the
//!    original count.
//! 2. [`enhance_image_matching`] scores every source-page image by keyword
//!    overlap with the section text (`overlap × page_bonus + 1`, bonus 3 on
//!    the first source page) and assembles the final list. Product sections
//!    keep their validated picks and fill from the ranking. Generic sections
//!    keep only validated picks that also rank in the top `2 × target`, then
//!    fill from the ranking.
//!
//! Every candidate comes from the source pages, so the final list never
//! references another page.

use super::index::{extract_keywords, ImageIndex};
use crate::output::GeneratedSection;
use std::collections::HashSet;
use tracing::debug;

const PRIMARY_PAGE_BONUS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredImage {
    pub path: String,
    pub page: usize,
    pub score: usize,
}

/// Keep only source-page images; backfill what was dropped.
pub fn validate_image_bindings(section: &mut GeneratedSection, index: &ImageIndex) {
    let valid = index.paths_on(&section.source_pages);
    let original = section.images.len();

    let mut seen = HashSet::new();
    let mut kept: Vec<String> = Vec::with_capacity(original);
    for path in &section.images {
        if !valid.contains(path.as_str()) {
            debug!(
                "Section '{}': {} is not on pages {:?} (indexed on {:?})",
                section.title,
                path,
                section.source_pages,
                index.page_of(path)
            );
            continue;
        }
        if seen.insert(path.as_str()) {
            kept.push(path.clone());
        }
    }

    let dropped = original - kept.len();
    if dropped > 0 {
        debug!(
            "Section '{}': dropped {} image(s) outside source pages",
            section.title, dropped
        );
        let mut needed = dropped;
        'fill: for page in &section.source_pages {
            for entry in index.entries(*page) {
                if needed == 0 {
                    break 'fill;
                }
                if !kept.contains(&entry.path) {
                    kept.push(entry.path.clone());
                    needed -= 1;
                }
            }
        }
    }

    section.images = kept;
}

/// Rank source-page images by keyword overlap with the section text.
///
/// Sorted by descending score; equal scores keep source-page order.
pub fn score_images(section: &GeneratedSection, index: &ImageIndex) -> Vec<ScoredImage> {
    let content_keywords = extract_keywords(&format!("{} {}", section.content, section.title));
    let primary = section.source_pages.first().copied();

    let mut scored: Vec<ScoredImage> = Vec::new();
    let mut seen = HashSet::new();
    for &page in &section.source_pages {
        let bonus = if Some(page) == primary { PRIMARY_PAGE_BONUS } else { 1 };
        for entry in index.entries(page) {
            if !seen.insert(entry.path.as_str()) {
                continue;
            }
            let overlap = entry.keywords.intersection(&content_keywords).count();
            scored.push(ScoredImage {
                path: entry.path.clone(),
                page,
                score: overlap * bonus + 1,
            });
        }
    }

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}

/// Final image list for a section, at most `target_count` long.
pub fn enhance_image_matching(
    section: &mut GeneratedSection,
    index: &ImageIndex,
    target_count: usize,
) {
    let scored = score_images(section, index);
    let valid = index.paths_on(&section.source_pages);
    let validated: Vec<&String> = section
        .images
        .iter()
        .filter(|p| valid.contains(p.as_str()))
        .collect();

    let mut final_images: Vec<String> = if section.is_product_section {
        validated.into_iter().cloned().collect()
    } else {
        let pool: HashSet<&str> = scored
            .iter()
            .take(target_count * 2)
            .map(|s| s.path.as_str())
            .collect();
        validated
            .into_iter()
            .filter(|p| pool.contains(p.as_str()))
            .cloned()
            .collect()
    };

    for candidate in &scored {
        if final_images.len() >= target_count {
            break;
        }
        if !final_images.contains(&candidate.path) {
            final_images.push(candidate.path.clone());
        }
    }

    final_images.truncate(target_count);
    section.images = final_images;
}

/// Validate, then rank. The order every section goes through.
pub fn bind_section(section: &mut GeneratedSection, index: &ImageIndex, target_count: usize) {
    validate_image_bindings(section, index);
    enhance_image_matching(section, index, target_count);
}
