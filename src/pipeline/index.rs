//! Page → image lookup used to bind and rank section images.
//!
//! Keywords are lowercase alphabetic tokens of three or more letters with
//! stopwords removed, drawn from each crop's description and relevance.

use crate::output::PageRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::info;

static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[a-z]{3,}\b").unwrap());

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "with", "this", "that", "from", "are", "was", "were", "been",
        "being", "have", "has", "had", "does", "did", "will", "would", "could", "should", "may",
        "might", "must", "shall", "can", "need", "into", "through", "during", "before", "after",
        "above", "below", "between", "under", "again", "further", "then", "once", "here",
        "there", "when", "where", "why", "how", "all", "each", "few", "more", "most", "other",
        "some", "such", "only", "own", "same", "than", "too", "very", "just", "also", "now",
        "image", "shows", "showing", "shown", "display", "displays", "featuring", "features",
        "includes", "including", "appears", "visible",
    ]
    .into_iter()
    .collect()
});

/// Keyword set of a text.
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    RE_WORD
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|w| !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Drop crops whose `actual_bbox` covers fewer than `min_area` px².
///
/// Returns the filtered pages and the number of crops removed.
pub fn filter_small_images(pages: &[PageRecord], min_area: u64) -> (Vec<PageRecord>, usize) {
    let mut removed = 0;
    let filtered = pages
        .iter()
        .map(|page| {
            let mut page = page.clone();
            let before = page.images.len();
            page.images.retain(|img| img.actual_bbox.area() >= min_area);
            removed += before - page.images.len();
            page
        })
        .collect();
    if removed > 0 {
        info!("Filtered {} small images", removed);
    }
    (filtered, removed)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageImageIndexEntry {
    pub path: String,
    pub description: String,
    pub relevance: String,
    pub keywords: BTreeSet<String>,
}

/// Read-only index keyed by 1-based page number.
#[derive(Debug, Clone, Default)]
pub struct ImageIndex {
    pages: BTreeMap<usize, Vec<PageImageIndexEntry>>,
}

impl ImageIndex {
    pub fn build(pages: &[PageRecord]) -> Self {
        let pages = pages
            .iter()
            .map(|page| {
                let entries = page
                    .images
                    .iter()
                    .map(|img| PageImageIndexEntry {
                        path: img.saved_path.clone(),
                        description: img.description.clone(),
                        relevance: img.relevance.clone(),
                        keywords: extract_keywords(&format!("{} {}", img.description, img.relevance)),
                    })
                    .collect();
                (page.page_num, entries)
            })
            .collect();
        Self { pages }
    }

    /// Entries of one page; empty for unknown pages.
    pub fn entries(&self, page_num: usize) -> &[PageImageIndexEntry] {
        self.pages.get(&page_num).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every path on the given pages.
    pub fn paths_on(&self, page_nums: &[usize]) -> HashSet<&str> {
        page_nums
            .iter()
            .flat_map(|p| self.entries(*p))
            .map(|e| e.path.as_str())
            .collect()
    }

    /// Page that holds `path`, if any.
    pub fn page_of(&self, path: &str) -> Option<usize> {
        self.pages
            .iter()
            .find(|(_, entries)| entries.iter().any(|e| e.path == path))
            .map(|(page, _)| *page)
    }

    pub fn total_images(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }
}
