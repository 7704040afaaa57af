//! Per-section content writing.
//!
//! The model sees only the section's source pages and only the images
//! indexed on those pages. Its reply is decoded into a [`GeneratedSection`]
//! whose image list is the model's selection, unvalidated; binding happens
//! in [`super::bind`].

use super::index::ImageIndex;
use super::parse::{null_as_default, parse_json_response, skip_invalid};
use super::plan::SectionPlan;
use crate::config::DeckConfig;
use crate::error::ModelError;
use crate::output::{GeneratedSection, PageRecord};
use crate::prompts::{section_user_prompt, SECTION_SYSTEM_PROMPT};
use crate::provider::TextGenerator;
use serde::{Deserialize, Serialize};

/// An image pick, either `{"path": ..., "reason": ...}` or a bare path.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SelectedImage {
    Detailed {
        path: String,
        #[serde(default)]
        reason: String,
    },
    Path(String),
}

impl SelectedImage {
    pub fn path(&self) -> &str {
        match self {
            SelectedImage::Detailed { path, .. } | SelectedImage::Path(path) => path,
        }
    }
}

/// Decoded reply of the writing call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectionDraft {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "skip_invalid")]
    pub selected_images: Vec<SelectedImage>,
    #[serde(default, deserialize_with = "skip_invalid")]
    pub key_takeaways: Vec<String>,
}

#[derive(Serialize)]
struct PageContent<'a> {
    page: usize,
    summary: &'a str,
    key_points: &'a [String],
}

#[derive(Serialize)]
struct AvailableImage<'a> {
    page: usize,
    path: &'a str,
    description: &'a str,
    relevance: &'a str,
}

/// Source pages with duplicates removed, order kept.
pub fn dedup_pages(pages: &[usize]) -> Vec<usize> {
    let mut out: Vec<usize> = Vec::with_capacity(pages.len());
    for p in pages {
        if !out.contains(p) {
            out.push(*p);
        }
    }
    out
}

/// Build the user prompt for one section from its own pages only.
pub fn build_section_prompt(
    plan: &SectionPlan,
    pages: &[PageRecord],
    index: &ImageIndex,
    target_images: usize,
) -> String {
    let source_pages = dedup_pages(&plan.source_pages);

    let page_contents: Vec<PageContent<'_>> = pages
        .iter()
        .filter(|p| source_pages.contains(&p.page_num))
        .map(|p| PageContent {
            page: p.page_num,
            summary: &p.page_summary,
            key_points: &p.key_points,
        })
        .collect();

    let available: Vec<AvailableImage<'_>> = pages
        .iter()
        .filter(|p| source_pages.contains(&p.page_num))
        .flat_map(|p| {
            index.entries(p.page_num).iter().map(move |e| AvailableImage {
                page: p.page_num,
                path: &e.path,
                description: &e.description,
                relevance: &e.relevance,
            })
        })
        .collect();

    section_user_prompt(
        plan,
        target_images,
        &serde_json::to_string_pretty(&page_contents).unwrap_or_default(),
        &serde_json::to_string_pretty(&available).unwrap_or_default(),
    )
}

/// Turn a decoded draft into a section carrying the plan's pages and flag.
pub fn into_section(draft: SectionDraft, plan: &SectionPlan) -> GeneratedSection {
    let title = if draft.title.trim().is_empty() {
        plan.title.clone()
    } else {
        draft.title
    };
    GeneratedSection {
        title,
        content: draft.content,
        images: draft
            .selected_images
            .iter()
            .map(|s| s.path().to_string())
            .collect(),
        key_takeaways: draft.key_takeaways,
        source_pages: dedup_pages(&plan.source_pages),
        is_product_section: plan.is_product_section,
    }
}

/// Write one section. A failed call or undecodable reply is returned to the caller.
pub async fn generate_section(
    generator: &dyn TextGenerator,
    plan: &SectionPlan,
    pages: &[PageRecord],
    index: &ImageIndex,
    config: &DeckConfig,
) -> Result<GeneratedSection, ModelError> {
    let target = plan.target_images(config.default_target_images);
    let user = build_section_prompt(plan, pages, index, target);
    let reply = generator
        .generate(
            SECTION_SYSTEM_PROMPT,
            &user,
            config.content_temperature,
            config.max_tokens,
        )
        .await?;
    let draft: SectionDraft = parse_json_response(&reply)?;
    Ok(into_section(draft, plan))
}
