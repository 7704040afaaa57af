//! Theme and structure planning: the two sequential calls of a presentation run.
//!
//! Both calls are fatal on failure. A call error or an undecodable reply
//! becomes [`Pdf2DeckError::PlanningFailed`]; a structure with no sections
//! does too. Missing product flags are inferred (see [`infer_product_theme`]
//! and [`infer_product_section`]).

use super::parse::{null_as_default, parse_json_response, skip_invalid};
use crate::config::DeckConfig;
use crate::error::{Pdf2DeckError, PlanningStage};
use crate::output::PageRecord;
use crate::prompts::{
    structure_user_prompt, themes_user_prompt, STRUCTURE_SYSTEM_PROMPT, THEMES_SYSTEM_PROMPT,
};
use crate::provider::TextGenerator;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

const NON_PRODUCT_THEME_TYPES: [&str; 5] =
    ["overview", "introduction", "conclusion", "contact", "warranty"];
const NON_PRODUCT_SECTION_TYPES: [&str; 4] = ["intro", "overview", "conclusion", "contact"];

/// Accept either `"text"` or `["a", "b"]`.
fn one_or_many<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Option::<OneOrMany>::deserialize(d)? {
        None => vec![],
        Some(OneOrMany::One(s)) if s.is_empty() => vec![],
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

fn default_title() -> String {
    "Presentation".to_string()
}

fn default_document_type() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    #[serde(default)]
    pub theme_id: serde_json::Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub theme_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub theme_description: String,
    #[serde(default, deserialize_with = "skip_invalid")]
    pub page_numbers: Vec<usize>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content_type: String,
    /// `None` only until [`infer_product_theme`] runs.
    #[serde(default)]
    pub is_product_theme: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority: String,
}

impl Theme {
    pub fn is_product(&self) -> bool {
        self.is_product_theme.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeAnalysis {
    #[serde(default = "default_title")]
    pub document_title: String,
    #[serde(default = "default_document_type")]
    pub document_type: String,
    #[serde(default, deserialize_with = "skip_invalid")]
    pub themes: Vec<Theme>,
}

/// One planned section, before its content is written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionPlan {
    #[serde(default)]
    pub section_id: serde_json::Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub section_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub purpose: String,
    #[serde(default, deserialize_with = "skip_invalid")]
    pub source_pages: Vec<usize>,
    #[serde(default)]
    pub is_product_section: bool,
    #[serde(default, deserialize_with = "one_or_many")]
    pub content_focus: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image_priority: String,
    #[serde(default)]
    pub target_image_count: Option<usize>,
}

impl SectionPlan {
    pub fn target_images(&self, default: usize) -> usize {
        self.target_image_count.unwrap_or(default)
    }
}

#[derive(Debug, Deserialize)]
struct RawSection {
    #[serde(flatten)]
    plan: SectionPlan,
    #[serde(default)]
    is_product_section: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawStructure {
    #[serde(default, deserialize_with = "skip_invalid")]
    sections: Vec<RawSection>,
}

/// A theme is a product theme if its type says so, or if it covers a single
/// page and is not one of the generic types.
pub fn infer_product_theme(theme: &Theme) -> bool {
    theme.content_type == "product"
        || (theme.page_numbers.len() == 1
            && !NON_PRODUCT_THEME_TYPES.contains(&theme.content_type.as_str()))
}

/// Same rule for sections, with the section-type vocabulary.
pub fn infer_product_section(plan: &SectionPlan) -> bool {
    plan.section_type == "product"
        || (plan.source_pages.len() == 1
            && !NON_PRODUCT_SECTION_TYPES.contains(&plan.section_type.as_str()))
}

/// One text block per page for the themes prompt.
pub fn pages_overview(pages: &[PageRecord]) -> String {
    pages
        .iter()
        .map(|p| {
            let key_points: Vec<&str> = p.key_points.iter().take(5).map(String::as_str).collect();
            format!(
                "PAGE {}: {}\n  Key points: {}\n  Images: {}",
                p.page_num,
                p.page_summary,
                key_points.join("; "),
                p.images.len()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Serialize)]
struct PageContent<'a> {
    summary: &'a str,
    key_points: &'a [String],
    image_count: usize,
}

/// Per-page summary, key points and image count keyed by page number.
pub fn page_content_reference(pages: &[PageRecord]) -> String {
    let map: BTreeMap<usize, PageContent<'_>> = pages
        .iter()
        .map(|p| {
            (
                p.page_num,
                PageContent {
                    summary: &p.page_summary,
                    key_points: &p.key_points,
                    image_count: p.images.len(),
                },
            )
        })
        .collect();
    serde_json::to_string_pretty(&map).unwrap_or_default()
}

fn planning_failed(stage: PlanningStage, detail: impl ToString) -> Pdf2DeckError {
    Pdf2DeckError::PlanningFailed {
        stage,
        detail: detail.to_string(),
    }
}

/// First planning call.
pub async fn analyze_themes(
    generator: &dyn TextGenerator,
    pages: &[PageRecord],
    config: &DeckConfig,
) -> Result<ThemeAnalysis, Pdf2DeckError> {
    let user = themes_user_prompt(&pages_overview(pages));
    let reply = generator
        .generate(
            THEMES_SYSTEM_PROMPT,
            &user,
            config.planning_temperature,
            config.max_tokens,
        )
        .await
        .map_err(|e| {
            warn!("Theme analysis call failed: {}", e);
            planning_failed(PlanningStage::Themes, e)
        })?;

    let mut analysis: ThemeAnalysis = parse_json_response(&reply).map_err(|e| {
        warn!("Theme analysis reply unusable: {}", e);
        planning_failed(PlanningStage::Themes, e)
    })?;

    for theme in &mut analysis.themes {
        if theme.is_product_theme.is_none() {
            theme.is_product_theme = Some(infer_product_theme(theme));
        }
    }
    info!("Found {} themes", analysis.themes.len());
    Ok(analysis)
}

/// Second planning call.
pub async fn create_structure(
    generator: &dyn TextGenerator,
    themes: &ThemeAnalysis,
    pages: &[PageRecord],
    config: &DeckConfig,
) -> Result<Vec<SectionPlan>, Pdf2DeckError> {
    let themes_json = serde_json::to_string_pretty(&themes.themes)
        .map_err(|e| Pdf2DeckError::Internal(e.to_string()))?;
    let user = structure_user_prompt(
        &themes.document_title,
        &themes.document_type,
        &themes_json,
        &page_content_reference(pages),
    );

    let reply = generator
        .generate(
            STRUCTURE_SYSTEM_PROMPT,
            &user,
            config.planning_temperature,
            config.max_tokens,
        )
        .await
        .map_err(|e| {
            warn!("Structure call failed: {}", e);
            planning_failed(PlanningStage::Structure, e)
        })?;

    let raw: RawStructure = parse_json_response(&reply).map_err(|e| {
        warn!("Structure reply unusable: {}", e);
        planning_failed(PlanningStage::Structure, e)
    })?;

    let sections: Vec<SectionPlan> = raw
        .sections
        .into_iter()
        .map(|raw| {
            let mut plan = raw.plan;
            plan.is_product_section = raw
                .is_product_section
                .unwrap_or_else(|| infer_product_section(&plan));
            plan
        })
        .collect();

    if sections.is_empty() {
        return Err(planning_failed(PlanningStage::Structure, "no sections planned"));
    }
    info!("Created {} sections", sections.len());
    Ok(sections)
}
