//! Prompts for page analysis, planning and section writing.
//!
//! Every prompt lives here so that wording changes never touch retry,
//! parsing or validation code. Each one ends with an explicit JSON schema;
//! the matching serde types are in [`crate::provider`] and
//! [`crate::pipeline::plan`] / [`crate::pipeline::section`].

use crate::pipeline::plan::SectionPlan;

/// Prompt sent alongside each page raster to the vision model.
pub const PAGE_ANALYSIS_PROMPT: &str = r#"Analyze this document page and answer in JSON.

1. Summarize the main content of the page.
2. List the key points or important facts.
3. Locate the relevant images on the page:
   - A CLUSTER or GRID of related small images (color swatches, product
     variants, a row of diagrams) is ONE image: give one box covering the
     whole group.
   - Large standalone images (photos, diagrams, charts) are listed individually.
   - SKIP logos, icons and small decorative elements.
   - Give each bounding box as page percentages (0-100): [x1, y1, x2, y2].

Prefer LARGER boxes that capture the complete visual element.

Respond ONLY with valid JSON:
{
  "page_summary": "Brief summary of the page content",
  "key_points": ["point 1", "point 2"],
  "relevant_images": [
    {
      "description": "What the image or cluster shows",
      "relevance": "Why it matters",
      "coordinates_pct": [x1, y1, x2, y2],
      "is_cluster": false
    }
  ]
}

If the page has no relevant images, return an empty relevant_images array."#;

pub const THEMES_SYSTEM_PROMPT: &str =
    "You are a document analyst. Analyze content and identify themes. Output valid JSON only.";

pub const STRUCTURE_SYSTEM_PROMPT: &str =
    "You are a presentation architect. Design clear, logical presentation structures. Output valid JSON only.";

pub const SECTION_SYSTEM_PROMPT: &str =
    "You are a content writer creating customer-friendly presentation content. Output valid JSON only.";

/// First planning call: cluster pages into themes.
///
/// `pages_text` is one block per page (summary, first key points, image count).
pub fn themes_user_prompt(pages_text: &str) -> String {
    format!(
        r#"Identify the main themes of this document.

DOCUMENT PAGES:
{pages_text}

PRODUCT RULES
1. A page that showcases a specific product, product type or variant (names,
   model numbers, product-specific features) belongs to that product's theme.
2. One product = one theme. Never combine different products, even similar
   ones. The theme_name must contain the product name.
3. A product theme contains ONLY that product's pages.

GENERIC (NON-PRODUCT) RULES
4. Do not lump generic content together. Split it into specific themes such as
   brand introduction, company history, features and benefits, technology,
   energy efficiency, glass options, design and customization, color options,
   warranty, sustainability, contact information.
5. A page covering several topics may belong to several generic themes.
   Keep generic themes to 2-3 pages each.
6. Set "is_product_theme": true for product themes, false otherwise.
7. For documents with 10+ pages aim for 8-15 themes.

Output JSON:
{{
  "document_title": "Main document title",
  "document_type": "brochure/catalog/manual/etc",
  "themes": [
    {{
      "theme_id": 1,
      "theme_name": "Specific topic name",
      "theme_description": "What this theme covers",
      "page_numbers": [1, 2],
      "content_type": "product/introduction/features/technology/energy/design/warranty/sustainability/contact",
      "is_product_theme": false,
      "priority": "high/medium/low"
    }}
  ]
}}

Return ONLY valid JSON."#
    )
}

/// Second planning call: turn themes into presentation sections.
pub fn structure_user_prompt(
    document_title: &str,
    document_type: &str,
    themes_json: &str,
    page_content_json: &str,
) -> String {
    format!(
        r#"Create a presentation structure from these document themes.

DOCUMENT INFO:
Title: {document_title}
Type: {document_type}

IDENTIFIED THEMES:
{themes_json}

PAGE CONTENT REFERENCE:
{page_content_json}

PRODUCT SECTIONS
1. Each product theme becomes its own section (or several). Never combine
   products in one section.
2. A section for a theme with "is_product_theme": true uses EXACTLY that
   theme's pages as source_pages; its images come from those pages only.

GENERIC SECTIONS
3. Give each major topic its own section: introduction, features, technology,
   energy efficiency, design options, warranty, sustainability, contact.
4. Split themes that mix topics. Use 2-3 source pages at most per section.

FLOW
5. Intro/overview first, then features and technology, then one section per
   product, then design options, then warranty, sustainability and contact.
6. For documents with 10+ pages aim for 8-15 sections.

Output JSON:
{{
  "presentation_title": "Title for the presentation",
  "sections": [
    {{
      "section_id": 1,
      "section_type": "intro/overview/feature/product/technical/lifestyle/warranty/sustainability/conclusion",
      "title": "Section title (product name for product sections)",
      "purpose": "What this section should communicate",
      "source_pages": [1, 2],
      "is_product_section": false,
      "content_focus": ["one main topic"],
      "image_priority": "lifestyle/technical/product/diagram",
      "target_image_count": 2
    }}
  ]
}}

Return ONLY valid JSON."#
    )
}

/// Per-section writing call. Only the section's own pages and images are shown.
pub fn section_user_prompt(
    section: &SectionPlan,
    target_images: usize,
    page_contents_json: &str,
    available_images_json: &str,
) -> String {
    let product_rule = if section.is_product_section {
        "\nPRODUCT SECTION: content and images must be ONLY about this specific product. Do not mention other products.\n"
    } else {
        ""
    };
    format!(
        r#"Write the content for this presentation section.

SECTION INFO:
Title: {title}
Type: {kind}
Purpose: {purpose}
Content Focus: {focus}
Is Product Section: {is_product}

SOURCE PAGE CONTENT:
{page_contents_json}

AVAILABLE IMAGES (from source pages ONLY):
{available_images_json}

IMAGE RULES
1. Select images ONLY from AVAILABLE IMAGES, using the EXACT path shown.
2. Do not invent or guess paths.
3. Select at most {target_images} images. If none are available, return an
   empty selected_images array.
{product_rule}
Output JSON:
{{
  "title": "Final section title",
  "content": "A rich paragraph of 4-6 customer-friendly sentences naming specific products and benefits.",
  "selected_images": [
    {{ "path": "EXACT path from available images", "reason": "Why this image fits" }}
  ],
  "key_takeaways": ["bullet 1", "bullet 2"]
}}

Return ONLY valid JSON."#,
        title = section.title,
        kind = section.section_type,
        purpose = section.purpose,
        focus = section.content_focus.join("; "),
        is_product = section.is_product_section,
    )
}
