//! Configuration types for brochure analysis and deck generation.
//!
//! All run behaviour is controlled through [`DeckConfig`], built via its
//! [`DeckConfigBuilder`]. The geometric constants of region detection,
//! clustering and matching live in the nested [`RegionConfig`] so they can be
//! tuned (or tested) as a unit.

use crate::error::Pdf2DeckError;
use crate::progress::ProgressCallback;
use crate::provider::{PageAnalyzer, TextGenerator};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for an analysis and/or presentation run.
///
/// # Example
/// ```rust
/// use edgequake_pdf2deck::DeckConfig;
///
/// let config = DeckConfig::builder()
///     .dpi(150)
///     .concurrency(4)
///     .vision_model("gpt-4.1")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct DeckConfig {
    /// Rendering DPI for page rasters. Range: 72–400. Default: 150.
    ///
    /// All pixel thresholds in [`RegionConfig`] were tuned at 150 DPI.
    pub dpi: u32,

    /// Longest edge of a page raster in pixels. Default: 4000.
    ///
    /// Pages render at `dpi` unless that would exceed this edge; an A0
    /// poster at 150 DPI would otherwise be about 12,000 × 17,000 px. Every
    /// selected raster is held in memory for the run.
    pub max_rendered_pixels: u32,

    /// Pages (and, in the presentation run, sections) processed at once. Default: 4.
    ///
    /// This is also the cap on in-flight model calls; lower it if the
    /// provider answers with 429s.
    pub concurrency: usize,

    /// Vision provider name for page analysis (e.g. "openai", "anthropic").
    pub vision_provider_name: Option<String>,
    /// Vision model id.
    pub vision_model: Option<String>,
    /// Pre-constructed vision provider. Takes precedence over the name.
    pub vision_provider: Option<Arc<dyn LLMProvider>>,

    /// Text provider name for planning and section writing.
    pub text_provider_name: Option<String>,
    /// Text model id.
    pub text_model: Option<String>,
    /// Pre-constructed text provider. Takes precedence over the name.
    pub text_provider: Option<Arc<dyn LLMProvider>>,

    /// Injected page analyzer. Takes precedence over every vision provider setting.
    pub page_analyzer: Option<Arc<dyn PageAnalyzer>>,
    /// Injected text generator. Takes precedence over every text provider setting.
    pub text_generator: Option<Arc<dyn TextGenerator>>,

    /// Sampling temperature of the page-analysis call. Default: 0.3.
    pub analysis_temperature: f32,
    /// Output token cap of the page-analysis call. Default: 2048.
    pub analysis_max_tokens: usize,
    /// Sampling temperature of the theme and structure calls. Default: 0.2.
    pub planning_temperature: f32,
    /// Sampling temperature of the per-section writing call. Default: 0.3.
    pub content_temperature: f32,
    /// Output token cap of planning and writing calls. Default: 4096.
    pub max_tokens: usize,

    /// Retries per model call on transport failure. Default: 2.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,
    /// Per model call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,
    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,
    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Crops wider than this are downscaled (aspect preserved). Default: 1400.
    pub max_image_width: u32,
    /// JPEG quality of persisted crops, 1–100. Default: 90.
    pub image_quality: u8,
    /// Crops smaller than this many px² are dropped before indexing. Default: 15 000.
    pub min_image_area: u64,
    /// Used when the structure plan omits `target_image_count`. Default: 2.
    pub default_target_images: usize,

    /// Region detection / clustering / matching constants.
    pub regions: RegionConfig,

    /// Receives run, page, stage and section events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 4000,
            concurrency: 4,
            vision_provider_name: None,
            vision_model: None,
            vision_provider: None,
            text_provider_name: None,
            text_model: None,
            text_provider: None,
            page_analyzer: None,
            text_generator: None,
            analysis_temperature: 0.3,
            analysis_max_tokens: 2048,
            planning_temperature: 0.2,
            content_temperature: 0.3,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            password: None,
            pages: PageSelection::default(),
            max_image_width: 1400,
            image_quality: 90,
            min_image_area: 15_000,
            default_target_images: 2,
            regions: RegionConfig::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DeckConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeckConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("vision_provider_name", &self.vision_provider_name)
            .field("vision_model", &self.vision_model)
            .field("vision_provider", &self.vision_provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("text_provider_name", &self.text_provider_name)
            .field("text_model", &self.text_model)
            .field("text_provider", &self.text_provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("page_analyzer", &self.page_analyzer.as_ref().map(|_| "<dyn PageAnalyzer>"))
            .field("text_generator", &self.text_generator.as_ref().map(|_| "<dyn TextGenerator>"))
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("pages", &self.pages)
            .field("max_image_width", &self.max_image_width)
            .field("image_quality", &self.image_quality)
            .field("min_image_area", &self.min_image_area)
            .field("regions", &self.regions)
            .finish()
    }
}

impl DeckConfig {
    /// Create a new builder for `DeckConfig`.
    pub fn builder() -> DeckConfigBuilder {
        DeckConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Upper bound for [`DeckConfigBuilder::max_retries`].
pub const MAX_RETRIES: u32 = 10;

/// Builder for [`DeckConfig`].
#[derive(Debug)]
pub struct DeckConfigBuilder {
    config: DeckConfig,
}

impl DeckConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(256);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn vision_provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.vision_provider_name = Some(name.into());
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = Some(model.into());
        self
    }

    pub fn vision_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.vision_provider = Some(provider);
        self
    }

    pub fn text_provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.text_provider_name = Some(name.into());
        self
    }

    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.config.text_model = Some(model.into());
        self
    }

    pub fn text_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.text_provider = Some(provider);
        self
    }

    pub fn page_analyzer(mut self, analyzer: Arc<dyn PageAnalyzer>) -> Self {
        self.config.page_analyzer = Some(analyzer);
        self
    }

    pub fn text_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.config.text_generator = Some(generator);
        self
    }

    pub fn analysis_temperature(mut self, t: f32) -> Self {
        self.config.analysis_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn planning_temperature(mut self, t: f32) -> Self {
        self.config.planning_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn content_temperature(mut self, t: f32) -> Self {
        self.config.content_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn analysis_max_tokens(mut self, n: usize) -> Self {
        self.config.analysis_max_tokens = n;
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    /// Retries after the first attempt, at most [`MAX_RETRIES`].
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn max_image_width(mut self, px: u32) -> Self {
        self.config.max_image_width = px.max(64);
        self
    }

    pub fn image_quality(mut self, q: u8) -> Self {
        self.config.image_quality = q.clamp(1, 100);
        self
    }

    pub fn min_image_area(mut self, px: u64) -> Self {
        self.config.min_image_area = px;
        self
    }

    pub fn default_target_images(mut self, n: usize) -> Self {
        self.config.default_target_images = n.max(1);
        self
    }

    pub fn regions(mut self, regions: RegionConfig) -> Self {
        self.config.regions = regions;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DeckConfig, Pdf2DeckError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(Pdf2DeckError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2DeckError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        c.regions.validate()?;
        Ok(self.config)
    }
}

/// Constants of the region detection → clustering → matching chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Gaussian sigma before edge detection. Default: 1.1 (a 5×5 kernel).
    pub blur_sigma: f32,
    /// Canny hysteresis low threshold. Default: 30.
    pub canny_low: f32,
    /// Canny hysteresis high threshold. Default: 150.
    pub canny_high: f32,
    /// Chebyshev dilation radius in pixels. Default: 9 (7×7 kernel, 3 iterations).
    pub dilation_radius: u8,
    /// Minimum region area as a fraction of page area. Default: 0.005.
    pub min_area_fraction: f64,
    /// Regions must be strictly wider and taller than this. Default: 50.
    pub min_side_px: u32,
    /// Regions must have `max(w,h)/min(w,h)` strictly below this. Default: 10.
    pub max_aspect_ratio: f64,
    /// Regions closer than this percentage of the longer page side merge. Default: 5.
    pub cluster_distance_pct: f64,
    /// Candidates further than this percentage of the page diagonal are ignored. Default: 20.
    pub max_distance_pct: f64,
    /// Unmatched proposals are cropped raw only if at least this page fraction. Default: 0.01.
    pub fallback_min_area_fraction: f64,
    /// Padding added around every crop, clamped to the page. Default: 5.
    pub crop_padding_px: u32,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            canny_low: 30.0,
            canny_high: 150.0,
            dilation_radius: 9,
            min_area_fraction: 0.005,
            min_side_px: 50,
            max_aspect_ratio: 10.0,
            cluster_distance_pct: 5.0,
            max_distance_pct: 20.0,
            fallback_min_area_fraction: 0.01,
            crop_padding_px: 5,
        }
    }
}

impl RegionConfig {
    fn validate(&self) -> Result<(), Pdf2DeckError> {
        if self.canny_low > self.canny_high {
            return Err(Pdf2DeckError::InvalidConfig(format!(
                "canny_low ({}) must not exceed canny_high ({})",
                self.canny_low, self.canny_high
            )));
        }
        if self.max_aspect_ratio <= 1.0 {
            return Err(Pdf2DeckError::InvalidConfig(
                "max_aspect_ratio must be > 1".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.max_distance_pct)
            || !(0.0..=100.0).contains(&self.cluster_distance_pct)
        {
            return Err(Pdf2DeckError::InvalidConfig(
                "distance percentages must be within 0–100".into(),
            ));
        }
        Ok(())
    }
}

/// Specifies which pages of the PDF to analyse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// All pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = DeckConfig::default();
        assert_eq!(c.dpi, 150);
        assert_eq!(c.max_image_width, 1400);
        assert_eq!(c.image_quality, 90);
        assert_eq!(c.min_image_area, 15_000);
        assert_eq!(c.regions.crop_padding_px, 5);
        assert_eq!(c.regions.max_distance_pct, 20.0);
        assert_eq!(c.regions.cluster_distance_pct, 5.0);
    }

    #[test]
    fn builder_clamps() {
        let c = DeckConfig::builder()
            .dpi(1000)
            .concurrency(0)
            .image_quality(0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 400);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.image_quality, 1);

        let c = DeckConfig::builder()
            .max_retries(1_000)
            .max_rendered_pixels(10)
            .build()
            .unwrap();
        assert_eq!(c.max_retries, MAX_RETRIES);
        assert_eq!(c.max_rendered_pixels, 256);
    }

    #[test]
    fn build_rejects_inverted_canny_thresholds() {
        let regions = RegionConfig {
            canny_low: 200.0,
            canny_high: 100.0,
            ..RegionConfig::default()
        };
        let err = DeckConfig::builder().regions(regions).build().unwrap_err();
        assert!(err.to_string().contains("canny_low"));
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(3).to_indices(5), vec![2]);
        assert_eq!(PageSelection::Single(6).to_indices(5), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 10).to_indices(4), vec![1, 2, 3]);
        assert_eq!(PageSelection::Set(vec![3, 1, 3]).to_indices(5), vec![0, 2]);
    }
}
