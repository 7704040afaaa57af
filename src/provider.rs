//! Model capabilities used by the pipeline, and their edgequake-llm adapters.
//!
//! The pipeline never talks to an `LLMProvider` directly. It sees two
//! narrow traits:
//!
//! * [`PageAnalyzer`]: page raster in, [`PageAnalysis`] out. Infallible at
//!   the boundary: transport and format failures become an empty analysis
//!   whose summary carries the error marker.
//! * [`TextGenerator`]: system + user prompt in, raw text out.
//!
//! Tests inject canned implementations through
//! [`crate::config::DeckConfigBuilder::page_analyzer`] and
//! [`crate::config::DeckConfigBuilder::text_generator`].

use crate::config::DeckConfig;
use crate::error::{ModelError, Pdf2DeckError};
use crate::pipeline::encode;
use crate::pipeline::llm::{build_options, chat_with_retry, CallPolicy};
use crate::pipeline::parse::{null_as_default, parse_json_response, skip_invalid};
use crate::prompts::PAGE_ANALYSIS_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, LLMProvider, ProviderFactory};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Summary marker used when the page response could not be decoded.
pub const PARSE_FAILURE_SUMMARY: &str = "Failed to parse response";

/// One relevant image as located by the vision model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageProposal {
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub relevance: String,
    /// `[x1, y1, x2, y2]` in page percentages. Anything but four numbers is ignored.
    #[serde(default, deserialize_with = "null_as_default")]
    pub coordinates_pct: Vec<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_cluster: bool,
}

/// Decoded answer of a page-analysis call.
///
/// A proposal that does not decode is dropped on its own; its siblings,
/// the summary and the key points are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    #[serde(default, deserialize_with = "null_as_default")]
    pub page_summary: String,
    #[serde(default, deserialize_with = "skip_invalid")]
    pub key_points: Vec<String>,
    #[serde(default, deserialize_with = "skip_invalid")]
    pub relevant_images: Vec<ImageProposal>,
}

impl PageAnalysis {
    /// The empty-result shape returned when a call or its decoding fails.
    pub fn failed(summary: impl Into<String>) -> Self {
        Self {
            page_summary: summary.into(),
            ..Self::default()
        }
    }
}

/// Vision capability: describe a page and propose image locations.
#[async_trait]
pub trait PageAnalyzer: Send + Sync {
    /// Never fails; see the module docs.
    async fn analyze(&self, page_num: usize, image: &DynamicImage) -> PageAnalysis;
}

/// Text capability: one completion for a system + user prompt pair.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<String, ModelError>;
}

/// [`PageAnalyzer`] backed by a multimodal `LLMProvider`.
pub struct VisionPageAnalyzer {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    policy: CallPolicy,
}

impl VisionPageAnalyzer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &DeckConfig) -> Self {
        Self {
            provider,
            temperature: config.analysis_temperature,
            max_tokens: config.analysis_max_tokens,
            policy: call_policy(config),
        }
    }
}

#[async_trait]
impl PageAnalyzer for VisionPageAnalyzer {
    async fn analyze(&self, page_num: usize, image: &DynamicImage) -> PageAnalysis {
        let image_data = match encode::encode_page(image) {
            Ok(data) => data,
            Err(e) => {
                warn!("Page {}: encoding failed: {}", page_num, e);
                return PageAnalysis::failed(format!("Error: {e}"));
            }
        };

        let messages = vec![ChatMessage::user_with_images(
            PAGE_ANALYSIS_PROMPT,
            vec![image_data],
        )];
        let options = build_options(self.temperature, self.max_tokens);
        let label = format!("page {page_num}");

        let reply = match chat_with_retry(&self.provider, &label, &messages, &options, self.policy)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Page {}: analysis call failed: {}", page_num, e);
                return PageAnalysis::failed(format!("Error: {e}"));
            }
        };

        match parse_json_response::<PageAnalysis>(&reply) {
            Ok(analysis) => {
                debug!(
                    "Page {}: {} image proposals",
                    page_num,
                    analysis.relevant_images.len()
                );
                analysis
            }
            Err(e) => {
                warn!("Page {}: {}", page_num, e);
                PageAnalysis::failed(PARSE_FAILURE_SUMMARY)
            }
        }
    }
}

/// [`TextGenerator`] backed by an `LLMProvider`.
pub struct LlmTextGenerator {
    provider: Arc<dyn LLMProvider>,
    policy: CallPolicy,
}

impl LlmTextGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &DeckConfig) -> Self {
        Self {
            provider,
            policy: call_policy(config),
        }
    }
}

#[async_trait]
impl TextGenerator for LlmTextGenerator {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<String, ModelError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let options = build_options(temperature, max_tokens);
        chat_with_retry(&self.provider, "text", &messages, &options, self.policy).await
    }
}

fn call_policy(config: &DeckConfig) -> CallPolicy {
    CallPolicy {
        max_retries: config.max_retries,
        retry_backoff_ms: config.retry_backoff_ms,
        api_timeout_secs: config.api_timeout_secs,
    }
}

/// Pick the page analyzer for a run.
///
/// Injected analyzer, then pre-built vision provider, then the provider chain
/// of [`resolve_llm`].
pub fn resolve_page_analyzer(config: &DeckConfig) -> Result<Arc<dyn PageAnalyzer>, Pdf2DeckError> {
    if let Some(ref analyzer) = config.page_analyzer {
        return Ok(Arc::clone(analyzer));
    }
    let provider = resolve_llm(
        config.vision_provider.as_ref(),
        config.vision_provider_name.as_deref(),
        config.vision_model.as_deref(),
    )?;
    Ok(Arc::new(VisionPageAnalyzer::new(provider, config)))
}

/// Pick the text generator for a run. Same precedence as [`resolve_page_analyzer`].
pub fn resolve_text_generator(
    config: &DeckConfig,
) -> Result<Arc<dyn TextGenerator>, Pdf2DeckError> {
    if let Some(ref generator) = config.text_generator {
        return Ok(Arc::clone(generator));
    }
    let provider = resolve_llm(
        config.text_provider.as_ref(),
        config.text_provider_name.as_deref(),
        config.text_model.as_deref(),
    )?;
    Ok(Arc::new(LlmTextGenerator::new(provider, config)))
}

/// Resolve an `LLMProvider`, from most-specific to least-specific:
///
/// 1. a pre-built provider;
/// 2. a provider name plus optional model (default `gpt-4.1-nano`);
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set;
/// 4. `openai` when `OPENAI_API_KEY` is set;
/// 5. [`ProviderFactory::from_env`] auto-detection.
pub fn resolve_llm(
    provider: Option<&Arc<dyn LLMProvider>>,
    name: Option<&str>,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, Pdf2DeckError> {
    if let Some(provider) = provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(name) = name {
        return create_provider(name, model.unwrap_or(DEFAULT_MODEL));
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, model.unwrap_or(&env_model));
        }
    }

    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.is_empty() {
            return create_provider("openai", model.unwrap_or(DEFAULT_MODEL));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2DeckError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(llm_provider)
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2DeckError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        Pdf2DeckError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_llm::{CompletionOptions, LLMResponse, LlmError, MockProvider};
    use image::RgbImage;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct Fixed;

    #[async_trait]
    impl PageAnalyzer for Fixed {
        async fn analyze(&self, page_num: usize, _image: &DynamicImage) -> PageAnalysis {
            PageAnalysis::failed(format!("page {page_num}"))
        }
    }

    enum Step {
        Reply(&'static str),
        Fail(&'static str),
        Stall,
    }

    /// Provider that plays back one step per chat call.
    struct Scripted {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LLMProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-model"
        }

        fn max_context_length(&self) -> usize {
            8192
        }

        async fn complete(&self, _prompt: &str) -> edgequake_llm::Result<LLMResponse> {
            self.chat(&[], None).await
        }

        async fn complete_with_options(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.complete(prompt).await
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Reply(text)) => Ok(LLMResponse::new(text, "scripted-model")),
                Some(Step::Fail(msg)) => Err(LlmError::ApiError(msg.into())),
                Some(Step::Stall) => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(LLMResponse::new("{}", "scripted-model"))
                }
                None => Err(LlmError::ApiError("no step left".into())),
            }
        }
    }

    fn page() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(32, 32))
    }

    fn quick_config() -> DeckConfig {
        DeckConfig::builder()
            .max_retries(1)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    #[test]
    fn analysis_decodes_with_missing_fields() {
        let a: PageAnalysis = parse_json_response(
            r#"{"page_summary": "Cover", "relevant_images": [{"coordinates_pct": [10, 10, 40, 30]}]}"#,
        )
        .unwrap();
        assert_eq!(a.page_summary, "Cover");
        assert!(a.key_points.is_empty());
        assert_eq!(a.relevant_images.len(), 1);
        assert_eq!(a.relevant_images[0].coordinates_pct, vec![10.0, 10.0, 40.0, 30.0]);
        assert!(!a.relevant_images[0].is_cluster);
    }

    #[test]
    fn one_broken_proposal_keeps_its_siblings() {
        let a: PageAnalysis = parse_json_response(
            r#"{
                "page_summary": "Sliding doors",
                "key_points": ["Slim frames", null],
                "relevant_images": [
                    {"description": "door", "coordinates_pct": [10, 20, 50, 60], "is_cluster": false},
                    {"description": "handle", "coordinates_pct": null},
                    {"description": null, "relevance": null, "coordinates_pct": [60, 60, 90, 90], "is_cluster": null},
                    {"description": "track", "coordinates_pct": ["left", "top", 1, 2]},
                    "stray text"
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(a.page_summary, "Sliding doors");
        assert_eq!(a.key_points, vec!["Slim frames"]);
        assert_eq!(a.relevant_images.len(), 3);
        assert_eq!(a.relevant_images[0].description, "door");
        assert_eq!(a.relevant_images[0].coordinates_pct, vec![10.0, 20.0, 50.0, 60.0]);
        assert!(a.relevant_images[1].coordinates_pct.is_empty());
        assert_eq!(a.relevant_images[2].description, "");
        assert!(!a.relevant_images[2].is_cluster);
    }

    #[test]
    fn failed_analysis_has_no_images() {
        let a = PageAnalysis::failed(PARSE_FAILURE_SUMMARY);
        assert_eq!(a.page_summary, PARSE_FAILURE_SUMMARY);
        assert!(a.relevant_images.is_empty());
    }

    #[test]
    fn injected_analyzer_wins() {
        let config = DeckConfig::builder()
            .page_analyzer(Arc::new(Fixed))
            .build()
            .unwrap();
        assert!(resolve_page_analyzer(&config).is_ok());
    }

    #[tokio::test]
    async fn vision_adapter_decodes_fenced_reply() {
        let mock = MockProvider::new();
        mock.add_response(
            "Here is the analysis:\n```json\n{\"page_summary\": \"Oak windows\", \
             \"key_points\": [\"FSC oak\"], \"relevant_images\": [\
             {\"description\": \"window\", \"coordinates_pct\": [10, 10, 50, 50]}, \
             {\"description\": null, \"coordinates_pct\": null}]}\n```",
        )
        .await;
        let analyzer = VisionPageAnalyzer::new(Arc::new(mock), &quick_config());

        let a = analyzer.analyze(1, &page()).await;
        assert_eq!(a.page_summary, "Oak windows");
        assert_eq!(a.key_points, vec!["FSC oak"]);
        assert_eq!(a.relevant_images.len(), 2);
        assert_eq!(a.relevant_images[0].coordinates_pct, vec![10.0, 10.0, 50.0, 50.0]);
    }

    #[tokio::test]
    async fn vision_adapter_marks_unparseable_reply() {
        let mock = MockProvider::new();
        mock.add_response("Sorry, I cannot read this page.").await;
        let analyzer = VisionPageAnalyzer::new(Arc::new(mock), &quick_config());

        let a = analyzer.analyze(2, &page()).await;
        assert_eq!(a, PageAnalysis::failed(PARSE_FAILURE_SUMMARY));
    }

    #[tokio::test]
    async fn vision_adapter_reports_call_failure_after_retries() {
        let provider = Scripted::new(vec![Step::Fail("overloaded"), Step::Fail("overloaded")]);
        let analyzer = VisionPageAnalyzer::new(provider.clone(), &quick_config());

        let a = analyzer.analyze(3, &page()).await;
        assert!(a.page_summary.starts_with("Error: "), "{}", a.page_summary);
        assert!(a.page_summary.contains("overloaded"));
        assert!(a.key_points.is_empty() && a.relevant_images.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn text_adapter_retries_then_succeeds() {
        let provider = Scripted::new(vec![Step::Fail("rate limited"), Step::Reply("hello")]);
        let generator = LlmTextGenerator::new(provider.clone(), &quick_config());

        let text = generator.generate("system", "user", 0.2, 256).await.unwrap();
        assert_eq!(text, "hello");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn text_adapter_gives_up_with_call_error() {
        let provider = Scripted::new(vec![Step::Fail("overloaded"), Step::Fail("overloaded")]);
        let generator = LlmTextGenerator::new(provider.clone(), &quick_config());

        let err = generator.generate("system", "user", 0.2, 256).await.unwrap_err();
        match err {
            ModelError::Call { retries, detail } => {
                assert_eq!(retries, 1);
                assert!(detail.contains("overloaded"));
            }
            other => panic!("expected a call error, got {other:?}"),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn text_adapter_times_out() {
        let provider = Scripted::new(vec![Step::Stall]);
        let config = DeckConfig::builder()
            .max_retries(0)
            .api_timeout_secs(1)
            .build()
            .unwrap();
        let generator = LlmTextGenerator::new(provider, &config);

        let err = generator.generate("system", "user", 0.2, 256).await.unwrap_err();
        assert_eq!(err, ModelError::Timeout { secs: 1 });
    }
}
