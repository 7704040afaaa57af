//! CLI binary for edgequake-pdf2deck.
//!
//! Maps flags onto `DeckConfig` and runs one of three modes: the full
//! pipeline, analysis only, or presentation only from an existing analysis.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2deck::{
    analyze_pdf, generate_presentation_from_file, run_pipeline, AnalysisStats, DeckConfig,
    DeckProgressCallback, PageSelection, Presentation, PresentationStage, ProgressCallback,
    RunContext,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar for the whole run. Pages fill it during analysis; the bar is then
/// reset to count sections. Pages may complete out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize, prefix: &'static str, unit: &str) {
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  \
             ⏱ {{elapsed_precise}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix(prefix);
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl DeckProgressCallback for CliProgressCallback {
    fn on_analysis_start(&self, total_pages: usize) {
        self.activate_bar(total_pages, "Analysing", "pages");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analysing {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, image_count: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{image_count:>2} images")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_analysis_complete(&self, total_pages: usize, images_extracted: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.println(format!(
            "{} {} pages analysed, {} images extracted{}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&total_pages.to_string()),
            bold(&images_extracted.to_string()),
            if failed == 0 {
                String::new()
            } else {
                format!("  ({} failed)", red(&failed.to_string()))
            }
        ));
    }

    fn on_stage(&self, stage: PresentationStage) {
        if stage == PresentationStage::Sections {
            // Re-armed with the section count on the first completion.
            self.bar.set_length(0);
        }
        self.bar.println(format!("{} {}", cyan("◆"), bold(stage.label())));
        self.bar.set_message(stage.label().to_string());
    }

    fn on_section_complete(&self, index: usize, total_sections: usize, title: &str, generated: bool) {
        if self.bar.length() != Some(total_sections as u64) {
            self.activate_bar(total_sections, "Writing", "sections");
        }
        self.bar.println(format!(
            "  {} Section {:>2}/{:<2}  {}",
            if generated { green("✓") } else { red("✗") },
            index,
            total_sections,
            if generated { title.to_string() } else { red(&format!("{title} (skipped)")) },
        ));
        self.bar.inc(1);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full run: analysis + presentation into ./output/brochure
  pdf2deck brochure.pdf -o output/brochure

  # Analysis only (images + analysis_results.json)
  pdf2deck --analyze-only brochure.pdf -o output/brochure

  # Presentation only, from an earlier analysis
  pdf2deck --from-analysis output/brochure/analysis_results.json -o output/brochure

  # Cheap vision model, stronger writer
  pdf2deck --provider openai --model gpt-4.1-nano --text-model gpt-4.1 brochure.pdf

  # From a URL, first eight pages only
  pdf2deck --pages 1-8 https://example.com/catalogue.pdf

OUTPUT LAYOUT:
  <output>/images/page_{n}_img_{k}.jpg   cropped images
  <output>/analysis_results.json         per-page summaries and crops
  <output>/presentation.json             sections with bound images

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory holding libpdfium
"#;

/// Turn PDF brochures into themed slide presentations.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2deck",
    version,
    about = "Turn PDF brochures into themed slide presentations with extracted images",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL. Not needed with --from-analysis.
    #[arg(required_unless_present = "from_analysis")]
    input: Option<String>,

    /// Output directory for images and JSON artifacts.
    #[arg(short, long, env = "PDF2DECK_OUTPUT", default_value = "output")]
    output: PathBuf,

    /// Stop after writing analysis_results.json.
    #[arg(long, conflicts_with = "from_analysis")]
    analyze_only: bool,

    /// Skip analysis and build the presentation from this analysis file.
    #[arg(long, env = "PDF2DECK_FROM_ANALYSIS")]
    from_analysis: Option<PathBuf>,

    /// Vision model provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "PDF2DECK_PROVIDER")]
    provider: Option<String>,

    /// Vision model ID (default gpt-4.1-nano).
    #[arg(long, env = "PDF2DECK_MODEL")]
    model: Option<String>,

    /// Text model provider for planning and writing. Defaults to --provider.
    #[arg(long, env = "PDF2DECK_TEXT_PROVIDER")]
    text_provider: Option<String>,

    /// Text model ID. Defaults to --model.
    #[arg(long, env = "PDF2DECK_TEXT_MODEL")]
    text_model: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2DECK_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Longest edge of a page raster in pixels; large-format pages render below --dpi.
    #[arg(long, env = "PDF2DECK_MAX_PIXELS", default_value_t = 4000,
          value_parser = clap::value_parser!(u32).range(256..))]
    max_pixels: u32,

    /// Concurrent model calls (pages and sections).
    #[arg(short, long, env = "PDF2DECK_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2DECK_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2DECK_PASSWORD")]
    password: Option<String>,

    /// Retries per model call (0–10).
    #[arg(long, env = "PDF2DECK_MAX_RETRIES", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(0..=10))]
    max_retries: u32,

    /// Images per section when the plan gives no count.
    #[arg(long, env = "PDF2DECK_TARGET_IMAGES", default_value_t = 2)]
    target_images: usize,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "PDF2DECK_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2DECK_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable the progress bar.
    #[arg(long, env = "PDF2DECK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2DECK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2DECK_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let bar_cb = show_progress.then(CliProgressCallback::new);
    let progress_cb: Option<ProgressCallback> = bar_cb
        .clone()
        .map(|cb| cb as Arc<dyn DeckProgressCallback>);
    let config = build_config(&cli, progress_cb)?;
    let ctx = RunContext::new(&cli.output);

    let result = run(&cli, &ctx, &config).await;
    if let Some(cb) = bar_cb {
        cb.bar.finish_and_clear();
    }
    result
}

async fn run(cli: &Cli, ctx: &RunContext, config: &DeckConfig) -> Result<()> {
    // ── Presentation only ────────────────────────────────────────────────
    if let Some(ref analysis_path) = cli.from_analysis {
        let presentation =
            generate_presentation_from_file(analysis_path, &ctx.presentation_path, config)
                .await
                .context("Presentation generation failed")?;
        report_presentation(cli, ctx, &presentation);
        return Ok(());
    }

    let input = cli
        .input
        .as_deref()
        .context("An input PDF path or URL is required")?;

    // ── Analysis only ────────────────────────────────────────────────────
    if cli.analyze_only {
        let output = analyze_pdf(input, ctx, config)
            .await
            .context("Analysis failed")?;
        report_analysis(cli, ctx, &output.stats);
        return Ok(());
    }

    // ── Full pipeline ────────────────────────────────────────────────────
    let output = run_pipeline(input, ctx, config)
        .await
        .context("Pipeline failed")?;
    report_analysis(cli, ctx, &output.analysis.stats);
    report_presentation(cli, ctx, &output.presentation);
    Ok(())
}

fn report_analysis(cli: &Cli, ctx: &RunContext, stats: &AnalysisStats) {
    if cli.quiet {
        return;
    }
    eprintln!(
        "{}  {}/{} pages  {} images ({} clusters, {} fallback)  {}ms  →  {}",
        if stats.failed_pages == 0 { green("✔") } else { cyan("⚠") },
        stats.processed_pages,
        stats.total_pages,
        stats.images_extracted,
        stats.cluster_images,
        stats.fallback_images,
        stats.total_duration_ms,
        bold(&ctx.analysis_path.display().to_string()),
    );
}

fn report_presentation(cli: &Cli, ctx: &RunContext, presentation: &Presentation) {
    if cli.quiet {
        return;
    }
    let meta = &presentation.metadata;
    eprintln!(
        "{}  \"{}\"  {} sections  {} of {} images used  →  {}",
        green("✔"),
        presentation.title,
        meta.total_sections,
        meta.images_used,
        meta.total_images_available,
        bold(&ctx.presentation_path.display().to_string()),
    );
    eprintln!(
        "   {} themes identified",
        dim(&meta.themes_identified.to_string())
    );
}

/// Map CLI args to `DeckConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DeckConfig> {
    let pages = parse_pages(&cli.pages)?;

    let mut builder = DeckConfig::builder()
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_pixels)
        .concurrency(cli.concurrency)
        .pages(pages)
        .max_retries(cli.max_retries)
        .default_target_images(cli.target_images)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref name) = cli.provider {
        builder = builder.vision_provider_name(name);
    }
    if let Some(ref model) = cli.model {
        builder = builder.vision_model(model);
    }
    if let Some(name) = cli.text_provider.as_ref().or(cli.provider.as_ref()) {
        builder = builder.text_provider_name(name);
    }
    if let Some(model) = cli.text_model.as_ref().or(cli.model.as_ref()) {
        builder = builder.text_model(model);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }
        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}
