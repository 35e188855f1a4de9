//! CLI binary for recipes2notion.
//!
//! A thin shim over the library: load `.env`, read the configuration from the
//! environment, run the batch and print a summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use recipes2notion::{
    BatchProgressCallback, BatchStats, PageReport, PdfiumRenderer, ProgressCallback, RecipeConfig,
    RecipePipeline,
};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar for the whole batch, one log line per page.
///
/// The bar's length grows as each PDF is opened, since page counts are only
/// known then.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        bar.set_style(style);
        bar.set_prefix("Recipes");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn file_name(pdf: &Path) -> String {
        pdf.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| pdf.display().to_string())
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_pdfs: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_pdfs} PDF(s)…"))
        ));
    }

    fn on_pdf_start(&self, pdf: &Path, total_pages: usize) {
        self.bar.inc_length(total_pages as u64);
        self.bar.println(format!(
            "{} {}  {}",
            cyan("▸"),
            bold(&Self::file_name(pdf)),
            dim(&format!("{total_pages} pages"))
        ));
    }

    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        self.bar.set_message(format!("page {page_num}/{total_pages}"));
    }

    fn on_page_complete(&self, report: &PageReport) {
        let image = report
            .image_path
            .as_ref()
            .map(|p| format!("  → {}", p.display()))
            .unwrap_or_default();
        self.bar.println(format!(
            "  {} Page {:>3}  {}{}  {}",
            green("✓"),
            report.page_num,
            report.title.as_deref().unwrap_or(""),
            dim(&image),
            dim(&format!("{:.1}s", report.duration_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, report: &PageReport) {
        let msg = report
            .error
            .as_ref()
            .map(|e| truncate(&e.to_string(), 100))
            .unwrap_or_default();
        if report.page_num == 0 {
            self.bar.println(format!(
                "  {} {}  {}",
                red("✗"),
                Self::file_name(&report.pdf),
                red(&msg)
            ));
            return;
        }
        self.bar.println(format!(
            "  {} Page {:>3}  {}  {}",
            red("✗"),
            report.page_num,
            red(&msg),
            dim(&format!("{:.1}s", report.duration_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _stats: &BatchStats) {
        self.bar.finish_and_clear();
    }
}

fn default_filter(show_progress: bool) -> &'static str {
    if show_progress {
        "warn"
    } else {
        "info"
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One scanned recipe book
  recipes2notion recetas.pdf

  # Every PDF in a folder, in file-name order
  recipes2notion ~/Escaneos/

ENVIRONMENT VARIABLES (a .env file in the working directory is read too):
  GEMINI_API_KEY            Google Gemini API key (required)
  NOTION_TOKEN              Notion integration token (required)
  NOTION_DATABASE_ID        Target recipe database (required)
  RECIPES_EXTRACTION_MODEL  Vision model        (default gemini-2.5-pro)
  RECIPES_IMAGE_MODEL       Image model         (default gemini-2.0-flash-exp-image-generation)
  RECIPES_IMAGE_DIR         Illustration folder (default Images)
  RECIPES_DPI               Render DPI, 72–400  (default 300)
  RECIPES_GENERATE_IMAGES   Set to false to skip illustrations
  RUST_LOG                  Log filter, e.g. recipes2notion=debug
  PDFIUM_LIB_PATH           Path to an existing libpdfium — skips auto-download

NOTION DATABASE:
  Title column required. Optional columns, written when present:
  Porciones (number), Vegetariano (checkbox), Tags (multi-select).
"#;

/// Upload scanned recipe PDFs to a Notion database.
#[derive(Parser, Debug)]
#[command(
    name = "recipes2notion",
    version,
    about = "Upload scanned recipe PDFs to a Notion database",
    long_about = "Reads each page of the given PDF (or every PDF in the given directory) with a \
vision model, uploads the recipe to a Notion database and saves an AI-generated photo of the dish.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file or directory of PDF files.
    input: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenv::dotenv().ok();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the per-page feedback when attached to a
    // terminal; library INFO logs would only interleave with it. Warnings
    // (dropped alternatives, lost sub-pages) still get through.
    let show_progress = io::stderr().is_terminal();
    let filter = default_filter(show_progress);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = RecipeConfig::from_env().context("Configuration error")?;
    info!("{:?}", config);

    // ── Ensure PDFium engine is available ───────────────────────────────────
    // First run downloads the library (~30 MB) and caches it; later runs only
    // check the cached path.
    if !pdfium_auto::is_pdfium_cached() && show_progress {
        let dl_bar = ProgressBar::new(0);
        dl_bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(SPINNER),
        );
        dl_bar.set_prefix("PDF engine");
        dl_bar.enable_steady_tick(Duration::from_millis(80));

        let bar = dl_bar.clone();
        tokio::task::block_in_place(|| {
            pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                if let Some(t) = total {
                    if bar.length().unwrap_or(0) != t {
                        bar.set_length(t);
                    }
                }
                bar.set_position(downloaded);
            }))
        })
        .context("Failed to download PDFium engine")?;
        dl_bar.finish_with_message("ready ✓");
    } else {
        tokio::task::block_in_place(PdfiumRenderer::ensure_available)
            .context("PDFium engine unavailable")?;
    }

    // ── Run batch ────────────────────────────────────────────────────────
    let mut pipeline =
        RecipePipeline::from_config(&config).context("Failed to set up the pipeline")?;
    if show_progress {
        pipeline = pipeline.with_progress(CliProgressCallback::new() as ProgressCallback);
    }

    let report = pipeline
        .run(&cli.input)
        .await
        .with_context(|| format!("Cannot process {}", cli.input.display()))?;

    // ── Summary ──────────────────────────────────────────────────────────
    let stats = &report.stats;
    let mark = if stats.failed_pages == 0 {
        green("✔")
    } else if stats.uploaded_pages == 0 {
        red("✘")
    } else {
        cyan("⚠")
    };
    eprintln!(
        "{}  {}/{} recipes uploaded  {} illustrated  {} failed  {}ms",
        mark,
        bold(&stats.uploaded_pages.to_string()),
        stats.total_pages,
        stats.illustrated_pages,
        if stats.failed_pages == 0 {
            stats.failed_pages.to_string()
        } else {
            red(&stats.failed_pages.to_string())
        },
        stats.total_duration_ms,
    );
    if stats.dropped_alternatives > 0 {
        eprintln!(
            "   {} alternative recipe(s) dropped as unreadable",
            cyan(&stats.dropped_alternatives.to_string())
        );
    }
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
    );
    if !show_progress {
        for failed in report.failures() {
            let detail = failed
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();
            eprintln!("   {} {}: {}", red("✗"), failed.pdf.display(), detail);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_takes_one_path() {
        let cli = Cli::try_parse_from(["recipes2notion", "recetas/"]).expect("parses");
        assert_eq!(cli.input, PathBuf::from("recetas/"));
        assert!(Cli::try_parse_from(["recipes2notion", "a.pdf", "b.pdf"]).is_err());
    }

    #[test]
    fn warnings_survive_the_progress_bar() {
        assert_eq!(default_filter(true), "warn");
        assert_eq!(default_filter(false), "info");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("ñandú", 10), "ñandú");
        assert_eq!(truncate("ñandúñandú", 4), "ñan\u{2026}");
    }
}
