//! Batch orchestration: every page of every PDF, one at a time.
//!
//! ## Why sequential?
//!
//! Each page costs two or three model calls and one or more Notion writes,
//! and Notion rate-limits integrations to a few requests per second. Running
//! pages in order keeps uploads in document order, keeps memory at one
//! rendered page and makes the log read like the stack of recipe cards.
//!
//! ## Failure model
//!
//! Only input resolution can abort a batch ([`RecipeError`]). Anything that
//! goes wrong after that is recorded in the page's [`PageReport`] as a
//! [`PageError`] and the batch moves on. A PDF that cannot be opened yields a
//! single failed report with `page_num == 0`.

use crate::config::RecipeConfig;
use crate::error::{PageError, RecipeError};
use crate::illustrate::{GeminiIllustrator, Illustrator};
use crate::notion::{NotionClient, PageId, RecipeSink};
use crate::pipeline::extract::{Extractor, VisionExtractor};
use crate::pipeline::normalize::{self, Normalized};
use crate::pipeline::render::{PageSource, PdfiumRenderer};
use crate::pipeline::{encode, input};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// ── Reports ──────────────────────────────────────────────────────────────

/// Furthest point a page reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageStage {
    #[default]
    Pending,
    Rendered,
    Extracted,
    Normalized,
    Uploaded,
    ImageSaved,
    Failed,
}

/// Outcome of one page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageReport {
    pub pdf: PathBuf,
    /// 1-indexed; 0 when the PDF itself could not be opened.
    pub page_num: usize,
    pub stage: PageStage,
    pub title: Option<String>,
    pub page_id: Option<PageId>,
    pub image_path: Option<PathBuf>,
    pub dropped_alternatives: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub error: Option<PageError>,
    pub duration_ms: u64,
}

impl PageReport {
    pub fn new(pdf: &Path, page_num: usize) -> Self {
        Self {
            pdf: pdf.to_path_buf(),
            page_num,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn fail(&mut self, error: PageError) {
        self.stage = PageStage::Failed;
        self.error = Some(error);
    }
}

/// Totals for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub pdfs: usize,
    pub total_pages: usize,
    pub uploaded_pages: usize,
    pub illustrated_pages: usize,
    pub failed_pages: usize,
    pub dropped_alternatives: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

impl BatchStats {
    fn from_reports(pdfs: usize, pages: &[PageReport], total_duration_ms: u64) -> Self {
        Self {
            pdfs,
            total_pages: pages.iter().filter(|p| p.page_num > 0).count(),
            uploaded_pages: pages.iter().filter(|p| p.page_id.is_some()).count(),
            illustrated_pages: pages.iter().filter(|p| p.image_path.is_some()).count(),
            failed_pages: pages.iter().filter(|p| p.error.is_some()).count(),
            dropped_alternatives: pages.iter().map(|p| p.dropped_alternatives).sum(),
            total_input_tokens: pages.iter().map(|p| p.input_tokens as u64).sum(),
            total_output_tokens: pages.iter().map(|p| p.output_tokens as u64).sum(),
            total_duration_ms,
        }
    }
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// In processing order: files sorted by name, pages in document order.
    pub pages: Vec<PageReport>,
    pub stats: BatchStats,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &PageReport> {
        self.pages.iter().filter(|p| !p.is_success())
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────

/// Drives pages through render → extract → normalise → upload → illustrate.
pub struct RecipePipeline {
    pages: Arc<dyn PageSource>,
    extractor: Arc<dyn Extractor>,
    sink: Arc<dyn RecipeSink>,
    illustrator: Option<Arc<dyn Illustrator>>,
    progress: Option<ProgressCallback>,
}

impl RecipePipeline {
    /// Assemble a pipeline from its parts. Illustration is off until
    /// [`with_illustrator`](Self::with_illustrator) is called.
    pub fn new(
        pages: Arc<dyn PageSource>,
        extractor: Arc<dyn Extractor>,
        sink: Arc<dyn RecipeSink>,
    ) -> Self {
        Self {
            pages,
            extractor,
            sink,
            illustrator: None,
            progress: None,
        }
    }

    /// The production pipeline: pdfium, the configured vision model, Notion
    /// and (unless disabled) Gemini illustrations.
    pub fn from_config(config: &RecipeConfig) -> Result<Self, RecipeError> {
        let extractor = VisionExtractor::from_config(config)?;
        let illustrator = if config.generate_images {
            Some(GeminiIllustrator::with_provider(extractor.provider(), config)?)
        } else {
            None
        };

        let mut pipeline = Self::new(
            Arc::new(PdfiumRenderer::new(config)),
            Arc::new(extractor),
            Arc::new(NotionClient::new(config)?),
        );
        if let Some(illustrator) = illustrator {
            pipeline = pipeline.with_illustrator(Arc::new(illustrator));
        }
        Ok(pipeline)
    }

    pub fn with_illustrator(mut self, illustrator: Arc<dyn Illustrator>) -> Self {
        self.illustrator = Some(illustrator);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Process a PDF file or a directory of PDFs.
    ///
    /// # Errors
    /// Returns `Err(RecipeError)` only when the input cannot be resolved.
    /// Per-page failures are reported in [`BatchReport::pages`].
    pub async fn run(&self, input: &Path) -> Result<BatchReport, RecipeError> {
        let start = Instant::now();
        let pdfs = input::resolve_inputs(input)?;
        info!("Processing {} PDF(s) from {}", pdfs.len(), input.display());

        if let Some(ref cb) = self.progress {
            cb.on_batch_start(pdfs.len());
        }

        let mut reports = Vec::new();
        for pdf in &pdfs {
            self.process_pdf(pdf, &mut reports).await;
        }

        let stats =
            BatchStats::from_reports(pdfs.len(), &reports, start.elapsed().as_millis() as u64);
        info!(
            "Batch complete: {} uploaded, {} illustrated, {} failed, {}ms",
            stats.uploaded_pages, stats.illustrated_pages, stats.failed_pages, stats.total_duration_ms
        );

        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(&stats);
        }

        Ok(BatchReport {
            pages: reports,
            stats,
        })
    }

    async fn process_pdf(&self, pdf: &Path, reports: &mut Vec<PageReport>) {
        let opened = match input::check_pdf_magic(pdf) {
            Ok(()) => self.pages.page_count(pdf).await,
            Err(e) => Err(e.to_string()),
        };
        let total = match opened {
            Ok(n) => n,
            Err(detail) => {
                let mut report = PageReport::new(pdf, 0);
                report.fail(PageError::Render { page: 0, detail });
                self.finish(report, reports);
                return;
            }
        };

        if total == 0 {
            warn!("{} has no pages", pdf.display());
        }
        if let Some(ref cb) = self.progress {
            cb.on_pdf_start(pdf, total);
        }

        for index in 0..total {
            if let Some(ref cb) = self.progress {
                cb.on_page_start(index + 1, total);
            }
            let report = self.process_page(pdf, index).await;
            self.finish(report, reports);
        }
    }

    async fn process_page(&self, pdf: &Path, index: usize) -> PageReport {
        let started = Instant::now();
        let mut report = PageReport::new(pdf, index + 1);

        if let Err(e) = self.advance(&mut report, index).await {
            report.fail(e);
        }
        report.duration_ms = started.elapsed().as_millis() as u64;
        report
    }

    /// Move one page through every stage, updating `report.stage` as it goes.
    async fn advance(&self, report: &mut PageReport, index: usize) -> Result<(), PageError> {
        let page = report.page_num;

        let image = self
            .pages
            .render_page(&report.pdf, index)
            .await
            .map_err(|detail| PageError::Render { page, detail })?;
        let encoded = encode::encode_page(&image).map_err(|e| PageError::Render {
            page,
            detail: format!("image encoding failed: {e}"),
        })?;
        drop(image);
        report.stage = PageStage::Rendered;

        let extraction = self
            .extractor
            .extract(page, encoded)
            .await
            .map_err(|source| PageError::Extraction { page, source })?;
        report.input_tokens = extraction.input_tokens;
        report.output_tokens = extraction.output_tokens;
        report.stage = PageStage::Extracted;

        let Normalized { record, dropped } =
            normalize::normalize_detailed(&extraction.text).map_err(|source| {
                debug!("Page {} unparseable reply:\n{}", page, extraction.text);
                PageError::Parse { page, source }
            })?;
        report.dropped_alternatives = dropped.len();
        report.title = Some(record.title.clone());
        report.stage = PageStage::Normalized;
        info!(
            "Page {}: '{}' ({} ingredients, {} steps, {} alternatives)",
            page,
            record.title,
            record.ingredients.len(),
            record.instructions.len(),
            record.alternatives.len()
        );

        let page_id = self
            .sink
            .create_recipe(&record)
            .await
            .map_err(|source| PageError::Upload { page, source })?;
        report.page_id = Some(page_id);
        report.stage = PageStage::Uploaded;

        if let Some(ref illustrator) = self.illustrator {
            let path = illustrator
                .illustrate(&record)
                .await
                .map_err(|source| PageError::Illustration { page, source })?;
            report.image_path = Some(path);
            report.stage = PageStage::ImageSaved;
        }
        Ok(())
    }

    fn finish(&self, report: PageReport, reports: &mut Vec<PageReport>) {
        match report.error {
            None => {
                if let Some(ref cb) = self.progress {
                    cb.on_page_complete(&report);
                }
            }
            Some(ref e) => {
                warn!("{}: {}", report.pdf.display(), e);
                if let Some(ref cb) = self.progress {
                    cb.on_page_error(&report);
                }
            }
        }
        reports.push(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ParseError, UploadError};

    fn report(page_num: usize) -> PageReport {
        PageReport::new(Path::new("recetas.pdf"), page_num)
    }

    #[test]
    fn new_report_is_pending() {
        let r = report(3);
        assert_eq!(r.stage, PageStage::Pending);
        assert_eq!(r.page_num, 3);
        assert!(r.is_success());
    }

    #[test]
    fn fail_marks_stage() {
        let mut r = report(1);
        r.stage = PageStage::Extracted;
        r.fail(PageError::Parse {
            page: 1,
            source: ParseError::NoJsonObject,
        });
        assert_eq!(r.stage, PageStage::Failed);
        assert!(!r.is_success());
    }

    #[test]
    fn stats_count_each_outcome() {
        let mut uploaded = report(1);
        uploaded.page_id = Some("p1".into());
        uploaded.stage = PageStage::Uploaded;
        uploaded.input_tokens = 1000;
        uploaded.output_tokens = 200;

        let mut illustrated = report(2);
        illustrated.page_id = Some("p2".into());
        illustrated.image_path = Some(PathBuf::from("Images/Flan.png"));
        illustrated.dropped_alternatives = 1;

        let mut rejected = report(3);
        rejected.fail(PageError::Upload {
            page: 3,
            source: UploadError::MissingPageId,
        });

        let mut unopened = PageReport::new(Path::new("roto.pdf"), 0);
        unopened.fail(PageError::Render {
            page: 0,
            detail: "bad xref".into(),
        });

        let stats = BatchStats::from_reports(2, &[uploaded, illustrated, rejected, unopened], 42);
        assert_eq!(
            stats,
            BatchStats {
                pdfs: 2,
                total_pages: 3,
                uploaded_pages: 2,
                illustrated_pages: 1,
                failed_pages: 2,
                dropped_alternatives: 1,
                total_input_tokens: 1000,
                total_output_tokens: 200,
                total_duration_ms: 42,
            }
        );
    }
}
