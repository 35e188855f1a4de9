//! Orchestrator tests with in-memory fakes: no pdfium, no network.

use async_trait::async_trait;
use edgequake_llm::ImageData;
use image::{DynamicImage, Rgb, RgbImage};
use pretty_assertions::assert_eq;
use recipes2notion::{
    BatchProgressCallback, BatchStats, Extraction, ExtractionError, IllustrationError, Illustrator,
    PageError, PageReport, PageSource, PageStage, ParseError, RecipeError, RecipePipeline,
    RecipeRecord, RecipeSink, UploadError,
};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────

/// Page counts keyed by file name; a missing name fails to open.
struct FakePages {
    counts: HashMap<String, usize>,
    broken_pages: Vec<(String, usize)>,
}

impl FakePages {
    fn new(counts: &[(&str, usize)]) -> Self {
        Self {
            counts: counts.iter().map(|(n, c)| (n.to_string(), *c)).collect(),
            broken_pages: Vec::new(),
        }
    }
}

fn name(pdf: &Path) -> String {
    pdf.file_name().unwrap().to_string_lossy().into_owned()
}

#[async_trait]
impl PageSource for FakePages {
    async fn page_count(&self, pdf: &Path) -> Result<usize, String> {
        self.counts
            .get(&name(pdf))
            .copied()
            .ok_or_else(|| "PDF could not be opened: bad xref".to_string())
    }

    async fn render_page(&self, pdf: &Path, index: usize) -> Result<DynamicImage, String> {
        if self.broken_pages.contains(&(name(pdf), index)) {
            return Err("bitmap allocation failed".into());
        }
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 255, 255]))))
    }
}

/// Replies handed out in call order.
struct ScriptedExtractor {
    replies: Mutex<VecDeque<Result<String, ExtractionError>>>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    fn new(replies: Vec<Result<String, ExtractionError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl recipes2notion::Extractor for ScriptedExtractor {
    async fn extract(&self, _page: usize, image: ImageData) -> Result<Extraction, ExtractionError> {
        assert_eq!(image.mime_type, "image/png");
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("more extractions than scripted")?;
        Ok(Extraction {
            text,
            input_tokens: 1000,
            output_tokens: 100,
            ..Default::default()
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    uploaded: Mutex<Vec<RecipeRecord>>,
    reject_titles: Vec<String>,
}

#[async_trait]
impl RecipeSink for RecordingSink {
    async fn create_recipe(&self, record: &RecipeRecord) -> Result<String, UploadError> {
        if self.reject_titles.contains(&record.title) {
            return Err(UploadError::SchemaMismatch {
                detail: "Porciones is expected to be number.".into(),
            });
        }
        let mut uploaded = self.uploaded.lock().unwrap();
        uploaded.push(record.clone());
        Ok(format!("page-{}", uploaded.len()))
    }
}

impl RecordingSink {
    fn titles(&self) -> Vec<String> {
        self.uploaded
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.title.clone())
            .collect()
    }
}

#[derive(Default)]
struct FakeIllustrator {
    drawn: Mutex<Vec<String>>,
    fail: bool,
}

#[async_trait]
impl Illustrator for FakeIllustrator {
    async fn illustrate(&self, record: &RecipeRecord) -> Result<PathBuf, IllustrationError> {
        if self.fail {
            return Err(IllustrationError::NoImage);
        }
        self.drawn.lock().unwrap().push(record.title.clone());
        Ok(PathBuf::from(format!("Images/{}.png", record.title)))
    }
}

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl BatchProgressCallback for EventLog {
    fn on_batch_start(&self, total_pdfs: usize) {
        self.0.lock().unwrap().push(format!("batch {total_pdfs}"));
    }
    fn on_pdf_start(&self, pdf: &Path, total_pages: usize) {
        self.0
            .lock()
            .unwrap()
            .push(format!("pdf {} {}", name(pdf), total_pages));
    }
    fn on_page_complete(&self, report: &PageReport) {
        self.0.lock().unwrap().push(format!("ok {}", report.page_num));
    }
    fn on_page_error(&self, report: &PageReport) {
        self.0.lock().unwrap().push(format!("err {}", report.page_num));
    }
    fn on_batch_complete(&self, stats: &BatchStats) {
        self.0
            .lock()
            .unwrap()
            .push(format!("done {}/{}", stats.uploaded_pages, stats.total_pages));
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

fn recipe_json(title: &str) -> String {
    format!(
        r#"{{"emoji":"🥘","title":"{title}","servings":4,"vegetarian":false,
"ingredients":["Arroz 400 GR","Sal C/N"],"instructions":["Hervir.","Servir."],"notes":[]}}"#
    )
}

fn pdf_dir(names: &[&str]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for n in names {
        std::fs::write(tmp.path().join(n), b"%PDF-1.4\n").unwrap();
    }
    tmp
}

fn ok(s: String) -> Result<String, ExtractionError> {
    Ok(s)
}

/// Route library logs to the test harness; run with `--nocapture` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("recipes2notion=debug"))
        .with_test_writer()
        .try_init();
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pages_are_processed_in_file_then_page_order() {
    init_tracing();
    let dir = pdf_dir(&["b_postres.pdf", "a_arroces.pdf"]);
    let sink = Arc::new(RecordingSink::default());
    let pipeline = RecipePipeline::new(
        Arc::new(FakePages::new(&[("a_arroces.pdf", 2), ("b_postres.pdf", 1)])),
        Arc::new(ScriptedExtractor::new(vec![
            ok(recipe_json("Paella")),
            ok(recipe_json("Risotto")),
            ok(recipe_json("Flan")),
        ])),
        sink.clone(),
    );

    let report = pipeline.run(dir.path()).await.expect("batch runs");

    assert_eq!(sink.titles(), vec!["Paella", "Risotto", "Flan"]);
    let order: Vec<(String, usize)> = report
        .pages
        .iter()
        .map(|p| (name(&p.pdf), p.page_num))
        .collect();
    assert_eq!(
        order,
        vec![
            ("a_arroces.pdf".to_string(), 1),
            ("a_arroces.pdf".to_string(), 2),
            ("b_postres.pdf".to_string(), 1),
        ]
    );
    assert!(report.pages.iter().all(|p| p.stage == PageStage::Uploaded));
    assert_eq!(report.stats.uploaded_pages, 3);
    assert_eq!(report.stats.total_input_tokens, 3000);
}

#[tokio::test]
async fn uploaded_record_is_normalised() {
    let dir = pdf_dir(&["arroz.pdf"]);
    let sink = Arc::new(RecordingSink::default());
    let pipeline = RecipePipeline::new(
        Arc::new(FakePages::new(&[("arroz.pdf", 1)])),
        Arc::new(ScriptedExtractor::new(vec![ok(format!(
            "Aquí está la receta:\n```json\n{}\n```",
            recipe_json("Arroz blanco")
        ))])),
        sink.clone(),
    );

    pipeline.run(dir.path()).await.unwrap();

    let uploaded = sink.uploaded.lock().unwrap();
    assert_eq!(uploaded[0].title, "Arroz blanco");
    assert_eq!(uploaded[0].servings, Some(4));
    assert_eq!(uploaded[0].ingredients, vec!["Arroz 400 GR", "Sal a gusto"]);
}

#[tokio::test]
async fn a_failed_page_does_not_stop_the_batch() {
    init_tracing();
    let dir = pdf_dir(&["libro.pdf"]);
    let sink = Arc::new(RecordingSink::default());
    let pipeline = RecipePipeline::new(
        Arc::new(FakePages::new(&[("libro.pdf", 4)])),
        Arc::new(ScriptedExtractor::new(vec![
            ok(recipe_json("Tortilla")),
            ok("Lo siento, no puedo leer esta página.".into()),
            Err(ExtractionError::Timeout { secs: 120 }),
            ok(recipe_json("Gazpacho")),
        ])),
        sink.clone(),
    );

    let report = pipeline.run(dir.path()).await.unwrap();

    assert_eq!(sink.titles(), vec!["Tortilla", "Gazpacho"]);
    assert!(matches!(
        report.pages[1].error,
        Some(PageError::Parse {
            page: 2,
            source: ParseError::NoJsonObject
        })
    ));
    assert!(matches!(
        report.pages[2].error,
        Some(PageError::Extraction { page: 3, .. })
    ));
    assert_eq!(report.pages[1].stage, PageStage::Failed);
    assert_eq!(report.stats.failed_pages, 2);
    assert_eq!(report.failures().count(), 2);
}

#[tokio::test]
async fn missing_title_is_a_parse_failure() {
    let dir = pdf_dir(&["libro.pdf"]);
    let pipeline = RecipePipeline::new(
        Arc::new(FakePages::new(&[("libro.pdf", 1)])),
        Arc::new(ScriptedExtractor::new(vec![ok(
            r#"{"ingredients":["Harina"],"instructions":[]}"#.into(),
        )])),
        Arc::new(RecordingSink::default()),
    );

    let report = pipeline.run(dir.path()).await.unwrap();
    assert!(matches!(
        report.pages[0].error,
        Some(PageError::Parse {
            source: ParseError::MissingTitle,
            ..
        })
    ));
}

#[tokio::test]
async fn render_failure_skips_the_model() {
    let dir = pdf_dir(&["libro.pdf"]);
    let mut pages = FakePages::new(&[("libro.pdf", 2)]);
    pages.broken_pages.push(("libro.pdf".into(), 0));
    let extractor = Arc::new(ScriptedExtractor::new(vec![ok(recipe_json("Sopa"))]));
    let pipeline = RecipePipeline::new(
        Arc::new(pages),
        extractor.clone(),
        Arc::new(RecordingSink::default()),
    );

    let report = pipeline.run(dir.path()).await.unwrap();

    assert!(matches!(
        report.pages[0].error,
        Some(PageError::Render { page: 1, .. })
    ));
    assert_eq!(report.pages[1].title.as_deref(), Some("Sopa"));
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unopenable_pdf_is_reported_and_skipped() {
    let dir = pdf_dir(&["a_roto.pdf", "b_bueno.pdf"]);
    let pipeline = RecipePipeline::new(
        Arc::new(FakePages::new(&[("b_bueno.pdf", 1)])),
        Arc::new(ScriptedExtractor::new(vec![ok(recipe_json("Pan"))])),
        Arc::new(RecordingSink::default()),
    );

    let report = pipeline.run(dir.path()).await.unwrap();

    assert_eq!(report.pages.len(), 2);
    assert_eq!(report.pages[0].page_num, 0);
    assert!(matches!(
        report.pages[0].error,
        Some(PageError::Render { page: 0, .. })
    ));
    assert!(report.pages[1].is_success());
    assert_eq!(report.stats.total_pages, 1);
}

#[tokio::test]
async fn files_that_are_not_pdfs_are_reported_like_unopenable_ones() {
    let dir = pdf_dir(&["b_bueno.pdf"]);
    std::fs::write(dir.path().join("a_escaneo.pdf"), b"<html>").unwrap();
    std::fs::write(dir.path().join("c_vacio.pdf"), b"").unwrap();
    let pipeline = RecipePipeline::new(
        // Page counts for every name: only the content check can fail them.
        Arc::new(FakePages::new(&[("a_escaneo.pdf", 1), ("b_bueno.pdf", 1), ("c_vacio.pdf", 1)])),
        Arc::new(ScriptedExtractor::new(vec![ok(recipe_json("Pan"))])),
        Arc::new(RecordingSink::default()),
    );

    let report = pipeline.run(dir.path()).await.unwrap();

    let summary: Vec<(String, usize, bool)> = report
        .pages
        .iter()
        .map(|p| (name(&p.pdf), p.page_num, p.is_success()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("a_escaneo.pdf".to_string(), 0, false),
            ("b_bueno.pdf".to_string(), 1, true),
            ("c_vacio.pdf".to_string(), 0, false),
        ]
    );
    assert!(matches!(
        &report.pages[0].error,
        Some(PageError::Render { page: 0, detail }) if detail.contains("not a valid PDF")
    ));
    assert_eq!(report.stats.pdfs, 3);
}

#[tokio::test]
async fn upload_failure_skips_illustration() {
    let dir = pdf_dir(&["libro.pdf"]);
    let sink = Arc::new(RecordingSink {
        reject_titles: vec!["Guiso".into()],
        ..Default::default()
    });
    let illustrator = Arc::new(FakeIllustrator::default());
    let pipeline = RecipePipeline::new(
        Arc::new(FakePages::new(&[("libro.pdf", 2)])),
        Arc::new(ScriptedExtractor::new(vec![
            ok(recipe_json("Guiso")),
            ok(recipe_json("Pollo al horno")),
        ])),
        sink,
    )
    .with_illustrator(illustrator.clone());

    let report = pipeline.run(dir.path()).await.unwrap();

    assert!(matches!(
        report.pages[0].error,
        Some(PageError::Upload {
            source: UploadError::SchemaMismatch { .. },
            ..
        })
    ));
    assert_eq!(*illustrator.drawn.lock().unwrap(), vec!["Pollo al horno"]);
    assert_eq!(report.pages[1].stage, PageStage::ImageSaved);
    assert_eq!(
        report.pages[1].image_path,
        Some(PathBuf::from("Images/Pollo al horno.png"))
    );
}

#[tokio::test]
async fn illustration_failure_keeps_the_upload() {
    let dir = pdf_dir(&["libro.pdf"]);
    let pipeline = RecipePipeline::new(
        Arc::new(FakePages::new(&[("libro.pdf", 1)])),
        Arc::new(ScriptedExtractor::new(vec![ok(recipe_json("Lentejas"))])),
        Arc::new(RecordingSink::default()),
    )
    .with_illustrator(Arc::new(FakeIllustrator {
        fail: true,
        ..Default::default()
    }));

    let report = pipeline.run(dir.path()).await.unwrap();

    let page = &report.pages[0];
    assert_eq!(page.page_id.as_deref(), Some("page-1"));
    assert!(matches!(page.error, Some(PageError::Illustration { .. })));
    assert_eq!(report.stats.uploaded_pages, 1);
    assert_eq!(report.stats.illustrated_pages, 0);
}

#[tokio::test]
async fn dropped_alternatives_are_counted() {
    init_tracing();
    let dir = pdf_dir(&["libro.pdf"]);
    let reply = r#"{"title":"Ensalada César","vegetarian":true,
        "ingredients":["Lechuga"],"instructions":["Mezclar."],
        "alternatives":[{"ingredients":["sin título"]},{"title":"Aderezo","ingredients":["Mayonesa"]}]}"#;
    let sink = Arc::new(RecordingSink::default());
    let pipeline = RecipePipeline::new(
        Arc::new(FakePages::new(&[("libro.pdf", 1)])),
        Arc::new(ScriptedExtractor::new(vec![ok(reply.into())])),
        sink.clone(),
    );

    let report = pipeline.run(dir.path()).await.unwrap();

    assert!(report.pages[0].is_success());
    assert_eq!(report.pages[0].dropped_alternatives, 1);
    assert_eq!(report.stats.dropped_alternatives, 1);
    let uploaded = sink.uploaded.lock().unwrap();
    assert_eq!(uploaded[0].alternatives.len(), 1);
    assert_eq!(uploaded[0].alternatives[0].title, "Aderezo");
}

#[tokio::test]
async fn progress_events_follow_the_batch() {
    let dir = pdf_dir(&["libro.pdf"]);
    let log = Arc::new(EventLog::default());
    let pipeline = RecipePipeline::new(
        Arc::new(FakePages::new(&[("libro.pdf", 2)])),
        Arc::new(ScriptedExtractor::new(vec![
            ok(recipe_json("Tarta")),
            ok("{}".into()),
        ])),
        Arc::new(RecordingSink::default()),
    )
    .with_progress(log.clone());

    pipeline.run(dir.path()).await.unwrap();

    assert_eq!(
        *log.0.lock().unwrap(),
        vec!["batch 1", "pdf libro.pdf 2", "ok 1", "err 2", "done 1/2"]
    );
}

#[tokio::test]
async fn missing_input_is_fatal() {
    let pipeline = RecipePipeline::new(
        Arc::new(FakePages::new(&[])),
        Arc::new(ScriptedExtractor::new(vec![])),
        Arc::new(RecordingSink::default()),
    );
    let err = pipeline
        .run(Path::new("/no/such/recetas"))
        .await
        .unwrap_err();
    assert!(matches!(err, RecipeError::FileNotFound { .. }));
}
