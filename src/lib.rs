//! # recipes2notion
//!
//! Turn scanned recipe cards (PDF) into pages of a Notion recipe database,
//! each with an AI-generated photo of the finished dish.
//!
//! ## Why a vision model?
//!
//! The source pages are scans: printed recipes with handwritten notes in the
//! margins, sub-recipes in boxes, quantities like "1/2 CDA" or "C/N". OCR
//! yields a soup of lines with no notion of which belongs to which section.
//! A vision model reads the page the way a cook does and answers with a
//! structured JSON record, which this crate validates before anything is
//! written to Notion.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF file or directory
//!  │
//!  ├─ 1. Input      resolve and sort PDFs by file name
//!  ├─ 2. Render     one page at a time via pdfium (spawn_blocking)
//!  ├─ 3. Encode     PNG → base64 ImageData
//!  ├─ 4. Extract    vision model, retry with backoff, timeout
//!  ├─ 5. Normalize  raw reply → validated RecipeRecord
//!  ├─ 6. Upload     Notion database page (+ child pages for alternatives)
//!  └─ 7. Illustrate Gemini image → Images/{title}.png
//! ```
//!
//! Pages run strictly in order. A failure at any stage is recorded in that
//! page's [`PageReport`] and the batch continues.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use recipes2notion::{RecipeConfig, RecipePipeline};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // GEMINI_API_KEY, NOTION_TOKEN and NOTION_DATABASE_ID must be set.
//!     let config = RecipeConfig::from_env()?;
//!     let report = RecipePipeline::from_config(&config)?
//!         .run(Path::new("recetas/"))
//!         .await?;
//!     for failed in report.failures() {
//!         eprintln!("{:?}", failed.error);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `recipes2notion` binary (clap, anyhow, tracing-subscriber, indicatif, dotenv) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod illustrate;
pub mod notion;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod recipe;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{BatchReport, BatchStats, PageReport, PageStage, RecipePipeline};
pub use config::{PropertyNames, RecipeConfig, RecipeConfigBuilder, SectionLabels};
pub use error::{
    ExtractionError, IllustrationError, PageError, ParseError, RecipeError, UploadError,
};
pub use illustrate::{GeminiIllustrator, Illustrator};
pub use notion::{NotionClient, RecipeSink};
pub use pipeline::extract::{Extraction, Extractor, VisionExtractor};
pub use pipeline::normalize::{normalize, normalize_detailed, Normalized};
pub use pipeline::render::{PageSource, PdfiumRenderer};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use recipe::RecipeRecord;
