//! Error types for the recipes2notion library.
//!
//! Two layers of failure, mirroring how a batch run behaves:
//!
//! * [`RecipeError`] — **Fatal**: the batch cannot start at all (missing
//!   credentials, input path does not exist, pdfium cannot be loaded).
//!   Returned as `Err(RecipeError)` from [`crate::batch::RecipePipeline::run`].
//!
//! * [`PageError`] — **Non-fatal**: one page failed at one stage (render,
//!   extraction, parse, upload, illustration). Stored inside
//!   [`crate::batch::PageReport`] so the batch moves on to the next page.
//!
//! Each pipeline stage has its own small error enum ([`ExtractionError`],
//! [`ParseError`], [`UploadError`], [`IllustrationError`]); [`PageError`]
//! wraps them together with the page number that produced them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the recipes2notion library.
#[derive(Debug, Error)]
pub enum RecipeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input path was not found.
    #[error("Input not found: '{path}'\nPass a PDF file or a directory of PDFs.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the path.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// A directory was given but contains no `.pdf` files.
    #[error("No PDF files found in directory '{path}'")]
    NoPdfsFound { path: PathBuf },

    // ── Config errors ─────────────────────────────────────────────────────
    /// A required environment variable is missing or empty.
    #[error("Missing credential: {var} is not set.\nAdd it to your environment or to a .env file.")]
    MissingCredential { var: &'static str },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The vision LLM provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure to turn raw model output into a [`crate::recipe::RecipeRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ParseError {
    /// No `{ ... }` object could be located in the text.
    #[error("no JSON object found in model output")]
    NoJsonObject,

    /// A balanced object was found but it is not valid JSON.
    #[error("model output contains malformed JSON: {detail}")]
    InvalidJson { detail: String },

    /// Valid JSON, but a field has a shape that cannot be coerced.
    #[error("recipe payload does not match the expected shape: {detail}")]
    Schema { detail: String },

    /// The required `title` field is absent or blank.
    #[error("recipe payload has no title")]
    MissingTitle,
}

/// Failure of the vision model call.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ExtractionError {
    /// The provider returned an error on every attempt.
    #[error("LLM call failed after {retries} retries: {detail}")]
    Api { retries: u32, detail: String },

    /// The call did not finish within the configured timeout.
    #[error("LLM call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The model answered with nothing but whitespace.
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

/// Rejection or failure while creating a Notion page.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum UploadError {
    /// 401/403 — the integration token is wrong or lacks access to the database.
    #[error("Notion rejected the credentials (HTTP {status}): {detail}")]
    Unauthorized { status: u16, detail: String },

    /// 400 `validation_error` — usually a property name or type mismatch.
    #[error("Notion schema mismatch: {detail}")]
    SchemaMismatch { detail: String },

    /// Any other non-success status.
    #[error("Notion API error (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// Network or decoding failure before a status was available.
    #[error("Notion request failed: {0}")]
    Transport(String),

    /// The response did not contain a page id.
    #[error("Notion response missing page id")]
    MissingPageId,
}

/// Failure while generating or saving the recipe illustration.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum IllustrationError {
    /// The prompt-writing step failed.
    #[error("could not write the image prompt: {0}")]
    Brief(String),

    /// The image model call failed.
    #[error("image generation request failed: {0}")]
    Api(String),

    /// The image model answered without any inline image.
    #[error("image model returned no image")]
    NoImage,

    /// The returned bytes are not a decodable image.
    #[error("generated image could not be decoded: {0}")]
    Decode(String),

    /// The PNG could not be written to disk.
    #[error("failed to write image '{path}': {detail}")]
    Write { path: PathBuf, detail: String },
}

/// A non-fatal error for a single page.
///
/// Stored in [`crate::batch::PageReport`]. The batch continues with the next
/// page regardless of which variant occurred.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum PageError {
    /// Page rasterisation or encoding failed (or the PDF could not be opened).
    #[error("Page {page}: rendering failed: {detail}")]
    Render { page: usize, detail: String },

    /// The vision model call failed.
    #[error("Page {page}: extraction failed: {source}")]
    Extraction {
        page: usize,
        #[source]
        source: ExtractionError,
    },

    /// The model output could not be normalised into a recipe.
    #[error("Page {page}: {source}")]
    Parse {
        page: usize,
        #[source]
        source: ParseError,
    },

    /// Notion rejected the upload.
    #[error("Page {page}: upload failed: {source}")]
    Upload {
        page: usize,
        #[source]
        source: UploadError,
    },

    /// The recipe was uploaded but its illustration could not be produced.
    #[error("Page {page}: illustration failed: {source}")]
    Illustration {
        page: usize,
        #[source]
        source: IllustrationError,
    },
}

impl PageError {
    /// 1-indexed page number the error belongs to (0 for whole-file failures).
    pub fn page(&self) -> usize {
        match self {
            PageError::Render { page, .. }
            | PageError::Extraction { page, .. }
            | PageError::Parse { page, .. }
            | PageError::Upload { page, .. }
            | PageError::Illustration { page, .. } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_names_variable() {
        let e = RecipeError::MissingCredential {
            var: "NOTION_TOKEN",
        };
        assert!(e.to_string().contains("NOTION_TOKEN"), "got: {e}");
    }

    #[test]
    fn parse_error_display_includes_page() {
        let e = PageError::Parse {
            page: 4,
            source: ParseError::MissingTitle,
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 4"), "got: {msg}");
        assert!(msg.contains("no title"), "got: {msg}");
        assert_eq!(e.page(), 4);
    }

    #[test]
    fn upload_error_display() {
        let e = PageError::Upload {
            page: 2,
            source: UploadError::Unauthorized {
                status: 401,
                detail: "API token is invalid.".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("401"));
        assert!(msg.contains("API token is invalid."));
    }

    #[test]
    fn extraction_timeout_display() {
        let e = ExtractionError::Timeout { secs: 90 };
        assert!(e.to_string().contains("90s"));
    }

    #[test]
    fn page_error_serialises() {
        let e = PageError::Render {
            page: 1,
            detail: "bad xref".into(),
        };
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("bad xref"));
    }
}
