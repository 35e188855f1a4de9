//! Progress-callback trait for batch events.
//!
//! Pass an [`Arc<dyn BatchProgressCallback>`] to
//! [`crate::batch::RecipePipeline::with_progress`] to receive events as the
//! batch walks through files and pages. The CLI uses it to drive a progress
//! bar; a service could forward the same events to a channel or a database.
//!
//! # Example
//!
//! ```rust
//! use recipes2notion::{BatchProgressCallback, PageReport};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Uploaded(AtomicUsize);
//!
//! impl BatchProgressCallback for Uploaded {
//!     fn on_page_complete(&self, report: &PageReport) {
//!         if report.page_id.is_some() {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//! ```

use crate::batch::{BatchStats, PageReport};
use std::path::Path;
use std::sync::Arc;

/// Called by the batch orchestrator as it processes files and pages.
///
/// Pages are processed one at a time, so events arrive in order. All methods
/// default to no-ops; implement only what you need.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after input resolution.
    ///
    /// # Arguments
    /// * `total_pdfs` — number of PDF files that will be processed
    fn on_batch_start(&self, total_pdfs: usize) {
        let _ = total_pdfs;
    }

    /// Called when a PDF has been opened and its pages counted.
    fn on_pdf_start(&self, pdf: &Path, total_pages: usize) {
        let _ = (pdf, total_pages);
    }

    /// Called before a page is rendered.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number within the current PDF
    /// * `total_pages` — pages in the current PDF
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page reaches its last stage without error.
    fn on_page_complete(&self, report: &PageReport) {
        let _ = report;
    }

    /// Called when a page (or a whole PDF, as page 0) fails.
    fn on_page_error(&self, report: &PageReport) {
        let _ = report;
    }

    /// Called once after every PDF has been attempted.
    fn on_batch_complete(&self, stats: &BatchStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type held by the orchestrator.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
