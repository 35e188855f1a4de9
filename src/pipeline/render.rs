//! PDF rasterisation: render one page at a time to `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! async-aware. Each call runs on tokio's blocking pool so the runtime is
//! never stalled while a 300 DPI scan is rasterised.
//!
//! ## Why one page per call?
//!
//! A 300 DPI letter page is ~33 MB of RGBA. Rendering lazily keeps only the
//! page being processed in memory and lets a single bad page fail on its own
//! instead of taking the whole document down with it.

use crate::config::RecipeConfig;
use crate::error::RecipeError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Source of page images for the pipeline.
///
/// [`PdfiumRenderer`] is the real implementation; tests substitute fakes.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Number of pages in the document.
    async fn page_count(&self, pdf: &Path) -> Result<usize, String>;

    /// Rasterise the page at 0-based `index`.
    async fn render_page(&self, pdf: &Path, index: usize) -> Result<DynamicImage, String>;
}

/// Renders pages with pdfium, binding the library through `pdfium-auto`.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    dpi: u32,
    max_pixels: u32,
}

impl PdfiumRenderer {
    pub fn new(config: &RecipeConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
        }
    }

    /// Make sure a pdfium library can be bound before the batch starts.
    ///
    /// Downloads and caches the library on first use.
    pub fn ensure_available() -> Result<PathBuf, RecipeError> {
        pdfium_auto::ensure_pdfium_library(None)
            .map_err(|e| RecipeError::PdfiumBindingFailed(e.to_string()))
    }
}

#[async_trait]
impl PageSource for PdfiumRenderer {
    async fn page_count(&self, pdf: &Path) -> Result<usize, String> {
        let path = pdf.to_path_buf();
        tokio::task::spawn_blocking(move || page_count_blocking(&path))
            .await
            .map_err(|e| format!("render task panicked: {e}"))?
    }

    async fn render_page(&self, pdf: &Path, index: usize) -> Result<DynamicImage, String> {
        let path = pdf.to_path_buf();
        let (dpi, max_pixels) = (self.dpi, self.max_pixels);
        tokio::task::spawn_blocking(move || render_page_blocking(&path, index, dpi, max_pixels))
            .await
            .map_err(|e| format!("render task panicked: {e}"))?
    }
}

fn bind() -> Result<Pdfium, String> {
    pdfium_auto::bind_pdfium_silent().map_err(|e| e.to_string())
}

fn page_count_blocking(pdf_path: &Path) -> Result<usize, String> {
    let pdfium = bind()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| describe_load_error(&e))?;
    let total = document.pages().len() as usize;
    info!("PDF loaded: {} ({} pages)", pdf_path.display(), total);
    Ok(total)
}

fn render_page_blocking(
    pdf_path: &Path,
    index: usize,
    dpi: u32,
    max_pixels: u32,
) -> Result<DynamicImage, String> {
    let pdfium = bind()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| describe_load_error(&e))?;
    let pages = document.pages();

    let page = pages
        .get(index as u16)
        .map_err(|e| format!("page {} unavailable: {:?}", index + 1, e))?;

    let (width, height) = target_size(page.width().value, page.height().value, dpi, max_pixels);
    let render_config = PdfRenderConfig::new()
        .set_target_width(width)
        .set_maximum_height(height);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| format!("{:?}", e))?;
    let image = bitmap.as_image();

    debug!(
        "Rendered page {} → {}x{} px",
        index + 1,
        image.width(),
        image.height()
    );
    Ok(image)
}

fn describe_load_error(e: &PdfiumError) -> String {
    let detail = format!("{:?}", e);
    if detail.to_lowercase().contains("password") {
        "PDF is encrypted and requires a password".to_string()
    } else {
        format!("PDF could not be opened: {detail}")
    }
}

/// Pixel size for a page of `width_pt` × `height_pt` points at `dpi`, with
/// the longest edge capped at `max_pixels`.
pub fn target_size(width_pt: f32, height_pt: f32, dpi: u32, max_pixels: u32) -> (i32, i32) {
    let scale = dpi as f32 / 72.0;
    let mut w = (width_pt * scale).max(1.0);
    let mut h = (height_pt * scale).max(1.0);
    let longest = w.max(h);
    if longest > max_pixels as f32 {
        let shrink = max_pixels as f32 / longest;
        w *= shrink;
        h *= shrink;
    }
    (w.round() as i32, h.round() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_page_at_300_dpi() {
        // 8.5 × 11 in = 612 × 792 pt
        assert_eq!(target_size(612.0, 792.0, 300, 4000), (2550, 3300));
    }

    #[test]
    fn longest_edge_is_capped() {
        let (w, h) = target_size(612.0, 792.0, 300, 3000);
        assert_eq!(h, 3000);
        assert_eq!(w, 2318);
    }

    #[test]
    fn degenerate_page_still_has_pixels() {
        assert_eq!(target_size(0.0, 0.0, 300, 3000), (1, 1));
    }
}
