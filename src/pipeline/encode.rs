//! Image encoding: `DynamicImage` → base64 PNG wrapped in `ImageData`.
//!
//! PNG is lossless; JPEG artefacts around handwritten notes and small
//! quantities ("1/2 CDA") measurably hurt extraction. `detail: "high"` keeps
//! providers that tile images from downsampling the scan to a single tile.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG ready for the vision model.
///
/// pdfium renders RGBA, but a scanned page is opaque; dropping the alpha
/// channel shrinks the request body by about a quarter.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    let opaque = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => None,
        other => Some(DynamicImage::ImageRgb8(other.to_rgb8())),
    };
    opaque
        .as_ref()
        .unwrap_or(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} page → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
