//! Image encoding: `DynamicImage` → base64 PNG string.
//!
//! PNG is chosen over JPEG because it is lossless — compression artefacts on
//! rendered text measurably degrade OCR accuracy, and page renders compress
//! well under PNG anyway.

use crate::error::OcrError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page as base64 PNG, ready for a data-URI payload.
pub fn encode_page(img: &DynamicImage) -> Result<String, OcrError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| OcrError::FileProcessing(format!("Image encoding failed: {e}")))?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page → {} bytes base64", b64.len());
    Ok(b64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let b64 = encode_page(&img).expect("encode should succeed");
        assert!(!b64.is_empty());

        let decoded = STANDARD.decode(&b64).expect("valid base64");
        // PNG magic bytes
        assert_eq!(&decoded[..4], &[0x89, b'P', b'N', b'G']);
    }
}
