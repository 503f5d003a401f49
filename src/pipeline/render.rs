//! Page rendering: turn a document file into base64-encoded page images.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is CPU-bound
//! and not safe to call from async contexts. `tokio::task::spawn_blocking`
//! moves rasterisation onto the blocking thread pool so Tokio worker threads
//! never stall mid-render.
//!
//! ## DPI as a scale factor
//!
//! PDF page geometry is in points (1/72 inch); rendering at `dpi / 72` scale
//! reproduces the requested density exactly. The OCR endpoint accepts only
//! 150/200/300 DPI (enforced by [`crate::OcrConfig`]); the generic VLM flow
//! accepts any DPI and defaults to 72, where token cost grows quadratically
//! with density.

use crate::config::PageSelection;
use crate::error::OcrError;
use crate::pipeline::encode;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File extensions treated as single-page raster images and sent to the API
/// as-is, without rasterisation.
const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff"];

/// Convert a document file into base64-encoded page images.
///
/// Raster images become a single page (the selection is ignored, as there is
/// only one page to select). PDFs are rasterised page by page at `dpi`.
///
/// Returns one base64 string per selected page, in selection order.
pub async fn file_to_base64(
    path: &Path,
    dpi: u32,
    selection: &PageSelection,
) -> Result<Vec<String>, OcrError> {
    if !path.exists() {
        return Err(OcrError::FileProcessing(format!(
            "File not found: {}",
            path.display()
        )));
    }

    if is_image_file(path) {
        let bytes = std::fs::read(path).map_err(|e| {
            OcrError::FileProcessing(format!("Failed to read image file {}: {e}", path.display()))
        })?;
        debug!("Read image file {} ({} bytes)", path.display(), bytes.len());
        return Ok(vec![STANDARD.encode(bytes)]);
    }

    let path_buf = path.to_path_buf();
    let selection = selection.clone();

    tokio::task::spawn_blocking(move || render_pdf_blocking(&path_buf, dpi, &selection))
        .await
        .map_err(|e| OcrError::Internal(format!("Render task panicked: {e}")))?
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Blocking implementation of PDF rasterisation.
fn render_pdf_blocking(
    pdf_path: &PathBuf,
    dpi: u32,
    selection: &PageSelection,
) -> Result<Vec<String>, OcrError> {
    let pdfium = Pdfium::default();

    let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
        OcrError::FileProcessing(format!("Failed to open {}: {e:?}", pdf_path.display()))
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(OcrError::FileProcessing(format!(
            "File has no pages: {}",
            pdf_path.display()
        )));
    }
    info!("PDF loaded: {} pages", total_pages);

    let indices = selection.resolve(total_pages)?;

    let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);

    let mut results = Vec::with_capacity(indices.len());
    for idx in indices {
        let page = pages.get(idx as u16).map_err(|e| {
            OcrError::FileProcessing(format!("Failed to load page {}: {e:?}", idx + 1))
        })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            OcrError::FileProcessing(format!("Rasterisation failed for page {}: {e:?}", idx + 1))
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px at {} DPI",
            idx + 1,
            image.width(),
            image.height(),
            dpi
        );

        results.push(encode::encode_page(&image)?);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn image_extensions_are_recognised() {
        assert!(is_image_file(Path::new("scan.png")));
        assert!(is_image_file(Path::new("scan.JPEG")));
        assert!(is_image_file(Path::new("scan.webp")));
        assert!(!is_image_file(Path::new("doc.pdf")));
        assert!(!is_image_file(Path::new("noext")));
    }

    #[tokio::test]
    async fn missing_file_is_file_processing_error() {
        let err = file_to_base64(
            Path::new("/definitely/not/here.pdf"),
            200,
            &PageSelection::All,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OcrError::FileProcessing(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn image_file_passes_through_as_single_page() {
        let mut tmp = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        tmp.write_all(b"fake png bytes").unwrap();

        let pages = file_to_base64(tmp.path(), 200, &PageSelection::All)
            .await
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(STANDARD.decode(&pages[0]).unwrap(), b"fake png bytes");
    }
}
