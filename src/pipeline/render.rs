//! Rasterisation: count the pages of an upload and produce its first page image.
//!
//! PDFs are rendered page by page through pdfium; every page is drawn but only
//! page 1 is kept. Images are not touched:
//! their bytes are wrapped as a single page and only the header is read to
//! learn the dimensions.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so the
//! runtime's worker threads never stall on rendering.

use crate::config::ExtractionConfig;
use crate::document::{PageImage, UploadedDocument};
use crate::error::OcrError;
use pdfium_render::prelude::*;
use std::io::Cursor;
use tracing::{debug, info};

/// Result of rasterisation: how many pages the upload has and the first one.
///
/// Later pages are rendered (a page pdfium cannot draw still fails the
/// conversion) but their pixels are released as soon as each render returns.
#[derive(Debug)]
pub struct Rasterized {
    pub page_count: usize,
    pub first: PageImage,
}

/// Rasterise the upload.
///
/// PDFs render every page in document order and keep only page 1; images
/// yield exactly one page.
pub async fn rasterize(
    doc: &UploadedDocument,
    config: &ExtractionConfig,
) -> Result<Rasterized, OcrError> {
    if doc.media_type.is_image() {
        return Ok(Rasterized {
            page_count: 1,
            first: wrap_image(doc)?,
        });
    }
    render_pdf(doc, config, RenderScope::AllPages).await
}

/// Count pages and render only the first one.
///
/// Used by [`crate::extract::inspect`], which needs dimensions but not every page.
pub async fn first_page(
    doc: &UploadedDocument,
    config: &ExtractionConfig,
) -> Result<Rasterized, OcrError> {
    if doc.media_type.is_image() {
        return Ok(Rasterized {
            page_count: 1,
            first: wrap_image(doc)?,
        });
    }
    render_pdf(doc, config, RenderScope::FirstPage).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenderScope {
    AllPages,
    FirstPage,
}

/// Wrap an image upload as page 1, reading only the header.
fn wrap_image(doc: &UploadedDocument) -> Result<PageImage, OcrError> {
    let invalid = |detail: String| OcrError::InvalidImage {
        name: doc.name.clone(),
        detail,
    };

    let (width, height) = image::ImageReader::new(Cursor::new(&doc.bytes))
        .with_guessed_format()
        .map_err(|e| invalid(e.to_string()))?
        .into_dimensions()
        .map_err(|e| invalid(e.to_string()))?;

    debug!("Image upload {}: {}x{} px", doc.name, width, height);
    Ok(PageImage::upload(doc.bytes.clone(), doc.media_type, width, height))
}

async fn render_pdf(
    doc: &UploadedDocument,
    config: &ExtractionConfig,
    scope: RenderScope,
) -> Result<Rasterized, OcrError> {
    // Cheap header check before paying for a pdfium bind. pdfium itself
    // accepts leading junk, so look for the marker in the first kilobyte.
    if !has_pdf_header(&doc.bytes) {
        return Err(OcrError::ConversionFailed {
            name: doc.name.clone(),
            detail: "missing %PDF header".to_string(),
        });
    }

    let bytes = doc.bytes.clone();
    let name = doc.name.clone();
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();

    tokio::task::spawn_blocking(move || {
        render_pdf_blocking(&bytes, &name, max_pixels, password.as_deref(), scope)
    })
    .await
    .map_err(|e| OcrError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of page rendering.
fn render_pdf_blocking(
    bytes: &[u8],
    name: &str,
    max_pixels: u32,
    password: Option<&str>,
    scope: RenderScope,
) -> Result<Rasterized, OcrError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_byte_slice(bytes, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                OcrError::WrongPassword {
                    name: name.to_string(),
                }
            } else {
                OcrError::PasswordRequired {
                    name: name.to_string(),
                }
            }
        } else {
            OcrError::ConversionFailed {
                name: name.to_string(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(empty_document(name));
    }
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let wanted = match scope {
        RenderScope::AllPages => total_pages,
        RenderScope::FirstPage => 1,
    };
    let mut first = None;

    for (idx, page) in pages.iter().enumerate().take(wanted) {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            OcrError::ConversionFailed {
                name: name.to_string(),
                detail: format!("page {}: {:?}", idx + 1, e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        // Only page 1 is kept; later bitmaps are dropped here.
        if first.is_none() {
            first = Some(PageImage::rendered(idx + 1, image));
        }
    }

    let first = first.ok_or_else(|| empty_document(name))?;
    Ok(Rasterized {
        page_count: total_pages,
        first,
    })
}

/// Load the pdfium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_LIB_PATH` env var (explicit path to the library file)
/// 2. Alongside the running executable
/// 3. The current directory
/// 4. System library search paths
pub fn bind_pdfium() -> Result<Pdfium, OcrError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        debug!("Loading pdfium from PDFIUM_LIB_PATH={}", path);
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            OcrError::PdfiumBindingFailed(format!("{path}: {e:?}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    let mut candidates = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        candidates.push(exe_dir);
    }
    candidates.push(std::path::PathBuf::from("./"));

    for dir in &candidates {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!("Loaded pdfium from {}", dir.display());
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| OcrError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(1024)]
        .windows(4)
        .any(|w| w == b"%PDF")
}

fn empty_document(name: &str) -> OcrError {
    OcrError::ConversionFailed {
        name: name.to_string(),
        detail: "document has no pages".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MediaType;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    /// A valid PDF with `pages` blank 300×200 pt pages.
    fn blank_pdf(pages: usize) -> Vec<u8> {
        let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", i + 3)).collect();
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!("<< /Type /Pages /Kids [{}] /Count {pages} >>", kids.join(" ")),
        ];
        objects.extend(
            (0..pages).map(|_| "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 300 200] >>".to_string()),
        );

        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, obj) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{obj}\nendobj\n", i + 1).as_bytes());
        }
        let xref = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for off in offsets {
            out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
                objects.len() + 1
            )
            .as_bytes(),
        );
        out
    }

    fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([9, 9, 9])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn pdf_header_detection() {
        assert!(has_pdf_header(b"%PDF-1.7\n..."));
        assert!(has_pdf_header(b"\xef\xbb\xbf%PDF-1.4"));
        assert!(!has_pdf_header(b"PK\x03\x04"));
        assert!(!has_pdf_header(b""));
    }

    #[tokio::test]
    async fn png_upload_is_single_untouched_page() {
        let bytes = encoded(12, 7, ImageFormat::Png);
        let doc = UploadedDocument::new("a.png", bytes.clone(), MediaType::Png);
        let out = rasterize(&doc, &ExtractionConfig::default()).await.unwrap();
        assert_eq!(out.page_count, 1);
        assert_eq!((out.first.width, out.first.height), (12, 7));
        assert_eq!(out.first.original_bytes(), Some(bytes.as_slice()));
    }

    #[tokio::test]
    async fn jpeg_upload_is_single_page() {
        let doc = UploadedDocument::new("a.jpg", encoded(30, 20, ImageFormat::Jpeg), MediaType::Jpeg);
        let out = rasterize(&doc, &ExtractionConfig::default()).await.unwrap();
        assert_eq!(out.page_count, 1);
        assert_eq!(out.first.page_num, 1);
        assert_eq!((out.first.width, out.first.height), (30, 20));
    }

    #[tokio::test]
    async fn garbage_image_is_invalid() {
        let doc = UploadedDocument::new("a.png", b"definitely not an image".to_vec(), MediaType::Png);
        let err = rasterize(&doc, &ExtractionConfig::default()).await.unwrap_err();
        assert!(matches!(err, OcrError::InvalidImage { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn non_pdf_bytes_fail_conversion_without_pdfium() {
        let doc = UploadedDocument::new("a.pdf", b"this is not a pdf".to_vec(), MediaType::Pdf);
        let err = rasterize(&doc, &ExtractionConfig::default()).await.unwrap_err();
        assert!(
            matches!(err, OcrError::ConversionFailed { ref detail, .. } if detail.contains("%PDF")),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn multi_page_pdf_counts_every_page_but_keeps_only_the_first() {
        if let Err(e) = bind_pdfium() {
            println!("SKIP — pdfium not available: {}", e.to_string().lines().next().unwrap_or(""));
            return;
        }

        let doc = UploadedDocument::new("five.pdf", blank_pdf(5), MediaType::Pdf);
        let config = ExtractionConfig::default();

        let out = rasterize(&doc, &config).await.unwrap();
        assert_eq!(out.page_count, 5);
        assert_eq!(out.first.page_num, 1);
        assert!(out.first.width > out.first.height);
        assert!(out.first.width <= config.max_rendered_pixels);

        let inspected = first_page(&doc, &config).await.unwrap();
        assert_eq!(inspected.page_count, 5);
        assert_eq!(
            (inspected.first.width, inspected.first.height),
            (out.first.width, out.first.height)
        );
    }
}
