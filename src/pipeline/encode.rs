//! Image encoding: `PageImage` → canonical PNG → base64 [`EncodedPayload`].
//!
//! Every page is re-serialised to PNG whatever it arrived as, so the
//! recognition request always carries one format and its `image/png` label is
//! always true. PNG is lossless: text edges stay crisp, which matters more for
//! OCR accuracy than payload size.

use crate::document::{EncodedPayload, PageImage};
use crate::error::OcrError;
use std::io::Cursor;
use tracing::debug;

/// Serialise a page as PNG bytes.
pub fn canonical_png(page: &PageImage) -> Result<Vec<u8>, OcrError> {
    let failed = |detail: String| OcrError::EncodingFailed {
        page: page.page_num,
        detail,
    };

    let img = page.to_image().map_err(|e| failed(e.to_string()))?;
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| failed(e.to_string()))?;
    Ok(buf)
}

/// Encode a page as a base64 PNG payload ready for the recognition request.
///
/// Returns the payload together with the PNG size in bytes for stats.
pub fn encode_page(page: &PageImage) -> Result<(EncodedPayload, usize), OcrError> {
    let png = canonical_png(page)?;
    let payload = EncodedPayload::from_png(&png);
    debug!(
        "Encoded page {} → {} bytes PNG, {} bytes base64",
        page.page_num,
        png.len(),
        payload.data.len()
    );
    Ok((payload, png.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MediaType;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let (data, png_len) = encode_page(&PageImage::from_image(img)).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        assert!(!data.data.is_empty());
        let decoded = data.decode().expect("valid base64");
        assert_eq!(decoded.len(), png_len);
        assert_eq!(&decoded[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn round_trip_is_byte_exact() {
        for (w, h) in [(1, 1), (3, 2), (1024, 768)] {
            let img = DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
                Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
            }));
            let page = PageImage::from_image(img);
            let png = canonical_png(&page).unwrap();
            let (payload, _) = encode_page(&page).unwrap();
            assert_eq!(payload.decode().unwrap(), png, "{w}x{h}");
        }
    }

    #[test]
    fn jpeg_upload_becomes_png() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([200, 10, 10])));
        let mut jpeg = Vec::new();
        img.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg).unwrap();

        let page = PageImage::upload(jpeg, MediaType::Jpeg, 16, 16);
        let (payload, _) = encode_page(&page).unwrap();
        let png = payload.decode().unwrap();
        assert_eq!(image::guess_format(&png).unwrap(), ImageFormat::Png);
        let back = image::load_from_memory(&png).unwrap();
        assert_eq!((back.width(), back.height()), (16, 16));
    }

    #[test]
    fn undecodable_upload_is_encoding_error() {
        let page = PageImage::upload(b"garbage".to_vec(), MediaType::Png, 1, 1);
        let err = encode_page(&page).unwrap_err();
        assert!(matches!(err, OcrError::EncodingFailed { page: 1, .. }));
    }
}
