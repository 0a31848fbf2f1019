//! Transient data model for one extraction.
//!
//! Nothing here outlives a single run: an [`UploadedDocument`] becomes a
//! sequence of [`PageImage`]s, the first of which becomes an
//! [`EncodedPayload`]. All three are dropped when the session ends.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of accepted upload types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Pdf,
    Png,
    Jpeg,
}

impl MediaType {
    /// Parse a declared MIME type. Parameters such as `; charset=…` are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "application/pdf" => Some(MediaType::Pdf),
            "image/png" => Some(MediaType::Png),
            "image/jpeg" | "image/jpg" => Some(MediaType::Jpeg),
            _ => None,
        }
    }

    /// Parse a file extension (without the dot), case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(MediaType::Pdf),
            "png" => Some(MediaType::Png),
            "jpg" | "jpeg" => Some(MediaType::Jpeg),
            _ => None,
        }
    }

    /// Infer the type from the extension of a file name or URL path.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    pub fn mime(self) -> &'static str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
        }
    }

    pub fn is_image(self) -> bool {
        !matches!(self, MediaType::Pdf)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// A file handed to the pipeline, already checked against [`MediaType`].
#[derive(Clone)]
pub struct UploadedDocument {
    pub name: String,
    pub bytes: Vec<u8>,
    pub media_type: MediaType,
}

impl UploadedDocument {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>, media_type: MediaType) -> Self {
        Self {
            name: name.into(),
            bytes,
            media_type,
        }
    }
}

impl fmt::Debug for UploadedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedDocument")
            .field("name", &self.name)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("media_type", &self.media_type)
            .finish()
    }
}

/// One page of the upload as a raster image.
///
/// PDF pages carry the pixels pdfium rendered. Image uploads carry their
/// original bytes untouched; only the header has been read for dimensions.
#[derive(Clone)]
pub struct PageImage {
    /// 1-indexed position in the document.
    pub page_num: usize,
    pub width: u32,
    pub height: u32,
    pub(crate) source: PageSource,
}

#[derive(Clone)]
pub(crate) enum PageSource {
    Rendered(DynamicImage),
    Upload { bytes: Vec<u8>, media_type: MediaType },
}

impl PageImage {
    pub(crate) fn rendered(page_num: usize, image: DynamicImage) -> Self {
        Self {
            page_num,
            width: image.width(),
            height: image.height(),
            source: PageSource::Rendered(image),
        }
    }

    pub(crate) fn upload(
        bytes: Vec<u8>,
        media_type: MediaType,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            page_num: 1,
            width,
            height,
            source: PageSource::Upload { bytes, media_type },
        }
    }

    /// Wrap an in-memory image as page 1. Useful for hosts that already hold pixels.
    pub fn from_image(image: DynamicImage) -> Self {
        Self::rendered(1, image)
    }

    /// The original upload bytes, when this page was not produced by rasterisation.
    pub fn original_bytes(&self) -> Option<&[u8]> {
        match &self.source {
            PageSource::Upload { bytes, .. } => Some(bytes),
            PageSource::Rendered(_) => None,
        }
    }

    /// Decode the page into pixels.
    pub fn to_image(&self) -> Result<DynamicImage, image::ImageError> {
        match &self.source {
            PageSource::Rendered(img) => Ok(img.clone()),
            // The header decides the codec; a mislabelled extension still decodes.
            PageSource::Upload { bytes, .. } => image::load_from_memory(bytes),
        }
    }
}

impl fmt::Debug for PageImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            PageSource::Rendered(_) => "rendered".to_string(),
            PageSource::Upload { bytes, media_type } => {
                format!("{} upload, {} bytes", media_type, bytes.len())
            }
        };
        f.debug_struct("PageImage")
            .field("page_num", &self.page_num)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("source", &source)
            .finish()
    }
}

/// A canonical PNG as base64 text, ready for an inline-data request part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedPayload {
    pub mime_type: String,
    pub data: String,
}

impl EncodedPayload {
    pub const PNG: &'static str = "image/png";

    /// Base64-encode PNG bytes (standard alphabet, padded, unwrapped).
    pub fn from_png(png: &[u8]) -> Self {
        Self {
            mime_type: Self::PNG.to_string(),
            data: STANDARD.encode(png),
        }
    }

    /// Inverse of [`EncodedPayload::from_png`].
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

/// The instruction and image sent to the recognition model, in that order.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub instruction: String,
    pub image: EncodedPayload,
}

impl RecognitionRequest {
    pub fn new(instruction: impl Into<String>, image: EncodedPayload) -> Self {
        Self {
            instruction: instruction.into(),
            image,
        }
    }
}

/// Text returned by the recognition model, exactly as the service sent it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognizedText {
    pub text: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

impl RecognizedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_from_mime() {
        assert_eq!(MediaType::from_mime("application/pdf"), Some(MediaType::Pdf));
        assert_eq!(MediaType::from_mime("image/PNG"), Some(MediaType::Png));
        assert_eq!(MediaType::from_mime("image/jpg"), Some(MediaType::Jpeg));
        assert_eq!(
            MediaType::from_mime("application/pdf; qs=0.9"),
            Some(MediaType::Pdf)
        );
        assert_eq!(MediaType::from_mime("image/gif"), None);
        assert_eq!(MediaType::from_mime("text/plain"), None);
        assert_eq!(MediaType::from_mime(""), None);
    }

    #[test]
    fn media_type_from_file_name() {
        assert_eq!(MediaType::from_file_name("scan.JPG"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_file_name("a.b.jpeg"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_file_name("report.pdf"), Some(MediaType::Pdf));
        assert_eq!(MediaType::from_file_name("logo.png"), Some(MediaType::Png));
        assert_eq!(MediaType::from_file_name("notes.docx"), None);
        assert_eq!(MediaType::from_file_name("README"), None);
    }

    #[test]
    fn only_pdf_needs_rendering() {
        assert!(!MediaType::Pdf.is_image());
        assert!(MediaType::Png.is_image());
        assert!(MediaType::Jpeg.is_image());
    }

    #[test]
    fn payload_is_unwrapped_standard_base64() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let payload = EncodedPayload::from_png(&bytes);
        assert_eq!(payload.mime_type, "image/png");
        assert!(!payload.data.contains('\n'));
        assert!(payload
            .data
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '='));
        assert_eq!(payload.decode().expect("valid base64"), bytes);
    }

    #[test]
    fn upload_page_keeps_original_bytes() {
        let page = PageImage::upload(vec![1, 2, 3], MediaType::Jpeg, 4, 5);
        assert_eq!(page.page_num, 1);
        assert_eq!(page.original_bytes(), Some(&[1u8, 2, 3][..]));
        assert_eq!((page.width, page.height), (4, 5));
    }
}
