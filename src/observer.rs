//! Observer trait: the host's display surface as seen by the pipeline.
//!
//! Inject an [`Arc<dyn ExtractionObserver>`] via
//! [`crate::config::ExtractionConfigBuilder::observer`] to receive events as
//! the session moves through its stages. The CLI implements it with terminal
//! output; a web host could render the same events as HTML.
//!
//! The preview and result-presentation stages are nothing more than these
//! calls: the session guarantees `on_preview` fires before recognition
//! starts, and that exactly one of `on_text` / `on_failure` ends every run
//! that got past intake.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocr::{ExtractionConfig, ExtractionObserver};
//! use std::sync::Arc;
//!
//! struct PrintText;
//!
//! impl ExtractionObserver for PrintText {
//!     fn on_text(&self, text: &str) {
//!         println!("{text}");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .observer(Arc::new(PrintText) as Arc<dyn ExtractionObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::document::{MediaType, PageImage};
use crate::error::OcrError;
use std::sync::Arc;

/// Called by the extraction session as it runs.
///
/// All methods have default no-op implementations so hosts only override what
/// they display.
pub trait ExtractionObserver: Send + Sync {
    /// The upload was accepted.
    fn on_upload(&self, file_name: &str, media_type: MediaType) {
        let _ = (file_name, media_type);
    }

    /// Rasterisation finished.
    ///
    /// # Arguments
    /// * `media_type` — type of the upload; page counts are only meaningful
    ///   to show for [`MediaType::Pdf`]
    /// * `page_count` — number of page images produced (≥ 1)
    fn on_rasterized(&self, media_type: MediaType, page_count: usize) {
        let _ = (media_type, page_count);
    }

    /// Render the first page for visual confirmation.
    fn on_preview(&self, page: &PageImage, caption: &str) {
        let _ = (page, caption);
    }

    /// The request is about to be sent; the call blocks until it returns.
    fn on_recognition_start(&self, model: &str) {
        let _ = model;
    }

    /// The run succeeded. `text` is exactly what the service returned.
    fn on_text(&self, text: &str) {
        let _ = text;
    }

    /// The run failed.
    fn on_failure(&self, error: &OcrError) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't display anything.
///
/// This is the default when no observer is configured.
pub struct NoopObserver;

impl ExtractionObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type SharedObserver = Arc<dyn ExtractionObserver>;

/// Caption shown under the preview.
pub fn preview_caption(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Pdf => "First page of the PDF",
        MediaType::Png | MediaType::Jpeg => "Uploaded image",
    }
}
