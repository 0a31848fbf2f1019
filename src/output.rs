//! Values returned to library callers.

use crate::document::MediaType;
use serde::{Deserialize, Serialize};

/// Result of a successful extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub file_name: String,
    pub media_type: MediaType,
    /// Pages produced by rasterisation. Always 1 for image uploads.
    pub page_count: usize,
    /// Width and height of the page that was previewed and recognised.
    pub preview_dimensions: (u32, u32),
    pub model: String,
    /// Text exactly as returned by the recognition service.
    pub text: String,
    pub stats: ExtractionStats,
}

/// Timings and sizes for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub rasterize_duration_ms: u64,
    pub encode_duration_ms: u64,
    pub recognition_duration_ms: u64,
    pub total_duration_ms: u64,
    /// Size of the canonical PNG sent to the service.
    pub png_bytes: usize,
    /// Length of its base64 representation.
    pub payload_len: usize,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

/// What [`crate::extract::inspect`] reports. No API call is made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub file_name: String,
    pub media_type: MediaType,
    pub size_bytes: usize,
    pub page_count: usize,
    pub first_page_dimensions: (u32, u32),
}
