//! Error types for the edgequake-ocr library.
//!
//! Two types reflect two layers of failure:
//!
//! * [`OcrError`] — everything that can end an extraction: bad input, a PDF
//!   pdfium cannot open, a missing API key, or a failed recognition call.
//!   Returned as `Err(OcrError)` from the top-level `extract*` functions and
//!   handed to [`crate::observer::ExtractionObserver::on_failure`].
//!
//! * [`RecognitionError`] — the remote model call failed. Wrapped inside
//!   [`OcrError::Recognition`]. Each variant maps to exactly one
//!   [`FailureCategory`], which is what a host uses to pick the wording of
//!   the error banner.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-ocr library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The upload is not a PDF, PNG or JPEG.
    #[error("Unsupported file type for '{name}': {declared}\nAccepted types: pdf, png, jpg, jpeg.")]
    UnsupportedType { name: String, declared: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The PDF could not be rasterised (corrupt, truncated, or not a PDF).
    #[error("Could not convert PDF '{name}': {detail}")]
    ConversionFailed { name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{name}'")]
    WrongPassword { name: String },

    /// An uploaded image could not be read.
    #[error("Could not read image '{name}': {detail}")]
    InvalidImage { name: String, detail: String },

    /// PNG serialisation of the first page failed.
    #[error("Failed to encode page {page} as PNG: {detail}")]
    EncodingFailed { page: usize, detail: String },

    // ── Recognition errors ────────────────────────────────────────────────
    /// The recognition model call failed.
    #[error("Error processing with {model}: {source}")]
    Recognition {
        model: String,
        #[source]
        source: RecognitionError,
    },

    /// No API key was configured for the recognition service.
    #[error(
        "No API key configured for the recognition service.\n\
Set GOOGLE_API_KEY (or GEMINI_API_KEY), or pass --api-key."
    )]
    MissingApiKey,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output text file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDF input needs the pdfium shared library. You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Place libpdfium next to the ocr-extract executable.\n\
  • Install pdfium into a system library directory.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// The recognition failure inside this error, if that is what it is.
    pub fn recognition(&self) -> Option<&RecognitionError> {
        match self {
            OcrError::Recognition { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Why a call to the recognition service failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecognitionError {
    /// The request never produced an HTTP response (DNS, TLS, reset, timeout).
    #[error("transport error: {detail}")]
    Transport { detail: String, timed_out: bool },

    /// The service rejected the credential.
    #[error("authentication failed (HTTP {status}): {detail}")]
    Authentication { status: u16, detail: String },

    /// The service refused the request because a quota or rate limit is exhausted.
    #[error("quota exceeded (HTTP 429): {detail}")]
    Quota {
        detail: String,
        retry_after_secs: Option<u64>,
    },

    /// Any other non-success response. `message` is the service's own text.
    #[error("service error (HTTP {status}): {message}")]
    Service { status: u16, message: String },

    /// A response arrived but did not contain recognised text.
    #[error("malformed response: {detail}")]
    MalformedResponse { detail: String },
}

/// The user-facing bucket a [`RecognitionError`] falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Transport,
    Authentication,
    Quota,
    Service,
    MalformedResponse,
}

impl FailureCategory {
    /// Short headline for an error banner.
    pub fn headline(self) -> &'static str {
        match self {
            FailureCategory::Transport => "Could not reach the recognition service",
            FailureCategory::Authentication => "The recognition service rejected the API key",
            FailureCategory::Quota => "Recognition quota exhausted",
            FailureCategory::Service => "The recognition service returned an error",
            FailureCategory::MalformedResponse => "The recognition service returned no usable text",
        }
    }
}

impl RecognitionError {
    pub fn category(&self) -> FailureCategory {
        match self {
            RecognitionError::Transport { .. } => FailureCategory::Transport,
            RecognitionError::Authentication { .. } => FailureCategory::Authentication,
            RecognitionError::Quota { .. } => FailureCategory::Quota,
            RecognitionError::Service { .. } => FailureCategory::Service,
            RecognitionError::MalformedResponse { .. } => FailureCategory::MalformedResponse,
        }
    }
}
