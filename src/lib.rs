//! # edgequake-ocr
//!
//! Extract the text of a scanned PDF or image with a vision model.
//!
//! ## How it works
//!
//! One upload, one request. The file is rasterised, its first page is shown
//! to the caller as a preview, re-encoded as PNG, base64-encoded and sent to
//! Gemini together with a fixed instruction. The reply is handed back exactly
//! as received; there is no post-processing and no retry.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / PNG / JPEG
//!  │
//!  ├─ 1. Input      accept a local file, URL or byte buffer of an allowed type
//!  ├─ 2. Render     rasterise PDF pages via pdfium (spawn_blocking); images pass through
//!  ├─ 3. Preview    first page handed to the observer
//!  ├─ 4. Encode     first page → PNG → base64
//!  ├─ 5. Recognise  one generateContent call to Gemini
//!  └─ 6. Present    text verbatim, or a categorised error
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key read from GOOGLE_API_KEY (or GEMINI_API_KEY)
//!     let config = ExtractionConfig::default();
//!     let output = extract("invoice.pdf", &config).await?;
//!     println!("{}", output.text);
//!     eprintln!("{} page(s), {}ms", output.page_count, output.stats.total_duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-extract` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-ocr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod observer;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, DEFAULT_ENDPOINT, DEFAULT_MODEL};
pub use document::{
    EncodedPayload, MediaType, PageImage, RecognitionRequest, RecognizedText, UploadedDocument,
};
pub use error::{FailureCategory, OcrError, RecognitionError};
pub use extract::{extract, extract_document, extract_from_bytes, extract_sync, extract_to_file, inspect};
pub use observer::{ExtractionObserver, NoopObserver, SharedObserver};
pub use output::{DocumentInfo, ExtractionOutput, ExtractionStats};
pub use pipeline::recognize::{GeminiClient, TextRecognizer};
pub use session::{ExtractionSession, PipelineState};
