//! Top-level extraction entry points.
//!
//! Every function here builds a fresh [`ExtractionSession`] for its upload,
//! so concurrent or repeated calls share nothing but the config.

use crate::config::ExtractionConfig;
use crate::document::UploadedDocument;
use crate::error::OcrError;
use crate::observer::{ExtractionObserver, NoopObserver};
use crate::output::{DocumentInfo, ExtractionOutput};
use crate::pipeline::recognize::{GeminiClient, TextRecognizer};
use crate::pipeline::{input, render};
use crate::session::ExtractionSession;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Extract the text of the first page of a PDF or image file or URL.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input` — Local file path or HTTP/HTTPS URL to a PDF, PNG or JPEG
/// * `config` — Extraction configuration
///
/// # Errors
/// The credential is resolved before the input is read, so a missing API
/// key fails fast with [`OcrError::MissingApiKey`]. Intake errors
/// (not found, unsupported type, download failure) are returned without
/// starting a session. Everything after intake is also reported to the
/// configured observer.
///
/// # Example
/// ```rust,no_run
/// use edgequake_ocr::{extract, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::default(); // reads GOOGLE_API_KEY
/// let output = extract("scan.pdf", &config).await?;
/// println!("{}", output.text);
/// # Ok(())
/// # }
/// ```
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, OcrError> {
    let recognizer = resolve_recognizer(config)?;
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);

    let upload = input::resolve_input(input_str, config.download_timeout_secs).await?;
    run_session(upload, config, recognizer.as_ref()).await
}

/// Extract text from an in-memory upload.
///
/// `declared_type` may be a MIME type or an extension; when `None` the type
/// is inferred from `name`.
///
/// # Example
/// ```rust,no_run
/// use edgequake_ocr::{extract_from_bytes, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("receipt.jpg")?;
/// let config = ExtractionConfig::default();
/// let output = extract_from_bytes("receipt.jpg", bytes, Some("image/jpeg"), &config).await?;
/// println!("{}", output.text);
/// # Ok(())
/// # }
/// ```
pub async fn extract_from_bytes(
    name: impl Into<String>,
    bytes: Vec<u8>,
    declared_type: Option<&str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, OcrError> {
    let upload = input::accept_bytes(name, bytes, declared_type)?;
    extract_document(upload, config).await
}

/// Extract text from an already accepted upload.
pub async fn extract_document(
    upload: UploadedDocument,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, OcrError> {
    let recognizer = resolve_recognizer(config)?;
    run_session(upload, config, recognizer.as_ref()).await
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, OcrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| OcrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}

/// Extract text and write it to a file.
///
/// The text is written to a temporary file in the target directory and
/// renamed into place, so readers never see a partial file.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, OcrError> {
    let output = extract(input_str, config).await?;
    write_atomic(output_path.as_ref(), output.text.clone()).await?;
    Ok(output)
}

/// Report page count and first-page size without calling the recognition service.
///
/// Does not require an API key.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<DocumentInfo, OcrError> {
    let upload = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let render::Rasterized { page_count, first } = render::first_page(&upload, config).await?;
    Ok(DocumentInfo {
        size_bytes: upload.bytes.len(),
        file_name: upload.name,
        media_type: upload.media_type,
        page_count,
        first_page_dimensions: (first.width, first.height),
    })
}

/// Pick the recognizer: an injected one, else a Gemini client.
///
/// Fails with [`OcrError::MissingApiKey`] when no key is configured.
pub fn resolve_recognizer(config: &ExtractionConfig) -> Result<Arc<dyn TextRecognizer>, OcrError> {
    if let Some(ref recognizer) = config.recognizer {
        return Ok(Arc::clone(recognizer));
    }
    Ok(Arc::new(GeminiClient::from_config(config)?))
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run_session(
    upload: UploadedDocument,
    config: &ExtractionConfig,
    recognizer: &dyn TextRecognizer,
) -> Result<ExtractionOutput, OcrError> {
    let noop = NoopObserver;
    let observer: &dyn ExtractionObserver = match config.observer.as_deref() {
        Some(o) => o,
        None => &noop,
    };

    let mut session = ExtractionSession::new(config, recognizer, observer);
    session.run(upload).await
}

async fn write_atomic(path: &Path, text: String) -> Result<(), OcrError> {
    let target = path.to_path_buf();
    let write_err = |source: std::io::Error| OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| OcrError::Internal(format!("Write task panicked: {}", e)))?
    .map_err(write_err)
}
