//! Upload intake: turn a path, URL, or byte buffer into an [`UploadedDocument`].
//!
//! Type checking happens here and only here. Anything that is not a PDF,
//! PNG or JPEG is rejected with [`OcrError::UnsupportedType`] before a
//! session starts, so later stages can rely on the closed [`MediaType`] set.

use crate::document::{MediaType, UploadedDocument};
use crate::error::OcrError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to an in-memory upload.
///
/// If the input is a URL, download it. If it is a local file, check the
/// extension first and only then read it.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<UploadedDocument, OcrError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input)).await
    }
}

/// Accept caller-supplied bytes.
///
/// `declared` may be a MIME type (`image/png`) or an extension (`png`). When
/// it is `None` the type is inferred from `name`.
pub fn accept_bytes(
    name: impl Into<String>,
    bytes: Vec<u8>,
    declared: Option<&str>,
) -> Result<UploadedDocument, OcrError> {
    let name = name.into();
    let media_type = match declared {
        Some(d) => MediaType::from_mime(d)
            .or_else(|| MediaType::from_extension(d.trim_start_matches('.'))),
        None => MediaType::from_file_name(&name),
    };

    match media_type {
        Some(media_type) => Ok(UploadedDocument::new(name, bytes, media_type)),
        None => Err(OcrError::UnsupportedType {
            declared: declared.map(str::to_string).unwrap_or_else(|| name.clone()),
            name,
        }),
    }
}

/// Read a local file, validating existence, permissions and extension.
async fn resolve_local(path: &Path) -> Result<UploadedDocument, OcrError> {
    if !path.exists() {
        return Err(OcrError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let name = display_name(path);
    let media_type = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(MediaType::from_extension)
        .ok_or_else(|| OcrError::UnsupportedType {
            name: name.clone(),
            declared: path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| "no extension".to_string()),
        })?;

    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => OcrError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => OcrError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    debug!("Read local {} ({} bytes): {}", media_type, bytes.len(), path.display());
    Ok(UploadedDocument::new(name, bytes, media_type))
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<UploadedDocument, OcrError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| OcrError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            OcrError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(OcrError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let name = file_name_from_url(url);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // Servers often label everything application/octet-stream; fall back to
    // the URL's extension when the header names no accepted type.
    let media_type = content_type
        .as_deref()
        .and_then(MediaType::from_mime)
        .or_else(|| MediaType::from_file_name(&name))
        .ok_or_else(|| OcrError::UnsupportedType {
            name: name.clone(),
            declared: content_type
                .clone()
                .unwrap_or_else(|| "unknown content type".to_string()),
        })?;

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            OcrError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    info!("Downloaded {} ({} bytes)", name, bytes.len());
    Ok(UploadedDocument::new(name, bytes.to_vec(), media_type))
}

/// Last non-empty path segment of the URL, or a generic name.
pub fn file_name_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(segments) = parsed.path_segments() {
            if let Some(last) = segments.filter(|s| !s.is_empty()).next_back() {
                return last.to_string();
            }
        }
    }

    "download".to_string()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}
