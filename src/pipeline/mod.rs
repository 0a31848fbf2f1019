//! Pipeline stages for text extraction.
//!
//! Each submodule implements exactly one transformation step. The stages
//! with no transformation of their own (preview, result presentation) are
//! observer calls made by [`crate::session::ExtractionSession`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ (preview) ──▶ encode ──▶ recognize ──▶ (present)
//! (path/URL) (pdfium)               (PNG+b64)  (Gemini)
//! ```
//!
//! 1. [`input`]     — accept a path, URL or buffer of an allowed type
//! 2. [`render`]    — rasterise PDFs in `spawn_blocking`; wrap images as one page
//! 3. [`encode`]    — re-serialise the first page as PNG and base64 it
//! 4. [`recognize`] — the only stage with outbound network I/O

pub mod encode;
pub mod input;
pub mod recognize;
pub mod render;
