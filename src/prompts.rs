//! Instruction text sent alongside the page image.
//!
//! Callers can override the default via
//! [`crate::config::ExtractionConfigBuilder`]'s `prompt` setter; the constant
//! here is used only when no override is provided.

/// Default instruction for the recognition model.
///
/// Deliberately minimal: the model returns whatever text it sees, and the
/// pipeline passes it through without post-processing.
pub const DEFAULT_PROMPT: &str = "Extract all text from this image.";
