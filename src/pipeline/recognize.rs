//! Recognition client: one `generateContent` call per extraction.
//!
//! The [`TextRecognizer`] trait is the seam between the session and the
//! network. [`GeminiClient`] is the production implementation; tests inject
//! their own through [`crate::config::ExtractionConfig::recognizer`].
//!
//! ## Failure classification
//!
//! Every failure becomes one [`RecognitionError`] variant. There is no retry
//! and no backoff here: a failed call ends the interaction and the user
//! re-runs it.
//!
//! | Condition | Variant |
//! |-----------|---------|
//! | no HTTP response (DNS, TLS, reset, timeout) | `Transport` |
//! | 401 / 403, or 400 naming an invalid API key | `Authentication` |
//! | 429 | `Quota` |
//! | any other non-2xx | `Service` |
//! | 2xx without candidate text | `MalformedResponse` |

use crate::config::ExtractionConfig;
use crate::document::{RecognitionRequest, RecognizedText};
use crate::error::{OcrError, RecognitionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Anything that can turn a [`RecognitionRequest`] into text.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Model identifier, used in status messages and error reports.
    fn model(&self) -> &str;

    /// Send one request and wait for its response.
    async fn recognize(
        &self,
        request: &RecognitionRequest,
    ) -> Result<RecognizedText, RecognitionError>;
}

/// Client for the Gemini REST `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    /// Create a client. `timeout` of `None` leaves the transport's defaults in place.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, OcrError> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let http = builder
            .build()
            .map_err(|e| OcrError::Internal(format!("Failed to build HTTP client: {e}")))?;

        let model = model.into();
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.trim_start_matches("models/").to_string(),
            api_key: api_key.into(),
        })
    }

    /// Build a client from the config, resolving the API key from the environment if needed.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, OcrError> {
        let api_key = config.resolve_api_key()?;
        Self::new(
            config.endpoint.clone(),
            config.model.clone(),
            api_key,
            config.api_timeout_secs.map(Duration::from_secs),
        )
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }
}

#[async_trait]
impl TextRecognizer for GeminiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn recognize(
        &self,
        request: &RecognitionRequest,
    ) -> Result<RecognizedText, RecognitionError> {
        let body = GenerateContentRequest::from_request(request);
        info!(
            "Sending {} bytes of {} to {}",
            request.image.data.len(),
            request.image.mime_type,
            self.model
        );

        // The key travels in a header so it never shows up in error messages
        // that echo the URL.
        let response = self
            .http
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response.text().await.map_err(transport_error)?;
        debug!("{} responded HTTP {} ({} bytes)", self.model, status, text.len());

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &text, retry_after));
        }

        parse_response(&text)
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

/// JSON body of a `generateContent` call.
#[derive(Debug, Serialize)]
pub struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

impl<'a> GenerateContentRequest<'a> {
    /// One user turn: the instruction, then the image.
    pub fn from_request(request: &'a RecognitionRequest) -> Self {
        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text {
                        text: &request.instruction,
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: &request.image.mime_type,
                            data: &request.image.data,
                        },
                    },
                ],
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

/// Extract text from a successful response body.
///
/// Text parts of the first candidate are concatenated in order and returned
/// untouched.
pub fn parse_response(body: &str) -> Result<RecognizedText, RecognitionError> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| RecognitionError::MalformedResponse {
            detail: format!("invalid JSON: {e}"),
        })?;

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        let detail = match parsed.prompt_feedback.and_then(|f| f.block_reason) {
            Some(reason) => format!("prompt was blocked ({reason})"),
            None => "response contained no candidates".to_string(),
        };
        return Err(RecognitionError::MalformedResponse { detail });
    };

    let texts: Vec<String> = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if texts.is_empty() {
        return Err(RecognitionError::MalformedResponse {
            detail: format!(
                "candidate contained no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ),
        });
    }

    let usage = parsed.usage_metadata;
    Ok(RecognizedText {
        text: texts.concat(),
        input_tokens: usage.as_ref().and_then(|u| u.prompt_token_count),
        output_tokens: usage.as_ref().and_then(|u| u.candidates_token_count),
    })
}

/// Map a non-success status and its body to a [`RecognitionError`].
pub fn classify_status(status: u16, body: &str, retry_after_secs: Option<u64>) -> RecognitionError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = envelope
        .as_ref()
        .and_then(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            let raw = body.trim();
            if raw.is_empty() {
                format!("HTTP {status}")
            } else {
                raw.to_string()
            }
        });

    match status {
        401 | 403 => RecognitionError::Authentication {
            status,
            detail: message,
        },
        400 if message.contains("API key") || body.contains("API_KEY_INVALID") => {
            RecognitionError::Authentication {
                status,
                detail: message,
            }
        }
        429 => RecognitionError::Quota {
            retry_after_secs: retry_after_secs
                .or_else(|| envelope.as_ref().and_then(|e| retry_delay_secs(&e.error))),
            detail: message,
        },
        _ => RecognitionError::Service { status, message },
    }
}

/// `RetryInfo.retryDelay` ("23s") from the error details, if present.
fn retry_delay_secs(error: &ErrorBody) -> Option<u64> {
    if error.status.as_deref() != Some("RESOURCE_EXHAUSTED") {
        return None;
    }
    error.details.iter().find_map(|d| {
        let delay = d.get("retryDelay")?.as_str()?;
        let secs = delay.strip_suffix('s')?;
        secs.parse::<f64>().ok().map(|s| s.ceil() as u64)
    })
}

/// Flatten a reqwest error and its sources into one message.
fn transport_error(e: reqwest::Error) -> RecognitionError {
    let timed_out = e.is_timeout();
    let mut detail = e.to_string();
    let mut source = std::error::Error::source(&e);
    while let Some(s) = source {
        detail.push_str(": ");
        detail.push_str(&s.to_string());
        source = s.source();
    }
    RecognitionError::Transport { detail, timed_out }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::EncodedPayload;

    #[test]
    fn request_has_text_then_inline_png() {
        let req = RecognitionRequest::new(
            "Extract all text from this image.",
            EncodedPayload::from_png(b"png-bytes"),
        );
        let json = serde_json::to_value(GenerateContentRequest::from_request(&req)).unwrap();
        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], serde_json::json!({"text": "Extract all text from this image."}));
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], req.image.data.as_str());
        assert_eq!(json["contents"][0]["role"], "user");
    }

    #[test]
    fn parse_passes_text_through_verbatim() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"  Hello World\n"}],"role":"model"},"finishReason":"STOP"}],
                       "usageMetadata":{"promptTokenCount":258,"candidatesTokenCount":4}}"#;
        let out = parse_response(body).unwrap();
        assert_eq!(out.text, "  Hello World\n");
        assert_eq!(out.input_tokens, Some(258));
        assert_eq!(out.output_tokens, Some(4));
    }

    #[test]
    fn parse_concatenates_parts_in_order() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Hello"},{"text":" World"}]}}]}"#;
        assert_eq!(parse_response(body).unwrap().text, "Hello World");
    }

    #[test]
    fn parse_rejects_missing_text() {
        for body in [
            "not json",
            r#"{}"#,
            r#"{"candidates":[]}"#,
            r#"{"candidates":[{"finishReason":"SAFETY"}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"inlineData":{}}]}}]}"#,
        ] {
            let err = parse_response(body).unwrap_err();
            assert!(
                matches!(err, RecognitionError::MalformedResponse { .. }),
                "{body}: {err:?}"
            );
        }
    }

    #[test]
    fn parse_reports_block_reason() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = parse_response(body).unwrap_err();
        assert!(err.to_string().contains("SAFETY"), "{err}");
    }

    #[test]
    fn classify_auth_failures() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            classify_status(400, body, None),
            RecognitionError::Authentication { status: 400, .. }
        ));
        assert!(matches!(
            classify_status(403, "", None),
            RecognitionError::Authentication { status: 403, .. }
        ));
    }

    #[test]
    fn classify_quota_with_retry_hint() {
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED",
                       "details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"22.5s"}]}}"#;
        assert_eq!(
            classify_status(429, body, None),
            RecognitionError::Quota {
                detail: "Resource has been exhausted".into(),
                retry_after_secs: Some(23),
            }
        );
        assert!(matches!(
            classify_status(429, body, Some(5)),
            RecognitionError::Quota { retry_after_secs: Some(5), .. }
        ));
    }

    #[test]
    fn classify_other_statuses_keep_message() {
        let body = r#"{"error":{"code":500,"message":"An internal error has occurred.","status":"INTERNAL"}}"#;
        assert_eq!(
            classify_status(500, body, None),
            RecognitionError::Service {
                status: 500,
                message: "An internal error has occurred.".into()
            }
        );
        assert_eq!(
            classify_status(502, "<html>Bad Gateway</html>", None),
            RecognitionError::Service {
                status: 502,
                message: "<html>Bad Gateway</html>".into()
            }
        );
        assert_eq!(
            classify_status(404, "", None),
            RecognitionError::Service {
                status: 404,
                message: "HTTP 404".into()
            }
        );
    }

    #[test]
    fn url_strips_models_prefix_and_trailing_slash() {
        let c = GeminiClient::new("https://example.test/", "models/gemini-1.5-flash", "k", None).unwrap();
        assert_eq!(
            c.url(),
            "https://example.test/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert_eq!(c.model(), "gemini-1.5-flash");
    }
}
