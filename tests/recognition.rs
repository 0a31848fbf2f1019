//! Gemini client tests against an in-process HTTP server.
//!
//! The server accepts exactly one connection, records the raw request and
//! answers with a canned response, so the full reqwest → wire → classify path
//! runs without leaving the machine.

use edgequake_ocr::{
    extract_from_bytes, EncodedPayload, ExtractionConfig, FailureCategory, GeminiClient, OcrError,
    RecognitionError, RecognitionRequest, TextRecognizer,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

// ── Fake server ──────────────────────────────────────────────────────────────

struct Captured {
    head: String,
    body: String,
}

impl Captured {
    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or("")
    }

    fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim()
                .eq_ignore_ascii_case(name)
                .then(|| v.trim().to_string())
        })
    }
}

/// Serve one canned response on a random local port.
async fn serve_once(
    status: &'static str,
    extra_headers: &'static str,
    body: String,
) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        let head_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|l| {
                let (k, v) = l.split_once(':')?;
                k.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| v.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while buf.len() < head_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let req_body = String::from_utf8_lossy(&buf[head_end..]).to_string();

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n{extra_headers}Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();

        Captured {
            head,
            body: req_body,
        }
    });

    (base, handle)
}

fn client(base: &str) -> GeminiClient {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    GeminiClient::new(base, "gemini-test", "k-123", Some(Duration::from_secs(10))).unwrap()
}

fn request() -> RecognitionRequest {
    RecognitionRequest::new(
        "Extract all text from this image.",
        EncodedPayload::from_png(b"\x89PNG\r\n\x1a\nfake"),
    )
}

fn png_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    buf
}

// ── Success ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sends_one_generate_content_call_and_returns_text() {
    let reply = serde_json::json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "World"}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 260, "candidatesTokenCount": 3}
    });
    let (base, server) = serve_once("200 OK", "", reply.to_string()).await;

    let recognized = client(&base).recognize(&request()).await.unwrap();
    assert_eq!(recognized.text, "Hello World");
    assert_eq!(recognized.input_tokens, Some(260));
    assert_eq!(recognized.output_tokens, Some(3));

    let captured = server.await.unwrap();
    assert_eq!(
        captured.request_line(),
        "POST /v1beta/models/gemini-test:generateContent HTTP/1.1"
    );
    assert_eq!(captured.header("x-goog-api-key").as_deref(), Some("k-123"));
    assert!(!captured.request_line().contains("k-123"));

    let body: serde_json::Value = serde_json::from_str(&captured.body).unwrap();
    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(body["contents"][0]["role"], "user");
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0]["text"], "Extract all text from this image.");
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
    assert_eq!(
        parts[1]["inline_data"]["data"],
        EncodedPayload::from_png(b"\x89PNG\r\n\x1a\nfake").data
    );
}

#[tokio::test]
async fn full_pipeline_against_fake_service() {
    let reply = serde_json::json!({
        "candidates": [{"content": {"parts": [{"text": "INVOICE #42\nTotal: 9.99"}]}}]
    });
    let (base, server) = serve_once("200 OK", "", reply.to_string()).await;

    let config = ExtractionConfig::builder()
        .endpoint(&base)
        .model("gemini-test")
        .api_key("k-123")
        .build()
        .unwrap();

    let output = extract_from_bytes("invoice.png", png_bytes(), None, &config)
        .await
        .unwrap();
    assert_eq!(output.text, "INVOICE #42\nTotal: 9.99");
    assert_eq!(output.model, "gemini-test");
    assert_eq!(output.stats.input_tokens, None);

    let captured = server.await.unwrap();
    let body: serde_json::Value = serde_json::from_str(&captured.body).unwrap();
    let data = body["contents"][0]["parts"][1]["inline_data"]["data"]
        .as_str()
        .unwrap();
    let png = EncodedPayload {
        mime_type: "image/png".to_string(),
        data: data.to_string(),
    }
    .decode()
    .unwrap();
    assert_eq!(image::guess_format(&png).unwrap(), ImageFormat::Png);
}

// ── Failure classification ───────────────────────────────────────────────────

#[tokio::test]
async fn quota_exhaustion_is_classified_with_retry_after() {
    let body = serde_json::json!({
        "error": {"code": 429, "message": "Resource has been exhausted (e.g. check quota).", "status": "RESOURCE_EXHAUSTED"}
    });
    let (base, _server) = serve_once("429 Too Many Requests", "Retry-After: 7\r\n", body.to_string()).await;

    let err = client(&base).recognize(&request()).await.unwrap_err();
    assert_eq!(
        err,
        RecognitionError::Quota {
            detail: "Resource has been exhausted (e.g. check quota).".to_string(),
            retry_after_secs: Some(7),
        }
    );
    assert_eq!(err.category(), FailureCategory::Quota);
}

#[tokio::test]
async fn rejected_key_is_an_authentication_error() {
    let body = serde_json::json!({
        "error": {"code": 403, "message": "Method doesn't allow unregistered callers.", "status": "PERMISSION_DENIED"}
    });
    let (base, _server) = serve_once("403 Forbidden", "", body.to_string()).await;

    let err = client(&base).recognize(&request()).await.unwrap_err();
    assert!(
        matches!(err, RecognitionError::Authentication { status: 403, .. }),
        "{err:?}"
    );
    assert!(err.to_string().contains("Method doesn't allow unregistered callers."));
}

#[tokio::test]
async fn invalid_key_400_is_an_authentication_error() {
    let body = serde_json::json!({
        "error": {
            "code": 400,
            "message": "API key not valid. Please pass a valid API key.",
            "status": "INVALID_ARGUMENT",
            "details": [{"@type": "type.googleapis.com/google.rpc.ErrorInfo", "reason": "API_KEY_INVALID"}]
        }
    });
    let (base, _server) = serve_once("400 Bad Request", "", body.to_string()).await;

    let err = client(&base).recognize(&request()).await.unwrap_err();
    assert_eq!(err.category(), FailureCategory::Authentication);
}

#[tokio::test]
async fn server_error_keeps_the_service_message() {
    let body = serde_json::json!({
        "error": {"code": 503, "message": "The model is overloaded. Please try again later.", "status": "UNAVAILABLE"}
    });
    let (base, _server) = serve_once("503 Service Unavailable", "", body.to_string()).await;

    let err = client(&base).recognize(&request()).await.unwrap_err();
    assert_eq!(
        err,
        RecognitionError::Service {
            status: 503,
            message: "The model is overloaded. Please try again later.".to_string(),
        }
    );
}

#[tokio::test]
async fn non_json_success_is_malformed() {
    let (base, _server) = serve_once("200 OK", "", "<html>proxy login</html>".to_string()).await;

    let err = client(&base).recognize(&request()).await.unwrap_err();
    assert!(matches!(err, RecognitionError::MalformedResponse { .. }), "{err:?}");
}

#[tokio::test]
async fn blocked_prompt_is_malformed() {
    let body = serde_json::json!({"promptFeedback": {"blockReason": "SAFETY"}});
    let (base, _server) = serve_once("200 OK", "", body.to_string()).await;

    let err = client(&base).recognize(&request()).await.unwrap_err();
    assert!(err.to_string().contains("SAFETY"), "{err}");
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}"))
        .recognize(&request())
        .await
        .unwrap_err();
    assert!(matches!(err, RecognitionError::Transport { .. }), "{err:?}");
    assert_eq!(err.category(), FailureCategory::Transport);
}

#[tokio::test]
async fn pipeline_error_names_the_model_and_service_text() {
    let body = serde_json::json!({
        "error": {"code": 500, "message": "Internal error encountered.", "status": "INTERNAL"}
    });
    let (base, _server) = serve_once("500 Internal Server Error", "", body.to_string()).await;

    let config = ExtractionConfig::builder()
        .endpoint(&base)
        .model("gemini-test")
        .api_key("k-123")
        .build()
        .unwrap();

    let err = extract_from_bytes("x.png", png_bytes(), None, &config)
        .await
        .unwrap_err();
    let OcrError::Recognition { ref model, ref source } = err else {
        panic!("expected Recognition, got {err:?}");
    };
    assert_eq!(model, "gemini-test");
    assert_eq!(source.category(), FailureCategory::Service);
    let shown = err.to_string();
    assert!(shown.starts_with("Error processing with gemini-test"), "{shown}");
    assert!(shown.contains("Internal error encountered."), "{shown}");
}
