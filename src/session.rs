//! One extraction, start to finish.
//!
//! An [`ExtractionSession`] is the whole context of a single interaction: it
//! is built fresh for every upload, walks the state machine below exactly
//! once, and is dropped afterwards. Nothing carries over between uploads.
//!
//! ```text
//! Idle → Uploaded → Rasterized → Previewed → Encoding → AwaitingRecognition → Succeeded
//!   └──────────┴───────────┴───────────┴──────────┴────────────────┴─────────→ Failed
//! ```
//!
//! Every stage error is caught here, moves the session to `Failed`, and is
//! handed to [`ExtractionObserver::on_failure`] before being returned.

use crate::config::ExtractionConfig;
use crate::document::{RecognitionRequest, UploadedDocument};
use crate::error::OcrError;
use crate::observer::{preview_caption, ExtractionObserver};
use crate::output::{ExtractionOutput, ExtractionStats};
use crate::pipeline::recognize::TextRecognizer;
use crate::pipeline::{encode, render};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

/// Where a session is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Uploaded,
    Rasterized,
    Previewed,
    Encoding,
    AwaitingRecognition,
    Succeeded,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed)
    }

    /// The state that follows on success.
    fn successor(self) -> Option<Self> {
        use PipelineState::*;
        match self {
            Idle => Some(Uploaded),
            Uploaded => Some(Rasterized),
            Rasterized => Some(Previewed),
            Previewed => Some(Encoding),
            Encoding => Some(AwaitingRecognition),
            AwaitingRecognition => Some(Succeeded),
            Succeeded | Failed => None,
        }
    }

    /// Whether `self → to` is a legal transition.
    pub fn can_transition_to(self, to: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == PipelineState::Failed || self.successor() == Some(to)
    }
}

/// Per-interaction pipeline context.
pub struct ExtractionSession<'a> {
    config: &'a ExtractionConfig,
    recognizer: &'a dyn TextRecognizer,
    observer: &'a dyn ExtractionObserver,
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl<'a> ExtractionSession<'a> {
    pub fn new(
        config: &'a ExtractionConfig,
        recognizer: &'a dyn TextRecognizer,
        observer: &'a dyn ExtractionObserver,
    ) -> Self {
        Self {
            config,
            recognizer,
            observer,
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state the session has been in, starting with `Idle`.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Run the whole pipeline for one upload.
    ///
    /// A session runs once; a second call is an [`OcrError::Internal`].
    pub async fn run(&mut self, upload: UploadedDocument) -> Result<ExtractionOutput, OcrError> {
        if self.state != PipelineState::Idle {
            return Err(OcrError::Internal(format!(
                "session already ran (state: {:?})",
                self.state
            )));
        }

        let result = match self.run_stages(upload).await {
            Ok(output) => self
                .advance(PipelineState::Succeeded)
                .map(|()| output),
            Err(e) => Err(e),
        };

        match &result {
            Ok(output) => self.observer.on_text(&output.text),
            Err(e) => {
                warn!("Extraction failed: {}", e);
                if !self.state.is_terminal() {
                    self.state = PipelineState::Failed;
                    self.history.push(PipelineState::Failed);
                }
                self.observer.on_failure(e);
            }
        }

        result
    }

    async fn run_stages(&mut self, upload: UploadedDocument) -> Result<ExtractionOutput, OcrError> {
        let total_start = Instant::now();
        let media_type = upload.media_type;

        // ── Stage 1: Intake ──────────────────────────────────────────────
        self.advance(PipelineState::Uploaded)?;
        info!(
            "Uploaded {} ({}, {} bytes)",
            upload.name,
            media_type,
            upload.bytes.len()
        );
        self.observer.on_upload(&upload.name, media_type);

        // ── Stage 2: Rasterise ───────────────────────────────────────────
        let render_start = Instant::now();
        let render::Rasterized { page_count, first } =
            render::rasterize(&upload, self.config).await?;
        let rasterize_duration_ms = render_start.elapsed().as_millis() as u64;
        self.advance(PipelineState::Rasterized)?;
        info!("Rasterised {} into {} page(s) in {}ms", upload.name, page_count, rasterize_duration_ms);
        self.observer.on_rasterized(media_type, page_count);

        // ── Stage 3: Preview ─────────────────────────────────────────────
        self.observer.on_preview(&first, preview_caption(media_type));
        self.advance(PipelineState::Previewed)?;

        // ── Stage 4: Encode ──────────────────────────────────────────────
        self.advance(PipelineState::Encoding)?;
        let encode_start = Instant::now();
        let (payload, png_bytes) = encode::encode_page(&first)?;
        let encode_duration_ms = encode_start.elapsed().as_millis() as u64;
        let payload_len = payload.data.len();
        let request = RecognitionRequest::new(self.config.prompt.clone(), payload);

        // ── Stage 5: Recognise ───────────────────────────────────────────
        self.advance(PipelineState::AwaitingRecognition)?;
        let model = self.recognizer.model().to_string();
        self.observer.on_recognition_start(&model);
        let llm_start = Instant::now();
        let recognized = self
            .recognizer
            .recognize(&request)
            .await
            .map_err(|source| OcrError::Recognition {
                model: model.clone(),
                source,
            })?;
        let recognition_duration_ms = llm_start.elapsed().as_millis() as u64;

        let stats = ExtractionStats {
            rasterize_duration_ms,
            encode_duration_ms,
            recognition_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
            png_bytes,
            payload_len,
            input_tokens: recognized.input_tokens,
            output_tokens: recognized.output_tokens,
        };

        info!(
            "Recognised {} chars from {} in {}ms",
            recognized.text.len(),
            upload.name,
            stats.total_duration_ms
        );

        Ok(ExtractionOutput {
            file_name: upload.name,
            media_type,
            page_count,
            preview_dimensions: (first.width, first.height),
            model,
            text: recognized.text,
            stats,
        })
    }

    fn advance(&mut self, to: PipelineState) -> Result<(), OcrError> {
        if !self.state.can_transition_to(to) {
            return Err(OcrError::Internal(format!(
                "illegal pipeline transition {:?} → {:?}",
                self.state, to
            )));
        }
        self.state = to;
        self.history.push(to);
        Ok(())
    }
}
