//! Speech-to-text through a Whisper-compatible HTTP API.
//!
//! Audio is posted as multipart form data with `verbose_json` output so that timed segments
//! come back. Responses without segments fall back to the plain `text` field.

use super::{ExtractionError, FileKind, Transcriber, TranscriptSegment};
use async_trait::async_trait;
use reqwest::{Client, multipart};
use serde::Deserialize;
use std::path::Path;

/// Whisper-compatible `/audio/transcriptions` client.
pub struct WhisperApiTranscriber {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    text: String,
    segments: Option<Vec<SegmentResponse>>,
}

#[derive(Debug, Deserialize)]
struct SegmentResponse {
    start: f64,
    end: f64,
    text: String,
}

impl WhisperApiTranscriber {
    /// Build a transcriber for `model` at `base_url`.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ExtractionError> {
        let http = Client::builder()
            .user_agent("recapnote/transcription")
            .build()
            .map_err(|error| {
                ExtractionError::Transcription(format!("failed to build HTTP client: {error}"))
            })?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/audio/transcriptions",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl Transcriber for WhisperApiTranscriber {
    async fn transcribe(
        &self,
        path: &Path,
        kind: FileKind,
        language_code: &str,
    ) -> Result<Vec<TranscriptSegment>, ExtractionError> {
        let bytes = tokio::fs::read(path).await?;
        let part = multipart::Part::bytes(bytes)
            .file_name(format!("audio{}", kind.extension()))
            .mime_str(kind.mime())
            .map_err(|error| ExtractionError::Transcription(format!("mime: {error}")))?;

        let mut form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .part("file", part);
        if !language_code.trim().is_empty() {
            form = form.text("language", language_code.trim().to_string());
        }

        tracing::debug!(
            model = %self.model,
            language = language_code,
            "Sending audio for transcription"
        );
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|error| ExtractionError::Transcription(format!("request: {error}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Transcription(format!(
                "status {status}: {body}"
            )));
        }

        let body: TranscribeResponse = response
            .json()
            .await
            .map_err(|error| ExtractionError::Transcription(format!("body: {error}")))?;

        let segments = match body.segments {
            Some(segments) if !segments.is_empty() => segments
                .into_iter()
                .map(|segment| TranscriptSegment {
                    start: segment.start,
                    end: segment.end,
                    text: segment.text,
                })
                .collect(),
            _ => vec![TranscriptSegment {
                start: 0.0,
                end: 0.0,
                text: body.text,
            }],
        };
        tracing::info!(segments = segments.len(), "Transcription completed");
        Ok(segments)
    }
}
