//! Plain-text extraction from uploaded files.
//!
//! Audio is handed to a [`Transcriber`]; PDF and DOCX files are parsed locally on the
//! blocking thread pool. The file kind is decided from the extension alone, before any
//! expensive work happens.

mod document;
mod transcription;

pub use document::{extract_docx_text, extract_pdf_text};
pub use transcription::WhisperApiTranscriber;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while turning a file into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// File extension is not one of the accepted kinds.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    /// The transcription backend failed.
    #[error("Transcription failed: {0}")]
    Transcription(String),
    /// A document parser failed.
    #[error("Document parsing failed: {0}")]
    Document(String),
    /// The file produced no text at all.
    #[error("No text could be extracted from {0}")]
    NoText(String),
    /// Local file access failed.
    #[error("I/O error during extraction: {0}")]
    Io(#[from] std::io::Error),
}

/// Accepted upload kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// MPEG audio.
    Mp3,
    /// WAVE audio.
    Wav,
    /// Portable Document Format.
    Pdf,
    /// Office Open XML word-processing document.
    Docx,
}

impl FileKind {
    /// Infer the kind from a file name's extension (case-insensitive).
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())?
            .to_ascii_lowercase();
        match extension.as_str() {
            "mp3" => Some(Self::Mp3),
            "wav" => Some(Self::Wav),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    /// Content type used when uploading the original file.
    pub fn mime(self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }

    /// Canonical extension, including the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => ".mp3",
            Self::Wav => ".wav",
            Self::Pdf => ".pdf",
            Self::Docx => ".docx",
        }
    }

    /// Whether the kind goes through transcription.
    pub fn is_audio(self) -> bool {
        matches!(self, Self::Mp3 | Self::Wav)
    }
}

/// One time-ordered piece of a transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    /// Segment start in seconds.
    pub start: f64,
    /// Segment end in seconds.
    pub end: f64,
    /// Recognized text.
    pub text: String,
}

/// Speech-to-text backend.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio file at `path`, returning segments in time order.
    async fn transcribe(
        &self,
        path: &Path,
        kind: FileKind,
        language_code: &str,
    ) -> Result<Vec<TranscriptSegment>, ExtractionError>;
}

/// Routes a file to transcription or document parsing and returns its text.
pub struct TextExtractor {
    transcriber: Arc<dyn Transcriber>,
}

impl TextExtractor {
    /// Build an extractor that sends audio to `transcriber`.
    pub fn new(transcriber: Arc<dyn Transcriber>) -> Self {
        Self { transcriber }
    }

    /// Extract the text of the file at `path`.
    ///
    /// Transcript segments, PDF pages, and DOCX paragraphs are joined with newlines in
    /// their original order. Whitespace-only results are reported as [`ExtractionError::NoText`].
    #[tracing::instrument(skip(self, path))]
    pub async fn extract(
        &self,
        path: &Path,
        kind: FileKind,
        language_code: &str,
    ) -> Result<String, ExtractionError> {
        let text = if kind.is_audio() {
            self.transcribe(path, kind, language_code).await?
        } else {
            let parse = match kind {
                FileKind::Pdf => extract_pdf_text,
                _ => extract_docx_text,
            };
            run_blocking(path, parse).await?
        };

        if text.trim().is_empty() {
            return Err(ExtractionError::NoText(display_name(path)));
        }
        tracing::info!(
            chars = text.len(),
            words = text.split_whitespace().count(),
            "Text extracted"
        );
        Ok(text)
    }

    async fn transcribe(
        &self,
        path: &Path,
        kind: FileKind,
        language: &str,
    ) -> Result<String, ExtractionError> {
        let segments = self.transcriber.transcribe(path, kind, language).await?;
        tracing::info!(segments = segments.len(), "Audio transcribed");
        Ok(join_segments(&segments))
    }
}

fn join_segments(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|segment| segment.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

async fn run_blocking(
    path: &Path,
    parse: fn(&Path) -> Result<String, ExtractionError>,
) -> Result<String, ExtractionError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || parse(&owned))
        .await
        .map_err(|error| ExtractionError::Document(format!("parser task failed: {error}")))?
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
