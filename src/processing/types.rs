//! Request data and error definitions for the processing pipeline.

use crate::completion::{BackendError, CompletionError};
use crate::extraction::ExtractionError;
use crate::storage::StorageError;
use crate::summarization::SummarizeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_LANGUAGE_CODE: &str = "vi";
const DEFAULT_LANGUAGE_NAME: &str = "Vietnamese";

/// Errors emitted while serving a request.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The request carried no file part.
    #[error("No file was uploaded")]
    MissingFile,
    /// The uploaded file's extension is not accepted.
    #[error("Unsupported file format: {0}. Accepted formats: .mp3, .wav, .pdf, .docx")]
    UnsupportedFormat(String),
    /// A required request parameter is absent or blank.
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    /// The request body could not be read or decoded.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Text could not be extracted from the upload.
    #[error("Text extraction failed: {0}")]
    ExtractionFailure(#[source] ExtractionError),
    /// Summarization failed for a reason other than completion exhaustion.
    #[error("Summarization failed: {0}")]
    Summarization(#[source] SummarizeError),
    /// A completion request ran out of keys, during summarization or chat.
    #[error("Completion failed: {0}")]
    CompletionExhausted(#[from] CompletionError),
    /// The requested stored object does not exist.
    #[error("File not found: {0}")]
    NotFound(String),
    /// Uploading, downloading, or signing failed.
    #[error("Storage operation failed: {0}")]
    StorageFailure(#[source] StorageError),
    /// The temporary copy of the upload could not be written.
    #[error("Failed to stage upload: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExtractionError> for ProcessingError {
    fn from(error: ExtractionError) -> Self {
        match error {
            ExtractionError::UnsupportedFormat(name) => Self::UnsupportedFormat(name),
            other => Self::ExtractionFailure(other),
        }
    }
}

impl From<SummarizeError> for ProcessingError {
    fn from(error: SummarizeError) -> Self {
        match error.into_completion_error() {
            Ok(exhausted) => Self::CompletionExhausted(exhausted),
            Err(other) => Self::Summarization(other),
        }
    }
}

impl From<StorageError> for ProcessingError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(name) => Self::NotFound(name),
            other => Self::StorageFailure(other),
        }
    }
}

/// Errors raised while wiring the service from configuration.
#[derive(Debug, Error)]
pub enum InitError {
    /// No completion API key survived trimming.
    #[error("No usable completion API key configured")]
    EmptyKeyPool,
    /// The completion HTTP client could not be built.
    #[error("Failed to initialize completion backend: {0}")]
    Completion(#[from] BackendError),
    /// The transcription HTTP client could not be built.
    #[error("Failed to initialize transcription backend: {0}")]
    Transcription(#[from] ExtractionError),
    /// The object storage client could not be built.
    #[error("Failed to initialize storage: {0}")]
    Storage(#[from] StorageError),
}

/// A file received in a request; lives only for that request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-declared file name, not yet sanitized.
    pub file_name: String,
    /// Content type declared by the client, if any.
    pub content_type: Option<String>,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

/// Language used for transcription and for every prompt of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageOptions {
    /// Code handed to the transcription backend, e.g. `vi`.
    pub code: String,
    /// Human-readable name interpolated into prompts, e.g. `Vietnamese`.
    pub name: String,
}

impl Default for LanguageOptions {
    fn default() -> Self {
        Self {
            code: DEFAULT_LANGUAGE_CODE.to_string(),
            name: DEFAULT_LANGUAGE_NAME.to_string(),
        }
    }
}

impl LanguageOptions {
    /// Build options from optional request fields; blank values fall back to the defaults.
    pub fn from_parts(code: Option<String>, name: Option<String>) -> Self {
        let defaults = Self::default();
        let pick = |value: Option<String>, fallback: String| {
            value
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(fallback)
        };
        Self {
            code: pick(code, defaults.code),
            name: pick(name, defaults.name),
        }
    }
}

/// Result bundle returned to the caller and persisted under `results/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    /// Dominant topic of the upload.
    pub subject: String,
    /// Merged summary.
    pub summary: String,
    /// Full extracted text.
    pub full_text: String,
    /// Signed URL of the original upload.
    pub file_url: String,
    /// Signed URL of this bundle.
    pub json_url: String,
}
