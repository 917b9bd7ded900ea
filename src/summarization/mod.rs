//! Chunked summarization on top of a [`CompletionClient`].
//!
//! Long texts exceed what the provider accepts in one request, so the summarizer works in
//! three passes: a subject label from a bounded prefix, one partial summary per word chunk,
//! and a final merge of the partial summaries. Requests run one after another with a pacing
//! delay between chunks.

mod chunking;
pub(crate) mod prompts;

pub use chunking::{ChunkingError, chunk_words};

use crate::completion::{CompletionClient, CompletionError};
use crate::config::SummarizationSettings;
use std::sync::Arc;
use thiserror::Error;

const SUBJECT_MAX_TOKENS: u32 = 64;
const CHUNK_MAX_TOKENS: u32 = 1024;
const MERGE_MAX_TOKENS: u32 = 2048;

/// Errors surfaced while summarizing a text.
#[derive(Debug, Error)]
pub enum SummarizeError {
    /// The configured chunk size is unusable.
    #[error("Failed to chunk text: {0}")]
    Chunking(#[from] ChunkingError),
    /// There is nothing to summarize.
    #[error("Text to summarize is empty")]
    EmptyText,
    /// Subject extraction failed.
    #[error("Subject extraction failed: {0}")]
    Subject(#[source] CompletionError),
    /// A chunk summary failed; the whole summarization is abandoned.
    #[error("Summary of chunk {index} failed: {source}")]
    Chunk {
        /// Zero-based chunk index.
        index: usize,
        /// Underlying completion failure.
        #[source]
        source: CompletionError,
    },
    /// The final merge request failed.
    #[error("Merging partial summaries failed: {0}")]
    Merge(#[source] CompletionError),
}

impl SummarizeError {
    /// Split off the completion failure behind this error; other errors come back unchanged.
    pub fn into_completion_error(self) -> Result<CompletionError, Self> {
        match self {
            Self::Subject(source) | Self::Merge(source) | Self::Chunk { source, .. } => Ok(source),
            other => Err(other),
        }
    }
}

/// Subject label and merged summary for one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Dominant topic of the text.
    pub subject: String,
    /// Single merged summary.
    pub summary: String,
    /// Number of chunks the text was split into.
    pub chunk_count: usize,
}

/// Drives subject extraction, per-chunk summaries, and the merge pass.
pub struct Summarizer {
    client: Arc<dyn CompletionClient>,
    settings: SummarizationSettings,
}

impl Summarizer {
    /// Build a summarizer issuing requests through `client`.
    pub fn new(client: Arc<dyn CompletionClient>, settings: SummarizationSettings) -> Self {
        Self { client, settings }
    }

    /// Summarize `text`, writing the subject and summary in `language`.
    pub async fn summarize(&self, text: &str, language: &str) -> Result<Summary, SummarizeError> {
        let chunks = chunk_words(text, self.settings.chunk_words)?;
        if chunks.is_empty() {
            return Err(SummarizeError::EmptyText);
        }
        tracing::info!(
            chunks = chunks.len(),
            chunk_words = self.settings.chunk_words,
            language,
            "Summarizing text"
        );

        let subject = self.extract_subject(text, language).await?;
        let partials = self.summarize_chunks(&chunks, language).await?;
        debug_assert_eq!(partials.len(), chunks.len());

        let merge_prompt = prompts::merge_prompt(&partials, language);
        let summary = self
            .client
            .complete(&merge_prompt, MERGE_MAX_TOKENS)
            .await
            .map_err(SummarizeError::Merge)?;

        tracing::info!(
            chunks = chunks.len(),
            subject_chars = subject.len(),
            summary_chars = summary.len(),
            "Summary merged"
        );
        Ok(Summary {
            subject,
            summary,
            chunk_count: chunks.len(),
        })
    }

    async fn extract_subject(&self, text: &str, language: &str) -> Result<String, SummarizeError> {
        let prefix = prompts::char_prefix(text, self.settings.subject_prefix_chars);
        let prompt = prompts::subject_prompt(prefix, language);
        let subject = self
            .client
            .complete(&prompt, SUBJECT_MAX_TOKENS)
            .await
            .map_err(SummarizeError::Subject)?;
        Ok(subject.trim().to_string())
    }

    async fn summarize_chunks(
        &self,
        chunks: &[String],
        language: &str,
    ) -> Result<Vec<String>, SummarizeError> {
        let total = chunks.len();
        let pacing = self.settings.chunk_pacing();
        let mut partials = Vec::with_capacity(total);

        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
            let prompt = prompts::chunk_prompt(chunk, index, total, language);
            let partial = self
                .client
                .complete(&prompt, CHUNK_MAX_TOKENS)
                .await
                .map_err(|source| SummarizeError::Chunk { index, source })?;
            tracing::debug!(
                chunk = index,
                total,
                chars = partial.len(),
                "Chunk summarized"
            );
            partials.push(partial);
        }

        Ok(partials)
    }
}
