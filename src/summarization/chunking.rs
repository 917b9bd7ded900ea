//! Word-count chunking for summarization input.

use thiserror::Error;

/// Errors produced while splitting text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// A chunk must hold at least one word.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Split `text` into consecutive chunks of at most `max_words` whitespace-separated words.
///
/// Chunks keep the original word order, never overlap, and ignore sentence boundaries.
/// Words inside a chunk are joined by single spaces, so joining the chunks with a space
/// reproduces the word sequence of `text`. Blank input yields no chunks.
pub fn chunk_words(text: &str, max_words: usize) -> Result<Vec<String>, ChunkingError> {
    if max_words == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    Ok(words
        .chunks(max_words)
        .map(|window| window.join(" "))
        .collect())
}
