//! Text completion against a rate-limited generative API.
//!
//! [`CompletionBackend`] issues a single request with one credential and classifies the
//! outcome. [`KeyRotatingClient`] layers the retry/rotation policy over a backend and is what
//! the rest of the crate talks to through [`CompletionClient`].

mod gemini;
mod rotation;

pub use gemini::GeminiBackend;
pub use rotation::{ApiKeyPool, KeyRotatingClient, RetryPolicy, RotationState, RotationStep};

use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single backend attempt, classified for the rotation policy.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Provider answered 429; the same key may be retried after a backoff.
    #[error("rate limited by provider")]
    RateLimited,
    /// Provider answered with a 5xx status; the key is abandoned.
    #[error("provider server error ({status}): {body}")]
    ServerError {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body, kept for diagnostics.
        body: String,
    },
    /// Any other failure: transport error, unexpected status, or malformed body.
    #[error("completion request failed: {0}")]
    Other(String),
}

/// Errors surfaced to callers of [`CompletionClient`].
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Every key in the pool used up its retry budget without a success.
    #[error("all completion keys exhausted after {attempts} attempts")]
    Exhausted {
        /// Total backend calls made before giving up.
        attempts: u32,
    },
}

/// One request to the provider using a specific credential.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send `prompt` with `api_key`, limiting the answer to `max_tokens`.
    async fn complete_with_key(
        &self,
        api_key: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, BackendError>;
}

/// Caller-facing completion interface.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Produce a completion for `prompt`, bounded by `max_tokens`.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, CompletionError>;
}

#[async_trait]
impl<T: CompletionBackend + ?Sized> CompletionBackend for std::sync::Arc<T> {
    async fn complete_with_key(
        &self,
        api_key: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, BackendError> {
        (**self)
            .complete_with_key(api_key, prompt, max_tokens)
            .await
    }
}
