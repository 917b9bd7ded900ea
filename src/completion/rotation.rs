//! Retry and key-rotation policy for the completion backend.
//!
//! The policy is a small state machine: [`RotationState`] tracks which key is in use and how
//! many attempts it has consumed, and [`RotationState::advance`] decides what happens after a
//! failed attempt. [`KeyRotatingClient`] just drives that machine against a backend.

use super::{BackendError, CompletionBackend, CompletionClient, CompletionError};
use async_trait::async_trait;
use std::time::Duration;

/// Ordered, non-empty pool of completion API keys.
#[derive(Clone)]
pub struct ApiKeyPool {
    keys: Vec<String>,
}

impl ApiKeyPool {
    /// Build a pool, returning `None` when no usable key is supplied.
    pub fn new(keys: Vec<String>) -> Option<Self> {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect();
        if keys.is_empty() {
            None
        } else {
            Some(Self { keys })
        }
    }

    /// Number of keys in the pool.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always `false`; the constructor rejects empty pools.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }
}

impl std::fmt::Debug for ApiKeyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyPool")
            .field("len", &self.keys.len())
            .finish()
    }
}

/// Per-key attempt budget and exponential backoff unit.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts allowed on one key before rotating (at least 1).
    pub max_retries: u32,
    /// Base delay; the wait after attempt `n` is `2^n` units.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after a rate-limited `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(2u32.checked_pow(attempt).unwrap_or(u32::MAX))
    }
}

/// Position within the key pool and the attempt count on the current key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationState {
    /// Index of the key being used.
    pub key_index: usize,
    /// Zero-based attempt number on that key.
    pub attempt: u32,
}

/// Decision taken after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStep {
    /// Wait `delay`, then retry with the same key.
    Retry {
        /// State for the next attempt.
        next: RotationState,
        /// Backoff to sleep before retrying.
        delay: Duration,
    },
    /// Move on to the next key without waiting.
    Rotate {
        /// State for the next attempt.
        next: RotationState,
    },
    /// No keys left.
    Exhausted,
}

impl RotationState {
    /// First attempt on the first key.
    pub const fn start() -> Self {
        Self {
            key_index: 0,
            attempt: 0,
        }
    }

    /// Decide the next step after `failure`.
    pub fn advance(
        self,
        failure: &BackendError,
        policy: &RetryPolicy,
        key_count: usize,
    ) -> RotationStep {
        match failure {
            BackendError::RateLimited if self.attempt + 1 < policy.max_retries => {
                RotationStep::Retry {
                    next: Self {
                        key_index: self.key_index,
                        attempt: self.attempt + 1,
                    },
                    delay: policy.backoff(self.attempt),
                }
            }
            _ => self.rotate(key_count),
        }
    }

    fn rotate(self, key_count: usize) -> RotationStep {
        let next_key = self.key_index + 1;
        if next_key < key_count {
            RotationStep::Rotate {
                next: Self {
                    key_index: next_key,
                    attempt: 0,
                },
            }
        } else {
            RotationStep::Exhausted
        }
    }
}

/// Completion client that retries rate-limited calls and rotates through an [`ApiKeyPool`].
pub struct KeyRotatingClient<B> {
    backend: B,
    keys: ApiKeyPool,
    policy: RetryPolicy,
}

impl<B: CompletionBackend> KeyRotatingClient<B> {
    /// Wrap `backend` with the given key pool and retry policy.
    pub fn new(backend: B, keys: ApiKeyPool, policy: RetryPolicy) -> Self {
        Self {
            backend,
            keys,
            policy,
        }
    }
}

#[async_trait]
impl<B: CompletionBackend> CompletionClient for KeyRotatingClient<B> {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, CompletionError> {
        let mut state = RotationState::start();
        let mut attempts = 0u32;

        while let Some(key) = self.keys.get(state.key_index) {
            attempts += 1;
            let failure = match self
                .backend
                .complete_with_key(key, prompt, max_tokens)
                .await
            {
                Ok(text) => {
                    tracing::debug!(
                        key_index = state.key_index,
                        attempt = state.attempt,
                        chars = text.len(),
                        "Completion succeeded"
                    );
                    return Ok(text);
                }
                Err(failure) => failure,
            };

            match state.advance(&failure, &self.policy, self.keys.len()) {
                RotationStep::Retry { next, delay } => {
                    tracing::warn!(
                        key_index = state.key_index,
                        attempt = state.attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    state = next;
                }
                RotationStep::Rotate { next } => {
                    tracing::warn!(
                        key_index = state.key_index,
                        attempt = state.attempt,
                        error = %failure,
                        "Abandoning completion key"
                    );
                    state = next;
                }
                RotationStep::Exhausted => {
                    tracing::warn!(
                        key_index = state.key_index,
                        attempt = state.attempt,
                        error = %failure,
                        "Last completion key failed"
                    );
                    break;
                }
            }
        }

        tracing::error!(
            attempts,
            keys = self.keys.len(),
            "Completion keys exhausted"
        );
        Err(CompletionError::Exhausted { attempts })
    }
}
