use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TRANSCRIPTION_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the RecapNote server.
///
/// Built once at startup and handed to the service constructors; nothing reads the
/// environment after [`Config::from_env`] returns.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Completion provider credentials and model selection.
    pub completion: CompletionSettings,
    /// Remote transcription backend settings.
    pub transcription: TranscriptionSettings,
    /// Object storage bucket credentials.
    pub storage: StorageSettings,
    /// Chunked summarization tuning.
    pub summarization: SummarizationSettings,
    /// Maximum accepted multipart body size in bytes.
    pub max_upload_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Settings for the Gemini completion client and its key rotation policy.
#[derive(Clone, Deserialize)]
pub struct CompletionSettings {
    /// Ordered pool of API keys; rotated positionally on failure.
    pub api_keys: Vec<String>,
    /// Model identifier, e.g. `gemini-2.0-flash`.
    pub model: String,
    /// Base URL of the generative language REST API.
    pub base_url: String,
    /// Attempts allowed per key before rotating.
    pub max_retries: u32,
    /// Unit multiplied by `2^attempt` when backing off after a 429.
    pub backoff_unit_ms: u64,
}

/// Settings for the Whisper-compatible transcription API.
#[derive(Clone, Deserialize)]
pub struct TranscriptionSettings {
    /// Bearer token for the transcription API.
    pub api_key: String,
    /// Base URL exposing `/audio/transcriptions`.
    pub base_url: String,
    /// Transcription model identifier.
    pub model: String,
}

/// Cloudflare R2 bucket settings.
#[derive(Clone, Deserialize)]
pub struct StorageSettings {
    /// R2 account identifier used to derive the S3 endpoint.
    pub account_id: String,
    /// Access key id for the bucket.
    pub access_key_id: String,
    /// Secret access key for the bucket.
    pub secret_access_key: String,
    /// Bucket holding uploads and result bundles.
    pub bucket_name: String,
    /// Lifetime of minted signed URLs in seconds.
    pub signed_url_ttl_secs: u64,
}

/// Chunked summarization tuning knobs.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SummarizationSettings {
    /// Maximum words per chunk.
    pub chunk_words: usize,
    /// Characters of the text sent when asking for the subject.
    pub subject_prefix_chars: usize,
    /// Delay inserted between consecutive chunk requests.
    pub chunk_pacing_ms: u64,
}

impl Default for SummarizationSettings {
    fn default() -> Self {
        Self {
            chunk_words: 3000,
            subject_prefix_chars: 4000,
            chunk_pacing_ms: 1000,
        }
    }
}

impl CompletionSettings {
    /// Backoff unit as a [`Duration`].
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }
}

impl StorageSettings {
    /// S3-compatible endpoint for the configured R2 account.
    pub fn endpoint(&self) -> String {
        format!("https://{}.r2.cloudflarestorage.com", self.account_id)
    }

    /// Signed URL lifetime as a [`Duration`].
    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }
}

impl SummarizationSettings {
    /// Pacing delay as a [`Duration`].
    pub fn chunk_pacing(&self) -> Duration {
        Duration::from_millis(self.chunk_pacing_ms)
    }
}

// Secrets stay out of `Debug` output so configuration can be logged safely.
impl std::fmt::Debug for CompletionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSettings")
            .field(
                "api_keys",
                &format_args!("[{} redacted]", self.api_keys.len()),
            )
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .field("backoff_unit_ms", &self.backoff_unit_ms)
            .finish()
    }
}

impl std::fmt::Debug for TranscriptionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionSettings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSettings")
            .field("account_id", &self.account_id)
            .field("bucket_name", &self.bucket_name)
            .field("signed_url_ttl_secs", &self.signed_url_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = SummarizationSettings::default();
        let chunk_pacing_ms =
            parse_optional("CHUNK_PACING_MS")?.unwrap_or(defaults.chunk_pacing_ms);
        let summarization = SummarizationSettings {
            chunk_words: parse_optional("SUMMARY_CHUNK_WORDS")?.unwrap_or(defaults.chunk_words),
            subject_prefix_chars: parse_optional("SUBJECT_PREFIX_CHARS")?
                .unwrap_or(defaults.subject_prefix_chars),
            chunk_pacing_ms,
        };
        if summarization.chunk_words == 0 {
            return Err(ConfigError::InvalidValue("SUMMARY_CHUNK_WORDS".into()));
        }

        let max_retries: u32 = parse_optional("COMPLETION_MAX_RETRIES")?.unwrap_or(3);
        if max_retries == 0 {
            return Err(ConfigError::InvalidValue("COMPLETION_MAX_RETRIES".into()));
        }

        Ok(Self {
            completion: CompletionSettings {
                api_keys: load_api_keys()?,
                model: load_env_optional("GEMINI_MODEL")
                    .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
                base_url: load_env_optional("GEMINI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
                max_retries,
                backoff_unit_ms: parse_optional("COMPLETION_BACKOFF_MS")?.unwrap_or(1000),
            },
            transcription: TranscriptionSettings {
                api_key: load_env("TRANSCRIPTION_API_KEY")?,
                base_url: load_env_optional("TRANSCRIPTION_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_BASE_URL.to_string()),
                model: load_env_optional("TRANSCRIPTION_MODEL")
                    .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_MODEL.to_string()),
            },
            storage: StorageSettings {
                account_id: load_env("R2_ACCOUNT_ID")?,
                access_key_id: load_env("R2_ACCESS_KEY_ID")?,
                secret_access_key: load_env("R2_SECRET_ACCESS_KEY")?,
                bucket_name: load_env("R2_BUCKET_NAME")?,
                signed_url_ttl_secs: parse_optional("SIGNED_URL_TTL_SECS")?.unwrap_or(3600),
            },
            summarization,
            max_upload_bytes: parse_optional("MAX_UPLOAD_BYTES")?.unwrap_or(100 * 1024 * 1024),
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

/// Read `.env` (when present) and build the configuration, failing fast on missing values.
pub fn load() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        completion = ?config.completion,
        transcription = ?config.transcription,
        storage = ?config.storage,
        summarization = ?config.summarization,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(config)
}

fn load_api_keys() -> Result<Vec<String>, ConfigError> {
    let raw = load_env_optional("GEMINI_API_KEYS")
        .or_else(|| load_env_optional("GOOGLE_API_KEY"))
        .ok_or_else(|| ConfigError::MissingVariable("GEMINI_API_KEYS".to_string()))?;
    let keys = split_key_list(&raw);
    if keys.is_empty() {
        return Err(ConfigError::InvalidValue("GEMINI_API_KEYS".to_string()));
    }
    Ok(keys)
}

fn split_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}
