//! Processing service coordinating extraction, summarization, and storage.

use crate::{
    completion::{ApiKeyPool, CompletionClient, GeminiBackend, KeyRotatingClient, RetryPolicy},
    config::Config,
    extraction::{FileKind, TextExtractor, WhisperApiTranscriber},
    processing::types::{
        InitError, LanguageOptions, ProcessingError, SummaryResult, UploadedFile,
    },
    storage::{
        RESULTS_PREFIX, StorageGateway, UPLOADS_PREFIX, result_key, sanitize_file_name, upload_key,
    },
    summarization::{Summarizer, prompts::chat_prompt},
};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

const CHAT_MAX_TOKENS: u32 = 1024;

/// Runs one upload through extraction, chunked summarization, and storage.
///
/// The service owns long-lived handles to the transcription backend, the completion client,
/// and the object store. Construct it once near process start and share it through an `Arc`.
pub struct ProcessingService {
    extractor: TextExtractor,
    summarizer: Summarizer,
    storage: StorageGateway,
    completion: Arc<dyn CompletionClient>,
}

/// Abstraction over the processing pipeline used by the HTTP surface.
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Extract, summarize, and store an upload, returning the result bundle.
    async fn process_file(
        &self,
        upload: UploadedFile,
        language: LanguageOptions,
    ) -> Result<SummaryResult, ProcessingError>;

    /// Mint a signed download URL for a stored upload or bundle.
    async fn signed_url(&self, file_name: &str) -> Result<String, ProcessingError>;

    /// Fetch a stored result bundle.
    async fn json_content(&self, file_name: &str) -> Result<serde_json::Value, ProcessingError>;

    /// Answer `question` from `context` with a single completion.
    async fn chat(&self, question: &str, context: &str) -> Result<String, ProcessingError>;
}

impl ProcessingService {
    /// Assemble a service from already-built components.
    pub fn new(
        extractor: TextExtractor,
        summarizer: Summarizer,
        storage: StorageGateway,
        completion: Arc<dyn CompletionClient>,
    ) -> Self {
        Self {
            extractor,
            summarizer,
            storage,
            completion,
        }
    }

    /// Build the production wiring: Whisper transcription, Gemini with key rotation, and R2.
    pub fn from_config(config: &Config) -> Result<Self, InitError> {
        let keys =
            ApiKeyPool::new(config.completion.api_keys.clone()).ok_or(InitError::EmptyKeyPool)?;
        tracing::info!(
            keys = keys.len(),
            model = %config.completion.model,
            "Initializing completion client"
        );
        let backend = GeminiBackend::new(&config.completion.base_url, &config.completion.model)?;
        let policy = RetryPolicy {
            max_retries: config.completion.max_retries,
            backoff_unit: config.completion.backoff_unit(),
        };
        let completion: Arc<dyn CompletionClient> =
            Arc::new(KeyRotatingClient::new(backend, keys, policy));

        let transcriber = WhisperApiTranscriber::new(
            &config.transcription.api_key,
            &config.transcription.base_url,
            &config.transcription.model,
        )?;
        let storage = StorageGateway::r2(&config.storage)?;
        tracing::info!(bucket = %config.storage.bucket_name, "Storage client initialized");

        Ok(Self::new(
            TextExtractor::new(Arc::new(transcriber)),
            Summarizer::new(completion.clone(), config.summarization),
            storage,
            completion,
        ))
    }

    /// Extract, summarize, and store one upload.
    ///
    /// The file kind is checked before anything touches disk or the network. The upload is
    /// staged in a temporary file that is removed once the request finishes, whichever step
    /// fails.
    #[tracing::instrument(
        skip_all,
        fields(request_id = %Uuid::new_v4(), file = %upload.file_name, language = %language.code)
    )]
    pub async fn process_upload(
        &self,
        upload: UploadedFile,
        language: LanguageOptions,
    ) -> Result<SummaryResult, ProcessingError> {
        let file_name = sanitize_file_name(&upload.file_name)
            .ok_or_else(|| ProcessingError::UnsupportedFormat(upload.file_name.clone()))?;
        let kind = FileKind::from_file_name(&file_name)
            .ok_or_else(|| ProcessingError::UnsupportedFormat(file_name.clone()))?;
        tracing::info!(
            kind = ?kind,
            bytes = upload.bytes.len(),
            declared_type = upload.content_type.as_deref().unwrap_or("unknown"),
            "Processing upload"
        );

        let staged = tempfile::Builder::new()
            .prefix("recapnote-")
            .suffix(kind.extension())
            .tempfile()?;
        tokio::fs::write(staged.path(), &upload.bytes).await?;
        drop(upload);

        let text = self
            .extractor
            .extract(staged.path(), kind, &language.code)
            .await?;
        let summary = self
            .summarizer
            .summarize(&text, &language.name)
            .await
            .inspect_err(|error| tracing::warn!(error = %error, "Summarization failed"))?;

        let ttl = self.storage.signed_url_ttl();
        let upload_key = upload_key(&file_name);
        self.storage
            .store(staged.path(), &upload_key, kind.mime())
            .await?;
        let file_url = self.storage.sign(&upload_key, ttl).await?;

        let json_key = result_key(&file_name);
        let json_url = self.storage.sign(&json_key, ttl).await?;
        let result = SummaryResult {
            subject: summary.subject,
            summary: summary.summary,
            full_text: text,
            file_url,
            json_url,
        };
        self.storage.store_json(&json_key, &result).await?;

        if let Err(error) = staged.close() {
            tracing::warn!(error = %error, "Failed to remove staged upload");
        }
        tracing::info!(
            chunks = summary.chunk_count,
            upload = %upload_key,
            bundle = %json_key,
            "Upload processed"
        );
        Ok(result)
    }

    /// Mint a signed URL; names without a storage prefix refer to original uploads.
    pub async fn signed_url(&self, file_name: &str) -> Result<String, ProcessingError> {
        let name = required(file_name, "file_name")?;
        let key = if name.starts_with(UPLOADS_PREFIX) || name.starts_with(RESULTS_PREFIX) {
            name.to_string()
        } else {
            upload_key(&sanitize_name(name)?)
        };
        let ttl = self.storage.signed_url_ttl();
        let url = self.storage.sign(&key, ttl).await?;
        tracing::info!(object = %key, "Signed URL issued");
        Ok(url)
    }

    /// Fetch a result bundle by its key or by the name of the upload it was built from.
    pub async fn json_content(
        &self,
        file_name: &str,
    ) -> Result<serde_json::Value, ProcessingError> {
        let name = required(file_name, "file_name")?;
        let key = if name.starts_with(RESULTS_PREFIX) {
            name.to_string()
        } else {
            result_key(&sanitize_name(name)?)
        };
        let content = self.storage.fetch_json(&key).await?;
        tracing::info!(object = %key, "Result bundle fetched");
        Ok(content)
    }

    /// Answer a follow-up question against previously extracted text.
    pub async fn chat(&self, question: &str, context: &str) -> Result<String, ProcessingError> {
        let question = required(question, "question")?;
        let context = required(context, "context")?;
        tracing::info!(
            question_chars = question.len(),
            context_chars = context.len(),
            "Answering chat question"
        );
        let answer = self
            .completion
            .complete(&chat_prompt(question, context), CHAT_MAX_TOKENS)
            .await?;
        Ok(answer.trim().to_string())
    }
}

#[async_trait]
impl ProcessingApi for ProcessingService {
    async fn process_file(
        &self,
        upload: UploadedFile,
        language: LanguageOptions,
    ) -> Result<SummaryResult, ProcessingError> {
        self.process_upload(upload, language).await
    }

    async fn signed_url(&self, file_name: &str) -> Result<String, ProcessingError> {
        ProcessingService::signed_url(self, file_name).await
    }

    async fn json_content(&self, file_name: &str) -> Result<serde_json::Value, ProcessingError> {
        ProcessingService::json_content(self, file_name).await
    }

    async fn chat(&self, question: &str, context: &str) -> Result<String, ProcessingError> {
        ProcessingService::chat(self, question, context).await
    }
}

fn required<'a>(value: &'a str, parameter: &'static str) -> Result<&'a str, ProcessingError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ProcessingError::MissingParameter(parameter))
    } else {
        Ok(trimmed)
    }
}

fn sanitize_name(name: &str) -> Result<String, ProcessingError> {
    sanitize_file_name(name).ok_or(ProcessingError::MissingParameter("file_name"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionError;
    use crate::config::SummarizationSettings;
    use crate::extraction::{ExtractionError, Transcriber, TranscriptSegment};
    use object_store::ObjectStore;
    use object_store::memory::InMemory;
    use object_store::path::Path as ObjectPath;
    use object_store::signer::Signer;
    use reqwest::{Method, Url};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct TestSigner;

    #[async_trait]
    impl Signer for TestSigner {
        async fn signed_url(
            &self,
            _method: Method,
            path: &ObjectPath,
            expires_in: Duration,
        ) -> object_store::Result<Url> {
            let secs = expires_in.as_secs();
            let url = format!("https://files.test/{path}?expires={secs}");
            Ok(Url::parse(&url).expect("valid url"))
        }
    }

    /// Counts calls and remembers where the staged upload lived.
    #[derive(Default)]
    struct CountingTranscriber {
        calls: AtomicUsize,
        staged: Mutex<Option<PathBuf>>,
    }

    #[async_trait]
    impl Transcriber for CountingTranscriber {
        async fn transcribe(
            &self,
            path: &Path,
            _kind: FileKind,
            _language_code: &str,
        ) -> Result<Vec<TranscriptSegment>, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(path.exists(), "staged upload exists while transcribing");
            *self.staged.lock().expect("staged lock") = Some(path.to_path_buf());
            Ok(vec![TranscriptSegment {
                start: 0.0,
                end: 3.0,
                text: "lecture about ownership and borrowing".into(),
            }])
        }
    }

    #[derive(Default)]
    struct EchoClient {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(
            &self,
            prompt: &str,
            _max_tokens: u32,
        ) -> Result<String, CompletionError> {
            self.prompts
                .lock()
                .expect("prompts lock")
                .push(prompt.to_string());
            if self.fail {
                return Err(CompletionError::Exhausted { attempts: 3 });
            }
            Ok(" answer ".into())
        }
    }

    struct Harness {
        service: ProcessingService,
        transcriber: Arc<CountingTranscriber>,
        client: Arc<EchoClient>,
        memory: Arc<InMemory>,
    }

    fn harness(client: EchoClient) -> Harness {
        let transcriber = Arc::new(CountingTranscriber::default());
        let client = Arc::new(client);
        let memory = Arc::new(InMemory::new());
        let storage = StorageGateway::new(
            memory.clone(),
            Arc::new(TestSigner),
            Duration::from_secs(600),
        );
        let settings = SummarizationSettings {
            chunk_words: 3000,
            subject_prefix_chars: 4000,
            chunk_pacing_ms: 0,
        };
        let service = ProcessingService::new(
            TextExtractor::new(transcriber.clone()),
            Summarizer::new(client.clone(), settings),
            storage,
            client.clone(),
        );
        Harness {
            service,
            transcriber,
            client,
            memory,
        }
    }

    impl Harness {
        fn prompts(&self) -> Vec<String> {
            self.client.prompts.lock().expect("prompts lock").clone()
        }

        fn staged_path(&self) -> PathBuf {
            let staged = self.transcriber.staged.lock().expect("staged lock");
            staged.clone().expect("upload was staged")
        }
    }

    fn upload(file_name: &str) -> UploadedFile {
        UploadedFile {
            file_name: file_name.into(),
            content_type: None,
            bytes: b"fake audio".to_vec(),
        }
    }

    async fn exists(memory: &InMemory, key: &str) -> bool {
        memory.head(&ObjectPath::from(key)).await.is_ok()
    }

    async fn is_empty(memory: &InMemory) -> bool {
        let listing = memory.list_with_delimiter(None).await.expect("list");
        listing.objects.is_empty() && listing.common_prefixes.is_empty()
    }

    #[tokio::test]
    async fn audio_upload_is_summarized_and_stored() {
        let harness = harness(EchoClient::default());

        let result = harness
            .service
            .process_upload(upload("../lectures/week1.mp3"), LanguageOptions::default())
            .await
            .expect("processed");

        assert_eq!(result.full_text, "lecture about ownership and borrowing");
        assert_eq!(result.subject, "answer");
        assert_eq!(
            result.file_url,
            "https://files.test/uploads/week1.mp3?expires=600"
        );
        assert_eq!(
            result.json_url,
            "https://files.test/results/week1.json?expires=600"
        );
        assert_eq!(harness.transcriber.calls.load(Ordering::SeqCst), 1);
        assert!(exists(&harness.memory, "uploads/week1.mp3").await);
        assert!(exists(&harness.memory, "results/week1.json").await);

        let stored = harness
            .service
            .json_content("week1.mp3")
            .await
            .expect("bundle");
        let stored: SummaryResult = serde_json::from_value(stored).expect("bundle shape");
        assert_eq!(stored, result);
    }

    #[tokio::test]
    async fn unsupported_extension_does_no_work() {
        let harness = harness(EchoClient::default());

        let error = harness
            .service
            .process_upload(upload("notes.txt"), LanguageOptions::default())
            .await
            .expect_err("unsupported");

        assert!(matches!(
            error,
            ProcessingError::UnsupportedFormat(name) if name == "notes.txt"
        ));
        assert_eq!(harness.transcriber.calls.load(Ordering::SeqCst), 0);
        assert!(harness.prompts().is_empty());
        assert!(is_empty(&harness.memory).await);
    }

    #[tokio::test]
    async fn exhausted_completion_stores_nothing() {
        let harness = harness(EchoClient {
            fail: true,
            ..EchoClient::default()
        });

        let error = harness
            .service
            .process_upload(upload("talk.wav"), LanguageOptions::default())
            .await
            .expect_err("exhausted");

        assert!(matches!(
            error,
            ProcessingError::CompletionExhausted(CompletionError::Exhausted { attempts: 3 })
        ));
        assert!(is_empty(&harness.memory).await);
    }

    #[tokio::test]
    async fn staged_upload_is_removed_after_success() {
        let harness = harness(EchoClient::default());

        harness
            .service
            .process_upload(upload("talk.mp3"), LanguageOptions::default())
            .await
            .expect("processed");

        let staged = harness.staged_path();
        let extension = staged.extension().and_then(|ext| ext.to_str());
        assert_eq!(extension, Some("mp3"));
        assert!(!staged.exists(), "staged upload was not removed");
    }

    #[tokio::test]
    async fn staged_upload_is_removed_after_failure() {
        let harness = harness(EchoClient {
            fail: true,
            ..EchoClient::default()
        });

        let result = harness
            .service
            .process_upload(upload("talk.wav"), LanguageOptions::default())
            .await;

        assert!(result.is_err());
        let staged = harness.staged_path();
        assert!(!staged.exists(), "staged upload was not removed");
    }

    #[tokio::test]
    async fn signed_url_resolves_bare_and_prefixed_names() {
        let harness = harness(EchoClient::default());

        let bare = harness.service.signed_url("talk.wav").await.expect("bare");
        let bundle = harness
            .service
            .signed_url("results/talk.json")
            .await
            .expect("prefixed");
        let blank = harness.service.signed_url("  ").await.expect_err("blank");

        assert_eq!(bare, "https://files.test/uploads/talk.wav?expires=600");
        assert_eq!(bundle, "https://files.test/results/talk.json?expires=600");
        assert!(matches!(
            blank,
            ProcessingError::MissingParameter("file_name")
        ));
    }

    #[tokio::test]
    async fn missing_bundle_is_not_found() {
        let harness = harness(EchoClient::default());

        let error = harness
            .service
            .json_content("results/absent.json")
            .await
            .expect_err("absent");

        assert!(matches!(
            error,
            ProcessingError::NotFound(key) if key == "results/absent.json"
        ));
    }

    #[tokio::test]
    async fn chat_requires_question_and_context() {
        let harness = harness(EchoClient::default());

        let missing = harness
            .service
            .chat("", "some context")
            .await
            .expect_err("missing question");
        let answer = harness
            .service
            .chat("What is borrowing?", "Borrowing lends a reference.")
            .await
            .expect("answer");

        assert!(matches!(
            missing,
            ProcessingError::MissingParameter("question")
        ));
        assert_eq!(answer, "answer");
        let prompts = harness.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Question: What is borrowing?"));
    }
}
