use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use httpmock::{Method::POST, MockServer};
use object_store::{ObjectStore, memory::InMemory, path::Path as ObjectPath, signer::Signer};
use recapnote::{
    api,
    completion::{ApiKeyPool, GeminiBackend, KeyRotatingClient, RetryPolicy},
    config::SummarizationSettings,
    extraction::{ExtractionError, FileKind, TextExtractor, Transcriber, TranscriptSegment},
    processing::{ProcessingService, SummaryResult},
    storage::StorageGateway,
    summarization::Summarizer,
};
use reqwest::Url;
use serde_json::json;
use tower::ServiceExt;
use zip::write::SimpleFileOptions;

const BOUNDARY: &str = "recapnote-integration-boundary";
const MODEL: &str = "gemini-test";

#[derive(Debug)]
struct FakeSigner;

#[async_trait]
impl Signer for FakeSigner {
    async fn signed_url(
        &self,
        method: reqwest::Method,
        path: &ObjectPath,
        expires_in: Duration,
    ) -> object_store::Result<Url> {
        let ttl = expires_in.as_secs();
        let url = format!("https://bucket.test/{path}?method={method}&ttl={ttl}");
        Ok(Url::parse(&url).expect("valid url"))
    }
}

#[derive(Default)]
struct FakeTranscriber {
    calls: AtomicUsize,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(
        &self,
        _path: &Path,
        _kind: FileKind,
        _language_code: &str,
    ) -> Result<Vec<TranscriptSegment>, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            TranscriptSegment {
                start: 0.0,
                end: 4.0,
                text: "Hôm nay chúng ta học về quyền sở hữu.".into(),
            },
            TranscriptSegment {
                start: 4.0,
                end: 8.0,
                text: "Sau đó là mượn tham chiếu.".into(),
            },
        ])
    }
}

struct Harness {
    app: Router,
    memory: Arc<InMemory>,
    transcriber: Arc<FakeTranscriber>,
}

fn harness(gemini: &MockServer, keys: &[&str], max_retries: u32) -> Harness {
    let backend = GeminiBackend::new(gemini.base_url(), MODEL).expect("backend");
    let pool = ApiKeyPool::new(keys.iter().map(|key| key.to_string()).collect()).expect("keys");
    let policy = RetryPolicy {
        max_retries,
        backoff_unit: Duration::from_millis(1),
    };
    let completion = Arc::new(KeyRotatingClient::new(backend, pool, policy));

    let transcriber = Arc::new(FakeTranscriber::default());
    let memory = Arc::new(InMemory::new());
    let storage = StorageGateway::new(
        memory.clone(),
        Arc::new(FakeSigner),
        Duration::from_secs(3600),
    );
    let settings = SummarizationSettings {
        chunk_words: 3000,
        subject_prefix_chars: 4000,
        chunk_pacing_ms: 0,
    };
    let service = ProcessingService::new(
        TextExtractor::new(transcriber.clone()),
        Summarizer::new(completion.clone(), settings),
        storage,
        completion,
    );

    Harness {
        app: api::create_router(Arc::new(service), 50 * 1024 * 1024),
        memory,
        transcriber,
    }
}

fn gemini_reply(text: &str) -> serde_json::Value {
    json!({
        "candidates": [
            { "content": { "role": "model", "parts": [ { "text": text } ] } }
        ]
    })
}

const PDF_FONT: &str =
    "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>";

fn numbered_pages(word_count: usize, words_per_page: usize) -> Vec<String> {
    (0..word_count)
        .collect::<Vec<_>>()
        .chunks(words_per_page)
        .map(|words| {
            words
                .iter()
                .map(|index| format!("word{index}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn docx_bytes(word_count: usize) -> Vec<u8> {
    let paragraphs: String = numbered_pages(word_count, 100)
        .iter()
        .map(|text| format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{paragraphs}</w:body></w:document>"#
    );

    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    zip.start_file("word/document.xml", SimpleFileOptions::default())
        .expect("start document part");
    zip.write_all(xml.as_bytes()).expect("write document part");
    zip.finish().expect("finish docx").into_inner()
}

/// Single-font PDF with one content stream per page and a hand-written xref table.
fn pdf_bytes(pages: &[String]) -> Vec<u8> {
    let page_count = pages.len();
    let kids = (0..page_count)
        .map(|index| format!("{} 0 R", 4 + 2 * index))
        .collect::<Vec<_>>()
        .join(" ");
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{kids}] /Count {page_count} >>"),
        PDF_FONT.to_string(),
    ];
    for (index, text) in pages.iter().enumerate() {
        let contents = 5 + 2 * index;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {contents} 0 R >>"
        ));
        let stream = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        let length = stream.len();
        objects.push(format!(
            "<< /Length {length} >>\nstream\n{stream}\nendstream"
        ));
    }

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, object) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        let number = index + 1;
        pdf.extend_from_slice(format!("{number} 0 obj\n{object}\nendobj\n").as_bytes());
    }

    let xref_start = pdf.len();
    let size = objects.len() + 1;
    let mut xref = format!("xref\n0 {size}\n0000000000 65535 f \n");
    for offset in offsets {
        xref.push_str(&format!("{offset:010} 00000 n \n"));
    }
    xref.push_str(&format!(
        "trailer\n<< /Size {size} /Root 1 0 R >>\nstartxref\n{xref_start}\n%%EOF\n"
    ));
    pdf.extend_from_slice(xref.as_bytes());
    pdf
}

fn upload_request(file_name: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/process_file")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&body).expect("json body")
}

async fn summary_result(response: axum::response::Response) -> SummaryResult {
    serde_json::from_value(response_json(response).await).expect("summary result")
}

async fn stored_object_count(memory: &InMemory) -> usize {
    let root = memory.list_with_delimiter(None).await.expect("list root");
    let mut count = root.objects.len();
    for prefix in root.common_prefixes {
        count += memory
            .list_with_delimiter(Some(&prefix))
            .await
            .expect("list prefix")
            .objects
            .len();
    }
    count
}

/// Upload a 7000-word document and check the whole pipeline against a mocked Gemini.
async fn assert_long_document_is_summarized(file_name: &str, bytes: &[u8]) {
    let gemini = MockServer::start_async().await;
    let completions = gemini
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/models/{MODEL}:generateContent"))
                .header("x-goog-api-key", "key-1");
            then.status(200).json_body(gemini_reply("Generated text"));
        })
        .await;
    let harness = harness(&gemini, &["key-1"], 3);

    let response = harness
        .app
        .clone()
        .oneshot(upload_request(file_name, bytes))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::OK);
    let result = summary_result(response).await;
    let hits = completions.hits_async().await;
    assert_eq!(hits, 5, "subject + 3 chunks + merge");
    assert_eq!(result.subject, "Generated text");
    assert_eq!(result.summary, "Generated text");
    assert_eq!(result.full_text.split_whitespace().count(), 7000);
    assert!(result.full_text.starts_with("word0 word1"));
    assert!(result.full_text.ends_with("word6999"));
    let upload_key = format!("uploads/{file_name}");
    assert_eq!(
        result.file_url,
        format!("https://bucket.test/{upload_key}?method=GET&ttl=3600")
    );
    assert_eq!(
        result.json_url,
        "https://bucket.test/results/lecture.json?method=GET&ttl=3600"
    );
    assert_eq!(harness.transcriber.calls.load(Ordering::SeqCst), 0);

    harness
        .memory
        .head(&ObjectPath::from(upload_key.as_str()))
        .await
        .expect("original upload stored");
    let uri = format!("/get_json_content?file_name={file_name}");
    let bundle = harness
        .app
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
        .await
        .expect("router response");
    assert_eq!(bundle.status(), StatusCode::OK);
    assert_eq!(summary_result(bundle).await, result);
}

#[tokio::test]
async fn long_pdf_is_chunked_summarized_and_stored() {
    let pdf = pdf_bytes(&numbered_pages(7000, 100));
    assert_long_document_is_summarized("lecture.pdf", &pdf).await;
}

#[tokio::test]
async fn long_docx_is_chunked_summarized_and_stored() {
    assert_long_document_is_summarized("lecture.docx", &docx_bytes(7000)).await;
}

#[tokio::test]
async fn unsupported_upload_is_rejected_before_any_work() {
    let gemini = MockServer::start_async().await;
    let completions = gemini
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200).json_body(gemini_reply("unused"));
        })
        .await;
    let harness = harness(&gemini, &["key-1"], 3);

    let response = harness
        .app
        .clone()
        .oneshot(upload_request("notes.txt", b"plain text notes"))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    let message = body["error"].as_str().expect("error message");
    assert!(message.contains("Unsupported file format"));
    assert_eq!(completions.hits_async().await, 0);
    assert_eq!(harness.transcriber.calls.load(Ordering::SeqCst), 0);
    assert_eq!(stored_object_count(&harness.memory).await, 0);
}

#[tokio::test]
async fn failing_key_is_rotated_for_every_request() {
    let gemini = MockServer::start_async().await;
    let broken = gemini
        .mock_async(|when, then| {
            when.method(POST).header("x-goog-api-key", "broken-key");
            then.status(503).body("backend unavailable");
        })
        .await;
    let healthy = gemini
        .mock_async(|when, then| {
            when.method(POST).header("x-goog-api-key", "healthy-key");
            then.status(200).json_body(gemini_reply("Quyền sở hữu"));
        })
        .await;
    let harness = harness(&gemini, &["broken-key", "healthy-key"], 3);

    let response = harness
        .app
        .clone()
        .oneshot(upload_request("lesson.wav", b"RIFF fake wave"))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["subject"], "Quyền sở hữu");
    assert_eq!(
        body["full_text"],
        "Hôm nay chúng ta học về quyền sở hữu.\nSau đó là mượn tham chiếu."
    );
    assert_eq!(harness.transcriber.calls.load(Ordering::SeqCst), 1);
    let broken_hits = broken.hits_async().await;
    assert_eq!(broken_hits, 3, "one 503 per completion, no retries");
    assert_eq!(healthy.hits_async().await, 3, "subject + 1 chunk + merge");
    assert_eq!(stored_object_count(&harness.memory).await, 2);
}

#[tokio::test]
async fn exhausted_keys_fail_the_request_without_storing() {
    let gemini = MockServer::start_async().await;
    let throttled = gemini
        .mock_async(|when, then| {
            when.method(POST);
            then.status(429).body("quota exceeded");
        })
        .await;
    let harness = harness(&gemini, &["key-a", "key-b"], 2);

    let response = harness
        .app
        .clone()
        .oneshot(upload_request("lesson.mp3", b"ID3 fake audio"))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response_json(response).await;
    let message = body["error"].as_str().expect("error message");
    assert!(message.contains("exhausted after 4 attempts"));
    assert_eq!(throttled.hits_async().await, 4, "2 keys x 2 retries");
    assert_eq!(stored_object_count(&harness.memory).await, 0);
}
