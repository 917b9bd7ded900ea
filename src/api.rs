//! HTTP surface for RecapNote.
//!
//! This module exposes a compact Axum router:
//!
//! - `GET /` – Liveness check returning `{ "status": ... }`.
//! - `POST /process_file` – Multipart upload (`file`, optional `language_code`, `language_name`).
//!   Extracts text, summarizes it, stores the upload and the result bundle, and returns
//!   `{ subject, summary, full_text, file_url, json_url }`.
//! - `GET /get_signed_url?file_name=` – Signed download URL for a stored upload or bundle.
//! - `GET /get_json_content?file_name=` – Stored result bundle.
//! - `POST /chat` – `{ question, context }` answered with a single completion.
//!
//! Failures are always returned as `{ "error": "<message>" }`.

use crate::processing::{
    LanguageOptions, ProcessingApi, ProcessingError, SummaryResult, UploadedFile,
};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Query, State,
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const STATUS_MESSAGE: &str = "RecapNote API is running";

/// Build the HTTP router; multipart bodies above `max_upload_bytes` are rejected.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: ProcessingApi + 'static,
{
    Router::new()
        .route("/", get(root))
        .route("/process_file", post(process_file::<S>))
        .route("/get_signed_url", get(get_signed_url::<S>))
        .route("/get_json_content", get(get_json_content::<S>))
        .route("/chat", post(chat::<S>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: STATUS_MESSAGE,
    })
}

/// Extract, summarize, and store an uploaded file.
///
/// Text fields may appear before or after the file part. The file part must carry a file name;
/// its extension decides how the text is extracted.
async fn process_file<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SummaryResult>, AppError>
where
    S: ProcessingApi,
{
    let mut multipart =
        multipart.map_err(|rejection| ProcessingError::InvalidRequest(rejection.body_text()))?;
    let mut upload = None;
    let mut language_code = None;
    let mut language_name = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid_multipart)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(invalid_multipart)?;
                if let Some(file_name) = file_name.filter(|name| !name.trim().is_empty()) {
                    upload = Some(UploadedFile {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            Some("language_code") => {
                language_code = Some(field.text().await.map_err(invalid_multipart)?);
            }
            Some("language_name") => {
                language_name = Some(field.text().await.map_err(invalid_multipart)?);
            }
            other => {
                tracing::debug!(field = ?other, "Ignoring unexpected multipart field");
            }
        }
    }

    let upload = upload.ok_or(ProcessingError::MissingFile)?;
    let language = LanguageOptions::from_parts(language_code, language_name);
    let file_name = upload.file_name.clone();
    let result = service.process_file(upload, language).await?;
    tracing::info!(file = %file_name, "Process request completed");
    Ok(Json(result))
}

/// Query string shared by the lookup endpoints.
#[derive(Deserialize)]
struct FileNameQuery {
    #[serde(default)]
    file_name: Option<String>,
}

impl FileNameQuery {
    fn into_file_name(self) -> Result<String, ProcessingError> {
        self.file_name
            .filter(|name| !name.trim().is_empty())
            .ok_or(ProcessingError::MissingParameter("file_name"))
    }
}

#[derive(Serialize)]
struct SignedUrlResponse {
    signed_url: String,
}

/// Mint a signed URL for a stored upload (`name.ext`) or key (`uploads/...`, `results/...`).
async fn get_signed_url<S>(
    State(service): State<Arc<S>>,
    query: Result<Query<FileNameQuery>, QueryRejection>,
) -> Result<Json<SignedUrlResponse>, AppError>
where
    S: ProcessingApi,
{
    let Query(query) =
        query.map_err(|rejection| ProcessingError::InvalidRequest(rejection.body_text()))?;
    let file_name = query.into_file_name()?;
    let signed_url = service.signed_url(&file_name).await?;
    Ok(Json(SignedUrlResponse { signed_url }))
}

/// Return a stored result bundle verbatim.
async fn get_json_content<S>(
    State(service): State<Arc<S>>,
    query: Result<Query<FileNameQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, AppError>
where
    S: ProcessingApi,
{
    let Query(query) =
        query.map_err(|rejection| ProcessingError::InvalidRequest(rejection.body_text()))?;
    let file_name = query.into_file_name()?;
    let content = service.json_content(&file_name).await?;
    Ok(Json(content))
}

/// Request body for `POST /chat`.
#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    context: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
}

/// Answer a follow-up question against previously extracted text.
async fn chat<S>(
    State(service): State<Arc<S>>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError>
where
    S: ProcessingApi,
{
    let Json(request) =
        request.map_err(|rejection| ProcessingError::InvalidRequest(rejection.body_text()))?;
    let question =
        non_blank(request.question).ok_or(ProcessingError::MissingParameter("question"))?;
    let context = non_blank(request.context).ok_or(ProcessingError::MissingParameter("context"))?;
    let answer = service.chat(&question, &context).await?;
    Ok(Json(ChatResponse { answer }))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn invalid_multipart(error: axum::extract::multipart::MultipartError) -> ProcessingError {
    ProcessingError::InvalidRequest(error.body_text())
}

struct AppError(ProcessingError);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ProcessingError::MissingFile
            | ProcessingError::UnsupportedFormat(_)
            | ProcessingError::MissingParameter(_)
            | ProcessingError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProcessingError::NotFound(_) => StatusCode::NOT_FOUND,
            ProcessingError::ExtractionFailure(_)
            | ProcessingError::Summarization(_)
            | ProcessingError::CompletionExhausted(_)
            | ProcessingError::StorageFailure(_)
            | ProcessingError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.0.to_string();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %message, "Request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self(inner)
    }
}
