//! Upload processing pipeline: text extraction, chunked summarization, and storage.

mod service;
pub mod types;

pub use service::{ProcessingApi, ProcessingService};
pub use types::{InitError, LanguageOptions, ProcessingError, SummaryResult, UploadedFile};
