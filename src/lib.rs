#![deny(missing_docs)]

//! Core library for the RecapNote summarization server.

/// HTTP routing and REST handlers.
pub mod api;
/// Completion client with retry and key rotation.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Text extraction from audio and documents.
pub mod extraction;
/// Structured logging and tracing setup.
pub mod logging;
/// Upload processing pipeline.
pub mod processing;
/// Object storage for uploads and result bundles.
pub mod storage;
/// Chunked summarization.
pub mod summarization;
