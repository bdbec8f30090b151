#![deny(missing_docs)]

//! Core library for the medscan medicine identification service.

/// AI analysis of OCR output via a chat completion provider.
pub mod analysis;
/// HTTP routing and REST handlers.
pub mod api;
/// Response assembly with fixed fallbacks.
pub mod assemble;
/// Environment-driven configuration management.
pub mod config;
/// `data:` URL encoding for inline images.
pub mod data_url;
/// Upload intake and ephemeral storage.
pub mod ingest;
/// Structured logging and tracing setup.
pub mod logging;
/// Scan outcome counters.
pub mod metrics;
/// OCR provider integration.
pub mod ocr;
/// Scan orchestration and error taxonomy.
pub mod pipeline;
/// Cleanup of request-scoped uploads.
pub mod reaper;
/// Fixed-delay retry policy.
pub mod retry;
/// Normalization and parsing of model output.
pub mod sanitize;
