//! OCR.space client used to pull printed text off the package photo.

use crate::config::Config;
use crate::ingest::UploadedImage;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Message returned when the provider gives neither text nor an explanation.
pub const NO_TEXT_MESSAGE: &str = "Could not read any text from the image.";

const OCR_LANGUAGE: &str = "eng";

/// Errors surfaced by the text extraction stage.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Provider processed the image but produced no usable text.
    #[error("{0}")]
    Rejected(String),
    /// Stored upload could not be read back from disk.
    #[error("Failed to read stored upload: {0}")]
    Io(#[from] std::io::Error),
    /// HTTP layer failed before receiving a response.
    #[error("OCR request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with a non-success status.
    #[error("Unexpected OCR response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider response body could not be decoded.
    #[error("Malformed OCR response: {0}")]
    InvalidResponse(String),
}

impl ExtractionError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::UnexpectedStatus { .. } | Self::InvalidResponse(_)
        )
    }
}

/// Outcome reported by the OCR provider for a single image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Text of the first parsed result, possibly empty.
    pub raw_text: String,
    /// False when the provider flagged a processing error.
    pub succeeded: bool,
    /// Provider diagnostics, joined into one line.
    pub provider_error_message: Option<String>,
}

impl ExtractionResult {
    /// Accept the text or turn the outcome into a terminal rejection.
    pub fn into_text(self) -> Result<String, ExtractionError> {
        if self.succeeded && !self.raw_text.trim().is_empty() {
            return Ok(self.raw_text);
        }
        Err(ExtractionError::Rejected(
            self.provider_error_message
                .unwrap_or_else(|| NO_TEXT_MESSAGE.to_string()),
        ))
    }
}

/// Interface implemented by OCR backends.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Run OCR over the stored upload.
    async fn extract(&self, image: &UploadedImage) -> Result<ExtractionResult, ExtractionError>;
}

/// HTTP client for the OCR.space `parse/image` API.
pub struct OcrSpaceClient {
    http: Client,
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl OcrSpaceClient {
    /// Build a client from the loaded configuration.
    pub fn new(config: &Config) -> Result<Self, ExtractionError> {
        let http = Client::builder()
            .user_agent(concat!("medscan/", env!("CARGO_PKG_VERSION")))
            .timeout(config.http_timeout())
            .build()?;
        tracing::debug!(
            endpoint = %config.ocr_api_url,
            max_attempts = config.ocr_max_attempts,
            "Initialized OCR client"
        );
        Ok(Self {
            http,
            endpoint: config.ocr_api_url.clone(),
            api_key: config.ocr_api_key.clone(),
            retry: config.ocr_retry_policy(),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the sleeper used between attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    async fn send_once(
        &self,
        image: &UploadedImage,
        bytes: Vec<u8>,
    ) -> Result<ExtractionResult, ExtractionError> {
        let part = Part::bytes(bytes)
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)?;
        let form = Form::new()
            .part("file", part)
            .text("language", OCR_LANGUAGE)
            .text("isOverlayRequired", "false");

        let response = self
            .http
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::UnexpectedStatus { status, body });
        }

        let body: OcrSpaceResponse = response
            .json()
            .await
            .map_err(|error| ExtractionError::InvalidResponse(error.to_string()))?;
        Ok(body.into_result())
    }
}

#[async_trait]
impl TextExtractor for OcrSpaceClient {
    async fn extract(&self, image: &UploadedImage) -> Result<ExtractionResult, ExtractionError> {
        let bytes = tokio::fs::read(&image.path).await?;
        tracing::info!(size_bytes = image.size_bytes, "Sending image to OCR provider");
        self.retry
            .run(
                "ocr",
                self.sleeper.as_ref(),
                ExtractionError::is_transient,
                |_| self.send_once(image, bytes.clone()),
            )
            .await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcrSpaceResponse {
    #[serde(default)]
    parsed_results: Option<Vec<ParsedResult>>,
    #[serde(default)]
    is_errored_on_processing: bool,
    #[serde(default)]
    error_message: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParsedResult {
    #[serde(default)]
    parsed_text: Option<String>,
}

impl OcrSpaceResponse {
    fn into_result(self) -> ExtractionResult {
        let raw_text = self
            .parsed_results
            .and_then(|results| results.into_iter().next())
            .and_then(|result| result.parsed_text)
            .unwrap_or_default();
        ExtractionResult {
            raw_text,
            succeeded: !self.is_errored_on_processing,
            provider_error_message: self.error_message.as_ref().and_then(join_error_message),
        }
    }
}

fn join_error_message(value: &Value) -> Option<String> {
    let joined = match value {
        Value::String(message) => message.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::trim))
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    };
    if joined.is_empty() { None } else { Some(joined) }
}
