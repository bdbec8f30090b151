//! Analysis stage: prompt the completion provider to identify the medicine.
//!
//! [`AnalysisClient`] picks the prompt variant from [`AnalysisMode`], sends it through a
//! [`CompletionProvider`] and retries under a fixed-delay [`RetryPolicy`]. Exhausted retries come
//! back as [`AnalysisError::Request`]; the pipeline degrades the result instead of failing.

mod client;
mod prompt;

pub use client::{AnalysisResponse, CompletionError, CompletionProvider, OpenRouterClient};
pub use prompt::{AnalysisRequest, EmbeddedImage, text_prompt, vision_prompt};

use crate::config::{AnalysisMode, Config};
use crate::data_url::data_url;
use crate::ingest::UploadedImage;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::sanitize::SanitizeError;
use std::sync::Arc;
use thiserror::Error;

/// Non-fatal failures of the analysis stage.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Every completion attempt failed.
    #[error("Completion failed after {attempts} attempt(s): {source}")]
    Request {
        /// Attempts made before giving up.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        source: CompletionError,
    },
    /// The stored upload could not be embedded into a vision request.
    #[error("Failed to read upload for vision analysis: {0}")]
    Image(#[from] std::io::Error),
    /// The completion text was not a usable JSON object.
    #[error("Unreadable completion: {0}")]
    Parse(#[from] SanitizeError),
}

/// Drives the completion provider with the configured prompt variant and retry policy.
pub struct AnalysisClient {
    provider: Arc<dyn CompletionProvider>,
    mode: AnalysisMode,
    model_id: String,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl AnalysisClient {
    /// Assemble a client from its parts.
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        mode: AnalysisMode,
        model_id: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            mode,
            model_id: model_id.into(),
            retry,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Build the production client against the configured OpenRouter endpoint.
    pub fn from_config(config: &Config) -> Result<Self, CompletionError> {
        let provider = Arc::new(OpenRouterClient::new(config)?);
        Ok(Self::new(
            provider,
            config.analysis_mode,
            config.completion_model.clone(),
            config.analysis_retry_policy(),
        ))
    }

    /// Replace the sleeper used between attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Prompt variant in use.
    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    /// Ask the model to identify the medicine, retrying request failures.
    pub async fn analyze(
        &self,
        extracted_text: &str,
        image: &UploadedImage,
    ) -> Result<AnalysisResponse, AnalysisError> {
        let embedded = match self.mode {
            AnalysisMode::TextOnly => None,
            AnalysisMode::VisionCapable => {
                let bytes = tokio::fs::read(&image.path).await?;
                Some(data_url(&image.mime_type, &bytes))
            }
        };

        tracing::info!(mode = ?self.mode, model = %self.model_id, "Requesting medicine analysis");
        let mut attempts = 0;
        let outcome = self
            .retry
            .run(
                "completion",
                self.sleeper.as_ref(),
                |_| true,
                |attempt| {
                    attempts = attempt;
                    let request = self.build_request(extracted_text, embedded.as_deref());
                    let provider = Arc::clone(&self.provider);
                    async move { provider.complete(&request).await }
                },
            )
            .await;
        outcome.map_err(|source| AnalysisError::Request { attempts, source })
    }

    fn build_request(&self, extracted_text: &str, embedded: Option<&str>) -> AnalysisRequest {
        match embedded {
            None => AnalysisRequest {
                prompt_text: text_prompt(extracted_text),
                model_id: self.model_id.clone(),
                embedded_image: None,
            },
            Some(url) => AnalysisRequest {
                prompt_text: vision_prompt(),
                model_id: self.model_id.clone(),
                embedded_image: Some(EmbeddedImage {
                    data_url: url.to_string(),
                }),
            },
        }
    }
}
