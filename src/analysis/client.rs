//! HTTP adapter for OpenAI-compatible chat completion providers (OpenRouter by default).

use super::prompt::AnalysisRequest;
use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised by a single completion attempt.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// HTTP layer failed before receiving a response.
    #[error("Completion request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with a non-success status.
    #[error("Unexpected completion response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider response could not be decoded or held no text.
    #[error("Malformed completion response: {0}")]
    InvalidResponse(String),
}

/// Raw text produced by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResponse {
    /// Generated text, trimmed but otherwise untouched.
    pub raw_completion_text: String,
}

/// Interface implemented by completion backends.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send one completion request and return the generated text.
    async fn complete(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisResponse, CompletionError>;
}

/// Chat completions client for OpenRouter and compatible APIs.
pub struct OpenRouterClient {
    http: Client,
    endpoint: String,
    api_key: String,
    max_tokens: u32,
    referer: Option<String>,
    title: Option<String>,
}

impl OpenRouterClient {
    /// Build a client from the loaded configuration.
    pub fn new(config: &Config) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .user_agent(concat!("medscan/", env!("CARGO_PKG_VERSION")))
            .timeout(config.http_timeout())
            .build()?;
        tracing::debug!(
            endpoint = %config.completion_api_url,
            model = %config.completion_model,
            "Initialized completion client"
        );
        Ok(Self {
            http,
            endpoint: config.completion_api_url.clone(),
            api_key: config.completion_api_key.clone(),
            max_tokens: config.completion_max_tokens,
            referer: config.completion_referer.clone(),
            title: config.completion_title.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionProvider for OpenRouterClient {
    async fn complete(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisResponse, CompletionError> {
        let mut builder = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request.to_body(self.max_tokens));
        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            builder = builder.header("X-Title", title);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::UnexpectedStatus { status, body });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|error| CompletionError::InvalidResponse(error.to_string()))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CompletionError::InvalidResponse("response held no choices".into()))?;

        Ok(AnalysisResponse {
            raw_completion_text: content.trim().to_string(),
        })
    }
}
