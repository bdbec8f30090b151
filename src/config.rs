use crate::retry::RetryPolicy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OCR_API_URL: &str = "https://api.ocr.space/parse/image";
const DEFAULT_COMPLETION_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_COMPLETION_MODEL: &str = "google/gemini-2.5-flash";
const DEFAULT_COMPLETION_REFERER: &str = "http://localhost:3000";
const DEFAULT_COMPLETION_TITLE: &str = "Medicine Search App";
const DEFAULT_SERVER_PORT: u16 = 3000;

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

/// Runtime configuration for the medscan server.
///
/// Built once at startup and handed to the clients that need it; nothing reads the
/// environment after [`Config::from_env`] returns.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key sent to the OCR provider in the `apikey` header.
    pub ocr_api_key: String,
    /// Endpoint of the OCR.space-compatible `parse/image` API.
    pub ocr_api_url: String,
    /// Total OCR attempts before a transport failure becomes fatal.
    pub ocr_max_attempts: u32,
    /// Bearer token for the chat completion provider.
    pub completion_api_key: String,
    /// Endpoint of the OpenAI-compatible chat completions API.
    pub completion_api_url: String,
    /// Model identifier passed to the completion provider.
    pub completion_model: String,
    /// Token budget requested for each completion.
    pub completion_max_tokens: u32,
    /// Optional `HTTP-Referer` attribution header.
    pub completion_referer: Option<String>,
    /// Optional `X-Title` attribution header.
    pub completion_title: Option<String>,
    /// Prompt variant used by the analysis stage.
    pub analysis_mode: AnalysisMode,
    /// Total completion attempts before analysis degrades.
    pub analysis_max_attempts: u32,
    /// Fixed pause between completion attempts, in milliseconds.
    pub analysis_retry_delay_ms: u64,
    /// Directory receiving uploaded images for the lifetime of one request.
    pub upload_dir: PathBuf,
    /// Upper bound on accepted request bodies.
    pub max_upload_bytes: usize,
    /// Timeout applied to every outbound HTTP request.
    pub http_timeout_secs: u64,
    /// HTTP server port.
    pub server_port: u16,
}

/// Which prompt variant the analysis stage sends to the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Send the OCR text only.
    TextOnly,
    /// Send the package photo inline and let the model read it.
    VisionCapable,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            ocr_api_key: load_env("OCR_API_KEY")?,
            ocr_api_url: load_env_optional("OCR_API_URL")
                .unwrap_or_else(|| DEFAULT_OCR_API_URL.to_string()),
            ocr_max_attempts: parse_attempts("OCR_MAX_ATTEMPTS", 1)?,
            completion_api_key: load_env_optional("COMPLETION_API_KEY")
                .or_else(|| load_env_optional("OPENROUTER_API_KEY"))
                .ok_or_else(|| ConfigError::MissingVariable("COMPLETION_API_KEY".to_string()))?,
            completion_api_url: load_env_optional("COMPLETION_API_URL")
                .unwrap_or_else(|| DEFAULT_COMPLETION_API_URL.to_string()),
            completion_model: load_env_optional("COMPLETION_MODEL")
                .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
            completion_max_tokens: parse_optional("COMPLETION_MAX_TOKENS")?.unwrap_or(300),
            completion_referer: Some(
                load_env_optional("COMPLETION_REFERER")
                    .unwrap_or_else(|| DEFAULT_COMPLETION_REFERER.to_string()),
            ),
            completion_title: Some(
                load_env_optional("COMPLETION_TITLE")
                    .unwrap_or_else(|| DEFAULT_COMPLETION_TITLE.to_string()),
            ),
            analysis_mode: load_env_optional("ANALYSIS_MODE")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("ANALYSIS_MODE".to_string()))
                })
                .transpose()?
                .unwrap_or(AnalysisMode::TextOnly),
            analysis_max_attempts: parse_attempts("ANALYSIS_MAX_ATTEMPTS", 2)?,
            analysis_retry_delay_ms: parse_optional("ANALYSIS_RETRY_DELAY_MS")?.unwrap_or(1000),
            upload_dir: load_env_optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            max_upload_bytes: parse_optional("MAX_UPLOAD_BYTES")?.unwrap_or(10 * 1024 * 1024),
            http_timeout_secs: parse_optional("HTTP_TIMEOUT_SECS")?.unwrap_or(60),
            server_port: match parse_optional("SERVER_PORT")? {
                Some(port) => port,
                None => parse_optional("PORT")?.unwrap_or(DEFAULT_SERVER_PORT),
            },
        })
    }

    /// Retry policy governing the OCR stage.
    pub fn ocr_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.ocr_max_attempts, Duration::ZERO)
    }

    /// Retry policy governing the completion stage.
    pub fn analysis_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.analysis_max_attempts,
            Duration::from_millis(self.analysis_retry_delay_ms),
        )
    }

    /// Timeout applied to outbound provider calls.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
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

fn parse_attempts(key: &str, default: u32) -> Result<u32, ConfigError> {
    match parse_optional::<u32>(key)? {
        Some(0) => Err(ConfigError::InvalidValue(key.to_string())),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

impl std::str::FromStr for AnalysisMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "text_only" | "textonly" => Ok(Self::TextOnly),
            "vision" | "vision_capable" | "visioncapable" => Ok(Self::VisionCapable),
            _ => Err(()),
        }
    }
}

/// Load `.env` (if present) and build the configuration.
pub fn load_config() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        ocr_api_url = %config.ocr_api_url,
        completion_api_url = %config.completion_api_url,
        model = %config.completion_model,
        analysis_mode = ?config.analysis_mode,
        upload_dir = %config.upload_dir.display(),
        server_port = config.server_port,
        "Loaded configuration"
    );
    Ok(config)
}

#[cfg(test)]
impl Config {
    /// Configuration pointing both providers at local mock servers.
    pub(crate) fn for_tests(ocr_api_url: String, completion_api_url: String) -> Self {
        Self {
            ocr_api_key: "ocr-key".into(),
            ocr_api_url,
            ocr_max_attempts: 1,
            completion_api_key: "completion-key".into(),
            completion_api_url,
            completion_model: "test/model".into(),
            completion_max_tokens: 300,
            completion_referer: None,
            completion_title: None,
            analysis_mode: AnalysisMode::TextOnly,
            analysis_max_attempts: 2,
            analysis_retry_delay_ms: 1000,
            upload_dir: env::temp_dir(),
            max_upload_bytes: 1024 * 1024,
            http_timeout_secs: 5,
            server_port: 0,
        }
    }
}
