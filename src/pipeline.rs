//! Scan pipeline coordinating ingest, OCR, analysis, and cleanup.

use crate::{
    analysis::{AnalysisClient, AnalysisError},
    assemble::{PipelineResult, assemble},
    config::Config,
    ingest::{IncomingImage, IngestError, IngestGate, UploadedImage},
    metrics::{MetricsSnapshot, ScanMetrics},
    ocr::{ExtractionError, OcrSpaceClient, TextExtractor},
    reaper::UploadGuard,
    sanitize::parse_medicine_info,
};
use anyhow::Context;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Terminal failures of a scan request.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The upload was missing or unusable; no provider was called.
    #[error("{0}")]
    Input(IngestError),
    /// OCR produced no usable text.
    #[error("{0}")]
    Extraction(String),
    /// Any other fault. Details stay server-side.
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl From<IngestError> for ScanError {
    fn from(error: IngestError) -> Self {
        if error.is_client_error() {
            Self::Input(error)
        } else {
            Self::Internal(anyhow::Error::new(error).context("failed to persist upload"))
        }
    }
}

impl From<ExtractionError> for ScanError {
    fn from(error: ExtractionError) -> Self {
        match error {
            ExtractionError::Rejected(message) => Self::Extraction(message),
            other => Self::Internal(anyhow::Error::new(other).context("OCR request failed")),
        }
    }
}

/// States a scan moves through; used for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Upload accepted.
    Received,
    /// OCR request in flight.
    Extracting,
    /// OCR found no usable text (terminal, 400).
    ExtractionFailed,
    /// OCR returned text.
    ExtractionOk,
    /// Completion request in flight.
    Analyzing,
    /// Analysis failed; the result will carry a diagnostic.
    AnalysisDegraded,
    /// Analysis produced parsed fields.
    AnalysisOk,
    /// Building the response body.
    Assembling,
    /// Response ready (terminal, 200).
    Completed,
    /// Unhandled fault (terminal, 500).
    ServerError,
}

impl PipelineStage {
    /// Stable name used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Extracting => "extracting",
            Self::ExtractionFailed => "extraction_failed",
            Self::ExtractionOk => "extraction_ok",
            Self::Analyzing => "analyzing",
            Self::AnalysisDegraded => "analysis_degraded",
            Self::AnalysisOk => "analysis_ok",
            Self::Assembling => "assembling",
            Self::Completed => "completed",
            Self::ServerError => "server_error",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter(stage: PipelineStage) {
    tracing::debug!(stage = %stage, "Pipeline transition");
}

/// Abstraction over the scan pipeline used by the HTTP surface.
#[async_trait]
pub trait ScanApi: Send + Sync {
    /// Run one scan to completion. The upload is removed before this returns.
    async fn scan(&self, image: IncomingImage) -> Result<PipelineResult, ScanError>;

    /// Count a request rejected before reaching the pipeline.
    fn record_input_rejection(&self) {}

    /// Count a request whose pipeline task died unexpectedly.
    fn record_internal_error(&self) {}

    /// Retrieve the current metrics snapshot.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the stage clients and runs each request through them.
pub struct ScanPipeline {
    ingest: IngestGate,
    extractor: Arc<dyn TextExtractor>,
    analysis: AnalysisClient,
    metrics: Arc<ScanMetrics>,
}

impl ScanPipeline {
    /// Assemble a pipeline from explicit components.
    pub fn new(
        ingest: IngestGate,
        extractor: Arc<dyn TextExtractor>,
        analysis: AnalysisClient,
    ) -> Self {
        Self {
            ingest,
            extractor,
            analysis,
            metrics: Arc::new(ScanMetrics::new()),
        }
    }

    /// Build the production pipeline from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let extractor = OcrSpaceClient::new(config).context("failed to build OCR client")?;
        let analysis =
            AnalysisClient::from_config(config).context("failed to build completion client")?;
        tracing::info!(
            upload_dir = %config.upload_dir.display(),
            analysis_mode = ?analysis.mode(),
            "Scan pipeline ready"
        );
        Ok(Self::new(
            IngestGate::new(config.upload_dir.clone()),
            Arc::new(extractor),
            analysis,
        ))
    }

    /// Run a scan, record its terminal state, and return the outcome.
    pub async fn scan(&self, image: IncomingImage) -> Result<PipelineResult, ScanError> {
        enter(PipelineStage::Received);
        let outcome = self.run(image).await;
        match &outcome {
            Ok(result) => {
                let degraded = result.is_degraded();
                self.metrics.record_completed(degraded);
                tracing::info!(
                    stage = %PipelineStage::Completed,
                    medicine = %result.medicine_name,
                    degraded,
                    "Scan completed"
                );
            }
            Err(ScanError::Input(error)) => {
                self.metrics.record_input_rejection();
                tracing::warn!(error = %error, "Scan rejected");
            }
            Err(ScanError::Extraction(message)) => {
                self.metrics.record_extraction_failure();
                tracing::warn!(
                    stage = %PipelineStage::ExtractionFailed,
                    message = %message,
                    "OCR produced no usable text"
                );
            }
            Err(ScanError::Internal(error)) => {
                self.metrics.record_internal_error();
                tracing::error!(stage = %PipelineStage::ServerError, error = ?error, "Scan failed");
            }
        }
        outcome
    }

    async fn run(&self, image: IncomingImage) -> Result<PipelineResult, ScanError> {
        let stored = self.ingest.persist(image).await?;
        let guard = UploadGuard::new(stored);
        let outcome = self.process(guard.image()).await;
        guard.release().await;
        outcome
    }

    async fn process(&self, image: &UploadedImage) -> Result<PipelineResult, ScanError> {
        enter(PipelineStage::Extracting);
        let extracted_text = self.extractor.extract(image).await?.into_text()?;
        enter(PipelineStage::ExtractionOk);
        tracing::debug!(text = %extracted_text, "OCR extracted text");

        enter(PipelineStage::Analyzing);
        let analysis = match self.analysis.analyze(&extracted_text, image).await {
            Ok(response) => {
                parse_medicine_info(&response.raw_completion_text).map_err(AnalysisError::from)
            }
            Err(error) => Err(error),
        };
        match &analysis {
            Ok(_) => enter(PipelineStage::AnalysisOk),
            Err(error) => tracing::warn!(
                stage = %PipelineStage::AnalysisDegraded,
                error = %error,
                "Analysis failed; returning degraded result"
            ),
        }

        enter(PipelineStage::Assembling);
        Ok(assemble(extracted_text, analysis))
    }

    /// Return the current scan counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl ScanApi for ScanPipeline {
    async fn scan(&self, image: IncomingImage) -> Result<PipelineResult, ScanError> {
        ScanPipeline::scan(self, image).await
    }

    fn record_input_rejection(&self) {
        self.metrics.record_input_rejection();
    }

    fn record_internal_error(&self) {
        self.metrics.record_internal_error();
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        ScanPipeline::metrics_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisRequest, AnalysisResponse, CompletionError, CompletionProvider};
    use crate::assemble::{NOT_FOUND, REQUEST_FAILED_USAGE, UNKNOWN_NAME, UNREADABLE_USAGE};
    use crate::config::AnalysisMode;
    use crate::ocr::ExtractionResult;
    use crate::retry::{RetryPolicy, testing::RecordingSleeper};
    use std::path::Path;
    use std::time::Duration;

    struct FixedExtractor(Result<ExtractionResult, &'static str>);

    #[async_trait]
    impl TextExtractor for FixedExtractor {
        async fn extract(
            &self,
            image: &UploadedImage,
        ) -> Result<ExtractionResult, ExtractionError> {
            assert!(image.path.exists(), "upload must exist during extraction");
            match &self.0 {
                Ok(result) => Ok(result.clone()),
                Err(message) => Err(ExtractionError::InvalidResponse(message.to_string())),
            }
        }
    }

    struct FixedProvider(Result<&'static str, &'static str>);

    #[async_trait]
    impl CompletionProvider for FixedProvider {
        async fn complete(
            &self,
            _request: &AnalysisRequest,
        ) -> Result<AnalysisResponse, CompletionError> {
            self.0
                .map(|text| AnalysisResponse {
                    raw_completion_text: text.to_string(),
                })
                .map_err(|message| CompletionError::InvalidResponse(message.to_string()))
        }
    }

    fn ocr_text(text: &str) -> Result<ExtractionResult, &'static str> {
        Ok(ExtractionResult {
            raw_text: text.to_string(),
            succeeded: true,
            provider_error_message: None,
        })
    }

    fn pipeline(
        dir: &Path,
        ocr: Result<ExtractionResult, &'static str>,
        completion: Result<&'static str, &'static str>,
    ) -> ScanPipeline {
        let analysis = AnalysisClient::new(
            Arc::new(FixedProvider(completion)),
            AnalysisMode::TextOnly,
            "test/model",
            RetryPolicy::new(2, Duration::from_secs(1)),
        )
        .with_sleeper(Arc::new(RecordingSleeper::default()));
        ScanPipeline::new(
            IngestGate::new(dir),
            Arc::new(FixedExtractor(ocr)),
            analysis,
        )
    }

    fn upload() -> IncomingImage {
        IncomingImage {
            file_name: Some("box.jpg".into()),
            content_type: Some("image/jpeg".into()),
            bytes: b"jpeg".to_vec(),
        }
    }

    fn is_empty_dir(dir: &Path) -> bool {
        std::fs::read_dir(dir).expect("read dir").next().is_none()
    }

    #[tokio::test]
    async fn paracetamol_end_to_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = pipeline(
            dir.path(),
            ocr_text("PARACETAMOL 500mg Tablets"),
            Ok(r#"{"name":"Paracetamol","usage":"Pain and fever relief","warnings":"Avoid exceeding recommended dose; liver risk in overdose"}"#),
        );

        let result = service.scan(upload()).await.expect("scan");

        assert_eq!(
            result,
            PipelineResult {
                extracted_text: "PARACETAMOL 500mg Tablets".into(),
                medicine_name: "Paracetamol".into(),
                usage: "Pain and fever relief".into(),
                warnings: "Avoid exceeding recommended dose; liver risk in overdose".into(),
            }
        );
        assert!(is_empty_dir(dir.path()));
        assert_eq!(service.metrics_snapshot().scans_completed, 1);
    }

    #[tokio::test]
    async fn provider_error_flag_aborts_and_cleans_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ocr = Ok(ExtractionResult {
            raw_text: String::new(),
            succeeded: false,
            provider_error_message: Some("Unable to recognize the file type".into()),
        });
        let service = pipeline(dir.path(), ocr, Ok("{}"));

        let error = service.scan(upload()).await.expect_err("rejected");

        assert!(matches!(&error, ScanError::Extraction(m) if m == "Unable to recognize the file type"));
        assert!(is_empty_dir(dir.path()));
        assert_eq!(service.metrics_snapshot().extraction_failures, 1);
    }

    #[tokio::test]
    async fn completion_outage_degrades_but_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = pipeline(dir.path(), ocr_text("IBUPROFEN 200mg"), Err("503"));

        let result = service.scan(upload()).await.expect("degraded scan");

        assert_eq!(result.extracted_text, "IBUPROFEN 200mg");
        assert_eq!(result.usage, REQUEST_FAILED_USAGE);
        assert_eq!(result.medicine_name, UNKNOWN_NAME);
        assert_eq!(result.warnings, NOT_FOUND);
        assert!(is_empty_dir(dir.path()));
        assert_eq!(service.metrics_snapshot().scans_degraded, 1);
    }

    #[tokio::test]
    async fn unreadable_completion_degrades() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = pipeline(dir.path(), ocr_text("IBUPROFEN"), Ok("Sorry, I cannot help."));

        let result = service.scan(upload()).await.expect("degraded scan");

        assert_eq!(result.usage, UNREADABLE_USAGE);
        assert_eq!(service.metrics_snapshot().scans_degraded, 1);
    }

    #[tokio::test]
    async fn ocr_transport_fault_is_internal_and_cleans_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = pipeline(dir.path(), Err("connection reset"), Ok("{}"));

        let error = service.scan(upload()).await.expect_err("fault");

        assert!(matches!(error, ScanError::Internal(_)));
        assert!(is_empty_dir(dir.path()));
        assert_eq!(service.metrics_snapshot().internal_errors, 1);
    }

    #[tokio::test]
    async fn empty_upload_is_rejected_before_any_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = pipeline(dir.path(), Err("must not be called"), Ok("{}"));
        let mut image = upload();
        image.bytes.clear();

        let error = service.scan(image).await.expect_err("empty");

        assert!(matches!(error, ScanError::Input(IngestError::EmptyImage)));
        assert!(is_empty_dir(dir.path()));
    }
}
