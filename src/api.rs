//! HTTP surface for medscan.
//!
//! - `POST /api/scan` – Multipart upload with a single `medicineImage` file. Runs OCR and AI
//!   analysis and returns `{ extractedText, medicineName, usage, warnings }`. Missing uploads and
//!   unreadable images yield `400 { error }`; unexpected faults yield a generic `500 { error }`.
//! - `GET /metrics` – Scan outcome counters.

use crate::assemble::PipelineResult;
use crate::ingest::read_image_field;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{ScanApi, ScanError};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;

/// Message returned for unhandled faults; details are only logged.
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal server error occurred during processing.";

/// Build the HTTP router exposing the scan API.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: ScanApi + 'static,
{
    Router::new()
        .route("/api/scan", post(scan_image::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

/// Accept an upload and run it through the scan pipeline.
///
/// The pipeline runs on its own task so a panic still maps to a 500 and a client disconnect
/// cannot interrupt cleanup.
async fn scan_image<S>(
    State(service): State<Arc<S>>,
    multipart: Multipart,
) -> Result<Json<PipelineResult>, AppError>
where
    S: ScanApi + 'static,
{
    let image = match read_image_field(multipart).await {
        Ok(image) => image,
        Err(error) => {
            service.record_input_rejection();
            tracing::warn!(error = %error, "Upload rejected");
            return Err(ScanError::from(error).into());
        }
    };

    let task_service = Arc::clone(&service);
    let outcome = tokio::spawn(async move { task_service.scan(image).await })
        .await
        .unwrap_or_else(|join_error| {
            service.record_internal_error();
            tracing::error!(error = %join_error, "Scan task aborted");
            Err(ScanError::Internal(anyhow::anyhow!(
                "scan task aborted: {join_error}"
            )))
        });
    Ok(Json(outcome?))
}

/// Return the scan counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: ScanApi,
{
    Json(service.metrics_snapshot())
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError(ScanError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            ScanError::Input(error) => (StatusCode::BAD_REQUEST, error.to_string()),
            ScanError::Extraction(message) => (StatusCode::BAD_REQUEST, message),
            ScanError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                INTERNAL_ERROR_MESSAGE.to_string(),
            ),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<ScanError> for AppError {
    fn from(inner: ScanError) -> Self {
        Self(inner)
    }
}
