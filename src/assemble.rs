//! Mapping analysis output onto the response contract.

use crate::analysis::AnalysisError;
use crate::sanitize::ParsedMedicineInfo;
use serde::Serialize;

/// Name reported when the model could not identify the medicine.
pub const UNKNOWN_NAME: &str = "Unknown";
/// Placeholder for missing usage or warnings.
pub const NOT_FOUND: &str = "Information not found.";
/// Usage text shown when the completion provider could not be reached.
pub const REQUEST_FAILED_USAGE: &str =
    "Could not analyze the medicine automatically. Please check your OpenRouter API key.";
/// Usage text shown when the model's answer could not be read.
pub const UNREADABLE_USAGE: &str = "Could not interpret the AI analysis of this medicine. The analysis service may be temporarily unavailable; please try again.";

/// Response body for a successful scan. Every field is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// Text read off the package by OCR.
    pub extracted_text: String,
    /// Identified medicine name.
    pub medicine_name: String,
    /// Common indications, or a diagnostic when analysis degraded.
    pub usage: String,
    /// Major warnings and precautions.
    pub warnings: String,
}

impl PipelineResult {
    /// True when `usage` carries a degradation diagnostic rather than model output.
    pub fn is_degraded(&self) -> bool {
        self.usage == REQUEST_FAILED_USAGE || self.usage == UNREADABLE_USAGE
    }
}

/// Combine OCR text with the analysis outcome, substituting fixed defaults.
pub fn assemble(
    extracted_text: String,
    analysis: Result<ParsedMedicineInfo, AnalysisError>,
) -> PipelineResult {
    match analysis {
        Ok(info) => PipelineResult {
            extracted_text,
            medicine_name: info.name.unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            usage: info.usage.unwrap_or_else(|| NOT_FOUND.to_string()),
            warnings: info.warnings.unwrap_or_else(|| NOT_FOUND.to_string()),
        },
        Err(error) => PipelineResult {
            extracted_text,
            medicine_name: UNKNOWN_NAME.to_string(),
            usage: diagnostic_for(&error).to_string(),
            warnings: NOT_FOUND.to_string(),
        },
    }
}

fn diagnostic_for(error: &AnalysisError) -> &'static str {
    match error {
        AnalysisError::Request { .. } | AnalysisError::Image(_) => REQUEST_FAILED_USAGE,
        AnalysisError::Parse(_) => UNREADABLE_USAGE,
    }
}
