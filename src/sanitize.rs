//! Helpers for normalizing model output into structured medicine fields.

use serde_json::{Map, Value};
use thiserror::Error;

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Errors raised while parsing normalized completion text.
#[derive(Debug, Error)]
pub enum SanitizeError {
    /// Text was not valid JSON.
    #[error("completion is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// JSON parsed but was not an object.
    #[error("completion JSON is not an object")]
    NotAnObject,
}

/// Fields the model reported. Absent values stay absent; defaults are applied later.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMedicineInfo {
    /// Medicine name.
    pub name: Option<String>,
    /// Common indications.
    pub usage: Option<String>,
    /// Major warnings and precautions.
    pub warnings: Option<String>,
}

/// Remove optional markdown fences around `raw` and trim the remainder.
///
/// Only prefix and suffix checks are applied; fences inside the payload are left alone.
pub fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix(JSON_FENCE) {
        text = rest;
    }
    if let Some(rest) = text.strip_prefix(FENCE) {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix(FENCE) {
        text = rest;
    }
    text.trim()
}

/// Strip fences and parse the remaining JSON object.
pub fn parse_medicine_info(raw: &str) -> Result<ParsedMedicineInfo, SanitizeError> {
    let value: Value = serde_json::from_str(strip_fences(raw))?;
    let Value::Object(fields) = value else {
        return Err(SanitizeError::NotAnObject);
    };
    Ok(ParsedMedicineInfo {
        name: field_text(&fields, "name"),
        usage: field_text(&fields, "usage"),
        warnings: field_text(&fields, "warnings"),
    })
}

/// Read a field leniently: strings, scalars and string lists become text.
fn field_text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match fields.get(key)? {
        Value::String(value) => value.trim().to_string(),
        Value::Number(value) => value.to_string(),
        Value::Bool(value) => value.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        Value::Null | Value::Object(_) => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str = r#"{"name":"Paracetamol","usage":"Pain and fever relief","warnings":"Liver risk in overdose"}"#;

    #[test]
    fn clean_json_is_untouched() {
        assert_eq!(strip_fences(CLEAN), CLEAN);
        assert_eq!(strip_fences(strip_fences(CLEAN)), CLEAN);
    }

    #[test]
    fn json_fence_parses_like_unwrapped_payload() {
        let wrapped = format!("```json\n{CLEAN}\n```");
        assert_eq!(
            parse_medicine_info(&wrapped).expect("wrapped"),
            parse_medicine_info(CLEAN).expect("clean")
        );
        let restripped = strip_fences(strip_fences(&wrapped));
        assert_eq!(
            parse_medicine_info(restripped).expect("restripped"),
            parse_medicine_info(&wrapped).expect("wrapped")
        );
    }

    #[test]
    fn bare_fence_is_stripped() {
        let wrapped = format!("  ```\n{CLEAN}```  ");
        assert_eq!(strip_fences(&wrapped), CLEAN);
    }

    #[test]
    fn missing_and_blank_fields_stay_absent() {
        let info = parse_medicine_info(r#"{"name":"  ","usage":null}"#).expect("parsed");
        assert_eq!(info, ParsedMedicineInfo::default());
    }

    #[test]
    fn list_warnings_are_joined() {
        let info = parse_medicine_info(r#"{"warnings":["Drowsiness","Do not drive"]}"#)
            .expect("parsed");
        assert_eq!(info.warnings.as_deref(), Some("Drowsiness; Do not drive"));
    }

    #[test]
    fn prose_and_arrays_are_rejected() {
        assert!(matches!(
            parse_medicine_info("I think this is ibuprofen."),
            Err(SanitizeError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_medicine_info("[1,2]"),
            Err(SanitizeError::NotAnObject)
        ));
    }
}
