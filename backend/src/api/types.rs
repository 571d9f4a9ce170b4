//! REST API types for frontend integration.
//!
//! The server keeps no session state: every mapping, validation and export
//! request carries the rows, the mapping and the entity id it applies to.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::export::SubmitReceipt;
use crate::mapping::FieldMapping;
use crate::models::{Dataset, ExportConfig, MappingSuggestion, SourceRow, TargetEntitySpec};
use crate::parser::ParseResult;
use crate::validation::ValidationReport;

/// Response sent to frontend after CSV upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Unique upload identifier (for correlating logs)
    pub upload_id: String,
    pub file_name: Option<String>,
    pub encoding: String,
    pub delimiter: String,
    pub headers: Vec<String>,
    pub row_count: usize,
    pub rows: Vec<SourceRow>,
}

impl UploadResponse {
    pub fn new(upload_id: String, file_name: Option<String>, parsed: ParseResult) -> Self {
        Self {
            upload_id,
            file_name,
            encoding: parsed.encoding,
            delimiter: parsed.delimiter.to_string(),
            headers: parsed.dataset.headers,
            row_count: parsed.dataset.rows.len(),
            rows: parsed.dataset.rows,
        }
    }
}

/// Entity configuration as served to the frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub base_url: String,
    pub entities: Vec<TargetEntitySpec>,
    /// Set when the stored document was unusable and ignored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ConfigResponse {
    pub fn new(config: &ExportConfig, notice: Option<String>, warnings: Vec<String>) -> Self {
        Self {
            base_url: config.base_url.clone(),
            entities: config.entities.clone(),
            notice,
            warnings,
        }
    }
}

/// Deterministic or AI mapping request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRequest {
    pub entity_id: String,
    pub headers: Vec<String>,
    /// AI only: suggestions below this score stay unmapped
    #[serde(default)]
    pub min_confidence: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingResponse {
    pub entity_id: String,
    pub mapping: FieldMapping,
    pub mapped_count: usize,
    pub missing_required: Vec<String>,
    /// AI only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<MappingSuggestion>,
}

/// Rows + mapping + entity: the input of validation and export.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub entity_id: String,
    /// Column order; taken from the first row when omitted
    #[serde(default)]
    pub headers: Option<Vec<String>>,
    pub rows: Vec<SourceRow>,
    #[serde(default)]
    pub mapping: FieldMapping,
    #[serde(default)]
    pub max_errors: Option<usize>,
}

impl ExportRequest {
    pub fn dataset(&self) -> Dataset {
        let headers = match &self.headers {
            Some(headers) => headers.clone(),
            None => self
                .rows
                .first()
                .map(|r| r.keys().cloned().collect())
                .unwrap_or_default(),
        };
        Dataset::new(headers, self.rows.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub entity_id: String,
    pub can_export: bool,
    pub summary: String,
    pub report: ValidationReport,
}

impl ValidateResponse {
    pub fn new(entity_id: &str, report: ValidationReport) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            can_export: report.is_valid() && report.rows_checked > 0,
            summary: report.summary(),
            report,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub entity_id: String,
    pub receipt: SubmitReceipt,
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

/// Body returned when validation blocks an export.
pub fn blocked_response(entity_id: &str, report: ValidationReport) -> Value {
    json!({
        "status": "error",
        "error": format!("Export blocked: {}", report.summary()),
        "validation": ValidateResponse::new(entity_id, report),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_request_defaults() {
        let request: ExportRequest = serde_json::from_value(json!({
            "entityId": "contacts",
            "rows": [{ "Name": "Ada", "Mail": "ada@example.com" }]
        }))
        .unwrap();

        assert!(request.mapping.entries(&[]).is_empty());
        assert_eq!(request.max_errors, None);
        assert_eq!(request.dataset().headers, vec!["Name", "Mail"]);
    }

    #[test]
    fn test_upload_response_shape() {
        let parsed = ParseResult {
            dataset: Dataset::from_records(vec![json!({ "a": "1" })]),
            encoding: "UTF-8".into(),
            delimiter: ';',
        };
        let body = serde_json::to_value(UploadResponse::new("u-1".into(), None, parsed)).unwrap();

        assert_eq!(body["uploadId"], "u-1");
        assert_eq!(body["delimiter"], ";");
        assert_eq!(body["rowCount"], 1);
        assert_eq!(body["headers"], json!(["a"]));
    }

    #[test]
    fn test_empty_dataset_cannot_export() {
        let report = ValidationReport {
            errors: vec![],
            total_errors: 0,
            rows_checked: 0,
            invalid_rows: 0,
            max_errors: 200,
        };
        assert!(!ValidateResponse::new("contacts", report).can_export);
    }

    #[test]
    fn test_error_response() {
        assert_eq!(error_response("boom")["error"], "boom");
    }
}
