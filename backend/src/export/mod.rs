//! Serialization and delivery of transformed records.
//!
//! - [`to_csv`] - header row = target field names, minimal RFC 4180 quoting
//! - [`to_json`] - JSON array payload
//! - [`ApiExporter`] - `POST {baseUrl}{entity.url}` with an optional bearer token

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::logs::{log_error, log_info, log_success};
use crate::error::{ExportError, ExportResult};
use crate::models::{TargetEntitySpec, TargetFieldSpec, TargetRecord};

/// Write records as CSV, columns in target field order.
pub fn to_csv(records: &[TargetRecord], fields: &[TargetFieldSpec]) -> ExportResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer.write_record(fields.iter().map(|f| f.name.as_str()))?;
    for record in records {
        writer.write_record(fields.iter().map(|f| cell(record.get(&f.name))))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Pretty JSON array.
pub fn to_json(records: &[TargetRecord]) -> ExportResult<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// `base_url` and `entity_url` joined by exactly one `/`.
pub fn endpoint_url(base_url: &str, entity_url: &str) -> String {
    match (base_url.trim_end_matches('/'), entity_url.trim_start_matches('/')) {
        ("", path) => format!("/{}", path),
        (base, "") => base.to_string(),
        (base, path) => format!("{}/{}", base, path),
    }
}

/// What happened to a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub url: String,
    pub records: usize,
    pub status: Option<u16>,
    pub dry_run: bool,
}

/// Client for the target API.
#[derive(Clone)]
pub struct ApiExporter {
    base_url: String,
    token: Option<String>,
    dry_run: bool,
    client: reqwest::Client,
}

impl ApiExporter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            dry_run: false,
            client: reqwest::Client::new(),
        }
    }

    /// Bearer token sent as `Authorization` (ignored when empty).
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Log the request instead of sending it.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// POST all records as one JSON array. Single attempt.
    pub async fn submit(&self, entity: &TargetEntitySpec, records: &[TargetRecord]) -> ExportResult<SubmitReceipt> {
        let url = endpoint_url(&self.base_url, &entity.url);

        if self.dry_run {
            log_info(format!(
                "Dry run: would POST {} records to {} ({})",
                records.len(),
                url,
                if self.token.is_some() { "with bearer token" } else { "no token" }
            ));
            return Ok(SubmitReceipt { url, records: records.len(), status: None, dry_run: true });
        }

        log_info(format!("Submitting {} records to {}...", records.len(), url));
        let mut request = self.client.post(&url).json(records);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            log_error(format!("Submission to {} failed: {}", url, e));
            ExportError::Http(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log_error(format!("{} answered HTTP {}", url, status));
            return Err(ExportError::Rejected { status: status.as_u16(), body });
        }

        log_success(format!("{} accepted {} records (HTTP {})", url, records.len(), status.as_u16()));
        Ok(SubmitReceipt { url, records: records.len(), status: Some(status.as_u16()), dry_run: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> TargetRecord {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_csv_quotes_only_when_needed() {
        let fields = vec![TargetFieldSpec::new("name"), TargetFieldSpec::new("note")];
        let records = vec![
            record(json!({ "name": "a,b", "note": "plain" })),
            record(json!({ "name": "say \"hi\"", "note": "two\nlines" })),
        ];

        let csv = to_csv(&records, &fields).unwrap();
        let expected = "name,note\n\"a,b\",plain\n\"say \"\"hi\"\"\",\"two\nlines\"\n";
        assert_eq!(csv, expected);
    }

    #[test]
    fn test_csv_renders_scalars_and_nulls() {
        let fields = vec![
            TargetFieldSpec::number("n", None, None),
            TargetFieldSpec::boolean("b"),
            TargetFieldSpec::new("s"),
        ];
        let records = vec![record(json!({ "n": 4.5, "b": false, "s": null }))];

        let csv = to_csv(&records, &fields).unwrap();
        assert_eq!(csv.lines().nth(1), Some("4.5,false,"));
    }

    #[test]
    fn test_csv_header_only_for_empty_payload() {
        let fields = vec![TargetFieldSpec::new("id"), TargetFieldSpec::new("name")];
        assert_eq!(to_csv(&[], &fields).unwrap(), "id,name\n");
    }

    #[test]
    fn test_json_keeps_field_order() {
        let records = vec![record(json!({ "z": 1, "a": 2 }))];
        let json = to_json(&records).unwrap();
        assert!(json.find("\"z\"").unwrap() < json.find("\"a\"").unwrap());
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(endpoint_url("https://api.example.com/", "/v1/contacts"), "https://api.example.com/v1/contacts");
        assert_eq!(endpoint_url("https://api.example.com", "v1/contacts"), "https://api.example.com/v1/contacts");
        assert_eq!(endpoint_url("https://api.example.com", ""), "https://api.example.com");
        assert_eq!(endpoint_url("", "/contacts"), "/contacts");
    }

    #[tokio::test]
    async fn test_dry_run_sends_nothing() {
        let entity = TargetEntitySpec {
            id: "contacts".into(),
            name: "Contacts".into(),
            url: "/contacts".into(),
            fields: vec![TargetFieldSpec::new("name")],
        };
        let exporter = ApiExporter::new("http://127.0.0.1:9")
            .with_token(Some("secret".into()))
            .with_dry_run(true);

        let receipt = exporter
            .submit(&entity, &[record(json!({ "name": "Ada" }))])
            .await
            .unwrap();

        assert!(receipt.dry_run);
        assert_eq!(receipt.url, "http://127.0.0.1:9/contacts");
        assert_eq!(receipt.records, 1);
        assert_eq!(receipt.status, None);
    }
}
