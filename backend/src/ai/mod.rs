//! AI Module for mapping suggestions
//!
//! Asks Anthropic Claude which source column best fits each target field.
//! The answer is advisory: suggestions are normalized here and only become
//! a mapping once the caller adopts them (see [`crate::FieldMapping::from_suggestions`]).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use datamend::ai::AiClient;
//!
//! let client = AiClient::from_env()?;
//! let suggestions = client.suggest_mapping(&dataset.headers, &entity.fields).await?;
//! ```

pub mod prompt;

use serde::Deserialize;
use serde_json::Value;
use std::env;

use crate::api::logs::{log_error, log_info, log_success};
use crate::error::{AiError, AiResult};
use crate::models::{MappingSuggestion, TargetFieldSpec};

pub use prompt::{system_prompt, user_prompt};

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Anthropic API client
#[derive(Clone)]
pub struct AiClient {
    api_key: String,
    model: String,
    max_tokens: u32,
}

/// Anthropic API response structure
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

/// Anthropic API error response
#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl AiClient {
    /// Create a new client with explicit API key
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 2048,
        }
    }

    /// Create a client from `ANTHROPIC_API_KEY`, with optional
    /// `DATAMEND_AI_MODEL` and `DATAMEND_AI_MAX_TOKENS` overrides
    pub fn from_env() -> AiResult<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AiError::MissingApiKey("ANTHROPIC_API_KEY not set".to_string()))?;

        let mut client = Self::new(api_key);
        if let Ok(model) = env::var("DATAMEND_AI_MODEL") {
            if !model.trim().is_empty() {
                client = client.with_model(model.trim());
            }
        }
        if let Ok(raw) = env::var("DATAMEND_AI_MAX_TOKENS") {
            match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => client = client.with_max_tokens(n),
                _ => tracing::warn!(value = %raw, "ignoring invalid DATAMEND_AI_MAX_TOKENS"),
            }
        }
        Ok(client)
    }

    /// Set the model to use
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// One suggestion per target field, in target field order.
    ///
    /// Single attempt: a transport, API or parse failure is returned as is
    /// and nothing is partially applied.
    pub async fn suggest_mapping(
        &self,
        columns: &[String],
        fields: &[TargetFieldSpec],
    ) -> AiResult<Vec<MappingSuggestion>> {
        log_info(format!(
            "Asking {} to map {} columns onto {} fields...",
            self.model,
            columns.len(),
            fields.len()
        ));

        let response = self
            .call_api(&system_prompt(), &user_prompt(columns, fields))
            .await
            .inspect_err(|e| log_error(format!("AI suggestion failed: {}", e)))?;

        let suggestions = parse_suggestions(&response, columns, fields)
            .inspect_err(|e| log_error(format!("AI suggestion failed: {}", e)))?;

        let proposed = suggestions.iter().filter(|s| s.suggested_source_column.is_some()).count();
        log_success(format!("AI proposed columns for {}/{} fields", proposed, fields.len()));
        Ok(suggestions)
    }

    /// Call Anthropic API
    async fn call_api(&self, system: &str, user: &str) -> AiResult<String> {
        tracing::debug!(model = %self.model, max_tokens = self.max_tokens, "calling Anthropic API");

        let client = reqwest::Client::new();

        let request_body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": 0,
            "system": system,
            "messages": [{ "role": "user", "content": user }]
        });

        let response = client
            .post("https://api.anthropic.com/v1/messages")
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<AnthropicError>(&body) {
                return Err(AiError::ApiError(error.error.message));
            }
            return Err(AiError::ApiError(format!("HTTP {}: {}", status, body)));
        }

        let response: AnthropicResponse =
            serde_json::from_str(&body).map_err(|e| AiError::InvalidJson(e.to_string()))?;

        let text = response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(AiError::InvalidJson("Empty response".to_string()));
        }

        tracing::debug!(bytes = text.len(), "received AI response");
        Ok(text)
    }
}

/// A suggestion as the model writes it, before normalization.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSuggestion {
    #[serde(alias = "target_field_name", alias = "field")]
    target_field_name: String,
    #[serde(default, alias = "suggested_source_column", alias = "column")]
    suggested_source_column: Option<String>,
    #[serde(default, alias = "confidence_score", alias = "confidence")]
    confidence_score: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Parse a model answer into normalized suggestions.
pub fn parse_suggestions(
    response: &str,
    columns: &[String],
    fields: &[TargetFieldSpec],
) -> AiResult<Vec<MappingSuggestion>> {
    let json_str = extract_json(response);
    let preview: String = response.chars().take(300).collect();

    let value: Value = serde_json::from_str(&json_str)
        .map_err(|e| AiError::InvalidJson(format!("{}. Response was: {}", e, preview)))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.get_mut("suggestions").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => return Err(AiError::ParseError("expected a 'suggestions' array".to_string())),
        },
        _ => return Err(AiError::ParseError(format!("expected a JSON array. Response was: {}", preview))),
    };

    let raw: Vec<RawSuggestion> = serde_json::from_value(Value::Array(items))
        .map_err(|e| AiError::ParseError(e.to_string()))?;

    Ok(normalize_suggestions(raw, columns, fields))
}

/// Exactly one suggestion per target field, in target order.
///
/// Unknown or missing fields get an empty suggestion; the first entry wins
/// when a field is answered twice; columns must name a real source column
/// (compared case-insensitively, returned with the source spelling).
fn normalize_suggestions(
    raw: Vec<RawSuggestion>,
    columns: &[String],
    fields: &[TargetFieldSpec],
) -> Vec<MappingSuggestion> {
    fields
        .iter()
        .map(|field| match raw.iter().find(|s| s.target_field_name == field.name) {
            Some(s) => {
                let column = s.suggested_source_column.as_deref().and_then(|wanted| {
                    let wanted = wanted.trim();
                    columns
                        .iter()
                        .find(|c| c.as_str() == wanted)
                        .or_else(|| columns.iter().find(|c| c.trim().eq_ignore_ascii_case(wanted)))
                        .cloned()
                });
                let confidence = match s.confidence_score.filter(|c| c.is_finite()) {
                    Some(score) if column.is_some() => score.round().clamp(0.0, 100.0) as u8,
                    _ => 0,
                };
                MappingSuggestion {
                    target_field_name: field.name.clone(),
                    suggested_source_column: column,
                    confidence_score: confidence,
                    reasoning: s.reasoning.clone().unwrap_or_default(),
                }
            }
            None => MappingSuggestion {
                target_field_name: field.name.clone(),
                suggested_source_column: None,
                confidence_score: 0,
                reasoning: "No suggestion returned".to_string(),
            },
        })
        .collect()
}

/// Extract JSON from a response that may contain markdown code blocks
fn extract_json(text: &str) -> String {
    // Try to find JSON in code block
    if let Some(start) = text.find("```json") {
        let json_start = start + 7; // len of "```json"
        if let Some(end) = text[json_start..].find("```") {
            return text[json_start..json_start + end].trim().to_string();
        }
    }

    // Try to find JSON in generic code block
    if let Some(start) = text.find("```") {
        let after_start = start + 3;
        // Skip language identifier if present
        let content_start = text[after_start..]
            .find('\n')
            .map(|i| after_start + i + 1)
            .unwrap_or(after_start);

        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim().to_string();
        }
    }

    // Raw JSON: whichever of array/object opens first
    let open = text.find(['[', '{']);
    if let Some(start) = open {
        let close = if text[start..].starts_with('[') { ']' } else { '}' };
        if let Some(end) = text.rfind(close) {
            if start < end {
                return text[start..=end].to_string();
            }
        }
    }

    text.to_string()
}
