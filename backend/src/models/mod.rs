//! Domain models for the export engine.
//!
//! - [`TargetFieldSpec`] / [`FieldKind`] - One field an external entity expects
//! - [`TargetEntitySpec`] - An external record shape (API resource or file schema)
//! - [`ExportConfig`] - All entities plus the shared API base URL
//! - [`Dataset`] / [`SourceRow`] - Uploaded tabular data
//! - [`MappingSuggestion`] - One AI proposal for a target field
//!
//! Field definitions travel as the flat JSON shape of the configuration file
//! (`type`, `minLength`, `pattern`, ...). In memory they are a tagged
//! [`FieldKind`] so that each type only carries the constraints that apply
//! to it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::ConfigError;

/// One uploaded record: source column name -> scalar value, in column order.
pub type SourceRow = Map<String, Value>;

/// One transformed record: target field name -> coerced value, in field order.
pub type TargetRecord = Map<String, Value>;

// =============================================================================
// Field Types
// =============================================================================

/// Declared type of a target field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Number,
    Boolean,
    Email,
    Date,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Email => "email",
            FieldType::Date => "date",
        }
    }
}

/// Length and pattern constraints for `string` and `email` fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextConstraints {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    /// Regular expression source. Compiled when a validation pass starts.
    pub pattern: Option<String>,
}

/// Bounds for `number` fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberConstraints {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

/// A field's type together with the constraints valid for that type.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text(TextConstraints),
    Email(TextConstraints),
    Number(NumberConstraints),
    Boolean,
    Date,
}

impl FieldKind {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldKind::Text(_) => FieldType::String,
            FieldKind::Email(_) => FieldType::Email,
            FieldKind::Number(_) => FieldType::Number,
            FieldKind::Boolean => FieldType::Boolean,
            FieldKind::Date => FieldType::Date,
        }
    }
}

impl Default for FieldKind {
    fn default() -> Self {
        FieldKind::Text(TextConstraints::default())
    }
}

/// Reference to an externally cached lookup table. Carried, not evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRef {
    pub lookup_id: String,
    pub lookup_field: String,
}

// =============================================================================
// Target Field
// =============================================================================

/// One field an external entity expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawFieldSpec", into = "RawFieldSpec")]
pub struct TargetFieldSpec {
    /// Key in the output payload. Unique within an entity.
    pub name: String,
    pub required: bool,
    pub kind: FieldKind,
    pub lookup_validation: Option<LookupRef>,
}

impl TargetFieldSpec {
    /// An optional `string` field without constraints.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            kind: FieldKind::default(),
            lookup_validation: None,
        }
    }

    pub fn text(name: impl Into<String>, constraints: TextConstraints) -> Self {
        Self::new(name).with_kind(FieldKind::Text(constraints))
    }

    pub fn email(name: impl Into<String>) -> Self {
        Self::new(name).with_kind(FieldKind::Email(TextConstraints::default()))
    }

    pub fn number(name: impl Into<String>, min_value: Option<f64>, max_value: Option<f64>) -> Self {
        Self::new(name).with_kind(FieldKind::Number(NumberConstraints { min_value, max_value }))
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name).with_kind(FieldKind::Boolean)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name).with_kind(FieldKind::Date)
    }

    pub fn with_kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.kind.field_type()
    }
}

/// Flat wire shape of a field, as stored in the configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFieldSpec {
    name: String,
    #[serde(rename = "type", default)]
    field_type: FieldType,
    #[serde(default)]
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lookup_validation: Option<LookupRef>,
}

impl From<RawFieldSpec> for TargetFieldSpec {
    fn from(raw: RawFieldSpec) -> Self {
        let text = || TextConstraints {
            min_length: raw.min_length,
            max_length: raw.max_length,
            pattern: raw.pattern.clone().filter(|p| !p.is_empty()),
        };
        let kind = match raw.field_type {
            FieldType::String => FieldKind::Text(text()),
            FieldType::Email => FieldKind::Email(text()),
            FieldType::Number => FieldKind::Number(NumberConstraints {
                min_value: raw.min_value,
                max_value: raw.max_value,
            }),
            FieldType::Boolean => FieldKind::Boolean,
            FieldType::Date => FieldKind::Date,
        };

        TargetFieldSpec {
            name: raw.name,
            required: raw.required,
            kind,
            lookup_validation: raw.lookup_validation,
        }
    }
}

impl From<TargetFieldSpec> for RawFieldSpec {
    fn from(spec: TargetFieldSpec) -> Self {
        let mut raw = RawFieldSpec {
            name: spec.name,
            field_type: spec.kind.field_type(),
            required: spec.required,
            lookup_validation: spec.lookup_validation,
            ..Default::default()
        };
        match spec.kind {
            FieldKind::Text(c) | FieldKind::Email(c) => {
                raw.min_length = c.min_length;
                raw.max_length = c.max_length;
                raw.pattern = c.pattern;
            }
            FieldKind::Number(c) => {
                raw.min_value = c.min_value;
                raw.max_value = c.max_value;
            }
            FieldKind::Boolean | FieldKind::Date => {}
        }
        raw
    }
}

// =============================================================================
// Target Entity & Config
// =============================================================================

/// An external system's expected record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetEntitySpec {
    pub id: String,
    pub name: String,
    /// Path appended to [`ExportConfig::base_url`] on submission.
    #[serde(default)]
    pub url: String,
    /// Ordered: defines payload key order and CSV column order.
    #[serde(default)]
    pub fields: Vec<TargetFieldSpec>,
}

impl TargetEntitySpec {
    pub fn field(&self, name: &str) -> Option<&TargetFieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Reject duplicate field names.
    pub fn check(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(ConfigError::DuplicateField {
                    entity: self.id.clone(),
                    field: field.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// The persisted entity configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportConfig {
    pub base_url: String,
    pub entities: Vec<TargetEntitySpec>,
}

impl ExportConfig {
    pub fn entity(&self, id: &str) -> Option<&TargetEntitySpec> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Reject duplicate entity ids and duplicate field names.
    pub fn check(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for entity in &self.entities {
            if !seen.insert(entity.id.as_str()) {
                return Err(ConfigError::DuplicateEntity(entity.id.clone()));
            }
            entity.check()?;
        }
        Ok(())
    }
}

// =============================================================================
// Source Data
// =============================================================================

/// An uploaded table: ordered headers plus homogeneous-keyed rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<SourceRow>,
}

impl Dataset {
    pub fn new(headers: Vec<String>, rows: Vec<SourceRow>) -> Self {
        Self { headers, rows }
    }

    /// Build a dataset from JSON objects, taking headers from the first row.
    pub fn from_records(records: Vec<Value>) -> Self {
        let rows: Vec<SourceRow> = records
            .into_iter()
            .filter_map(|r| match r {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        let headers = rows
            .first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Display/comparison text of a cell: `String(value).trim()`, null -> "".
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Some(other) => other.to_string(),
    }
}

// =============================================================================
// AI Suggestions
// =============================================================================

/// One AI proposal for a target field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingSuggestion {
    pub target_field_name: String,
    #[serde(default)]
    pub suggested_source_column: Option<String>,
    /// 0..=100
    #[serde(default)]
    pub confidence_score: u8,
    #[serde(default)]
    pub reasoning: String,
}
