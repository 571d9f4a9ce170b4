//! Row validation against a target entity's field definitions.
//!
//! Every mapped field of every row is checked against its type and
//! constraints. Problems in the data are reported as [`ValidationError`]
//! values, never as `Err`: a dataset is export-eligible iff a pass over it
//! yields zero errors.
//!
//! # Per-field order
//!
//! 1. required + unmapped -> `RequiredNotMapped`, stop
//! 2. unmapped -> skip
//! 3. required + empty cell -> `RequiredEmpty`
//! 4. non-empty cell -> type checks (several errors per cell are possible)
//!
//! # Example
//!
//! ```rust,ignore
//! use datamend::validation::{validate_dataset, ValidationOptions};
//!
//! let report = validate_dataset(&dataset.rows, &entity.fields, &mapping, &ValidationOptions::default());
//! if !report.is_valid() {
//!     for err in &report.errors {
//!         println!("{}", err.message);
//!     }
//! }
//! ```

pub mod dates;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::mapping::FieldMapping;
use crate::models::{cell_text, FieldKind, SourceRow, TargetFieldSpec, TextConstraints};

/// Default cap on collected errors.
pub const DEFAULT_MAX_ERRORS: usize = 200;

const MAX_VALUE_PREVIEW: usize = 50;

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

// =============================================================================
// Error records
// =============================================================================

/// The condition that produced a [`ValidationError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ErrorKind {
    RequiredNotMapped,
    RequiredEmpty,
    TooShort { min: usize },
    TooLong { max: usize },
    PatternMismatch { pattern: String },
    InvalidEmail,
    NotANumber,
    BelowMinimum { min: f64 },
    AboveMaximum { max: f64 },
    InvalidBoolean,
    InvalidDate,
}

/// One problem found in one field of one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    /// 0-based row index.
    pub row_index: usize,
    pub target_field_name: String,
    pub source_column_name: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl ValidationError {
    fn new(
        row_index: usize,
        field: &TargetFieldSpec,
        column: Option<&str>,
        value: &str,
        kind: ErrorKind,
    ) -> Self {
        let message = describe(row_index, &field.name, column, value, &kind);
        Self {
            row_index,
            target_field_name: field.name.clone(),
            source_column_name: column.map(str::to_string),
            kind,
            message,
        }
    }
}

fn describe(row_index: usize, field: &str, column: Option<&str>, value: &str, kind: &ErrorKind) -> String {
    let row = row_index + 1;
    let origin = match column {
        Some(col) => format!("Field '{}' (column '{}')", field, col),
        None => format!("Field '{}'", field),
    };
    let value = preview(value);

    match kind {
        ErrorKind::RequiredNotMapped => {
            format!("Row {}: {} is required by the API but not mapped to any column", row, origin)
        }
        ErrorKind::RequiredEmpty => format!("Row {}: {} is required but the source data is empty", row, origin),
        ErrorKind::TooShort { min } => {
            format!("Row {}: {} value '{}' is shorter than {} characters", row, origin, value, min)
        }
        ErrorKind::TooLong { max } => {
            format!("Row {}: {} value '{}' is longer than {} characters", row, origin, value, max)
        }
        ErrorKind::PatternMismatch { pattern } => {
            format!("Row {}: {} value '{}' does not match pattern '{}'", row, origin, value, pattern)
        }
        ErrorKind::InvalidEmail => format!("Row {}: {} value '{}' is not a valid email", row, origin, value),
        ErrorKind::NotANumber => format!("Row {}: {} value '{}' should be a number", row, origin, value),
        ErrorKind::BelowMinimum { min } => {
            format!("Row {}: {} value '{}' is below the min value {}", row, origin, value, min)
        }
        ErrorKind::AboveMaximum { max } => {
            format!("Row {}: {} value '{}' exceeds the max value {}", row, origin, value, max)
        }
        ErrorKind::InvalidBoolean => {
            format!("Row {}: {} value '{}' should be true/false or 1/0", row, origin, value)
        }
        ErrorKind::InvalidDate => format!("Row {}: {} value '{}' is not a valid date", row, origin, value),
    }
}

fn preview(value: &str) -> String {
    if value.chars().count() > MAX_VALUE_PREVIEW {
        let cut: String = value.chars().take(MAX_VALUE_PREVIEW).collect();
        format!("{}...", cut)
    } else {
        value.to_string()
    }
}

// =============================================================================
// Row validation
// =============================================================================

/// Field definitions with their patterns compiled once per pass.
pub struct RowValidator<'a> {
    fields: Vec<CompiledField<'a>>,
    mapping: &'a FieldMapping,
}

struct CompiledField<'a> {
    spec: &'a TargetFieldSpec,
    pattern: Option<fancy_regex::Regex>,
}

impl<'a> RowValidator<'a> {
    pub fn new(fields: &'a [TargetFieldSpec], mapping: &'a FieldMapping) -> Self {
        let fields = fields
            .iter()
            .map(|spec| CompiledField { spec, pattern: compile_pattern(spec) })
            .collect();
        Self { fields, mapping }
    }

    /// Check one row. Errors come out in target field order.
    pub fn check(&self, row: &SourceRow, row_index: usize) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for field in &self.fields {
            let spec = field.spec;
            let column = self.mapping.source_for(&spec.name);

            let Some(column) = column else {
                if spec.required {
                    errors.push(ValidationError::new(row_index, spec, None, "", ErrorKind::RequiredNotMapped));
                }
                continue;
            };

            let value = cell_text(row.get(column));
            let mut push = |kind| errors.push(ValidationError::new(row_index, spec, Some(column), &value, kind));

            if spec.required && value.is_empty() {
                push(ErrorKind::RequiredEmpty);
            }
            if value.is_empty() {
                continue;
            }

            for kind in check_value(&spec.kind, field.pattern.as_ref(), &value) {
                push(kind);
            }
        }

        errors
    }
}

/// Compile a field `pattern`.
///
/// Patterns are written in the JavaScript `RegExp` dialect, so lookaround
/// and backreferences have to work: `fancy_regex` handles those and hands
/// everything else to the `regex` engine.
pub fn compile_field_pattern(pattern: &str) -> Result<fancy_regex::Regex, fancy_regex::Error> {
    fancy_regex::Regex::new(pattern)
}

/// Invalid patterns impose no constraint.
fn compile_pattern(spec: &TargetFieldSpec) -> Option<fancy_regex::Regex> {
    let pattern = match &spec.kind {
        FieldKind::Text(c) | FieldKind::Email(c) => c.pattern.as_deref()?,
        _ => return None,
    };
    match compile_field_pattern(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(field = %spec.name, %pattern, error = %e, "ignoring invalid pattern");
            None
        }
    }
}

/// Type checks for a non-empty, trimmed value.
fn check_value(kind: &FieldKind, pattern: Option<&fancy_regex::Regex>, value: &str) -> Vec<ErrorKind> {
    let mut found = Vec::new();
    match kind {
        FieldKind::Text(c) => check_text(c, pattern, value, &mut found),
        FieldKind::Email(c) => {
            check_text(c, pattern, value, &mut found);
            if !EMAIL.is_match(value) {
                found.push(ErrorKind::InvalidEmail);
            }
        }
        FieldKind::Number(c) => match parse_number(value) {
            None => found.push(ErrorKind::NotANumber),
            Some(n) => {
                if let Some(min) = c.min_value.filter(|min| n < *min) {
                    found.push(ErrorKind::BelowMinimum { min });
                }
                if let Some(max) = c.max_value.filter(|max| n > *max) {
                    found.push(ErrorKind::AboveMaximum { max });
                }
            }
        },
        FieldKind::Boolean => {
            if !matches!(value.to_lowercase().as_str(), "true" | "false" | "1" | "0" | "") {
                found.push(ErrorKind::InvalidBoolean);
            }
        }
        FieldKind::Date => {
            if !dates::is_valid_date(value) {
                found.push(ErrorKind::InvalidDate);
            }
        }
    }
    found
}

fn check_text(
    c: &TextConstraints,
    pattern: Option<&fancy_regex::Regex>,
    value: &str,
    found: &mut Vec<ErrorKind>,
) {
    let len = value.chars().count();
    if let Some(min) = c.min_length.filter(|min| len < *min) {
        found.push(ErrorKind::TooShort { min });
    }
    if let Some(max) = c.max_length.filter(|max| len > *max) {
        found.push(ErrorKind::TooLong { max });
    }
    if let Some(re) = pattern {
        match re.is_match(value) {
            Ok(true) => {}
            Ok(false) => found.push(ErrorKind::PatternMismatch { pattern: re.as_str().to_string() }),
            // backtrack limit hit
            Err(e) => tracing::warn!(pattern = re.as_str(), error = %e, "pattern could not be evaluated"),
        }
    }
}

/// Finite float, whole string. `None` plays the role of NaN.
pub(crate) fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Validate one row.
pub fn validate_row(
    row: &SourceRow,
    row_index: usize,
    fields: &[TargetFieldSpec],
    mapping: &FieldMapping,
) -> Vec<ValidationError> {
    RowValidator::new(fields, mapping).check(row, row_index)
}

// =============================================================================
// Dataset validation
// =============================================================================

/// Options for a validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOptions {
    /// Cap on collected errors; counting continues past it.
    pub max_errors: usize,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self { max_errors: DEFAULT_MAX_ERRORS }
    }
}

/// Outcome of validating a whole dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// First `max_errors` errors, in row then field order.
    pub errors: Vec<ValidationError>,
    /// All errors found, collected or not.
    pub total_errors: usize,
    pub rows_checked: usize,
    pub invalid_rows: usize,
    pub max_errors: usize,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.total_errors == 0
    }

    /// More errors exist than were collected.
    pub fn truncated(&self) -> bool {
        self.total_errors > self.errors.len()
    }

    pub fn summary(&self) -> String {
        if self.is_valid() {
            format!("All {} rows valid", self.rows_checked)
        } else if self.truncated() {
            format!(
                "More than {} errors ({} total) in {} of {} rows",
                self.errors.len(),
                self.total_errors,
                self.invalid_rows,
                self.rows_checked
            )
        } else {
            format!(
                "{} errors in {} of {} rows",
                self.total_errors, self.invalid_rows, self.rows_checked
            )
        }
    }
}

/// Validate every row in index order.
pub fn validate_dataset(
    rows: &[SourceRow],
    fields: &[TargetFieldSpec],
    mapping: &FieldMapping,
    options: &ValidationOptions,
) -> ValidationReport {
    let validator = RowValidator::new(fields, mapping);
    let mut report = ValidationReport {
        errors: Vec::new(),
        total_errors: 0,
        rows_checked: rows.len(),
        invalid_rows: 0,
        max_errors: options.max_errors,
    };

    for (idx, row) in rows.iter().enumerate() {
        let row_errors = validator.check(row, idx);
        if row_errors.is_empty() {
            continue;
        }
        report.invalid_rows += 1;
        report.total_errors += row_errors.len();

        let room = options.max_errors.saturating_sub(report.errors.len());
        report.errors.extend(row_errors.into_iter().take(room));
    }

    tracing::debug!(
        rows = report.rows_checked,
        errors = report.total_errors,
        collected = report.errors.len(),
        "validation pass finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NumberConstraints, TextConstraints};
    use serde_json::json;

    fn row(value: serde_json::Value) -> SourceRow {
        value.as_object().unwrap().clone()
    }

    fn map(pairs: &[(&str, &str)]) -> FieldMapping {
        pairs.iter().map(|(f, c)| (f.to_string(), c.to_string())).collect()
    }

    fn kinds(errors: &[ValidationError]) -> Vec<ErrorKind> {
        errors.iter().map(|e| e.kind.clone()).collect()
    }

    #[test]
    fn test_required_unmapped_stops_field() {
        let fields = vec![TargetFieldSpec::email("email").required()];
        let errors = validate_row(&row(json!({ "x": "" })), 0, &fields, &map(&[("email", "")]));

        assert_eq!(kinds(&errors), vec![ErrorKind::RequiredNotMapped]);
        assert_eq!(errors[0].source_column_name, None);
        assert!(errors[0].message.starts_with("Row 1:"));
    }

    #[test]
    fn test_optional_unmapped_is_silent() {
        let fields = vec![TargetFieldSpec::number("age", Some(0.0), None)];
        let errors = validate_row(&row(json!({ "Age": "-4" })), 0, &fields, &FieldMapping::default());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_required_empty_reports_once() {
        let fields = vec![TargetFieldSpec::date("born").required()];
        for empty in [json!("   "), json!(null)] {
            let errors = validate_row(&row(json!({ "Born": empty })), 3, &fields, &map(&[("born", "Born")]));
            assert_eq!(kinds(&errors), vec![ErrorKind::RequiredEmpty]);
            assert_eq!(errors[0].row_index, 3);
            assert_eq!(errors[0].source_column_name.as_deref(), Some("Born"));
        }
    }

    #[test]
    fn test_missing_column_counts_as_empty() {
        let fields = vec![TargetFieldSpec::new("name").required()];
        let errors = validate_row(&row(json!({ "Other": "x" })), 0, &fields, &map(&[("name", "Name")]));
        assert_eq!(kinds(&errors), vec![ErrorKind::RequiredEmpty]);
    }

    #[test]
    fn test_text_constraints_accumulate() {
        let fields = vec![TargetFieldSpec::text(
            "code",
            TextConstraints { min_length: Some(5), max_length: None, pattern: Some("^[A-Z]+$".into()) },
        )];
        let errors = validate_row(&row(json!({ "Code": "ab" })), 0, &fields, &map(&[("code", "Code")]));

        assert_eq!(
            kinds(&errors),
            vec![ErrorKind::TooShort { min: 5 }, ErrorKind::PatternMismatch { pattern: "^[A-Z]+$".into() }]
        );
    }

    #[test]
    fn test_max_length_counts_characters() {
        let fields = vec![TargetFieldSpec::text(
            "city",
            TextConstraints { min_length: None, max_length: Some(6), pattern: None },
        )];
        let ok = validate_row(&row(json!({ "c": "Zürich" })), 0, &fields, &map(&[("city", "c")]));
        assert!(ok.is_empty());

        let long = validate_row(&row(json!({ "c": "Zürichsee" })), 0, &fields, &map(&[("city", "c")]));
        assert_eq!(kinds(&long), vec![ErrorKind::TooLong { max: 6 }]);
    }

    #[test]
    fn test_invalid_pattern_is_ignored() {
        let fields = vec![TargetFieldSpec::text(
            "sku",
            TextConstraints { min_length: None, max_length: None, pattern: Some("([unclosed".into()) },
        )];
        let errors = validate_row(&row(json!({ "s": "anything" })), 0, &fields, &map(&[("sku", "s")]));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_lookahead_and_backreference_patterns_apply() {
        let fields = vec![
            TargetFieldSpec::text(
                "password",
                TextConstraints { min_length: None, max_length: None, pattern: Some(r"^(?=.*\d).+$".into()) },
            ),
            TargetFieldSpec::text(
                "code",
                TextConstraints { min_length: None, max_length: None, pattern: Some(r"^(\w)\1$".into()) },
            ),
        ];
        let mapping = map(&[("password", "p"), ("code", "c")]);

        let errors = validate_row(&row(json!({ "p": "nodigits", "c": "ab" })), 0, &fields, &mapping);
        assert_eq!(
            kinds(&errors),
            vec![
                ErrorKind::PatternMismatch { pattern: r"^(?=.*\d).+$".into() },
                ErrorKind::PatternMismatch { pattern: r"^(\w)\1$".into() },
            ]
        );

        let errors = validate_row(&row(json!({ "p": "s3cret", "c": "aa" })), 0, &fields, &mapping);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_email_shapes() {
        let fields = vec![TargetFieldSpec::email("email")];
        let mapping = map(&[("email", "e")]);
        let check = |v: &str| kinds(&validate_row(&row(json!({ "e": v })), 0, &fields, &mapping));

        assert!(check("a@b.com").is_empty());
        assert_eq!(check("a@b"), vec![ErrorKind::InvalidEmail]);
        assert_eq!(check("a b@c.com"), vec![ErrorKind::InvalidEmail]);
        assert_eq!(check("a@@b.com"), vec![ErrorKind::InvalidEmail]);
    }

    #[test]
    fn test_number_bounds() {
        let fields = vec![TargetFieldSpec::number("score", Some(0.0), Some(100.0))];
        let mapping = map(&[("score", "s")]);
        let check = |v: serde_json::Value| kinds(&validate_row(&row(json!({ "s": v })), 0, &fields, &mapping));

        assert_eq!(check(json!("150")), vec![ErrorKind::AboveMaximum { max: 100.0 }]);
        assert_eq!(check(json!("-1")), vec![ErrorKind::BelowMinimum { min: 0.0 }]);
        assert_eq!(check(json!("abc")), vec![ErrorKind::NotANumber]);
        assert_eq!(check(json!("NaN")), vec![ErrorKind::NotANumber]);
        assert!(check(json!(" 42.5 ")).is_empty());
        assert!(check(json!(100)).is_empty());
    }

    #[test]
    fn test_boolean_values() {
        let fields = vec![TargetFieldSpec::boolean("active")];
        let mapping = map(&[("active", "a")]);
        let check = |v: &str| kinds(&validate_row(&row(json!({ "a": v })), 0, &fields, &mapping));

        for ok in ["true", "FALSE", "1", "0", "True"] {
            assert!(check(ok).is_empty(), "{} should be accepted", ok);
        }
        assert_eq!(check("yes"), vec![ErrorKind::InvalidBoolean]);
    }

    #[test]
    fn test_date_values() {
        let fields = vec![TargetFieldSpec::date("d")];
        let mapping = map(&[("d", "D")]);
        let check = |v: &str| kinds(&validate_row(&row(json!({ "D": v })), 0, &fields, &mapping));

        assert!(check("2024-02-29").is_empty());
        assert!(check("02/29/2024").is_empty());
        assert_eq!(check("2024-02-30"), vec![ErrorKind::InvalidDate]);
        assert_eq!(check("2024-13-01"), vec![ErrorKind::InvalidDate]);
    }

    #[test]
    fn test_message_truncates_value() {
        let fields = vec![TargetFieldSpec::email("email")];
        let long = "x".repeat(80);
        let errors = validate_row(&row(json!({ "e": long })), 9, &fields, &map(&[("email", "e")]));

        let msg = &errors[0].message;
        assert!(msg.starts_with("Row 10:"));
        assert!(msg.contains(&format!("{}...", "x".repeat(50))));
        assert!(!msg.contains(&"x".repeat(51)));
    }

    #[test]
    fn test_dataset_cap_keeps_true_count() {
        let fields = vec![TargetFieldSpec::new("id").required()];
        let rows: Vec<SourceRow> = (0..10).map(|_| row(json!({ "Id": "" }))).collect();
        let options = ValidationOptions { max_errors: 4 };

        let report = validate_dataset(&rows, &fields, &map(&[("id", "Id")]), &options);

        assert_eq!(report.errors.len(), 4);
        assert_eq!(report.total_errors, 10);
        assert_eq!(report.invalid_rows, 10);
        assert!(report.truncated());
        assert!(!report.is_valid());
        assert!(report.summary().starts_with("More than 4 errors"));
    }

    #[test]
    fn test_dataset_valid_and_idempotent() {
        let fields = vec![
            TargetFieldSpec::new("name").required(),
            TargetFieldSpec::number("age", Some(0.0), None),
        ];
        let rows = vec![
            row(json!({ "Name": "Ada", "Age": "36" })),
            row(json!({ "Name": "Alan", "Age": "-1" })),
        ];
        let mapping = map(&[("name", "Name"), ("age", "Age")]);
        let options = ValidationOptions::default();

        let first = validate_dataset(&rows, &fields, &mapping, &options);
        let second = validate_dataset(&rows, &fields, &mapping, &options);

        assert_eq!(first, second);
        assert_eq!(first.total_errors, 1);
        assert_eq!(first.errors[0].row_index, 1);

        let clean = validate_dataset(&rows[..1], &fields, &mapping, &options);
        assert!(clean.is_valid());
        assert_eq!(clean.summary(), "All 1 rows valid");
    }

    #[test]
    fn test_number_kind_ignores_text_rules() {
        let field = TargetFieldSpec::new("n").with_kind(FieldKind::Number(NumberConstraints::default()));
        let errors = validate_row(&row(json!({ "n": "7" })), 0, &[field], &map(&[("n", "n")]));
        assert!(errors.is_empty());
    }
}
