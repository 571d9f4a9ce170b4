//! Source row -> target-shaped record.
//!
//! Output keys are exactly the target field names, in target field order.
//! No coercion fails: values that cannot be converted fall back to `null`
//! or to the original text. Validation is what decides whether a payload
//! may leave the engine.

use serde_json::{Number, Value};

use crate::mapping::FieldMapping;
use crate::models::{cell_text, FieldKind, SourceRow, TargetFieldSpec, TargetRecord};
use crate::validation::{dates, parse_number};

/// Transform one row.
pub fn transform_row(row: &SourceRow, fields: &[TargetFieldSpec], mapping: &FieldMapping) -> TargetRecord {
    let mut record = TargetRecord::new();

    for field in fields {
        let value = match mapping.source_for(&field.name) {
            Some(column) => coerce(field, &cell_text(row.get(column))),
            None => Value::Null,
        };
        record.insert(field.name.clone(), value);
    }

    record
}

/// Transform every row, preserving order.
pub fn transform_rows(rows: &[SourceRow], fields: &[TargetFieldSpec], mapping: &FieldMapping) -> Vec<TargetRecord> {
    rows.iter().map(|row| transform_row(row, fields, mapping)).collect()
}

fn coerce(field: &TargetFieldSpec, text: &str) -> Value {
    match field.kind {
        FieldKind::Boolean => Value::Bool(matches!(text.to_lowercase().as_str(), "true" | "1")),
        FieldKind::Number(_) => parse_number(text).map(number_value).unwrap_or(Value::Null),
        FieldKind::Date if text.is_empty() => Value::Null,
        FieldKind::Date => Value::String(dates::normalize_date(text).unwrap_or_else(|| text.to_string())),
        FieldKind::Text(_) | FieldKind::Email(_) => {
            if text.is_empty() && !field.required {
                Value::Null
            } else {
                Value::String(text.to_string())
            }
        }
    }
}

/// Integral values are emitted as JSON integers.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> SourceRow {
        value.as_object().unwrap().clone()
    }

    fn map(pairs: &[(&str, &str)]) -> FieldMapping {
        pairs.iter().map(|(f, c)| (f.to_string(), c.to_string())).collect()
    }

    #[test]
    fn test_keys_follow_target_order() {
        let fields = vec![
            TargetFieldSpec::new("zeta"),
            TargetFieldSpec::new("alpha").required(),
            TargetFieldSpec::new("mid"),
        ];
        let source = row(json!({ "A": "a", "Z": "z", "Extra": "leak?" }));

        let record = transform_row(&source, &fields, &map(&[("zeta", "Z"), ("alpha", "A")]));

        let keys: Vec<&String> = record.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(record["mid"], Value::Null);
        assert!(record.get("Extra").is_none());
    }

    #[test]
    fn test_every_record_has_exactly_the_target_keys() {
        let fields = vec![
            TargetFieldSpec::new("name").required(),
            TargetFieldSpec::email("email"),
            TargetFieldSpec::number("score", None, None),
            TargetFieldSpec::boolean("active"),
            TargetFieldSpec::date("joined"),
        ];
        let rows = vec![
            row(json!({ "Name": "Ada", "Mail": "ada@example.com" })),
            row(json!({})),
            row(json!({ "Other": "x", "Score": "3" })),
        ];
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();

        for mapping in [FieldMapping::unmapped(&fields), FieldMapping::default(), map(&[("name", "Name")])] {
            let records = transform_rows(&rows, &fields, &mapping);
            assert_eq!(records.len(), rows.len());
            for record in &records {
                let keys: Vec<&str> = record.keys().map(String::as_str).collect();
                assert_eq!(keys, names);
            }
        }

        let records = transform_rows(&rows, &fields, &FieldMapping::unmapped(&fields));
        assert!(records.iter().all(|r| r.values().all(Value::is_null)));
    }

    #[test]
    fn test_unmapped_required_is_null() {
        let fields = vec![TargetFieldSpec::email("email").required()];
        let record = transform_row(&row(json!({})), &fields, &FieldMapping::unmapped(&fields));
        assert_eq!(record["email"], Value::Null);
    }

    #[test]
    fn test_booleans() {
        let fields = vec![TargetFieldSpec::boolean("b")];
        let mapping = map(&[("b", "B")]);
        let coerce = |v: Value| transform_row(&row(json!({ "B": v })), &fields, &mapping)["b"].clone();

        assert_eq!(coerce(json!("TRUE")), json!(true));
        assert_eq!(coerce(json!(" 1 ")), json!(true));
        assert_eq!(coerce(json!("0")), json!(false));
        assert_eq!(coerce(json!("maybe")), json!(false));
        assert_eq!(coerce(json!(true)), json!(true));
    }

    #[test]
    fn test_numbers() {
        let fields = vec![TargetFieldSpec::number("n", None, None)];
        let mapping = map(&[("n", "N")]);
        let coerce = |v: Value| transform_row(&row(json!({ "N": v })), &fields, &mapping)["n"].clone();

        assert_eq!(coerce(json!("42")), json!(42));
        assert_eq!(coerce(json!("2.5")), json!(2.5));
        assert_eq!(coerce(json!("abc")), Value::Null);
        assert_eq!(coerce(json!("")), Value::Null);
    }

    #[test]
    fn test_dates() {
        let fields = vec![TargetFieldSpec::date("d")];
        let mapping = map(&[("d", "D")]);
        let coerce = |v: &str| transform_row(&row(json!({ "D": v })), &fields, &mapping)["d"].clone();

        assert_eq!(coerce("3/7/2024"), json!("2024-03-07"));
        assert_eq!(coerce("2024-03-07T08:00:00Z"), json!("2024-03-07"));
        assert_eq!(coerce("2024-03-07"), json!("2024-03-07"));
        assert_eq!(coerce("next week"), json!("next week"));
        assert_eq!(coerce("  "), Value::Null);
    }

    #[test]
    fn test_text_trim_and_empty() {
        let fields = vec![TargetFieldSpec::new("opt"), TargetFieldSpec::new("req").required()];
        let mapping = map(&[("opt", "O"), ("req", "R")]);

        let record = transform_row(&row(json!({ "O": "  ", "R": "" })), &fields, &mapping);
        assert_eq!(record["opt"], Value::Null);
        assert_eq!(record["req"], json!(""));

        let record = transform_row(&row(json!({ "O": "  hi ", "R": 7 })), &fields, &mapping);
        assert_eq!(record["opt"], json!("hi"));
        assert_eq!(record["req"], json!("7"));
    }

    #[test]
    fn test_transform_rows_keeps_row_order() {
        let fields = vec![TargetFieldSpec::new("v")];
        let rows = vec![row(json!({ "V": "1" })), row(json!({ "V": "2" })), row(json!({ "V": "3" }))];

        let records = transform_rows(&rows, &fields, &map(&[("v", "V")]));
        let values: Vec<&Value> = records.iter().map(|r| &r["v"]).collect();
        assert_eq!(values, vec!["1", "2", "3"]);
    }
}
