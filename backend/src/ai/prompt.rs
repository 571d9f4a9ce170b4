//! Prompt generation for AI mapping suggestions
//!
//! The model only ever sees column names and field descriptors, never row data.

use serde_json::json;

use crate::models::TargetFieldSpec;

/// Generate the system prompt for mapping suggestions
pub fn system_prompt() -> String {
    r#"You are a data integration expert. Your task is to match the columns of a spreadsheet to the fields of a target API entity.

## Your Mission

Given:
1. The source column names of an uploaded spreadsheet
2. The target fields (name and type) the API expects

For EVERY target field, pick the single source column that holds that data, or null if none does.

## CRITICAL: Output Format

Return ONLY a JSON array, one object per target field, in the order the fields were given:

```json
[
  {
    "targetFieldName": "email",
    "suggestedSourceColumn": "E-Mail Address",
    "confidenceScore": 92,
    "reasoning": "Column name and field type both describe an email address"
  }
]
```

## Rules

1. `targetFieldName` must be copied exactly from the target field list
2. `suggestedSourceColumn` must be copied exactly from the source column list (case-sensitive), or null
3. `confidenceScore` is an integer from 0 to 100
4. A source column may be suggested for more than one field only if it truly fits both
5. Prefer null over a weak guess: a wrong mapping exports wrong data
6. Keep `reasoning` to one short sentence
7. Return ONLY the JSON array, no explanations or markdown"#
        .to_string()
}

/// Generate the user prompt listing source columns and target fields
pub fn user_prompt(columns: &[String], fields: &[TargetFieldSpec]) -> String {
    let columns_json = serde_json::to_string_pretty(columns).unwrap_or_default();
    let fields_json = serde_json::to_string_pretty(
        &fields
            .iter()
            .map(|f| json!({ "name": f.name, "type": f.field_type().as_str() }))
            .collect::<Vec<_>>(),
    )
    .unwrap_or_default();

    format!(
        r#"## Source Columns ({column_count})

```json
{columns_json}
```

## Target Fields ({field_count})

```json
{fields_json}
```

## Task

Suggest a source column for each of the {field_count} target fields.
Return ONLY the JSON array."#,
        column_count = columns.len(),
        field_count = fields.len(),
    )
}
