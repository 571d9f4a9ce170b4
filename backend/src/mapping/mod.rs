//! Target field -> source column mapping.
//!
//! [`auto_map`] is the deterministic first pass run whenever the selected
//! entity or the dataset's columns change: names are compared after
//! lowercasing and removing whitespace and underscores, and only exact
//! matches count. Anything smarter comes from the AI suggestion flow
//! ([`FieldMapping::from_suggestions`]).
//!
//! ```text
//! source columns: ["Customer Name", "email_address"]
//! target fields:  ["customer_name", "email"]
//!
//! customer_name -> "Customer Name"   (customername == customername)
//! email         -> ""                (email != emailaddress)
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::MappingError;
use crate::models::{MappingSuggestion, TargetFieldSpec};

/// Mapping from target field name to source column name.
///
/// Every target field has a key; `""` means unmapped. Keys keep insertion
/// order, which is target field order for every mapping built here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldMapping(IndexMap<String, String>);

/// Clients may send `null` for an unmapped field.
impl<'de> Deserialize<'de> for FieldMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<String, Option<String>>::deserialize(deserializer)?;
        Ok(Self(
            raw.into_iter()
                .map(|(field, column)| (field, column.unwrap_or_default()))
                .collect(),
        ))
    }
}

impl FieldMapping {
    /// A mapping with every target field present and unmapped.
    pub fn unmapped(fields: &[TargetFieldSpec]) -> Self {
        Self(fields.iter().map(|f| (f.name.clone(), String::new())).collect())
    }

    /// Source column for a field, `None` when unmapped.
    pub fn source_for(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .map(String::as_str)
            .filter(|c| !c.trim().is_empty())
    }

    /// Point `field` at `column` (or clear it with `None`).
    ///
    /// Both names must exist: `field` in `fields`, `column` in `columns`.
    pub fn assign(
        &mut self,
        field: &str,
        column: Option<&str>,
        fields: &[TargetFieldSpec],
        columns: &[String],
    ) -> Result<(), MappingError> {
        if !fields.iter().any(|f| f.name == field) {
            return Err(MappingError::UnknownField(field.to_string()));
        }
        let column = column.map(str::trim).filter(|c| !c.is_empty());
        if let Some(col) = column {
            if !columns.iter().any(|c| c == col) {
                return Err(MappingError::UnknownColumn(col.to_string()));
            }
        }
        self.0
            .insert(field.to_string(), column.unwrap_or_default().to_string());
        Ok(())
    }

    /// Required fields with no source column.
    pub fn missing_required<'a>(&self, fields: &'a [TargetFieldSpec]) -> Vec<&'a str> {
        fields
            .iter()
            .filter(|f| f.required && self.source_for(&f.name).is_none())
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn mapped_count(&self) -> usize {
        self.0.values().filter(|c| !c.trim().is_empty()).count()
    }

    /// Re-validate a mapping received from outside against the current
    /// entity and columns. Keys for fields the entity no longer has are dropped.
    pub fn checked(&self, fields: &[TargetFieldSpec], columns: &[String]) -> Result<Self, MappingError> {
        let mut checked = Self::unmapped(fields);
        for (field, column) in self.entries(fields) {
            checked.assign(field, column, fields, columns)?;
        }
        Ok(checked)
    }

    /// Build a full mapping from AI suggestions.
    ///
    /// A field stays unmapped when its suggestion is missing, names a column
    /// the dataset does not have, or scores below `min_confidence`.
    pub fn from_suggestions(
        suggestions: &[MappingSuggestion],
        fields: &[TargetFieldSpec],
        columns: &[String],
        min_confidence: u8,
    ) -> Self {
        let mut mapping = Self::unmapped(fields);
        for field in fields {
            let chosen = suggestions
                .iter()
                .find(|s| s.target_field_name == field.name)
                .filter(|s| s.confidence_score >= min_confidence)
                .and_then(|s| s.suggested_source_column.as_deref())
                .filter(|col| columns.iter().any(|c| c == col));

            if let Some(col) = chosen {
                mapping.0.insert(field.name.clone(), col.to_string());
            }
        }
        mapping
    }

    /// `(field, column)` pairs in target field order.
    pub fn entries<'a>(&'a self, fields: &'a [TargetFieldSpec]) -> Vec<(&'a str, Option<&'a str>)> {
        fields
            .iter()
            .map(|f| (f.name.as_str(), self.source_for(&f.name)))
            .collect()
    }
}

impl FromIterator<(String, String)> for FieldMapping {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Lowercase and drop whitespace and underscores.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Exact normalized-name matching; first source column wins.
pub fn auto_map(source_columns: &[String], fields: &[TargetFieldSpec]) -> FieldMapping {
    let normalized: Vec<(String, &String)> = source_columns
        .iter()
        .map(|c| (normalize_name(c), c))
        .collect();

    fields
        .iter()
        .map(|field| {
            let target = normalize_name(&field.name);
            let column = normalized
                .iter()
                .find(|(norm, _)| *norm == target)
                .map(|(_, col)| (*col).clone())
                .unwrap_or_default();
            (field.name.clone(), column)
        })
        .collect()
}
