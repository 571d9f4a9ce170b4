//! Export pipeline: mapping -> validation -> transform.
//!
//! Two entry points:
//!
//! - [`prepare_export`] - stateless, used by the HTTP API where every request
//!   carries rows, mapping and entity.
//! - [`ExportSession`] - owns one dataset and one entity selection and keeps
//!   the "mapping changed -> previous validation discarded" sequencing in a
//!   single place. Used by the CLI.
//!
//! # Example
//!
//! ```rust,ignore
//! use datamend::{ExportSession, ValidationOptions};
//!
//! let mut session = ExportSession::new(dataset, ValidationOptions::default());
//! session.select_entity(entity);
//! session.set_field_mapping("email", Some("E-Mail Address"))?;
//!
//! let report = session.validate()?;
//! if report.is_valid() {
//!     let csv = session.export_csv()?;
//! }
//! ```

use crate::api::logs::{log_info, log_success, log_warning, log_warning_indent};
use crate::error::{PipelineError, PipelineResult};
use crate::export;
use crate::mapping::{auto_map, FieldMapping};
use crate::models::{Dataset, MappingSuggestion, TargetEntitySpec, TargetRecord};
use crate::validation::{validate_dataset, ValidationOptions, ValidationReport};

use super::row::transform_rows;

/// Validate, then transform if and only if the data is clean.
///
/// Returns the validation report as the error when anything is wrong.
pub fn prepare_export(
    dataset: &Dataset,
    entity: &TargetEntitySpec,
    mapping: &FieldMapping,
    options: &ValidationOptions,
) -> Result<Vec<TargetRecord>, ValidationReport> {
    log_info(format!(
        "Validating {} rows against '{}' ({} fields)...",
        dataset.len(),
        entity.name,
        entity.fields.len()
    ));

    let report = validate_dataset(&dataset.rows, &entity.fields, mapping, options);
    if !report.is_valid() {
        log_warning(report.summary());
        for error in report.errors.iter().take(3) {
            log_warning_indent(error.message.clone(), 1);
        }
        return Err(report);
    }

    let records = transform_rows(&dataset.rows, &entity.fields, mapping);
    log_success(format!("{} records ready for '{}'", records.len(), entity.name));
    Ok(records)
}

/// Dataset + entity selection + mapping + last validation result.
#[derive(Debug, Clone)]
pub struct ExportSession {
    dataset: Dataset,
    entity: Option<TargetEntitySpec>,
    mapping: FieldMapping,
    report: Option<ValidationReport>,
    options: ValidationOptions,
}

impl ExportSession {
    pub fn new(dataset: Dataset, options: ValidationOptions) -> Self {
        Self {
            dataset,
            entity: None,
            mapping: FieldMapping::default(),
            report: None,
            options,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn entity(&self) -> Option<&TargetEntitySpec> {
        self.entity.as_ref()
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Last validation result, `None` once the mapping or data changed.
    pub fn report(&self) -> Option<&ValidationReport> {
        self.report.as_ref()
    }

    /// Switch target entity. The mapping is rebuilt from scratch.
    pub fn select_entity(&mut self, entity: TargetEntitySpec) {
        self.mapping = auto_map(&self.dataset.headers, &entity.fields);
        log_info(format!(
            "Selected '{}': {}/{} fields auto-mapped",
            entity.name,
            self.mapping.mapped_count(),
            entity.fields.len()
        ));
        self.entity = Some(entity);
        self.report = None;
    }

    /// Swap in new data. A changed column set resets the mapping.
    pub fn replace_dataset(&mut self, dataset: Dataset) {
        let columns_changed = dataset.headers != self.dataset.headers;
        self.dataset = dataset;
        self.report = None;

        if columns_changed {
            if let Some(entity) = &self.entity {
                self.mapping = auto_map(&self.dataset.headers, &entity.fields);
            }
        }
    }

    /// Point one target field at a source column, or clear it.
    pub fn set_field_mapping(&mut self, field: &str, column: Option<&str>) -> PipelineResult<()> {
        let entity = self.entity.as_ref().ok_or(PipelineError::NoEntitySelected)?;
        self.mapping
            .assign(field, column, &entity.fields, &self.dataset.headers)?;
        self.report = None;
        Ok(())
    }

    /// Replace the whole mapping (e.g. one loaded from a file).
    pub fn set_mapping(&mut self, mapping: FieldMapping) -> PipelineResult<()> {
        let entity = self.entity.as_ref().ok_or(PipelineError::NoEntitySelected)?;
        self.mapping = mapping.checked(&entity.fields, &self.dataset.headers)?;
        self.report = None;
        Ok(())
    }

    /// Adopt AI suggestions at or above `min_confidence`.
    pub fn apply_suggestions(&mut self, suggestions: &[MappingSuggestion], min_confidence: u8) -> PipelineResult<()> {
        let entity = self.entity.as_ref().ok_or(PipelineError::NoEntitySelected)?;
        self.mapping = FieldMapping::from_suggestions(suggestions, &entity.fields, &self.dataset.headers, min_confidence);
        self.report = None;
        log_info(format!(
            "Applied AI suggestions: {}/{} fields mapped",
            self.mapping.mapped_count(),
            entity.fields.len()
        ));
        Ok(())
    }

    /// Run a validation pass and keep its result.
    pub fn validate(&mut self) -> PipelineResult<&ValidationReport> {
        let entity = self.entity.as_ref().ok_or(PipelineError::NoEntitySelected)?;
        let report = validate_dataset(&self.dataset.rows, &entity.fields, &self.mapping, &self.options);

        if report.is_valid() {
            log_success(report.summary());
        } else {
            log_warning(report.summary());
        }
        Ok(self.report.insert(report))
    }

    /// True iff the current mapping has been validated with zero errors
    /// over at least one row.
    pub fn is_export_eligible(&self) -> bool {
        self.report
            .as_ref()
            .is_some_and(|report| report.is_valid() && report.rows_checked > 0)
    }

    /// Target-shaped records. Requires a clean, current validation.
    pub fn payload(&self) -> PipelineResult<Vec<TargetRecord>> {
        let entity = self.entity.as_ref().ok_or(PipelineError::NoEntitySelected)?;
        match &self.report {
            None => Err(PipelineError::NotValidated),
            Some(report) if !report.is_valid() => Err(PipelineError::ValidationFailed { total: report.total_errors }),
            Some(_) if self.dataset.is_empty() => Err(PipelineError::EmptyInput),
            Some(_) => Ok(transform_rows(&self.dataset.rows, &entity.fields, &self.mapping)),
        }
    }

    pub fn export_csv(&self) -> PipelineResult<String> {
        let records = self.payload()?;
        let entity = self.entity.as_ref().ok_or(PipelineError::NoEntitySelected)?;
        Ok(export::to_csv(&records, &entity.fields)?)
    }

    pub fn export_json(&self) -> PipelineResult<String> {
        let records = self.payload()?;
        Ok(export::to_json(&records)?)
    }
}
