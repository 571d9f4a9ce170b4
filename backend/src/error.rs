//! Error types for the datamend export engine.
//!
//! This module defines the error hierarchy used across the crate:
//!
//! - [`CsvError`] - CSV ingestion errors
//! - [`ConfigError`] - Entity configuration store errors
//! - [`MappingError`] - Invalid mapping edits
//! - [`AiError`] - AI suggestion client errors
//! - [`ExportError`] - Serialization and API submission errors
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP API errors
//!
//! Data-quality problems (bad dates, unmapped required fields, ...) are
//! never errors here: they are [`crate::validation::ValidationError`]
//! entries in a [`crate::validation::ValidationReport`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

use crate::api::types::error_response;

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// Errors during CSV ingestion.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Could not decode the file content.
    #[error("Failed to decode content: {0}")]
    Encoding(String),

    /// Malformed CSV record.
    #[error("Line {line}: {message}")]
    Parse { line: u64, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors from the entity configuration store.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error.
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Document does not match the configuration schema.
    #[error("Config does not match schema: {}", .0.join("; "))]
    Schema(Vec<String>),

    /// Two entities share an id.
    #[error("Duplicate entity id: {0}")]
    DuplicateEntity(String),

    /// Two fields of one entity share a name.
    #[error("Entity '{entity}' declares field '{field}' more than once")]
    DuplicateField { entity: String, field: String },

    /// Entity not found.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// The document on disk could not be loaded, so a partial edit would
    /// overwrite it with the empty stand-in.
    #[error("Configuration at {0} could not be loaded; fix it or import a complete document before editing")]
    DocumentIgnored(String),
}

// =============================================================================
// Mapping Errors
// =============================================================================

/// Errors raised by explicit mapping edits.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    /// The target entity has no field with this name.
    #[error("Unknown target field: {0}")]
    UnknownField(String),

    /// The dataset has no column with this name.
    #[error("Unknown source column: {0}")]
    UnknownColumn(String),
}

// =============================================================================
// AI Client Errors
// =============================================================================

/// Errors from the AI suggestion client.
#[derive(Debug, Error)]
pub enum AiError {
    /// Missing API key.
    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// Provider returned an error payload.
    #[error("API error: {0}")]
    ApiError(String),

    /// Response body was not the expected JSON.
    #[error("Invalid JSON response: {0}")]
    InvalidJson(String),

    /// Suggestions could not be parsed.
    #[error("Failed to parse suggestions: {0}")]
    ParseError(String),
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while serializing or submitting an export payload.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV writer error.
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("Export IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error reaching the target API.
    #[error("Submission failed: {0}")]
    Http(String),

    /// Target API answered with a non-success status.
    #[error("Target API rejected the payload (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level orchestration errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Mapping edit error.
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// AI client error.
    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    /// Export error.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// No target entity has been selected yet.
    #[error("No target entity selected")]
    NoEntitySelected,

    /// The current mapping has not been validated since its last change.
    #[error("Data must be validated before export")]
    NotValidated,

    /// The last validation pass found errors.
    #[error("Export blocked: {total} validation error(s)")]
    ValidationFailed { total: usize },

    /// No records to export.
    #[error("No records to export")]
    EmptyInput,
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl ServerError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Pipeline(err) => match err {
                PipelineError::Csv(_) | PipelineError::Mapping(_) | PipelineError::EmptyInput => {
                    StatusCode::BAD_REQUEST
                }
                PipelineError::Config(ConfigError::EntityNotFound(_)) => StatusCode::NOT_FOUND,
                PipelineError::Config(ConfigError::DocumentIgnored(_)) => StatusCode::CONFLICT,
                PipelineError::Config(
                    ConfigError::DuplicateEntity(_)
                    | ConfigError::DuplicateField { .. }
                    | ConfigError::Schema(_),
                ) => StatusCode::BAD_REQUEST,
                PipelineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
                PipelineError::Ai(_) | PipelineError::Export(_) => StatusCode::BAD_GATEWAY,
                PipelineError::NoEntitySelected
                | PipelineError::NotValidated
                | PipelineError::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        (status, Json(error_response(&self.to_string()))).into_response()
    }
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        ServerError::Pipeline(err.into())
    }
}

impl From<CsvError> for ServerError {
    fn from(err: CsvError) -> Self {
        ServerError::Pipeline(err.into())
    }
}

impl From<MappingError> for ServerError {
    fn from(err: MappingError) -> Self {
        ServerError::Pipeline(err.into())
    }
}

impl From<AiError> for ServerError {
    fn from(err: AiError) -> Self {
        ServerError::Pipeline(err.into())
    }
}

impl From<ExportError> for ServerError {
    fn from(err: ExportError) -> Self {
        ServerError::Pipeline(err.into())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for AI operations.
pub type AiResult<T> = Result<T, AiError>;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
