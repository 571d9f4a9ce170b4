//! # Datamend - export mapping and validation engine
//!
//! Datamend takes a cleaned spreadsheet (CSV or rows already in memory),
//! maps its columns onto the fields of a configured target entity,
//! validates every row against that entity's field rules and, only when no
//! error remains, produces the target-shaped payload as CSV, JSON or an
//! HTTP submission.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│   Mapping   │────▶│ Validation  │────▶│   Export    │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │ (auto / AI) │     │  (report)   │     │ (CSV / API) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use datamend::{parse_file_auto, ConfigStore, ExportSession, ValidationOptions};
//!
//! let parsed = parse_file_auto("contacts.csv")?;
//! let store = ConfigStore::open(".datamend/export-config.json");
//!
//! let mut session = ExportSession::new(parsed.dataset, ValidationOptions::default());
//! session.select_entity(store.entity("contacts")?.clone());
//! if session.validate()?.is_valid() {
//!     std::fs::write("contacts-export.csv", session.export_csv()?)?;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Target entity/field specs, datasets, AI suggestions
//! - [`parser`] - CSV parsing with auto-detection
//! - [`mapping`] - Field mapping and deterministic auto-mapping
//! - [`validation`] - Per-row field validation and reports
//! - [`transform`] - Row transformation and the export pipeline
//! - [`export`] - CSV/JSON serialization and API submission
//! - [`config`] - Entity configuration store and settings
//! - [`ai`] - AI-powered mapping suggestions
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Mapping & validation
pub mod mapping;
pub mod validation;

// Transformation & export
pub mod export;
pub mod transform;

// Configuration
pub mod config;

// AI
pub mod ai;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{AiError, ConfigError, CsvError, ExportError, MappingError, PipelineError, ServerError};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Dataset, ExportConfig, FieldKind, FieldType, MappingSuggestion, NumberConstraints, SourceRow,
    TargetEntitySpec, TargetFieldSpec, TargetRecord, TextConstraints,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_file_auto, parse_str, ParseResult};

// =============================================================================
// Re-exports - Mapping & Validation
// =============================================================================

pub use mapping::{auto_map, FieldMapping};
pub use validation::{validate_dataset, validate_row, ErrorKind, ValidationError, ValidationOptions, ValidationReport};

// =============================================================================
// Re-exports - Pipeline & Export
// =============================================================================

pub use export::{ApiExporter, SubmitReceipt};
pub use transform::{prepare_export, transform_row, transform_rows, ExportSession};

// =============================================================================
// Re-exports - Configuration & AI
// =============================================================================

pub use ai::AiClient;
pub use config::{ConfigStore, Settings};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server};
}
