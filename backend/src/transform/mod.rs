//! Transformation module.
//!
//! - Row: source row to target-shaped record (type coercion)
//! - Pipeline: validate-then-transform gate and the interactive export session

pub mod pipeline;
pub mod row;

pub use pipeline::{prepare_export, ExportSession};
pub use row::{transform_row, transform_rows};
