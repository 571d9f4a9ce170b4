//! HTTP API module.
//!
//! This module provides the HTTP server, request/response types and the
//! SSE log broadcaster used by the pipeline.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server, AppState};
pub use types::*;
