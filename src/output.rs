//! JSON Output Types
//!
//! Two layers of output:
//! - [`OutputRecord`]: one emitted record, tagged with the input record it
//!   came from. The shaper in [`crate::shape`] produces these.
//! - [`SuccessEnvelope`] / [`ErrorEnvelope`]: what the CLI prints on stdout.
//!
//! # Output Contract
//! - Success: `{"ok": true, "engine": "...", "command": "...", "data": ..., "meta": {...}}`
//! - Error: `{"ok": false, "engine": "...", "command": "...", "error": {"code": "...", "message": "..."}}`

use serde::{Deserialize, Serialize};

use crate::engine::Row;
use crate::error::ReaderError;

/// One emitted record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Index of the input record this output belongs to
    pub item: usize,

    /// Record payload (a data row or a wrapped envelope)
    pub json: Row,
}

impl OutputRecord {
    #[must_use]
    pub fn new(item: usize, json: Row) -> Self {
        Self { item, json }
    }
}

/// Success envelope for CLI results
///
/// Generic over the data type to support different command return values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Database engine used for this operation (postgres, mysql, sqlite)
    pub engine: String,

    /// Command that was executed (read, ping, describe, connect)
    pub command: String,

    /// Command-specific data
    pub data: T,

    /// Execution metadata
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    /// Create a new success envelope
    pub fn new(
        engine: impl Into<String>,
        command: impl Into<String>,
        data: T,
        meta: Metadata,
    ) -> Self {
        Self { ok: true, engine: engine.into(), command: command.into(), data, meta }
    }
}

/// Error envelope for CLI failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    /// Database engine (empty string if not engine-specific)
    pub engine: String,

    /// Command that was attempted
    pub command: String,

    /// Error information
    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    /// Create a new error envelope
    pub fn new(engine: impl Into<String>, command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, engine: engine.into(), command: command.into(), error }
    }

    /// Create error envelope from `ReaderError`
    pub fn from_error(
        engine: impl Into<String>,
        command: impl Into<String>,
        err: &ReaderError,
    ) -> Self {
        Self::new(
            engine,
            command,
            ErrorInfo {
                code: err.error_code().to_string(),
                message: err.message(),
                item_index: err.item_index(),
            },
        )
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "CONNECTION_FAILED", "UNKNOWN_OPERATION")
    pub code: String,

    /// Human-readable error message (no sensitive data)
    pub message: String,

    /// Input record that caused an aborted read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_index: Option<usize>,
}

impl ErrorInfo {
    /// Create a new error info
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into(), item_index: None }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Execution time in milliseconds
    pub execution_ms: u64,

    /// Number of records emitted (for reads, None for other commands)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_emitted: Option<usize>,

    /// Number of disconnects that failed and were skipped
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cleanup_failures: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl Metadata {
    /// Create new metadata with just execution time
    pub fn new(execution_ms: u64) -> Self {
        Self { execution_ms, records_emitted: None, cleanup_failures: 0 }
    }

    /// Create new metadata with execution time and record count
    pub fn with_records(execution_ms: u64, records_emitted: usize) -> Self {
        Self { execution_ms, records_emitted: Some(records_emitted), cleanup_failures: 0 }
    }
}
