//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout tablereader.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `ConnectionFailed`: Driver could not open (or has no) connection
//! - `QueryFailed`: Driver reported an error while executing a statement
//! - `InvalidInput`: Malformed input or missing required parameters
//! - `UnknownOperation`: Unrecognized operation selector in an input record
//! - `ConfigError`: Configuration file or connection profile errors
//! - `ItemFailed`: One of the above, tagged with the offending input index

use thiserror::Error;

/// Main error type for tablereader operations
#[derive(Error, Debug)]
pub enum ReaderError {
    /// Database connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation selector not recognized
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Configuration error (file not found, invalid JSON, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Processing of one input record failed and the run was aborted
    #[error("Read operation failed at item {index}: {source}")]
    ItemFailed {
        index: usize,
        #[source]
        source: Box<ReaderError>,
    },
}

impl ReaderError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    /// `ItemFailed` reports the code of the error it wraps.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::QueryFailed(_) => "QUERY_FAILED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::UnknownOperation(_) => "UNKNOWN_OPERATION",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::ItemFailed { source, .. } => source.error_code(),
        }
    }

    /// Error kind name used in the `type` field of per-item error records
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "ConnectionError",
            Self::QueryFailed(_) => "QueryError",
            Self::InvalidInput(_) => "ValidationError",
            Self::UnknownOperation(_) => "UnknownOperationError",
            Self::ConfigError(_) => "ConfigError",
            Self::ItemFailed { source, .. } => source.kind(),
        }
    }

    /// Index of the input record that caused the failure, if known
    #[must_use]
    pub fn item_index(&self) -> Option<usize> {
        match self {
            Self::ItemFailed { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Get human-readable error message (no credentials or sensitive data)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a query failed error
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an unknown operation error
    pub fn unknown_operation(operation: impl Into<String>) -> Self {
        Self::UnknownOperation(operation.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Tag an error with the index of the input record being processed
    #[must_use]
    pub fn at_item(self, index: usize) -> Self {
        Self::ItemFailed { index, source: Box::new(self) }
    }
}

/// Result type alias for tablereader operations
pub type Result<T> = std::result::Result<T, ReaderError>;
