//! Tablereader - Single-Shot Table Read Connector
//!
//! Reads rows from a relational table for each input record and emits them as
//! JSON output records, either one record per row or one aggregate record.
//!
//! # Core Principles
//! - One connection per input record, always closed before the next one
//! - Statements are built from caller-supplied fragments in a fixed clause order
//! - Each input record is its own error boundary
//! - JSON-only output on stdout, logs on stderr
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`output`] - Output records and CLI envelopes
//! - [`engine`] - Driver traits, connection config, and engine implementations
//! - [`query`] - SELECT statement builder
//! - [`guard`] - Injection hazard checks on query fragments
//! - [`request`] - Input records and read planning
//! - [`shape`] - Result shaping (row expansion / aggregate)
//! - [`client`] - Per-record connection wrapper
//! - [`runner`] - Sequential read loop with per-record error handling
//! - [`config`] - Named connection profiles
//! - [`logging`] - stderr logging setup

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod logging;
pub mod output;
pub mod query;
pub mod request;
pub mod runner;
pub mod shape;

// Re-export commonly used types for convenience
pub use client::{CleanupFailure, DataClient};
pub use config::{
    list_connections, resolve_connection, save_connection, ConfigLocation, ProfileFile,
    StoredConnection,
};
pub use engine::{
    ColumnInfo, ConnectionConfig, ConnectionKind, DatabaseConnection, DatabaseDriver,
    DatabaseType, Row,
};
pub use error::{ReaderError, Result};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, OutputRecord, SuccessEnvelope};
pub use query::{build_select, Operation, SelectQuery};
pub use request::{parse_records, InputRecord, ReadOptions, ReadPlan, ReadRequest};
pub use runner::{run_reads, RunOptions, RunReport};
pub use shape::ShapeOptions;
