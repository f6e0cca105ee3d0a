//! Result Shaping
//!
//! Turns the rows of one read into output records.
//!
//! - Aggregate mode: exactly one record wrapping every row
//!   (`success`, `timestamp`, echoed parameters, `rowCount`, `data`, and
//!   `metadata` when requested).
//! - Row-expansion mode: one record per row, `_metadata` on the first one
//!   when requested. An empty result becomes a single informational record.
//!
//! Failed reads in continue mode become an error record (see
//! [`error_record`]).

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::engine::Row;
use crate::error::ReaderError;
use crate::output::OutputRecord;
use crate::request::QueryInfo;

/// Message on the record emitted for an empty row-expansion result
pub const NO_RECORDS_MESSAGE: &str = "No records found";

/// Output shape for one read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeOptions {
    /// One aggregate record instead of one record per row
    pub array_format: bool,
    /// Attach run metadata
    pub include_metadata: bool,
}

impl Default for ShapeOptions {
    fn default() -> Self {
        Self { array_format: false, include_metadata: true }
    }
}

/// Timestamp format used on every record (millisecond precision, UTC `Z`)
#[must_use]
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn run_metadata(info: &QueryInfo, total_rows: usize, stamp: &str) -> Value {
    let mut meta = info.to_row();
    meta.insert("totalRows".to_string(), Value::from(total_rows));
    meta.insert("timestamp".to_string(), Value::from(stamp));
    Value::Object(meta)
}

fn envelope_head(stamp: &str) -> Row {
    let mut json = Row::new();
    json.insert("success".to_string(), Value::Bool(true));
    json.insert("timestamp".to_string(), Value::from(stamp));
    json
}

/// Shape the rows of input record `item`
#[must_use]
pub fn shape_rows(
    item: usize,
    info: &QueryInfo,
    rows: Vec<Row>,
    options: ShapeOptions,
    now: DateTime<Utc>,
) -> Vec<OutputRecord> {
    let stamp = timestamp(now);
    let total = rows.len();

    if options.array_format {
        let mut json = envelope_head(&stamp);
        json.extend(info.to_row());
        json.insert("rowCount".to_string(), Value::from(total));
        json.insert("data".to_string(), Value::Array(rows.into_iter().map(Value::Object).collect()));
        if options.include_metadata {
            json.insert("metadata".to_string(), run_metadata(info, total, &stamp));
        }
        return vec![OutputRecord::new(item, json)];
    }

    if rows.is_empty() {
        let mut json = envelope_head(&stamp);
        json.extend(info.to_row());
        json.insert("rowCount".to_string(), Value::from(0));
        json.insert("message".to_string(), Value::from(NO_RECORDS_MESSAGE));
        return vec![OutputRecord::new(item, json)];
    }

    rows.into_iter()
        .enumerate()
        .map(|(idx, mut row)| {
            if idx == 0 && options.include_metadata {
                row.insert("_metadata".to_string(), run_metadata(info, total, &stamp));
            }
            OutputRecord::new(item, row)
        })
        .collect()
}

/// Record emitted in place of a failed read when continuing past errors
#[must_use]
pub fn error_record(item: usize, err: &ReaderError, now: DateTime<Utc>) -> OutputRecord {
    let mut error = Row::new();
    error.insert("message".to_string(), Value::from(err.message()));
    error.insert("type".to_string(), Value::from(err.kind()));
    error.insert("itemIndex".to_string(), Value::from(item));

    let mut json = Row::new();
    json.insert("error".to_string(), Value::Object(error));
    json.insert("success".to_string(), Value::Bool(false));
    json.insert("timestamp".to_string(), Value::from(timestamp(now)));

    OutputRecord::new(item, json)
}
