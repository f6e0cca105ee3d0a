//! Input Records
//!
//! An input record is the loosely-typed parameter set for one read. This
//! module turns it into a [`ReadPlan`]: a validated operation, the SELECT to
//! run, the echo of its parameters, and the output shape.
//!
//! Record format (camelCase JSON, every field but `tableName` optional):
//! ```json
//! {
//!   "operation": "getFiltered",
//!   "tableName": "CUSTOMERS",
//!   "whereCondition": "STATUS = 'ACTIVE'",
//!   "limit": 10,
//!   "includeMetadata": true,
//!   "returnArrayFormat": false,
//!   "options": { "columns": "ID, NAME", "orderBy": "NAME ASC" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

use crate::engine::Row;
use crate::error::{ReaderError, Result};
use crate::query::{build_select, Operation, SelectQuery, ALL_COLUMNS};
use crate::shape::ShapeOptions;

/// Largest accepted `limit`
pub const MAX_LIMIT: i64 = 100_000;

fn default_operation() -> String {
    Operation::GetAll.as_str().to_string()
}

fn default_true() -> bool {
    true
}

/// Optional query clauses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOptions {
    /// `*` or a comma-separated column list (default `*`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<String>,

    /// ORDER BY text without the keyword
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
}

/// One input record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    /// `getAll` or `getFiltered`; anything else fails with `UnknownOperation`
    #[serde(default = "default_operation")]
    pub operation: String,

    /// Table to read from (required)
    #[serde(default)]
    pub table_name: String,

    /// WHERE text without the keyword (required for `getFiltered`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_condition: Option<String>,

    /// Maximum rows; 0 or negative means no limit
    #[serde(default)]
    pub limit: i64,

    /// Attach run metadata to the output
    #[serde(default = "default_true")]
    pub include_metadata: bool,

    /// Emit one aggregate record instead of one record per row
    #[serde(default)]
    pub return_array_format: bool,

    #[serde(default)]
    pub options: ReadOptions,
}

impl ReadRequest {
    /// Read every row of `table`
    pub fn get_all(table: impl Into<String>) -> Self {
        Self {
            operation: default_operation(),
            table_name: table.into(),
            where_condition: None,
            limit: 0,
            include_metadata: true,
            return_array_format: false,
            options: ReadOptions::default(),
        }
    }

    /// Read the rows of `table` matching `condition`
    pub fn filtered(table: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            operation: Operation::GetFiltered.as_str().to_string(),
            where_condition: Some(condition.into()),
            ..Self::get_all(table)
        }
    }

    #[must_use]
    pub fn with_columns(mut self, columns: impl Into<String>) -> Self {
        self.options.columns = Some(columns.into());
        self
    }

    #[must_use]
    pub fn with_order_by(mut self, order: impl Into<String>) -> Self {
        self.options.order_by = Some(order.into());
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_array_format(mut self, enabled: bool) -> Self {
        self.return_array_format = enabled;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, enabled: bool) -> Self {
        self.include_metadata = enabled;
        self
    }

    /// Validate the record and build its statement
    ///
    /// Nothing here touches the database, so every validation failure is
    /// reported before a connection is opened.
    pub fn plan(&self) -> Result<ReadPlan> {
        let operation: Operation = self.operation.parse()?;

        let table = self.table_name.trim();
        if table.is_empty() {
            return Err(ReaderError::invalid_input("tableName is required"));
        }

        if self.limit > MAX_LIMIT {
            return Err(ReaderError::invalid_input(format!(
                "limit must be at most {MAX_LIMIT}, got {}",
                self.limit
            )));
        }

        let columns = self
            .options
            .columns
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(ALL_COLUMNS)
            .to_string();
        let order_by = self.options.order_by.clone().unwrap_or_default();

        let query = build_select(
            operation,
            table,
            &columns,
            self.where_condition.as_deref(),
            Some(&order_by),
            self.limit,
        )?;

        let where_condition = match operation {
            Operation::GetFiltered => self.where_condition.clone(),
            Operation::GetAll => None,
        };

        let info = QueryInfo {
            operation,
            table_name: self.table_name.clone(),
            where_condition,
            columns,
            order_by,
            limit: query.limit_value(),
        };

        Ok(ReadPlan {
            query,
            info,
            shape: ShapeOptions {
                array_format: self.return_array_format,
                include_metadata: self.include_metadata,
            },
        })
    }
}

/// Parameters echoed back on output records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInfo {
    pub operation: Operation,
    pub table_name: String,
    /// Only set for `getFiltered`
    pub where_condition: Option<String>,
    pub columns: String,
    pub order_by: String,
    /// `null` when no limit applies
    pub limit: Option<u64>,
}

impl QueryInfo {
    /// Render as JSON fields in echo order
    #[must_use]
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("operation".to_string(), Value::from(self.operation.as_str()));
        row.insert("tableName".to_string(), Value::from(self.table_name.clone()));
        if let Some(condition) = &self.where_condition {
            row.insert("whereCondition".to_string(), Value::from(condition.clone()));
        }
        row.insert("columns".to_string(), Value::from(self.columns.clone()));
        row.insert("orderBy".to_string(), Value::from(self.order_by.clone()));
        row.insert("limit".to_string(), self.limit.map_or(Value::Null, Value::from));
        row
    }
}

/// Everything needed to run and shape one read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPlan {
    pub query: SelectQuery,
    pub info: QueryInfo,
    pub shape: ShapeOptions,
}

/// Something the runner can turn into a [`ReadRequest`] for one record
///
/// Conversion happens inside the per-record step, so a record that does not
/// fit the request shape fails on its own index instead of the whole batch.
pub trait InputRecord {
    fn to_request(&self) -> Result<Cow<'_, ReadRequest>>;
}

impl InputRecord for ReadRequest {
    fn to_request(&self) -> Result<Cow<'_, ReadRequest>> {
        Ok(Cow::Borrowed(self))
    }
}

impl InputRecord for Value {
    fn to_request(&self) -> Result<Cow<'_, ReadRequest>> {
        ReadRequest::deserialize(self)
            .map(Cow::Owned)
            .map_err(|e| ReaderError::invalid_input(format!("Invalid input record: {e}")))
    }
}

/// Split input text into raw records: a JSON array, a single JSON object, or
/// JSON Lines
///
/// Only JSON syntax is checked here. Field types are checked per record by
/// [`InputRecord::to_request`].
pub fn parse_records(text: &str) -> Result<Vec<Value>> {
    let trimmed = text.trim_start();

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| ReaderError::invalid_input(format!("Invalid input records: {e}")));
    }

    // A single (possibly pretty-printed) object
    if let Ok(record @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(vec![record]);
    }

    let mut records = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|e| {
            ReaderError::invalid_input(format!("Invalid input record on line {}: {e}", line_no + 1))
        })?;
        records.push(record);
    }

    Ok(records)
}
