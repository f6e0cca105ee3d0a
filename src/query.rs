//! SELECT Statement Builder
//!
//! Composes the single statement a read issues. Fragments are concatenated
//! verbatim: table, columns, filter, and order text are trusted caller input.
//! See [`crate::guard`] for the hazard checks run before a statement is sent.
//!
//! Clause order is fixed:
//! `SELECT cols FROM table [WHERE filter] [ORDER BY order] [LIMIT limit]`

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ReaderError, Result};

/// Predicate used when an unfiltered read still needs ORDER BY or LIMIT
pub const ALWAYS_TRUE: &str = "1=1";

/// Column spec selecting every column
pub const ALL_COLUMNS: &str = "*";

/// Read operation selected by an input record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Retrieve all records from a table
    #[serde(rename = "getAll")]
    GetAll,
    /// Retrieve records matching a WHERE condition
    #[serde(rename = "getFiltered")]
    GetFiltered,
}

impl Operation {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GetAll => "getAll",
            Self::GetFiltered => "getFiltered",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "getAll" => Ok(Self::GetAll),
            "getFiltered" => Ok(Self::GetFiltered),
            other => Err(ReaderError::unknown_operation(other)),
        }
    }
}

/// A SELECT statement under construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    table: String,
    columns: String,
    filter: Option<String>,
    order_by: Option<String>,
    limit: Option<u64>,
}

impl SelectQuery {
    /// Select every column of `table` with no further clauses
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: ALL_COLUMNS.to_string(),
            filter: None,
            order_by: None,
            limit: None,
        }
    }

    /// Column spec: `*` or a comma list. Blank input keeps `*`.
    #[must_use]
    pub fn columns(mut self, columns: &str) -> Self {
        let trimmed = columns.trim();
        self.columns =
            if trimmed.is_empty() { ALL_COLUMNS.to_string() } else { trimmed.to_string() };
        self
    }

    /// Raw predicate inserted after WHERE. Blank input removes the clause.
    #[must_use]
    pub fn filter(mut self, predicate: Option<&str>) -> Self {
        self.filter = non_blank(predicate);
        self
    }

    /// Raw ORDER BY text. Blank input removes the clause.
    #[must_use]
    pub fn order_by(mut self, order: Option<&str>) -> Self {
        self.order_by = non_blank(order);
        self
    }

    /// Row limit. Zero and negative values remove the clause.
    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = u64::try_from(limit).ok().filter(|l| *l > 0);
        self
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn column_spec(&self) -> &str {
        &self.columns
    }

    #[must_use]
    pub fn filter_text(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    #[must_use]
    pub fn order_text(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    #[must_use]
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// Render the statement
    #[must_use]
    pub fn to_sql(&self) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.columns, self.table);

        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }

        if let Some(order) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        sql
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

/// Build the statement for an operation
///
/// `GetAll` with neither order nor limit is a bare SELECT. With either one it
/// becomes a filtered read on [`ALWAYS_TRUE`], matching what a `GetFiltered`
/// with that predicate would issue. `GetFiltered` requires a non-blank filter.
pub fn build_select(
    operation: Operation,
    table: &str,
    columns: &str,
    filter: Option<&str>,
    order_by: Option<&str>,
    limit: i64,
) -> Result<SelectQuery> {
    let base = SelectQuery::new(table).columns(columns).order_by(order_by).limit(limit);

    match operation {
        Operation::GetAll => {
            if base.order_by.is_some() || base.limit.is_some() {
                Ok(base.filter(Some(ALWAYS_TRUE)))
            } else {
                Ok(base)
            }
        }
        Operation::GetFiltered => {
            let predicate = non_blank(filter).ok_or_else(|| {
                ReaderError::invalid_input("whereCondition is required for getFiltered")
            })?;
            Ok(base.filter(Some(&predicate)))
        }
    }
}
