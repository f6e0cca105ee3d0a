//! `SQLite` Database Driver
//!
//! # Features
//! - File-based connections (`/path/to/db.sqlite`)
//! - In-memory connections (`:memory:`)
//! - Column metadata via `pragma_table_info`
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver, no async needed)
//! - Connections are opened read-only
//! - BLOB data is Base64-encoded for JSON safety
//! - The connect timeout doubles as the `busy_timeout`

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::time::Duration;

use crate::engine::{
    describe_param, ColumnInfo, ConnectionConfig, DatabaseConnection, DatabaseDriver,
    DatabaseType, Row,
};
use crate::error::{ReaderError, Result};

/// `SQLite` driver
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteEngine;

/// An open `SQLite` database
#[derive(Debug)]
pub struct SqliteConnection {
    conn: Connection,
}

impl DatabaseDriver for SqliteEngine {
    type Connection = SqliteConnection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<SqliteConnection> {
        if config.engine != DatabaseType::SQLite {
            return Err(ReaderError::invalid_input(format!(
                "Expected SQLite engine, got {}",
                config.engine
            )));
        }

        let file_path = config
            .file
            .as_ref()
            .ok_or_else(|| ReaderError::invalid_input("SQLite requires 'file' parameter"))?;
        let path_str = file_path.to_str().ok_or_else(|| {
            ReaderError::invalid_input("SQLite file path contains invalid UTF-8 characters")
        })?;

        let conn = open_connection(path_str)?;
        conn.busy_timeout(Duration::from_millis(config.connect_timeout_ms)).map_err(|e| {
            ReaderError::connection_failed(format!("Failed to set busy timeout: {e}"))
        })?;

        Ok(SqliteConnection { conn })
    }
}

impl DatabaseConnection for SqliteConnection {
    async fn exec(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let bound = bind_params(params)?;
        query_rows(&self.conn, sql, &bound)
    }

    async fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnInfo>> {
        table_columns(&self.conn, table)
    }

    async fn disconnect(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| {
            ReaderError::connection_failed(format!("Failed to close SQLite database: {e}"))
        })
    }
}

fn open_connection(path: &str) -> Result<Connection> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| ReaderError::connection_failed(format!("Failed to open SQLite database: {e}")))
}

fn bind_params(params: &[Value]) -> Result<Vec<SqlValue>> {
    params
        .iter()
        .enumerate()
        .map(|(idx, value)| match value {
            Value::Null => Ok(SqlValue::Null),
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(SqlValue::Integer(i)),
                None => Ok(SqlValue::Real(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            other => Err(ReaderError::invalid_input(format!(
                "Parameter {} is an {}, which SQLite cannot bind",
                idx + 1,
                describe_param(other)
            ))),
        })
        .collect()
}

fn query_rows(conn: &Connection, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| ReaderError::query_failed(format!("Failed to prepare query: {e}")))?;

    let column_names: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();

    let rows = stmt
        .query(rusqlite::params_from_iter(params.iter()))
        .map_err(|e| ReaderError::query_failed(format!("Failed to execute query: {e}")))?;

    rows.mapped(|row| row_to_json(&column_names, row))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ReaderError::query_failed(format!("Failed to fetch row: {e}")))
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn
        .prepare(r#"SELECT name, type, "notnull", dflt_value FROM pragma_table_info(?1)"#)
        .map_err(|e| ReaderError::query_failed(format!("Failed to prepare table_info: {e}")))?;

    let columns = stmt
        .query_map([table], |row| {
            Ok(ColumnInfo {
                name: row.get::<_, String>(0)?,
                data_type: row.get::<_, String>(1)?,
                nullable: row.get::<_, i32>(2)? == 0, // notnull column: 0 = nullable, 1 = not null
                default: row.get::<_, Option<String>>(3)?,
            })
        })
        .map_err(|e| ReaderError::query_failed(format!("Failed to query columns for {table}: {e}")))?
        .collect::<std::result::Result<Vec<ColumnInfo>, _>>()
        .map_err(|e| {
            ReaderError::query_failed(format!("Failed to collect columns for {table}: {e}"))
        })?;

    if columns.is_empty() {
        return Err(ReaderError::query_failed(format!("Table '{table}' not found")));
    }

    Ok(columns)
}

fn row_to_json(
    column_names: &[String],
    row: &rusqlite::Row,
) -> std::result::Result<Row, rusqlite::Error> {
    let mut json = Row::new();
    for (idx, name) in column_names.iter().enumerate() {
        json.insert(name.clone(), sqlite_value_to_json(row, idx)?);
    }
    Ok(json)
}

fn sqlite_value_to_json(
    row: &rusqlite::Row,
    idx: usize,
) -> std::result::Result<Value, rusqlite::Error> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(s) => {
            let text = std::str::from_utf8(s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            Value::String(text.to_string())
        }
        ValueRef::Blob(b) => {
            use base64::Engine;
            Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
    })
}
