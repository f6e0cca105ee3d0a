//! MySQL Database Driver (including MariaDB)
//!
//! # Implementation Notes
//! - Uses `mysql_async` (async driver, requires tokio runtime)
//! - Connect timeout enforced via `tokio::time::timeout`
//! - `current_schema` is the default database when `database` is not set
//! - `encrypt` turns on rustls; `validate_certificate = false` accepts any certificate
//! - ENUM and SET types arrive as strings
//! - BLOB data is Base64-encoded for JSON safety

use mysql_async::{prelude::*, Conn, OptsBuilder, Params, Row, SslOpts, Value};
use std::time::Duration;

use crate::engine::{
    describe_param, ColumnInfo, ConnectionConfig, DatabaseConnection, DatabaseDriver,
    DatabaseType, Row as JsonRow,
};
use crate::error::{ReaderError, Result};

const DESCRIBE_SQL: &str = "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT \
     FROM information_schema.COLUMNS \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION";

/// MySQL driver
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlEngine;

/// An open MySQL session
pub struct MySqlConnection {
    conn: Conn,
}

impl DatabaseDriver for MySqlEngine {
    type Connection = MySqlConnection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<MySqlConnection> {
        if config.engine != DatabaseType::MySQL {
            return Err(ReaderError::invalid_input(format!(
                "Expected MySQL engine, got {}",
                config.engine
            )));
        }

        let opts = build_mysql_opts(config)?;
        let timeout = Duration::from_millis(config.connect_timeout_ms);

        let conn = tokio::time::timeout(timeout, Conn::new(opts))
            .await
            .map_err(|_| {
                ReaderError::connection_failed(format!(
                    "Timed out connecting to MySQL after {} ms",
                    config.connect_timeout_ms
                ))
            })?
            .map_err(|e| ReaderError::connection_failed(format!("Failed to connect to MySQL: {e}")))?;

        Ok(MySqlConnection { conn })
    }
}

impl DatabaseConnection for MySqlConnection {
    async fn exec(&mut self, sql: &str, params: &[serde_json::Value]) -> Result<Vec<JsonRow>> {
        let rows: Vec<Row> = if params.is_empty() {
            self.conn.query::<Row, _>(sql).await
        } else {
            self.conn.exec::<Row, _, _>(sql, bind_params(params)?).await
        }
        .map_err(|e| ReaderError::query_failed(format!("Failed to execute query: {e}")))?;

        rows.iter().map(row_to_json).collect()
    }

    async fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows: Vec<(String, String, String, Option<String>)> =
            self.conn.exec(DESCRIBE_SQL, (table,)).await.map_err(|e| {
                ReaderError::query_failed(format!("Failed to query columns for {table}: {e}"))
            })?;

        if rows.is_empty() {
            return Err(ReaderError::query_failed(format!("Table '{table}' not found")));
        }

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, default)| ColumnInfo {
                name,
                data_type,
                nullable: is_nullable == "YES",
                default,
            })
            .collect())
    }

    async fn disconnect(self) -> Result<()> {
        self.conn.disconnect().await.map_err(|e| {
            ReaderError::connection_failed(format!("Failed to close MySQL connection: {e}"))
        })
    }
}

fn build_mysql_opts(config: &ConnectionConfig) -> Result<OptsBuilder> {
    let host = config
        .host
        .as_ref()
        .ok_or_else(|| ReaderError::invalid_input("MySQL requires 'host' parameter"))?;

    let port = config
        .port
        .ok_or_else(|| ReaderError::invalid_input("MySQL requires 'port' parameter"))?;

    let user = config
        .user
        .as_ref()
        .ok_or_else(|| ReaderError::invalid_input("MySQL requires 'user' parameter"))?;

    let password = config
        .password
        .as_ref()
        .ok_or_else(|| ReaderError::invalid_input("MySQL requires 'password' parameter"))?;

    let database = config.database.as_ref().or(config.current_schema.as_ref());

    let ssl_opts = config.encrypt.then(|| {
        SslOpts::default().with_danger_accept_invalid_certs(!config.validate_certificate)
    });

    let opts = OptsBuilder::default()
        .ip_or_hostname(host)
        .tcp_port(port)
        .user(Some(user))
        .pass(Some(password))
        .db_name(database)
        .ssl_opts(ssl_opts);

    Ok(opts)
}

fn bind_params(params: &[serde_json::Value]) -> Result<Params> {
    let values = params
        .iter()
        .enumerate()
        .map(|(idx, value)| match value {
            serde_json::Value::Null => Ok(Value::NULL),
            serde_json::Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            serde_json::Value::Number(n) => Ok(match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => Value::Int(i),
                (None, Some(u)) => Value::UInt(u),
                _ => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            }),
            serde_json::Value::String(s) => Ok(Value::Bytes(s.clone().into_bytes())),
            other => Err(ReaderError::invalid_input(format!(
                "Parameter {} is an {}, which MySQL cannot bind",
                idx + 1,
                describe_param(other)
            ))),
        })
        .collect::<Result<Vec<Value>>>()?;

    Ok(Params::Positional(values))
}

/// Convert a MySQL row to a JSON row, keeping column order
fn row_to_json(row: &Row) -> Result<JsonRow> {
    let mut map = JsonRow::new();

    for (idx, column) in row.columns_ref().iter().enumerate() {
        map.insert(column.name_str().to_string(), mysql_value_to_json(row, idx)?);
    }

    Ok(map)
}

fn mysql_value_to_json(row: &Row, idx: usize) -> Result<serde_json::Value> {
    let value = row
        .as_ref(idx)
        .ok_or_else(|| ReaderError::query_failed(format!("Failed to get value at index {idx}")))?;

    Ok(value_to_json(value))
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::NULL => serde_json::Value::Null,

        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => serde_json::Value::String(s.to_string()),
            Err(_) => {
                use base64::Engine;
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        },

        Value::Int(i) => serde_json::Value::from(*i),
        Value::UInt(u) => serde_json::Value::from(*u),

        // NaN/Infinity become null
        Value::Float(f) => serde_json::Number::from_f64(f64::from(*f))
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Double(d) => {
            serde_json::Number::from_f64(*d).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }

        Value::Date(year, month, day, hour, minute, second, micro) => serde_json::Value::String(
            format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micro:06}"),
        ),

        Value::Time(is_negative, days, hours, minutes, seconds, microseconds) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            serde_json::Value::String(format!(
                "{sign}{total_hours}:{minutes:02}:{seconds:02}.{microseconds:06}"
            ))
        }
    }
}
