//! `PostgreSQL` Database Driver
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (async driver)
//! - The connection task is spawned on connect and joined on disconnect
//! - `current_schema` is applied through the startup `search_path` option
//! - Connect timeout via `Config::connect_timeout`
//! - No TLS connector is linked in, so `encrypt` must be off (the default for
//!   this engine; saved profiles need `"encrypt": false`)

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::config::SslMode;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Client, Config, NoTls};

use serde_json::Value;

use crate::engine::{
    describe_param, ColumnInfo, ConnectionConfig, DatabaseConnection, DatabaseDriver,
    DatabaseType, Row,
};
use crate::error::{ReaderError, Result};

const DESCRIBE_SQL: &str = "SELECT column_name::text, data_type::text, is_nullable::text, \
     column_default::text FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = $1 ORDER BY ordinal_position";

/// `PostgreSQL` driver
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresEngine;

/// An open `PostgreSQL` session
pub struct PostgresConnection {
    client: Client,
    driver_task: JoinHandle<std::result::Result<(), tokio_postgres::Error>>,
}

impl DatabaseDriver for PostgresEngine {
    type Connection = PostgresConnection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<PostgresConnection> {
        if config.engine != DatabaseType::Postgres {
            return Err(ReaderError::invalid_input(format!(
                "Expected PostgreSQL engine, got {}",
                config.engine
            )));
        }

        let pg_config = build_pg_config(config)?;

        let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
            ReaderError::connection_failed(format!("Failed to connect to PostgreSQL: {e}"))
        })?;

        // Connection errors are not logged to prevent credential leakage
        let driver_task = tokio::spawn(connection);

        Ok(PostgresConnection { client, driver_task })
    }
}

impl DatabaseConnection for PostgresConnection {
    async fn exec(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let bound = bind_params(params)?;
        let refs: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();

        let rows = self
            .client
            .query(sql, &refs)
            .await
            .map_err(|e| ReaderError::query_failed(format!("Failed to execute query: {e}")))?;

        rows.iter().map(row_to_json).collect()
    }

    async fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = self.client.query(DESCRIBE_SQL, &[&table]).await.map_err(|e| {
            ReaderError::query_failed(format!("Failed to query columns for {table}: {e}"))
        })?;

        if rows.is_empty() {
            return Err(ReaderError::query_failed(format!("Table '{table}' not found")));
        }

        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.get(0),
                data_type: row.get(1),
                nullable: row.get::<_, String>(2) == "YES",
                default: row.get(3),
            })
            .collect())
    }

    async fn disconnect(self) -> Result<()> {
        drop(self.client);
        match self.driver_task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                Err(ReaderError::connection_failed(format!("PostgreSQL connection error: {e}")))
            }
            Err(e) => Err(ReaderError::connection_failed(format!(
                "PostgreSQL connection task failed: {e}"
            ))),
        }
    }
}

fn build_pg_config(config: &ConnectionConfig) -> Result<Config> {
    let host = config
        .host
        .as_ref()
        .ok_or_else(|| ReaderError::invalid_input("PostgreSQL requires 'host' parameter"))?;

    let port = config
        .port
        .ok_or_else(|| ReaderError::invalid_input("PostgreSQL requires 'port' parameter"))?;

    let user = config
        .user
        .as_ref()
        .ok_or_else(|| ReaderError::invalid_input("PostgreSQL requires 'user' parameter"))?;

    let password = config
        .password
        .as_ref()
        .ok_or_else(|| ReaderError::invalid_input("PostgreSQL requires 'password' parameter"))?;

    if config.encrypt {
        return Err(ReaderError::connection_failed(
            "Encrypted PostgreSQL connections are not supported; set encrypt to false",
        ));
    }

    let mut pg_config = Config::new();
    pg_config
        .host(host)
        .port(port)
        .user(user)
        .password(password)
        .ssl_mode(SslMode::Disable)
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms));

    // "*" or no database means the server default ("postgres")
    match config.database.as_deref() {
        Some(db) if db != "*" => pg_config.dbname(db),
        _ => pg_config.dbname("postgres"),
    };

    if let Some(schema) = &config.current_schema {
        pg_config.options(&format!("-c search_path={schema}"));
    }

    Ok(pg_config)
}

fn bind_params(params: &[Value]) -> Result<Vec<Box<dyn ToSql + Sync + Send>>> {
    params
        .iter()
        .enumerate()
        .map(|(idx, value)| -> Result<Box<dyn ToSql + Sync + Send>> {
            match value {
                Value::Null => Ok(Box::new(Option::<String>::None)),
                Value::Bool(b) => Ok(Box::new(*b)),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => Ok(Box::new(i)),
                    None => Ok(Box::new(n.as_f64().unwrap_or(f64::NAN))),
                },
                Value::String(s) => Ok(Box::new(s.clone())),
                other => Err(ReaderError::invalid_input(format!(
                    "Parameter {} is an {}, which PostgreSQL cannot bind",
                    idx + 1,
                    describe_param(other)
                ))),
            }
        })
        .collect()
}

fn row_to_json(row: &tokio_postgres::Row) -> Result<Row> {
    let mut json = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        json.insert(column.name().to_string(), postgres_value_to_json(row, idx)?);
    }
    Ok(json)
}

/// Read a nullable column as `T`
fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, idx: usize) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        ReaderError::query_failed(format!(
            "Failed to convert PostgreSQL type '{}' to JSON: {e}",
            row.columns()[idx].type_().name()
        ))
    })
}

fn float_to_json(v: f64) -> Value {
    // NaN/Infinity become null
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

fn postgres_value_to_json(row: &tokio_postgres::Row, idx: usize) -> Result<Value> {
    use base64::Engine;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};

    let col_type = row.columns()[idx].type_();

    let value = match *col_type {
        Type::BOOL => get::<bool>(row, idx)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, idx)?.map(Value::from),
        Type::INT4 => get::<i32>(row, idx)?.map(Value::from),
        Type::INT8 => get::<i64>(row, idx)?.map(Value::from),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|v| float_to_json(f64::from(v))),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(float_to_json),
        Type::JSON | Type::JSONB => get::<Value>(row, idx)?,
        Type::BYTEA => get::<Vec<u8>>(row, idx)?
            .map(|b| Value::String(base64::engine::general_purpose::STANDARD.encode(b))),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx)?
            .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx)?
            .map(|v| Value::String(v.to_rfc3339_opts(SecondsFormat::Millis, true))),
        Type::DATE => {
            get::<NaiveDate>(row, idx)?.map(|v| Value::String(v.format("%Y-%m-%d").to_string()))
        }
        Type::TIME => {
            get::<NaiveTime>(row, idx)?.map(|v| Value::String(v.format("%H:%M:%S").to_string()))
        }
        Type::UUID => get::<uuid::Uuid>(row, idx)?.map(|v| Value::String(v.to_string())),
        // Text types and anything else with a text representation
        _ => get::<String>(row, idx)?.map(Value::String),
    };

    Ok(value.unwrap_or(Value::Null))
}
