//! Connection Wrapper
//!
//! [`DataClient`] owns at most one open connection. It is created per input
//! record, connected, used for a single read, and disconnected.
//!
//! Disconnect is best-effort: a failure is logged and returned as a
//! [`CleanupFailure`] for the caller to record, never as an error.

use serde::Serialize;
use serde_json::Value;

use crate::engine::{
    ColumnInfo, ConnectionConfig, ConnectionKind, DatabaseConnection, DatabaseDriver, Row,
};
use crate::error::{ReaderError, Result};
use crate::query::{build_select, Operation, SelectQuery};

/// Statement used by [`DataClient::test_connection`]
pub const PING_SQL: &str = "SELECT 1 AS test";

/// A disconnect that failed and was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    /// Input record whose connection failed to close, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<usize>,
    pub message: String,
}

/// One connection's worth of reads against a driver
pub struct DataClient<'d, D: DatabaseDriver> {
    driver: &'d D,
    config: ConnectionConfig,
    connection: Option<D::Connection>,
}

impl<'d, D: DatabaseDriver> DataClient<'d, D> {
    pub fn new(driver: &'d D, config: ConnectionConfig) -> Self {
        Self { driver, config, connection: None }
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Open the connection. A second call while connected is a no-op.
    pub async fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        self.config.validate()?;
        let kind = self.config.connection_type;
        if kind == ConnectionKind::Hdi
            && self.config.engine.is_networked()
            && self.config.current_schema.is_none()
        {
            tracing::warn!(
                "hdi credentials without a container schema; unqualified tables resolve \
                 against the user's default schema"
            );
        }
        tracing::debug!(db = %self.config.display_target(), kind = kind.as_str(), "connecting");

        let connection = self.driver.connect(&self.config).await?;
        self.connection = Some(connection);
        Ok(())
    }

    /// Close the connection, if open
    ///
    /// Never fails; a driver error comes back as a `CleanupFailure`.
    pub async fn disconnect(&mut self) -> Option<CleanupFailure> {
        let connection = self.connection.take()?;

        match connection.disconnect().await {
            Ok(()) => {
                tracing::debug!(db = %self.config.display_target(), "disconnected");
                None
            }
            Err(e) => {
                tracing::warn!(db = %self.config.display_target(), "disconnect warning: {e}");
                Some(CleanupFailure { item: None, message: e.message() })
            }
        }
    }

    /// Run a statement with positional parameters
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| ReaderError::connection_failed("Not connected"))?;

        tracing::debug!(sql, params = params.len(), "executing");
        connection.exec(sql, params).await
    }

    /// Run a built SELECT
    pub async fn select(&mut self, query: &SelectQuery) -> Result<Vec<Row>> {
        self.execute(&query.to_sql(), &[]).await
    }

    /// `SELECT columns FROM table`
    pub async fn get_all_records(&mut self, table: &str, columns: &str) -> Result<Vec<Row>> {
        let query = build_select(Operation::GetAll, table, columns, None, None, 0)?;
        self.select(&query).await
    }

    /// `SELECT columns FROM table WHERE condition [ORDER BY ...] [LIMIT ...]`
    pub async fn get_filtered_records(
        &mut self,
        table: &str,
        condition: &str,
        columns: &str,
        order_by: Option<&str>,
        limit: Option<u64>,
    ) -> Result<Vec<Row>> {
        let limit = limit.map_or(0, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let query =
            build_select(Operation::GetFiltered, table, columns, Some(condition), order_by, limit)?;
        self.select(&query).await
    }

    /// True when a trivial statement returns a row; any error counts as false
    pub async fn test_connection(&mut self) -> bool {
        match self.execute(PING_SQL, &[]).await {
            Ok(rows) => !rows.is_empty(),
            Err(e) => {
                tracing::debug!("connection test failed: {e}");
                false
            }
        }
    }

    /// Column metadata for `table`
    pub async fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnInfo>> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| ReaderError::connection_failed("Not connected"))?;
        connection.describe_table(table).await
    }
}
