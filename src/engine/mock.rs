//! Mock database driver for testing.
//!
//! Returns scripted rows and failures without touching a real database, and
//! records every connect, statement, and disconnect so tests can assert on
//! the connection lifecycle.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use super::{ColumnInfo, ConnectionConfig, DatabaseConnection, DatabaseDriver, Row};
use crate::error::{ReaderError, Result};

/// Everything the mock observed, in call order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockJournal {
    /// Number of connect attempts (successful or not)
    pub connect_attempts: usize,
    /// Statements executed
    pub statements: Vec<String>,
    /// Number of disconnect calls
    pub disconnects: usize,
}

/// A driver that returns predefined results.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    rows: Vec<Row>,
    columns: Vec<ColumnInfo>,
    failing_connects: HashSet<usize>,
    exec_error: Option<String>,
    disconnect_error: Option<String>,
    journal: Arc<Mutex<MockJournal>>,
}

impl MockDriver {
    /// Creates a mock that connects fine and returns no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every executed statement returns these rows.
    #[must_use]
    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    /// `describe_table` returns these columns.
    #[must_use]
    pub fn with_columns(mut self, columns: Vec<ColumnInfo>) -> Self {
        self.columns = columns;
        self
    }

    /// Fail the connect attempts with these zero-based attempt numbers.
    #[must_use]
    pub fn failing_connect_on(mut self, attempts: &[usize]) -> Self {
        self.failing_connects.extend(attempts.iter().copied());
        self
    }

    /// Every statement fails with this driver message.
    #[must_use]
    pub fn failing_exec(mut self, message: impl Into<String>) -> Self {
        self.exec_error = Some(message.into());
        self
    }

    /// Every disconnect fails with this driver message.
    #[must_use]
    pub fn failing_disconnect(mut self, message: impl Into<String>) -> Self {
        self.disconnect_error = Some(message.into());
        self
    }

    /// Snapshot of what the mock has seen so far.
    pub fn journal(&self) -> MockJournal {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl DatabaseDriver for MockDriver {
    type Connection = MockConnection;

    async fn connect(&self, _config: &ConnectionConfig) -> Result<MockConnection> {
        let attempt = {
            let mut journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
            let attempt = journal.connect_attempts;
            journal.connect_attempts += 1;
            attempt
        };

        if self.failing_connects.contains(&attempt) {
            return Err(ReaderError::connection_failed(format!(
                "mock refused connect attempt {attempt}"
            )));
        }

        Ok(MockConnection {
            rows: self.rows.clone(),
            columns: self.columns.clone(),
            exec_error: self.exec_error.clone(),
            disconnect_error: self.disconnect_error.clone(),
            journal: Arc::clone(&self.journal),
        })
    }
}

/// Connection handed out by `MockDriver`.
#[derive(Debug)]
pub struct MockConnection {
    rows: Vec<Row>,
    columns: Vec<ColumnInfo>,
    exec_error: Option<String>,
    disconnect_error: Option<String>,
    journal: Arc<Mutex<MockJournal>>,
}

impl DatabaseConnection for MockConnection {
    async fn exec(&mut self, sql: &str, _params: &[serde_json::Value]) -> Result<Vec<Row>> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .statements
            .push(sql.to_string());

        match &self.exec_error {
            Some(message) => Err(ReaderError::query_failed(message.clone())),
            None => Ok(self.rows.clone()),
        }
    }

    async fn describe_table(&mut self, _table: &str) -> Result<Vec<ColumnInfo>> {
        Ok(self.columns.clone())
    }

    async fn disconnect(self) -> Result<()> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner).disconnects += 1;

        match self.disconnect_error {
            Some(message) => Err(ReaderError::connection_failed(message)),
            None => Ok(()),
        }
    }
}
