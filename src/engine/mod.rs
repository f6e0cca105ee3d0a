//! Database Driver Traits and Core Types
//!
//! This module defines the driver abstraction the connector talks to.
//! Each engine (`PostgreSQL`, `MySQL`, `SQLite`) implements `DatabaseDriver`,
//! and the `mock` driver implements it for tests.
//!
//! # Connection Lifecycle
//! A driver opens one `DatabaseConnection` per input record. The connection
//! executes statements and is consumed by `disconnect`. Nothing is pooled.
//!
//! # Engine Isolation
//! Each engine implementation is completely independent.
//! No shared SQL helpers or cross-engine abstractions.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;

use crate::error::{ReaderError, Result};

// Engine-specific implementations
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

pub mod mock;

/// Default connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;

/// Smallest accepted connect timeout in milliseconds
pub const MIN_CONNECT_TIMEOUT_MS: u64 = 1_000;

/// Largest accepted connect timeout in milliseconds
pub const MAX_CONNECT_TIMEOUT_MS: u64 = 300_000;

/// A result row: column name to JSON value, in result-set column order
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Supported database engine types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `PostgreSQL` database
    Postgres,
    /// `MySQL` database (includes `MariaDB`)
    MySQL,
    /// `SQLite` database
    SQLite,
}

impl DatabaseType {
    /// Get the engine name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }

    /// Whether the engine talks to a server over the network
    #[must_use]
    pub const fn is_networked(&self) -> bool {
        !matches!(self, Self::SQLite)
    }

    /// Whether the driver can open TLS connections
    ///
    /// The `PostgreSQL` driver is built without a TLS connector.
    #[must_use]
    pub const fn supports_tls(&self) -> bool {
        matches!(self, Self::MySQL)
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DatabaseType {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySQL),
            "sqlite" => Ok(Self::SQLite),
            other => Err(ReaderError::invalid_input(format!(
                "Unsupported engine '{other}'. Expected: postgres, mysql, or sqlite"
            ))),
        }
    }
}

/// How the credentials were obtained
///
/// `Hdi` credentials come from a managed container's service key and address
/// the container schema; `Database` credentials are direct user credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    #[default]
    Hdi,
    Database,
}

impl ConnectionKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hdi => "hdi",
            Self::Database => "database",
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

/// Connection configuration for database engines
///
/// This struct contains all parameters needed to establish a database connection.
/// Fields are engine-specific (e.g., `file` only applies to `SQLite`).
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database engine type
    pub engine: DatabaseType,

    /// Credential kind (service-key container or direct database user)
    #[serde(default)]
    pub connection_type: ConnectionKind,

    /// Hostname (for postgres/mysql)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Port number (for postgres/mysql)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Username (for postgres/mysql)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Password (for postgres/mysql)
    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database name (for postgres/mysql)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Schema to resolve unqualified table names against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_schema: Option<String>,

    /// Database file path (for sqlite)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Use TLS for the connection
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Verify the server certificate when `encrypt` is set
    #[serde(default = "default_true")]
    pub validate_certificate: bool,

    /// Connect timeout handed to the driver
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("engine", &self.engine)
            .field("connection_type", &self.connection_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("current_schema", &self.current_schema)
            .field("file", &self.file)
            .field("encrypt", &self.encrypt)
            .field("validate_certificate", &self.validate_certificate)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

impl ConnectionConfig {
    /// An empty config for `engine` with default flags
    ///
    /// `encrypt` starts on only for engines whose driver supports TLS.
    #[must_use]
    pub fn new(engine: DatabaseType) -> Self {
        Self {
            engine,
            connection_type: ConnectionKind::Database,
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            current_schema: None,
            file: None,
            encrypt: engine.supports_tls(),
            validate_certificate: true,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }

    fn network(
        engine: DatabaseType,
        host: String,
        port: u16,
        user: String,
        password: String,
        database: Option<String>,
    ) -> Self {
        Self {
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            database,
            ..Self::new(engine)
        }
    }

    /// Create a new `PostgreSQL` connection config
    #[must_use]
    pub fn postgres(
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
    ) -> Self {
        Self::network(DatabaseType::Postgres, host, port, user, password, Some(database))
    }

    /// Create a new `MySQL` connection config
    #[must_use]
    pub fn mysql(host: String, port: u16, user: String, password: String, database: String) -> Self {
        Self::network(DatabaseType::MySQL, host, port, user, password, Some(database))
    }

    /// Create a new `SQLite` connection config
    #[must_use]
    pub fn sqlite(file: PathBuf) -> Self {
        Self { file: Some(file), ..Self::new(DatabaseType::SQLite) }
    }

    /// Check ranges and required fields before any driver is involved
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CONNECT_TIMEOUT_MS..=MAX_CONNECT_TIMEOUT_MS).contains(&self.connect_timeout_ms) {
            return Err(ReaderError::invalid_input(format!(
                "connect_timeout_ms must be between {MIN_CONNECT_TIMEOUT_MS} and {MAX_CONNECT_TIMEOUT_MS}, got {}",
                self.connect_timeout_ms
            )));
        }

        if self.port == Some(0) {
            return Err(ReaderError::invalid_input("port must be between 1 and 65535"));
        }

        if !self.engine.is_networked() {
            if self.file.is_none() {
                return Err(ReaderError::invalid_input("SQLite requires 'file' parameter"));
            }
            return Ok(());
        }

        let required = [
            ("host", self.host.as_deref()),
            ("user", self.user.as_deref()),
            ("password", self.password.as_deref()),
        ];
        for (name, value) in required {
            if value.map_or(true, str::is_empty) {
                return Err(ReaderError::invalid_input(format!(
                    "{} requires '{name}' parameter",
                    self.engine
                )));
            }
        }

        if self.port.is_none() {
            return Err(ReaderError::invalid_input(format!(
                "{} requires 'port' parameter",
                self.engine
            )));
        }

        Ok(())
    }

    /// Human-readable target for logs (never includes the password)
    #[must_use]
    pub fn display_target(&self) -> String {
        if let Some(file) = &self.file {
            return format!("{}:{}", self.engine, file.display());
        }
        let host = self.host.as_deref().unwrap_or("?");
        let port = self.port.map_or_else(|| "?".to_string(), |p| p.to_string());
        let user = self.user.as_deref().unwrap_or("?");
        let mut target = format!("{}://{user}@{host}:{port}", self.engine);
        if let Some(db) = &self.database {
            target.push('/');
            target.push_str(db);
        }
        if let Some(schema) = &self.current_schema {
            target.push_str(&format!(" (schema {schema})"));
        }
        target
    }
}

/// Column information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,

    /// Column data type (engine-specific)
    pub data_type: String,

    /// Whether column allows NULL values
    pub nullable: bool,

    /// Default value (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Database driver trait
///
/// A driver knows how to open a connection for a config. It holds no
/// per-connection state; everything connection-scoped lives in
/// `Self::Connection`.
pub trait DatabaseDriver: Sync {
    /// Open connection type
    type Connection: DatabaseConnection;

    /// Open a connection
    ///
    /// Fails with `ConnectionFailed` if the server (or file) cannot be reached
    /// or rejects the credentials.
    fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// An open database connection
pub trait DatabaseConnection: Send + Sized {
    /// Execute a SQL statement with positional parameters and return its rows
    ///
    /// Fails with `QueryFailed` on any driver error.
    fn exec(
        &mut self,
        sql: &str,
        params: &[serde_json::Value],
    ) -> impl Future<Output = Result<Vec<Row>>> + Send;

    /// Column metadata for a table visible from the current schema
    fn describe_table(
        &mut self,
        table: &str,
    ) -> impl Future<Output = Result<Vec<ColumnInfo>>> + Send;

    /// Close the connection
    fn disconnect(self) -> impl Future<Output = Result<()>> + Send;
}

/// Convert a positional JSON parameter to display form for error messages
pub(crate) fn describe_param(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg() -> ConnectionConfig {
        ConnectionConfig::postgres(
            "localhost".to_string(),
            5432,
            "user".to_string(),
            "pass".to_string(),
            "db".to_string(),
        )
    }

    #[test]
    fn test_database_type_serialization() {
        assert_eq!(serde_json::to_string(&DatabaseType::Postgres).unwrap(), r#""postgres""#);
        assert_eq!(serde_json::to_string(&DatabaseType::MySQL).unwrap(), r#""mysql""#);
        assert_eq!(serde_json::to_string(&DatabaseType::SQLite).unwrap(), r#""sqlite""#);
    }

    #[test]
    fn test_database_type_from_str() {
        assert_eq!("PostgreSQL".parse::<DatabaseType>().unwrap(), DatabaseType::Postgres);
        assert_eq!("mariadb".parse::<DatabaseType>().unwrap(), DatabaseType::MySQL);
        assert!("oracle".parse::<DatabaseType>().is_err());
    }

    #[test]
    fn test_connection_config_constructors() {
        let pg_config = pg();
        assert_eq!(pg_config.engine, DatabaseType::Postgres);
        assert_eq!(pg_config.port, Some(5432));
        assert!(!pg_config.encrypt);
        assert_eq!(pg_config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);

        let sqlite_config = ConnectionConfig::sqlite(PathBuf::from("/tmp/test.db"));
        assert_eq!(sqlite_config.engine, DatabaseType::SQLite);
        assert!(sqlite_config.file.is_some());
        assert!(sqlite_config.validate().is_ok());
    }

    #[test]
    fn test_encrypt_default_follows_tls_support() {
        assert!(!ConnectionConfig::new(DatabaseType::Postgres).encrypt);
        assert!(ConnectionConfig::new(DatabaseType::MySQL).encrypt);
        assert!(!ConnectionConfig::new(DatabaseType::SQLite).encrypt);
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let config: ConnectionConfig = serde_json::from_str(
            r#"{"engine":"mysql","host":"db","port":3306,"user":"u","password":"p"}"#,
        )
        .unwrap();

        assert_eq!(config.connection_type, ConnectionKind::Hdi);
        assert!(config.encrypt);
        assert!(config.validate_certificate);
        assert_eq!(config.connect_timeout_ms, 15_000);
    }

    #[test]
    fn test_validate_timeout_range() {
        let mut config = pg();
        config.connect_timeout_ms = 999;
        assert!(config.validate().unwrap_err().message().contains("connect_timeout_ms"));

        config.connect_timeout_ms = 300_001;
        assert!(config.validate().is_err());

        config.connect_timeout_ms = 300_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_port_zero() {
        let mut config = pg();
        config.port = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_missing_host() {
        let mut config = pg();
        config.host = None;
        let err = config.validate().unwrap_err();
        assert!(err.message().contains("postgres requires 'host' parameter"));
    }

    #[test]
    fn test_validate_sqlite_requires_file() {
        let mut config = ConnectionConfig::sqlite(PathBuf::from("a.db"));
        config.file = None;
        assert!(config.validate().unwrap_err().message().contains("'file'"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", pg());
        assert!(!rendered.contains("pass\""));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_display_target_omits_password() {
        let mut config = pg();
        config.current_schema = Some("APP".to_string());
        let target = config.display_target();
        assert_eq!(target, "postgres://user@localhost:5432/db (schema APP)");
    }
}
