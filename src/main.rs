//! Tablereader CLI Entry Point
//!
//! Subcommands:
//! - `read` - Read table rows for one or more input records
//! - `ping` - Test a connection
//! - `describe` - Column metadata for a table
//! - `connect` - Validate a connection and save it as a named profile
//! - `connections` - List saved profiles
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

#[cfg(feature = "mysql")]
use tablereader::engine::mysql::MySqlEngine;
#[cfg(feature = "postgres")]
use tablereader::engine::postgres::PostgresEngine;
#[cfg(feature = "sqlite")]
use tablereader::engine::sqlite::SqliteEngine;

use tablereader::config::{self, ConfigLocation};
use tablereader::{
    logging, parse_records, run_reads, ConnectionConfig, DataClient, DatabaseDriver,
    DatabaseType, ErrorEnvelope, Metadata, ReadOptions, ReadRequest, ReaderError, Result,
    RunOptions, SuccessEnvelope,
};

/// Tablereader - single-shot table read connector
#[derive(Parser)]
#[command(name = "tablereader")]
#[command(about = "Read table rows as JSON records, one connection per input record")]
#[command(version)]
struct Cli {
    /// Log at debug level (includes generated SQL); RUST_LOG overrides
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read rows for each input record
    Read(ReadArgs),

    /// Test that a connection can run a trivial statement
    Ping {
        #[command(flatten)]
        conn: ConnectionArgs,
    },

    /// Show column metadata for a table
    Describe {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// Table to describe
        #[arg(long)]
        table: String,
    },

    /// Validate a connection and save it as a named profile
    Connect {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// Profile name to save under
        #[arg(long, default_value = "default")]
        save_as: String,

        /// Save to the per-user config instead of `.tablereader/config.json`
        #[arg(long)]
        global: bool,

        /// Store a reference to this environment variable instead of the password
        #[arg(long)]
        password_env: Option<String>,

        /// Prompt for the password interactively
        #[arg(long)]
        prompt_password: bool,
    },

    /// List saved connection profiles
    Connections,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Read(_) => "read",
            Self::Ping { .. } => "ping",
            Self::Describe { .. } => "describe",
            Self::Connect { .. } => "connect",
            Self::Connections => "connections",
        }
    }
}

/// Connection flags; any flag given overrides the same field of a saved profile
#[derive(Args, Clone, Default)]
struct ConnectionArgs {
    /// Saved profile to start from (the default profile when no --engine is given)
    #[arg(long)]
    name: Option<String>,

    /// Database engine (postgres, mysql, sqlite)
    #[arg(long)]
    engine: Option<DatabaseType>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long, env = "TABLEREADER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long)]
    database: Option<String>,

    /// Schema used to resolve unqualified table names
    #[arg(long)]
    schema: Option<String>,

    /// SQLite database file
    #[arg(long)]
    file: Option<PathBuf>,

    /// Connect without TLS (PostgreSQL always connects without TLS; saved
    /// PostgreSQL profiles need "encrypt": false)
    #[arg(long)]
    no_encrypt: bool,

    /// Accept any server certificate
    #[arg(long)]
    skip_cert_validation: bool,

    /// Connect timeout (1000..=300000 ms)
    #[arg(long)]
    connect_timeout_ms: Option<u64>,
}

#[derive(Args)]
struct ReadArgs {
    #[command(flatten)]
    conn: ConnectionArgs,

    /// File of input records (JSON array, object, or JSON Lines); `-` reads stdin
    #[arg(long, conflicts_with = "table")]
    input: Option<PathBuf>,

    /// Table to read (single input record from flags)
    #[arg(long)]
    table: Option<String>,

    /// getAll or getFiltered
    #[arg(long, default_value = "getAll")]
    operation: String,

    /// WHERE text without the keyword
    #[arg(long = "where")]
    where_condition: Option<String>,

    /// Column list (default `*`)
    #[arg(long)]
    columns: Option<String>,

    /// ORDER BY text without the keyword
    #[arg(long)]
    order_by: Option<String>,

    /// Maximum rows; 0 or negative means no limit
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    limit: i64,

    /// Emit one aggregate record instead of one record per row
    #[arg(long)]
    array: bool,

    /// Leave run metadata off the output
    #[arg(long)]
    no_metadata: bool,

    /// Emit an error record for a failing input record and keep going
    #[arg(long)]
    continue_on_fail: bool,

    /// Reject fragments that look like injection instead of only warning
    #[arg(long)]
    strict_fragments: bool,
}

/// What to do once a driver is chosen
enum Action {
    Read { records: Vec<Value>, options: RunOptions },
    Ping,
    Describe { table: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_stderr_logging(cli.verbose);

    let command = cli.command.name();
    let mut engine = String::new();

    let result = run(cli.command, &mut engine).await;

    let printed = match &result {
        Ok((data, meta)) => {
            emit(&SuccessEnvelope::new(engine.as_str(), command, data, meta.clone()))
        }
        Err(e) => {
            tracing::error!(command, code = e.error_code(), "{e}");
            emit(&ErrorEnvelope::from_error(engine.as_str(), command, e))
        }
    };

    if let Err(e) = printed {
        eprintln!("Failed to write output: {e:#}");
        return ExitCode::FAILURE;
    }

    if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn emit<T: Serialize>(envelope: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, envelope).context("serializing envelope")?;
    writeln!(stdout).context("writing to stdout")?;
    Ok(())
}

async fn run(command: Commands, engine: &mut String) -> Result<(Value, Metadata)> {
    let start = Instant::now();

    let (conn, action) = match command {
        Commands::Connections => {
            let profiles = config::list_connections()?;
            let data = to_value(&profiles)?;
            return Ok((data, Metadata::new(elapsed_ms(start))));
        }
        Commands::Connect { mut conn, save_as, global, password_env, prompt_password } => {
            if prompt_password {
                conn.password = Some(prompt_for_password()?);
            } else if conn.password.is_none() {
                if let Some(var) = &password_env {
                    conn.password = std::env::var(var).ok();
                }
            }
            let config = build_config(&conn)?;
            *engine = config.engine.to_string();
            return connect_and_save(config, &save_as, global, password_env, start).await;
        }
        Commands::Ping { conn } => (conn, Action::Ping),
        Commands::Describe { conn, table } => (conn, Action::Describe { table }),
        Commands::Read(args) => {
            let options = RunOptions {
                continue_on_fail: args.continue_on_fail,
                strict_fragments: args.strict_fragments,
            };
            let records = read_records(&args)?;
            (args.conn, Action::Read { records, options })
        }
    };

    let config = build_config(&conn)?;
    *engine = config.engine.to_string();

    let (data, mut meta) = dispatch(&config, &action).await?;
    meta.execution_ms = elapsed_ms(start);
    Ok((data, meta))
}

/// Profile (if any) overlaid with explicit flags
fn build_config(args: &ConnectionArgs) -> Result<ConnectionConfig> {
    let mut config = match (&args.name, args.engine) {
        (None, Some(engine)) => ConnectionConfig::new(engine),
        (name, _) => config::resolve_connection(name.as_deref())?,
    };

    if let Some(engine) = args.engine {
        config.engine = engine;
    }
    if let Some(host) = &args.host {
        config.host = Some(host.clone());
    }
    if let Some(port) = args.port {
        config.port = Some(port);
    }
    if let Some(user) = &args.user {
        config.user = Some(user.clone());
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }
    if let Some(database) = &args.database {
        config.database = Some(database.clone());
    }
    if let Some(schema) = &args.schema {
        config.current_schema = Some(schema.clone());
    }
    if let Some(file) = &args.file {
        config.file = Some(file.clone());
    }
    if args.no_encrypt {
        config.encrypt = false;
    }
    if args.skip_cert_validation {
        config.validate_certificate = false;
    }
    if let Some(timeout) = args.connect_timeout_ms {
        config.connect_timeout_ms = timeout;
    }

    config.validate()?;
    Ok(config)
}

/// Raw input records; each is decoded into a request inside its own read
fn read_records(args: &ReadArgs) -> Result<Vec<Value>> {
    if let Some(path) = &args.input {
        let text = read_input(path).map_err(|e| ReaderError::invalid_input(format!("{e:#}")))?;
        return parse_records(&text);
    }

    let Some(table) = &args.table else {
        return Err(ReaderError::invalid_input("No input data provided"));
    };

    let request = ReadRequest {
        operation: args.operation.clone(),
        table_name: table.clone(),
        where_condition: args.where_condition.clone(),
        limit: args.limit,
        include_metadata: !args.no_metadata,
        return_array_format: args.array,
        options: ReadOptions { columns: args.columns.clone(), order_by: args.order_by.clone() },
    };
    Ok(vec![to_value(&request)?])
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text).context("reading input records from stdin")?;
        return Ok(text);
    }

    std::fs::read_to_string(path)
        .with_context(|| format!("reading input records from {}", path.display()))
}

fn prompt_for_password() -> Result<String> {
    dialoguer::Password::new()
        .with_prompt("Password")
        .interact()
        .map_err(|e| ReaderError::config_error(format!("Could not read password: {e}")))
}

async fn connect_and_save(
    config: ConnectionConfig,
    name: &str,
    global: bool,
    password_env: Option<String>,
    start: Instant,
) -> Result<(Value, Metadata)> {
    let (ping, _) = dispatch(&config, &Action::Ping).await?;
    if ping["connected"] != Value::Bool(true) {
        return Err(ReaderError::connection_failed(format!(
            "Connection test against {} did not return a row",
            config.display_target()
        )));
    }

    let location = if global { ConfigLocation::Global } else { ConfigLocation::Local };
    let target = config.display_target();
    let path = config::save_connection(name, config, password_env, location)?;

    let data = json!({
        "name": name,
        "target": target,
        "path": path.display().to_string(),
    });
    Ok((data, Metadata::new(elapsed_ms(start))))
}

/// Pick the driver for `config.engine` and run `action` with it
async fn dispatch(config: &ConnectionConfig, action: &Action) -> Result<(Value, Metadata)> {
    match config.engine {
        #[cfg(feature = "sqlite")]
        DatabaseType::SQLite => perform(&SqliteEngine, config, action).await,
        #[cfg(not(feature = "sqlite"))]
        DatabaseType::SQLite => Err(ReaderError::config_error(
            "SQLite engine not enabled. Build with --features sqlite",
        )),

        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => perform(&PostgresEngine, config, action).await,
        #[cfg(not(feature = "postgres"))]
        DatabaseType::Postgres => Err(ReaderError::config_error(
            "PostgreSQL engine not enabled. Build with --features postgres",
        )),

        #[cfg(feature = "mysql")]
        DatabaseType::MySQL => perform(&MySqlEngine, config, action).await,
        #[cfg(not(feature = "mysql"))]
        DatabaseType::MySQL => Err(ReaderError::config_error(
            "MySQL engine not enabled. Build with --features mysql",
        )),
    }
}

async fn perform<D: DatabaseDriver>(
    driver: &D,
    config: &ConnectionConfig,
    action: &Action,
) -> Result<(Value, Metadata)> {
    match action {
        Action::Read { records, options } => {
            let report = run_reads(driver, config, records, *options).await?;
            let mut meta = Metadata::with_records(report.execution_ms, report.records.len());
            meta.cleanup_failures = report.cleanup_failures.len();
            Ok((to_value(&report.records)?, meta))
        }
        Action::Ping => {
            let mut client = DataClient::new(driver, config.clone());
            client.connect().await?;
            let connected = client.test_connection().await;
            let cleanup = client.disconnect().await;

            let mut meta = Metadata::new(0);
            meta.cleanup_failures = usize::from(cleanup.is_some());
            let data = json!({
                "connected": connected,
                "target": config.display_target(),
                "kind": config.connection_type.as_str(),
            });
            Ok((data, meta))
        }
        Action::Describe { table } => {
            let mut client = DataClient::new(driver, config.clone());
            client.connect().await?;
            let columns = client.describe_table(table).await;
            let cleanup = client.disconnect().await;

            let mut meta = Metadata::new(0);
            meta.cleanup_failures = usize::from(cleanup.is_some());
            let data = json!({ "table": table, "columns": to_value(&columns?)? });
            Ok((data, meta))
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| ReaderError::query_failed(format!("Could not serialize result: {e}")))
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
