//! End-to-End Read Tests
//!
//! Runs input records through the read loop against real `SQLite` databases:
//! - Statement building and clause order as seen by the engine
//! - Row expansion and aggregate shaping of real rows
//! - Per-record error handling with and without continue mode
//! - One connection per record, closed even when the query fails

#![cfg(feature = "sqlite")]

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use tablereader::engine::mock::MockDriver;
use tablereader::engine::sqlite::SqliteEngine;
use tablereader::{
    parse_records, run_reads, ConnectionConfig, DataClient, ReadRequest, ReaderError,
    RunOptions,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// Create a test `SQLite` database with sample data
fn create_customers_db() -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_file =
        std::env::temp_dir().join(format!("tablereader_it_{}_{id}.db", std::process::id()));
    let _ = std::fs::remove_file(&temp_file);

    let conn = rusqlite::Connection::open(&temp_file).expect("Failed to create temp database");
    conn.execute_batch(
        "CREATE TABLE CUSTOMERS (
            ID INTEGER PRIMARY KEY,
            NAME TEXT NOT NULL,
            STATUS TEXT NOT NULL,
            BALANCE REAL
        );
        INSERT INTO CUSTOMERS (NAME, STATUS, BALANCE) VALUES ('Alice', 'ACTIVE', 120.5);
        INSERT INTO CUSTOMERS (NAME, STATUS, BALANCE) VALUES ('Bob', 'INACTIVE', 0);
        INSERT INTO CUSTOMERS (NAME, STATUS, BALANCE) VALUES ('Charlie', 'ACTIVE', NULL);
        INSERT INTO CUSTOMERS (NAME, STATUS, BALANCE) VALUES ('Dana', 'ACTIVE', 42);",
    )
    .expect("Failed to seed database");

    temp_file
}

fn cleanup_db(path: &Path) {
    let _ = std::fs::remove_file(path);
}

fn names(records: &[tablereader::OutputRecord]) -> Vec<Value> {
    records.iter().map(|r| r.json["NAME"].clone()).collect()
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn test_get_all_row_expansion() {
    let db = create_customers_db();
    let config = ConnectionConfig::sqlite(db.clone());

    let report = run_reads(
        &SqliteEngine,
        &config,
        &[ReadRequest::get_all("CUSTOMERS")],
        RunOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.records.len(), 4);
    assert_eq!(
        names(&report.records),
        vec![json!("Alice"), json!("Bob"), json!("Charlie"), json!("Dana")]
    );
    assert_eq!(report.records[0].json["_metadata"]["totalRows"], json!(4));
    assert_eq!(report.records[0].json["_metadata"]["limit"], Value::Null);
    assert!(report.records[1..].iter().all(|r| !r.json.contains_key("_metadata")));
    assert!(report.cleanup_failures.is_empty());

    cleanup_db(&db);
}

#[tokio::test]
async fn test_filtered_with_order_and_limit() {
    let db = create_customers_db();
    let config = ConnectionConfig::sqlite(db.clone());

    let request = ReadRequest::filtered("CUSTOMERS", "STATUS = 'ACTIVE'")
        .with_columns("ID, NAME")
        .with_order_by("NAME DESC")
        .with_limit(2)
        .with_metadata(false);

    let report =
        run_reads(&SqliteEngine, &config, &[request], RunOptions::default()).await.unwrap();

    assert_eq!(names(&report.records), vec![json!("Dana"), json!("Charlie")]);
    let keys: Vec<&str> = report.records[0].json.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["ID", "NAME"]);

    cleanup_db(&db);
}

#[tokio::test]
async fn test_get_all_with_limit_uses_always_true_filter() {
    let db = create_customers_db();
    let config = ConnectionConfig::sqlite(db.clone());

    let request = ReadRequest::get_all("CUSTOMERS").with_order_by("ID DESC").with_limit(1);
    let plan = request.plan().unwrap();
    assert_eq!(plan.query.to_sql(), "SELECT * FROM CUSTOMERS WHERE 1=1 ORDER BY ID DESC LIMIT 1");

    let report =
        run_reads(&SqliteEngine, &config, &[request], RunOptions::default()).await.unwrap();
    assert_eq!(names(&report.records), vec![json!("Dana")]);

    cleanup_db(&db);
}

#[tokio::test]
async fn test_aggregate_mode_wraps_all_rows() {
    let db = create_customers_db();
    let config = ConnectionConfig::sqlite(db.clone());

    let request =
        ReadRequest::filtered("CUSTOMERS", "BALANCE IS NULL").with_array_format(true);
    let report =
        run_reads(&SqliteEngine, &config, &[request], RunOptions::default()).await.unwrap();

    assert_eq!(report.records.len(), 1);
    let record = &report.records[0].json;
    assert_eq!(record["success"], json!(true));
    assert_eq!(record["rowCount"], json!(1));
    assert_eq!(record["whereCondition"], json!("BALANCE IS NULL"));
    assert_eq!(record["data"][0]["NAME"], json!("Charlie"));
    assert_eq!(record["data"][0]["BALANCE"], Value::Null);
    assert_eq!(record["metadata"]["totalRows"], json!(1));

    cleanup_db(&db);
}

#[tokio::test]
async fn test_empty_result_emits_info_record() {
    let db = create_customers_db();
    let config = ConnectionConfig::sqlite(db.clone());

    let request = ReadRequest::filtered("CUSTOMERS", "STATUS = 'DELETED'");
    let report =
        run_reads(&SqliteEngine, &config, &[request], RunOptions::default()).await.unwrap();

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].json["rowCount"], json!(0));
    assert_eq!(report.records[0].json["message"], json!("No records found"));

    cleanup_db(&db);
}

#[tokio::test]
async fn test_multiple_records_keep_input_order() {
    let db = create_customers_db();
    let config = ConnectionConfig::sqlite(db.clone());

    let requests = parse_records(
        r#"{"operation":"getFiltered","tableName":"CUSTOMERS","whereCondition":"ID = 2"}
{"operation":"getFiltered","tableName":"CUSTOMERS","whereCondition":"ID = 1"}"#,
    )
    .unwrap();

    let report = run_reads(&SqliteEngine, &config, &requests, RunOptions::default()).await.unwrap();

    assert_eq!(report.records.iter().map(|r| r.item).collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(names(&report.records), vec![json!("Bob"), json!("Alice")]);

    cleanup_db(&db);
}

// ============================================================================
// Per-Record Errors
// ============================================================================

#[tokio::test]
async fn test_missing_table_halts_with_index() {
    let db = create_customers_db();
    let config = ConnectionConfig::sqlite(db.clone());

    let requests = vec![
        ReadRequest::get_all("CUSTOMERS"),
        ReadRequest::get_all("ORDERS"),
        ReadRequest::get_all("CUSTOMERS"),
    ];

    let err = run_reads(&SqliteEngine, &config, &requests, RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.item_index(), Some(1));
    assert_eq!(err.error_code(), "QUERY_FAILED");
    assert!(err.message().contains("Read operation failed at item 1"));

    cleanup_db(&db);
}

#[tokio::test]
async fn test_missing_table_continue_mode() {
    let db = create_customers_db();
    let config = ConnectionConfig::sqlite(db.clone());

    let requests = vec![
        ReadRequest::get_all("ORDERS"),
        ReadRequest::filtered("CUSTOMERS", "ID = 4"),
    ];
    let options = RunOptions { continue_on_fail: true, ..Default::default() };

    let report = run_reads(&SqliteEngine, &config, &requests, options).await.unwrap();

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.failed_items, 1);
    let error = &report.records[0].json;
    assert_eq!(error["success"], json!(false));
    assert_eq!(error["error"]["type"], json!("QueryError"));
    assert_eq!(error["error"]["itemIndex"], json!(0));
    assert_eq!(report.records[1].json["NAME"], json!("Dana"));

    cleanup_db(&db);
}

#[tokio::test]
async fn test_mistyped_record_becomes_error_record() {
    let db = create_customers_db();
    let config = ConnectionConfig::sqlite(db.clone());

    let records = parse_records(
        r#"{"operation":"getFiltered","tableName":"CUSTOMERS","whereCondition":"ID = 1"}
{"operation":"getFiltered","tableName":"CUSTOMERS","whereCondition":"ID = 2","limit":"10"}
{"operation":"getFiltered","tableName":"CUSTOMERS","whereCondition":"ID = 3"}"#,
    )
    .unwrap();
    let options = RunOptions { continue_on_fail: true, ..Default::default() };

    let report = run_reads(&SqliteEngine, &config, &records, options).await.unwrap();

    assert_eq!(report.records.len(), 3);
    assert_eq!(report.records[0].json["NAME"], json!("Alice"));
    assert_eq!(report.records[1].json["error"]["type"], json!("ValidationError"));
    assert_eq!(report.records[1].json["error"]["itemIndex"], json!(1));
    assert_eq!(report.records[2].json["NAME"], json!("Charlie"));

    cleanup_db(&db);
}

#[tokio::test]
async fn test_missing_database_file_is_connection_error() {
    let path = std::env::temp_dir().join("tablereader_it_no_such_file.db");
    let _ = std::fs::remove_file(&path);
    let config = ConnectionConfig::sqlite(path);
    let options = RunOptions { continue_on_fail: true, ..Default::default() };

    let report =
        run_reads(&SqliteEngine, &config, &[ReadRequest::get_all("T")], options).await.unwrap();

    assert_eq!(report.records[0].json["error"]["type"], json!("ConnectionError"));
}

#[tokio::test]
async fn test_connection_closed_after_failed_query() {
    let driver = MockDriver::new().failing_exec("syntax error");
    let config = ConnectionConfig::sqlite(PathBuf::from(":memory:"));
    let options = RunOptions { continue_on_fail: true, ..Default::default() };

    let requests = vec![ReadRequest::get_all("A"), ReadRequest::get_all("B")];
    let report = run_reads(&driver, &config, &requests, options).await.unwrap();

    assert_eq!(report.failed_items, 2);
    let journal = driver.journal();
    assert_eq!(journal.connect_attempts, 2);
    assert_eq!(journal.disconnects, 2);
}

#[tokio::test]
async fn test_invalid_config_rejected_before_connect() {
    let mut config = ConnectionConfig::sqlite(PathBuf::from(":memory:"));
    config.connect_timeout_ms = 500;

    let mut client = DataClient::new(&SqliteEngine, config);
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, ReaderError::InvalidInput(_)));
    assert!(!client.is_connected());
}

// ============================================================================
// Client Operations
// ============================================================================

#[tokio::test]
async fn test_client_ping_and_describe() {
    let db = create_customers_db();
    let mut client = DataClient::new(&SqliteEngine, ConnectionConfig::sqlite(db.clone()));
    client.connect().await.unwrap();

    assert!(client.test_connection().await);

    let columns = client.describe_table("CUSTOMERS").await.unwrap();
    let column_names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(column_names, vec!["ID", "NAME", "STATUS", "BALANCE"]);
    assert!(!columns[1].nullable);
    assert!(columns[3].nullable);

    let rows = client
        .get_filtered_records("CUSTOMERS", "BALANCE > 10", "NAME", Some("NAME"), None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    assert_eq!(client.disconnect().await, None);
    cleanup_db(&db);
}
