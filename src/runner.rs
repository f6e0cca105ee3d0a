//! Read Runner
//!
//! Processes input records strictly in order. For each record:
//! decode -> plan -> (guard) -> connect -> SELECT -> shape -> disconnect.
//!
//! A connection opened for a record is always closed before the next record
//! starts, including when the SELECT fails. Each record is its own error
//! boundary: with `continue_on_fail` a failure becomes an error record and
//! processing moves on; otherwise the run stops and reports the record index.

use chrono::Utc;
use serde::Serialize;
use std::time::Instant;

use crate::client::{CleanupFailure, DataClient};
use crate::engine::{ConnectionConfig, DatabaseDriver};
use crate::error::{ReaderError, Result};
use crate::guard;
use crate::output::OutputRecord;
use crate::request::InputRecord;
use crate::shape::{error_record, shape_rows};

/// Run-wide switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Emit an error record for a failing input record and keep going
    pub continue_on_fail: bool,
    /// Reject fragments with injection hazards instead of only logging them
    pub strict_fragments: bool,
}

/// Outcome of a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Emitted records, in input order
    pub records: Vec<OutputRecord>,
    /// Disconnects that failed; these never affect `records`
    pub cleanup_failures: Vec<CleanupFailure>,
    /// Input records that failed and were turned into error records
    pub failed_items: usize,
    pub execution_ms: u64,
}

/// Process every input record against one connection config
pub async fn run_reads<D: DatabaseDriver, R: InputRecord>(
    driver: &D,
    config: &ConnectionConfig,
    requests: &[R],
    options: RunOptions,
) -> Result<RunReport> {
    if requests.is_empty() {
        return Err(ReaderError::invalid_input("No input data provided"));
    }

    let start = Instant::now();
    let mut report = RunReport::default();

    for (index, request) in requests.iter().enumerate() {
        match read_one(driver, config, index, request, options, &mut report.cleanup_failures).await
        {
            Ok(records) => report.records.extend(records),
            Err(e) if options.continue_on_fail => {
                tracing::warn!(item = index, kind = e.kind(), "read failed, continuing: {e}");
                report.failed_items += 1;
                report.records.push(error_record(index, &e, Utc::now()));
            }
            Err(e) => {
                tracing::error!(item = index, kind = e.kind(), "read failed: {e}");
                return Err(e.at_item(index));
            }
        }
    }

    report.execution_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    tracing::info!(
        inputs = requests.len(),
        records = report.records.len(),
        failed = report.failed_items,
        cleanup_failures = report.cleanup_failures.len(),
        "read run finished"
    );

    Ok(report)
}

async fn read_one<D: DatabaseDriver, R: InputRecord>(
    driver: &D,
    config: &ConnectionConfig,
    index: usize,
    record: &R,
    options: RunOptions,
    cleanup_failures: &mut Vec<CleanupFailure>,
) -> Result<Vec<OutputRecord>> {
    let plan = record.to_request()?.plan()?;
    guard::enforce(&plan.query, config.engine, options.strict_fragments)?;

    let mut client = DataClient::new(driver, config.clone());
    client.connect().await?;

    let rows = client.select(&plan.query).await;

    if let Some(mut failure) = client.disconnect().await {
        failure.item = Some(index);
        cleanup_failures.push(failure);
    }

    let rows = rows?;
    tracing::debug!(item = index, rows = rows.len(), table = %plan.info.table_name, "read complete");

    Ok(shape_rows(index, &plan.info, rows, plan.shape, Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockDriver;
    use crate::engine::Row;
    use crate::request::{parse_records, ReadRequest};
    use serde_json::json;
    use std::path::PathBuf;

    fn config() -> ConnectionConfig {
        ConnectionConfig::sqlite(PathBuf::from(":memory:"))
    }

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| {
                let mut row = Row::new();
                row.insert("ID".to_string(), json!(i));
                row
            })
            .collect()
    }

    fn continuing() -> RunOptions {
        RunOptions { continue_on_fail: true, ..Default::default() }
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let driver = MockDriver::new();
        let requests: Vec<ReadRequest> = Vec::new();
        let err = run_reads(&driver, &config(), &requests, RunOptions::default()).await.unwrap_err();
        assert!(err.message().contains("No input data provided"));
    }

    #[tokio::test]
    async fn test_each_record_gets_its_own_connection() {
        let driver = MockDriver::new().with_rows(rows(2));
        let requests = vec![ReadRequest::get_all("A"), ReadRequest::get_all("B")];

        let report = run_reads(&driver, &config(), &requests, RunOptions::default()).await.unwrap();

        assert_eq!(report.records.len(), 4);
        assert_eq!(report.records.iter().map(|r| r.item).collect::<Vec<_>>(), vec![0, 0, 1, 1]);
        let journal = driver.journal();
        assert_eq!(journal.connect_attempts, 2);
        assert_eq!(journal.disconnects, 2);
        assert_eq!(journal.statements, vec!["SELECT * FROM A", "SELECT * FROM B"]);
    }

    #[tokio::test]
    async fn test_connect_failure_continue_mode() {
        let driver = MockDriver::new().with_rows(rows(1)).failing_connect_on(&[0, 2]);
        let requests =
            vec![ReadRequest::get_all("A"), ReadRequest::get_all("B"), ReadRequest::get_all("C")];

        let report = run_reads(&driver, &config(), &requests, continuing()).await.unwrap();

        assert_eq!(report.records.len(), 3);
        assert_eq!(report.failed_items, 2);
        assert_eq!(report.records[0].json["error"]["itemIndex"], json!(0));
        assert_eq!(report.records[0].json["error"]["type"], json!("ConnectionError"));
        assert_eq!(report.records[1].json["ID"], json!(0));
        assert_eq!(report.records[2].json["error"]["itemIndex"], json!(2));
        assert_eq!(driver.journal().statements, vec!["SELECT * FROM B"]);
    }

    #[tokio::test]
    async fn test_connect_failure_halts_without_continue() {
        let driver = MockDriver::new().failing_connect_on(&[1]);
        let requests =
            vec![ReadRequest::get_all("A"), ReadRequest::get_all("B"), ReadRequest::get_all("C")];

        let err = run_reads(&driver, &config(), &requests, RunOptions::default()).await.unwrap_err();

        assert_eq!(err.item_index(), Some(1));
        assert_eq!(err.error_code(), "CONNECTION_FAILED");
        assert_eq!(driver.journal().connect_attempts, 2);
        assert_eq!(driver.journal().statements, vec!["SELECT * FROM A"]);
    }

    #[tokio::test]
    async fn test_failed_query_still_disconnects() {
        let driver = MockDriver::new().failing_exec("table not found");
        let requests = vec![ReadRequest::get_all("MISSING")];

        let err = run_reads(&driver, &config(), &requests, RunOptions::default()).await.unwrap_err();

        assert_eq!(err.error_code(), "QUERY_FAILED");
        let journal = driver.journal();
        assert_eq!(journal.connect_attempts, 1);
        assert_eq!(journal.disconnects, 1);
    }

    #[tokio::test]
    async fn test_disconnect_failure_does_not_change_outcome() {
        let driver = MockDriver::new().with_rows(rows(3)).failing_disconnect("reset by peer");
        let requests = vec![ReadRequest::get_all("A").with_array_format(true)];

        let report = run_reads(&driver, &config(), &requests, RunOptions::default()).await.unwrap();

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].json["rowCount"], json!(3));
        assert_eq!(report.failed_items, 0);
        assert_eq!(report.cleanup_failures.len(), 1);
        assert_eq!(report.cleanup_failures[0].item, Some(0));
    }

    #[tokio::test]
    async fn test_validation_errors_skip_connection() {
        let driver = MockDriver::new();
        let mut unknown = ReadRequest::get_all("A");
        unknown.operation = "truncate".to_string();
        let requests = vec![unknown, ReadRequest::filtered("B", "  ")];

        let report = run_reads(&driver, &config(), &requests, continuing()).await.unwrap();

        assert_eq!(report.records[0].json["error"]["type"], json!("UnknownOperationError"));
        assert_eq!(report.records[1].json["error"]["type"], json!("ValidationError"));
        assert_eq!(driver.journal().connect_attempts, 0);
    }

    #[tokio::test]
    async fn test_strict_fragments_reject_before_connect() {
        let driver = MockDriver::new();
        let requests = vec![ReadRequest::filtered("T", "1=1; DROP TABLE T")];
        let options = RunOptions { strict_fragments: true, ..Default::default() };

        let err = run_reads(&driver, &config(), &requests, options).await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
        assert_eq!(driver.journal().connect_attempts, 0);

        let report = run_reads(&driver, &config(), &requests, RunOptions::default()).await.unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(driver.journal().statements, vec!["SELECT * FROM T WHERE 1=1; DROP TABLE T"]);
    }

    #[tokio::test]
    async fn test_empty_result_row_expansion() {
        let driver = MockDriver::new();
        let requests = vec![ReadRequest::get_all("EMPTY")];

        let report = run_reads(&driver, &config(), &requests, RunOptions::default()).await.unwrap();

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].json["rowCount"], json!(0));
        assert_eq!(report.records[0].json["message"], json!("No records found"));
    }

    #[tokio::test]
    async fn test_mistyped_record_fails_alone_in_continue_mode() {
        let driver = MockDriver::new().with_rows(rows(1));
        let records = parse_records(
            r#"[{"tableName":"A"},{"tableName":"B","limit":"10"},{"tableName":"C"}]"#,
        )
        .unwrap();

        let report = run_reads(&driver, &config(), &records, continuing()).await.unwrap();

        assert_eq!(report.records.len(), 3);
        assert_eq!(report.records.iter().map(|r| r.item).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(report.failed_items, 1);

        let error = &report.records[1].json["error"];
        assert_eq!(error["type"], json!("ValidationError"));
        assert_eq!(error["itemIndex"], json!(1));
        assert!(error["message"].as_str().unwrap().contains("Invalid input record"));

        assert_eq!(report.records[0].json["ID"], json!(0));
        assert_eq!(report.records[2].json["ID"], json!(0));
        let journal = driver.journal();
        assert_eq!(journal.statements, vec!["SELECT * FROM A", "SELECT * FROM C"]);
        assert_eq!(journal.disconnects, 2);
    }

    #[tokio::test]
    async fn test_mistyped_record_halts_with_its_index() {
        let driver = MockDriver::new();
        let records = parse_records(
            "{\"tableName\":\"A\"}\n{\"tableName\":\"B\",\"includeMetadata\":\"yes\"}\n{\"tableName\":\"C\"}",
        )
        .unwrap();

        let err = run_reads(&driver, &config(), &records, RunOptions::default()).await.unwrap_err();

        assert_eq!(err.item_index(), Some(1));
        assert_eq!(err.error_code(), "INVALID_INPUT");
        assert_eq!(driver.journal().connect_attempts, 1);
    }
}
