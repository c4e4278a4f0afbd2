//! Query Executor
//!
//! Runs a validated read-only statement with row and size truncation and
//! normalizes driver values to JSON-safe primitives. Driver errors are
//! surfaced inside the result, never as a crash; the read-only prefix check
//! is a last-resort backstop behind the response guard.

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Statement verbs rejected by the write guard.
const FORBIDDEN_VERBS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE",
];

pub const WRITE_REJECTED_MESSAGE: &str = "write operations not allowed";

/// A single cell as handed over by the database driver, before JSON
/// normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Arbitrary-precision decimal carried as its string form
    Decimal(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

/// Column-ordered rows from one fetch.
#[derive(Debug, Clone, Default)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// Database access seam. Implementations fetch at most `limit` rows;
/// connection handling is theirs.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    async fn fetch(&self, sql: &str, limit: usize) -> Result<QueryRows>;
}

/// Result of one bounded execution. Created fresh per call, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub data: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: usize,
    pub is_truncated: bool,
    pub truncation_reason: Option<String>,
    pub error: Option<String>,
    pub latency_ms: u64,
}

impl ExecutionResult {
    pub fn empty_success() -> Self {
        Self {
            data: Vec::new(),
            row_count: 0,
            is_truncated: false,
            truncation_reason: None,
            error: None,
            latency_ms: 0,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            data: Vec::new(),
            row_count: 0,
            is_truncated: false,
            truncation_reason: None,
            error: Some(message.into()),
            latency_ms: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Normalize a driver value to a JSON-safe primitive: temporal values become
/// ISO-8601 strings, decimals become floats, everything else passes through.
fn normalize(value: SqlValue) -> serde_json::Value {
    match value {
        SqlValue::Null => serde_json::Value::Null,
        SqlValue::Bool(b) => serde_json::Value::Bool(b),
        SqlValue::Int(i) => serde_json::Value::Number(i.into()),
        SqlValue::Float(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        SqlValue::Text(s) => serde_json::Value::String(s),
        SqlValue::Decimal(d) => match d.parse::<f64>() {
            Ok(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(d)),
            Err(_) => serde_json::Value::String(d),
        },
        SqlValue::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
        SqlValue::DateTime(dt) => {
            serde_json::Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        }
    }
}

/// Bounded, read-only query execution.
pub struct QueryExecutor {
    db: Arc<dyn DatabaseClient>,
    max_rows: usize,
    char_limit: usize,
}

impl QueryExecutor {
    pub fn new(db: Arc<dyn DatabaseClient>, max_rows: usize, char_limit: usize) -> Self {
        Self {
            db,
            max_rows,
            char_limit,
        }
    }

    /// First-token check over the upper-cased statement, so a write verb is
    /// caught whatever whitespace follows it. Not a parser.
    pub fn is_read_only(sql: &str) -> bool {
        let verb = sql
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_uppercase();
        !FORBIDDEN_VERBS.contains(&verb.as_str())
    }

    /// Execute with truncation. Fetches `max_rows + 1` so the presence of the
    /// extra row marks row-limit truncation; serialized size over the char
    /// budget marks truncation independently - the two conditions are OR'd.
    pub async fn execute(&self, sql: &str) -> ExecutionResult {
        if !Self::is_read_only(sql) {
            warn!("rejected write statement: {}", sql);
            return ExecutionResult::failed(WRITE_REJECTED_MESSAGE);
        }

        let started = std::time::Instant::now();
        let fetched = match self.db.fetch(sql, self.max_rows + 1).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("query execution failed: {}", e);
                let mut result = ExecutionResult::failed(e.to_string());
                result.latency_ms = started.elapsed().as_millis() as u64;
                return result;
            }
        };

        let mut rows = fetched.rows;
        let mut reasons = Vec::new();
        if rows.len() > self.max_rows {
            rows.truncate(self.max_rows);
            reasons.push(format!("row limit ({})", self.max_rows));
        }

        let data: Vec<serde_json::Map<String, serde_json::Value>> = rows
            .into_iter()
            .map(|row| {
                fetched
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.into_iter().map(normalize))
                    .collect()
            })
            .collect();

        let serialized_len = serde_json::to_string(&data).map(|s| s.len()).unwrap_or(0);
        if serialized_len > self.char_limit {
            reasons.push(format!("size limit ({} chars)", self.char_limit));
        }

        debug!(
            "executed query: {} rows, {} serialized chars",
            data.len(),
            serialized_len
        );

        ExecutionResult {
            row_count: data.len(),
            is_truncated: !reasons.is_empty(),
            truncation_reason: if reasons.is_empty() {
                None
            } else {
                Some(reasons.join(" and "))
            },
            data,
            error: None,
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// `DatabaseClient` over a sqlx Postgres pool, decoding by column type name.
pub struct PgDatabaseClient {
    pool: sqlx::PgPool,
}

impl PgDatabaseClient {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| EngineError::Execution(format!("database connect failed: {}", e)))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

/// Collect at most `limit` rows from a fallible row stream without pulling
/// the remainder over the wire.
async fn take_rows<S, T, E>(mut stream: S, limit: usize) -> std::result::Result<Vec<T>, E>
where
    S: futures::Stream<Item = std::result::Result<T, E>> + Unpin,
{
    use futures::TryStreamExt;

    let mut rows = Vec::with_capacity(limit);
    while rows.len() < limit {
        match stream.try_next().await? {
            Some(row) => rows.push(row),
            None => break,
        }
    }
    Ok(rows)
}

fn decode_pg_value(row: &sqlx::postgres::PgRow, index: usize) -> SqlValue {
    use sqlx::{Column, Row, TypeInfo};

    let type_name = row.columns()[index].type_info().name().to_uppercase();
    match type_name.as_str() {
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| SqlValue::Int(v as i64))
            .unwrap_or(SqlValue::Null),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| SqlValue::Int(v as i64))
            .unwrap_or(SqlValue::Null),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Null),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| SqlValue::Float(v as f64))
            .unwrap_or(SqlValue::Null),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(SqlValue::Float)
            .unwrap_or(SqlValue::Null),
        "NUMERIC" => row
            .try_get::<Option<sqlx::types::BigDecimal>, _>(index)
            .ok()
            .flatten()
            .map(|v| SqlValue::Decimal(v.to_string()))
            .unwrap_or(SqlValue::Null),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)
            .ok()
            .flatten()
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .ok()
            .flatten()
            .map(|v| SqlValue::DateTime(v.naive_utc()))
            .unwrap_or(SqlValue::Null),
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(SqlValue::Text)
            .unwrap_or(SqlValue::Null),
    }
}

#[async_trait]
impl DatabaseClient for PgDatabaseClient {
    async fn fetch(&self, sql: &str, limit: usize) -> Result<QueryRows> {
        use sqlx::{Column, Row};

        let stream = sqlx::query(sql).fetch(&self.pool);
        let pg_rows = take_rows(stream, limit)
            .await
            .map_err(|e: sqlx::Error| EngineError::Execution(e.to_string()))?;

        let columns = pg_rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let rows = pg_rows
            .iter()
            .map(|row| {
                (0..row.columns().len())
                    .map(|i| decode_pg_value(row, i))
                    .collect()
            })
            .collect();

        Ok(QueryRows { columns, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRows {
        rows: Vec<Vec<SqlValue>>,
        columns: Vec<String>,
        fail_with: Option<String>,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl FixedRows {
        fn new(columns: Vec<&str>, rows: Vec<Vec<SqlValue>>) -> Self {
            Self {
                rows,
                columns: columns.into_iter().map(String::from).collect(),
                fail_with: None,
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                rows: Vec::new(),
                columns: Vec::new(),
                fail_with: Some(message.to_string()),
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DatabaseClient for FixedRows {
        async fn fetch(&self, _sql: &str, limit: usize) -> Result<QueryRows> {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if let Some(ref msg) = self.fail_with {
                return Err(EngineError::Execution(msg.clone()));
            }
            Ok(QueryRows {
                columns: self.columns.clone(),
                rows: self.rows.iter().take(limit).cloned().collect(),
            })
        }
    }

    fn int_rows(n: usize) -> Vec<Vec<SqlValue>> {
        (0..n).map(|i| vec![SqlValue::Int(i as i64)]).collect()
    }

    #[tokio::test]
    async fn write_statement_is_rejected_without_db_call() {
        let db = Arc::new(FixedRows::new(vec!["ord_id"], int_rows(1)));
        let executor = QueryExecutor::new(db.clone(), 10, 12_000);

        let result = executor.execute("DELETE FROM T_Ord_Main").await;
        assert_eq!(result.error.as_deref(), Some(WRITE_REJECTED_MESSAGE));
        assert!(result.data.is_empty());
        assert_eq!(db.call_count(), 0);
    }

    #[tokio::test]
    async fn eleven_rows_truncate_to_ten() {
        let db = Arc::new(FixedRows::new(vec!["ord_id"], int_rows(11)));
        let executor = QueryExecutor::new(db, 10, 12_000);

        let result = executor.execute("SELECT ord_id FROM dbo.T_Ord_Main").await;
        assert!(result.is_truncated);
        assert_eq!(result.row_count, 10);
        assert_eq!(result.data.len(), 10);
        assert_eq!(
            result.data[9].get("ord_id"),
            Some(&serde_json::Value::Number(9.into()))
        );
        assert!(result.truncation_reason.unwrap().contains("row limit"));
    }

    #[tokio::test]
    async fn ten_rows_are_not_truncated() {
        let db = Arc::new(FixedRows::new(vec!["ord_id"], int_rows(10)));
        let executor = QueryExecutor::new(db, 10, 12_000);

        let result = executor.execute("SELECT ord_id FROM dbo.T_Ord_Main").await;
        assert!(!result.is_truncated);
        assert_eq!(result.row_count, 10);
        assert!(result.truncation_reason.is_none());
    }

    #[tokio::test]
    async fn oversized_serialization_marks_truncation() {
        // 3 rows, each with a ~6000-char text cell: under the row limit but
        // over the 12000-char budget
        let big = "x".repeat(6_000);
        let rows = (0..3)
            .map(|_| vec![SqlValue::Text(big.clone())])
            .collect();
        let db = Arc::new(FixedRows::new(vec!["notes"], rows));
        let executor = QueryExecutor::new(db, 10, 12_000);

        let result = executor.execute("SELECT notes FROM dbo.T_Ord_Main").await;
        assert!(result.is_truncated);
        assert_eq!(result.row_count, 3);
        assert!(result.truncation_reason.unwrap().contains("size limit"));
    }

    #[tokio::test]
    async fn temporal_and_decimal_values_are_normalized() {
        let rows = vec![vec![
            SqlValue::Date(NaiveDate::from_ymd_opt(2026, 8, 27).unwrap()),
            SqlValue::DateTime(
                NaiveDate::from_ymd_opt(2026, 8, 27)
                    .unwrap()
                    .and_hms_opt(10, 30, 0)
                    .unwrap(),
            ),
            SqlValue::Decimal("1234.5600".to_string()),
            SqlValue::Null,
        ]];
        let db = Arc::new(FixedRows::new(
            vec!["ord_date", "created_at", "amount", "remarks"],
            rows,
        ));
        let executor = QueryExecutor::new(db, 10, 12_000);

        let result = executor.execute("SELECT * FROM dbo.T_Ord_Main").await;
        let row = &result.data[0];
        assert_eq!(
            row.get("ord_date"),
            Some(&serde_json::Value::String("2026-08-27".to_string()))
        );
        assert_eq!(
            row.get("created_at"),
            Some(&serde_json::Value::String("2026-08-27T10:30:00".to_string()))
        );
        assert_eq!(
            row.get("amount").and_then(|v| v.as_f64()),
            Some(1234.56)
        );
        assert_eq!(row.get("remarks"), Some(&serde_json::Value::Null));
    }

    #[tokio::test]
    async fn driver_error_is_surfaced_not_propagated() {
        let db = Arc::new(FixedRows::failing("Invalid column name 'bad_col'"));
        let executor = QueryExecutor::new(db, 10, 12_000);

        let result = executor.execute("SELECT bad_col FROM dbo.T_Ord_Main").await;
        assert!(result.error.unwrap().contains("Invalid column name"));
        assert!(result.data.is_empty());
    }

    #[test]
    fn read_only_check_is_first_token_based() {
        assert!(QueryExecutor::is_read_only("SELECT * FROM t"));
        assert!(QueryExecutor::is_read_only("  select 1"));
        assert!(!QueryExecutor::is_read_only("INSERT INTO t VALUES (1)"));
        assert!(!QueryExecutor::is_read_only("truncate table t"));
        // First token only: a SELECT mentioning DELETE in a literal passes
        assert!(QueryExecutor::is_read_only(
            "SELECT * FROM t WHERE action = 'DELETE '"
        ));
    }

    #[test]
    fn write_verb_followed_by_any_whitespace_is_rejected() {
        assert!(!QueryExecutor::is_read_only("DELETE\nFROM t"));
        assert!(!QueryExecutor::is_read_only("delete\tfrom t"));
        assert!(!QueryExecutor::is_read_only("UPDATE\n  t SET x = 1"));
        assert!(!QueryExecutor::is_read_only("DELETE"));
    }

    #[tokio::test]
    async fn row_stream_stops_pulling_at_limit() {
        use futures::StreamExt;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let stream = futures::stream::iter(0..100).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<i64, EngineError>(i)
        });

        let rows = take_rows(Box::pin(stream), 11).await.unwrap();
        assert_eq!(rows.len(), 11);
        assert_eq!(pulled.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn row_stream_shorter_than_limit_returns_all_rows() {
        let stream = futures::stream::iter((0..3).map(Ok::<i64, EngineError>));
        let rows = take_rows(Box::pin(stream), 11).await.unwrap();
        assert_eq!(rows, vec![0, 1, 2]);
    }
}
