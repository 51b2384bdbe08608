//! DuckDB record store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

use crate::dialect::DuckDbDialect;
use crate::error::{HarnessError, Result};

use super::{parse_record_data, raw_records_sql, RecordStore};

/// Reads raw tables from a DuckDB database file.
#[derive(Clone)]
pub struct DuckDbRecordStore {
    database_path: PathBuf,
    default_schema: String,
    dialect: DuckDbDialect,
    max_concurrency: usize,
    limiter: Arc<Semaphore>,
    idle: Arc<Mutex<Vec<duckdb::Connection>>>,
}

const DEFAULT_MAX_CONCURRENCY: usize = 16;

impl DuckDbRecordStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            database_path: path.as_ref().to_path_buf(),
            default_schema: "main".to_string(),
            dialect: DuckDbDialect,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            limiter: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENCY)),
            idle: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure maximum concurrent reads.
    pub fn with_max_concurrency(mut self, max_in_flight: usize) -> Self {
        self.max_concurrency = max_in_flight.max(1);
        self.limiter = Arc::new(Semaphore::new(self.max_concurrency));
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = schema.into();
        self
    }

    /// A read slot plus a connection, reused from the idle list when possible.
    /// Never creates the database file.
    async fn lease(&self) -> Result<(SemaphorePermit<'_>, duckdb::Connection)> {
        let permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| HarnessError::Retrieval(format!("read slots closed: {e}")))?;
        if let Some(conn) = self.idle.lock().await.pop() {
            return Ok((permit, conn));
        }
        if !self.database_path.is_file() {
            return Err(HarnessError::Retrieval(format!(
                "duckdb database not found: {}",
                self.database_path.display()
            )));
        }
        tracing::debug!(path = %self.database_path.display(), "opening DuckDB database");
        let conn = duckdb::Connection::open(&self.database_path)
            .map_err(|e| HarnessError::Retrieval(format!("open duckdb: {e}")))?;
        Ok((permit, conn))
    }
}

#[async_trait]
impl RecordStore for DuckDbRecordStore {
    fn default_namespace(&self) -> &str {
        &self.default_schema
    }

    async fn fetch_records(&self, stream: &str, namespace: Option<&str>) -> Result<Vec<Value>> {
        let sql = raw_records_sql(&self.dialect, &self.default_schema, stream, namespace);
        let (_permit, conn) = self.lease().await?;
        let stream_name = stream.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            let records = read_raw_rows(&conn, &sql);
            tracing::debug!(
                stream = stream_name.as_str(),
                ok = records.is_ok(),
                ms = start.elapsed().as_millis(),
                "duckdb fetch_records"
            );
            (records, conn)
        })
        .await
        .map_err(|e| HarnessError::Retrieval(format!("task join error: {e}")))?;

        let (records, conn) = result;
        self.idle.lock().await.push(conn);
        records.map_err(|e| match e {
            HarnessError::Retrieval(_) => e,
            other => HarnessError::Retrieval(format!("stream {stream}: {other}")),
        })
    }
}

fn read_raw_rows(conn: &duckdb::Connection, sql: &str) -> Result<Vec<Value>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let raw: Option<String> = row.get(0)?;
        records.push(parse_record_data(raw)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_limit_is_at_least_one() {
        let store = DuckDbRecordStore::new("/tmp/dest.duckdb");
        assert_eq!(store.max_concurrency(), DEFAULT_MAX_CONCURRENCY);
        let store = store.with_max_concurrency(0);
        assert_eq!(store.max_concurrency(), 1);
        assert_eq!(store.limiter.available_permits(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.duckdb");
        let store = DuckDbRecordStore::new(&path);
        let err = store.fetch_records("users", None).await.unwrap_err();
        assert!(matches!(err, HarnessError::Retrieval(_)));
        assert!(!path.exists());
    }
}
