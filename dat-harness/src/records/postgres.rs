//! PostgreSQL record store.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::dialect::PostgresDialect;
use crate::error::{HarnessError, Result};

use super::{parse_record_data, raw_records_sql, RecordStore};

pub struct PostgresRecordStore {
    pool: deadpool_postgres::Pool,
    default_schema: String,
    dialect: PostgresDialect,
}

impl PostgresRecordStore {
    /// Create a record store from a connection string, either a `postgres://` URL or
    /// libpq-style `key=value` pairs. No connection is opened until the first read.
    pub fn new(connection_string: &str, default_schema: &str) -> Result<Self> {
        let pool = pool_config(connection_string)?
            .create_pool(
                Some(deadpool_postgres::Runtime::Tokio1),
                tokio_postgres::NoTls,
            )
            .map_err(|e| HarnessError::Config(format!("create postgres pool: {e}")))?;
        tracing::info!(schema = %default_schema, "using PostgreSQL record store");
        Ok(Self {
            pool,
            default_schema: default_schema.to_string(),
            dialect: PostgresDialect,
        })
    }
}

fn pool_config(connection_string: &str) -> Result<deadpool_postgres::Config> {
    let mut cfg = deadpool_postgres::Config::new();
    let trimmed = connection_string.trim();
    if trimmed.starts_with("postgres://") || trimmed.starts_with("postgresql://") {
        cfg.url = Some(trimmed.to_string());
        return Ok(cfg);
    }
    for pair in trimmed.split_whitespace() {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            HarnessError::Config(format!("malformed connection parameter {pair:?}"))
        })?;
        match key {
            "host" => cfg.host = Some(value.to_string()),
            "port" => {
                let port = value
                    .parse()
                    .map_err(|_| HarnessError::Config(format!("invalid port {value:?}")))?;
                cfg.port = Some(port);
            }
            "user" => cfg.user = Some(value.to_string()),
            "password" => cfg.password = Some(value.to_string()),
            "dbname" => cfg.dbname = Some(value.to_string()),
            other => tracing::warn!(key = other, "ignoring connection parameter"),
        }
    }
    Ok(cfg)
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    fn default_namespace(&self) -> &str {
        &self.default_schema
    }

    async fn fetch_records(&self, stream: &str, namespace: Option<&str>) -> Result<Vec<Value>> {
        let start = Instant::now();
        let sql = raw_records_sql(&self.dialect, &self.default_schema, stream, namespace);
        let client = self.pool.get().await.map_err(|e| {
            tracing::error!(error = %e, "failed to get PostgreSQL connection");
            HarnessError::Retrieval(format!("get postgres connection: {e}"))
        })?;

        tracing::trace!(sql = %sql, "reading raw records");
        let rows = client.query(sql.as_str(), &[]).await.map_err(|e| {
            tracing::error!(error = %e, stream, "PostgreSQL raw record query failed");
            HarnessError::Retrieval(format!("stream {stream}: {e}"))
        })?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw: Option<String> = row
                .try_get(0)
                .map_err(|e| HarnessError::Retrieval(format!("read {stream} row: {e}")))?;
            records.push(parse_record_data(raw)?);
        }

        tracing::debug!(
            stream,
            rows = records.len(),
            ms = start.elapsed().as_millis(),
            "postgres fetch_records"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_connection_strings() {
        let cfg = pool_config("host=db port=5433 user=airbyte dbname=dest sslmode=off").unwrap();
        assert_eq!(cfg.host.as_deref(), Some("db"));
        assert_eq!(cfg.port, Some(5433));
        assert_eq!(cfg.user.as_deref(), Some("airbyte"));
        assert_eq!(cfg.dbname.as_deref(), Some("dest"));
        assert!(cfg.url.is_none());
    }

    #[test]
    fn keeps_urls_whole() {
        let cfg = pool_config("postgresql://u:p@db/dest").unwrap();
        assert_eq!(cfg.url.as_deref(), Some("postgresql://u:p@db/dest"));
    }

    #[test]
    fn rejects_malformed_parameters() {
        assert!(matches!(pool_config("host"), Err(HarnessError::Config(_))));
        assert!(matches!(
            pool_config("port=fivefourthreetwo"),
            Err(HarnessError::Config(_))
        ));
    }

    #[tokio::test]
    async fn store_reads_namespaced_raw_tables() {
        let store = PostgresRecordStore::new("host=localhost dbname=dest", "public").unwrap();
        assert_eq!(store.default_namespace(), "public");
        let sql = raw_records_sql(&store.dialect, store.default_namespace(), "Users", None);
        assert_eq!(
            sql,
            "SELECT \"_airbyte_data\"::text AS \"_airbyte_data\" \
             FROM \"public\".\"_airbyte_raw_users\" ORDER BY \"_airbyte_emitted_at\" ASC"
        );
    }
}
