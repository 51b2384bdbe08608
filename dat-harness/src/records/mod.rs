//! Reading back what a destination wrote.
//!
//! Destinations store every record in a raw table named `_airbyte_raw_<stream>` inside the
//! stream's namespace, with the record JSON in `_airbyte_data` and the emission time in
//! `_airbyte_emitted_at`. Each store is implemented in its own file and gated behind a
//! feature flag.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{RecordStoreKind, RecordsConfig};
use crate::dialect::Dialect;
use crate::error::{HarnessError, Result};

mod compare;
pub use compare::{compare_records, prune_internal_fields, RecordComparison};

pub const RAW_TABLE_PREFIX: &str = "_airbyte_raw_";
pub const COLUMN_AB_ID: &str = "_airbyte_ab_id";
pub const COLUMN_DATA: &str = "_airbyte_data";
pub const COLUMN_EMITTED_AT: &str = "_airbyte_emitted_at";

/// Read access to a destination's storage.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Schema used when a stream has no namespace.
    fn default_namespace(&self) -> &str;

    /// Every record stored for the stream, oldest first. A missing raw table is an error.
    async fn fetch_records(&self, stream: &str, namespace: Option<&str>) -> Result<Vec<Value>>;
}

/// Build the store described by `[records]`; `None` when no store is configured.
pub fn from_config(config: &RecordsConfig) -> Result<Option<Arc<dyn RecordStore>>> {
    match config.kind {
        RecordStoreKind::None => Ok(None),
        RecordStoreKind::Duckdb => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| HarnessError::not_configured("records.path"))?;
            duckdb_store(path, config)
        }
        RecordStoreKind::Postgres => {
            let conn = config
                .connection_string
                .as_deref()
                .ok_or_else(|| HarnessError::not_configured("records.connection_string"))?;
            postgres_store(conn, config)
        }
    }
}

#[cfg(feature = "duckdb")]
fn duckdb_store(
    path: &std::path::Path,
    config: &RecordsConfig,
) -> Result<Option<Arc<dyn RecordStore>>> {
    let mut store = DuckDbRecordStore::new(path).with_max_concurrency(config.max_concurrency);
    if let Some(schema) = &config.default_schema {
        store = store.with_default_schema(schema.clone());
    }
    tracing::info!(
        path = %path.display(),
        schema = store.default_namespace(),
        max_concurrency = store.max_concurrency(),
        "using DuckDB record store"
    );
    Ok(Some(Arc::new(store)))
}

#[cfg(not(feature = "duckdb"))]
fn duckdb_store(
    _path: &std::path::Path,
    _config: &RecordsConfig,
) -> Result<Option<Arc<dyn RecordStore>>> {
    Err(HarnessError::Config(
        "duckdb record store requested but the duckdb feature is disabled".to_string(),
    ))
}

#[cfg(feature = "postgres")]
fn postgres_store(conn: &str, config: &RecordsConfig) -> Result<Option<Arc<dyn RecordStore>>> {
    let schema = config.default_schema.as_deref().unwrap_or("public");
    Ok(Some(Arc::new(PostgresRecordStore::new(conn, schema)?)))
}

#[cfg(not(feature = "postgres"))]
fn postgres_store(_conn: &str, _config: &RecordsConfig) -> Result<Option<Arc<dyn RecordStore>>> {
    Err(HarnessError::Config(
        "postgres record store requested but the postgres feature is disabled".to_string(),
    ))
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn normalize_identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

pub fn raw_table_name(stream: &str) -> String {
    format!("{RAW_TABLE_PREFIX}{}", normalize_identifier(stream))
}

/// Query returning the raw data column for a stream, ordered by emission time.
pub fn raw_records_sql(
    dialect: &(dyn Dialect + Send + Sync),
    default_namespace: &str,
    stream: &str,
    namespace: Option<&str>,
) -> String {
    let schema = match namespace {
        Some(ns) if !ns.is_empty() => dialect.apply_default_case(&normalize_identifier(ns)),
        _ => default_namespace.to_string(),
    };
    let table = dialect.apply_default_case(&raw_table_name(stream));
    format!(
        "SELECT {} AS {} FROM {} ORDER BY {} ASC",
        dialect.select_json(COLUMN_DATA),
        dialect.quote_ident(COLUMN_DATA),
        dialect.qualify_table(&schema, &table),
        dialect.quote_ident(COLUMN_EMITTED_AT),
    )
}

/// Decode one `_airbyte_data` cell.
pub(crate) fn parse_record_data(raw: Option<String>) -> Result<Value> {
    let raw = raw.ok_or_else(|| HarnessError::Retrieval(format!("null {COLUMN_DATA} value")))?;
    serde_json::from_str(&raw)
        .map_err(|e| HarnessError::Retrieval(format!("invalid JSON in {COLUMN_DATA}: {e}")))
}

#[cfg(feature = "duckdb")]
mod duckdb;
#[cfg(feature = "duckdb")]
pub use duckdb::DuckDbRecordStore;

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "postgres")]
pub use postgres::PostgresRecordStore;
