use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("resource unavailable at {}: {source}", path.display())]
    ResourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("record retrieval failed: {0}")]
    Retrieval(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("destination launch error: {0}")]
    Launch(String),
    #[error("lifecycle error: {0}")]
    Lifecycle(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HarnessError {
    pub fn not_configured(what: impl Into<String>) -> Self {
        HarnessError::NotConfigured(what.into())
    }

    /// True for failures caused by the harness setup rather than by the destination.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            HarnessError::NotConfigured(_)
                | HarnessError::ResourceUnavailable { .. }
                | HarnessError::Config(_)
                | HarnessError::Json(_)
                | HarnessError::Yaml(_)
        )
    }
}
