//! The externally configured test subject.
//!
//! Lets the generic acceptance suite run against a destination chosen at invocation time:
//! everything destination-specific comes from the [`TestConfiguration`] it was built with
//! and from an optional [`RecordStore`] used to read written records back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::TestConfiguration;
use crate::env::TestDestinationEnv;
use crate::error::{HarnessError, Result};
use crate::records::RecordStore;
use crate::subject::DestinationTestSubject;

const SCRATCH_DIR_PREFIX: &str = "destination-";

pub struct ExternallyConfiguredSubject {
    config: TestConfiguration,
    records: Option<Arc<dyn RecordStore>>,
    /// Scratch directories provisioned by `setup`, keyed by the env's local root.
    provisioned: Mutex<HashMap<PathBuf, PathBuf>>,
}

impl ExternallyConfiguredSubject {
    pub fn new(config: TestConfiguration) -> Self {
        Self {
            config,
            records: None,
            provisioned: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_record_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.records = Some(store);
        self
    }

    pub fn configuration(&self) -> &TestConfiguration {
        &self.config
    }

    /// Scratch directory `setup` provisioned for `env`, if any.
    pub fn scratch_dir(&self, env: &TestDestinationEnv) -> Option<PathBuf> {
        self.lock_provisioned()
            .ok()
            .and_then(|map| map.get(env.local_root()).cloned())
    }

    fn lock_provisioned(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<PathBuf, PathBuf>>> {
        self.provisioned
            .lock()
            .map_err(|_| HarnessError::Lifecycle("provisioned resource set poisoned".to_string()))
    }

    fn scratch_name(&self) -> String {
        let image = self.config.image_name.as_deref().unwrap_or("unnamed");
        let slug: String = image
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        format!("{SCRATCH_DIR_PREFIX}{slug}")
    }
}

/// Read a connector configuration document. Connector configs are JSON objects.
pub fn load_json_document(path: &Path) -> Result<Value> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| HarnessError::ResourceUnavailable {
            path: path.to_path_buf(),
            source: e,
        })?;
    let value: Value = serde_json::from_str(&contents)?;
    if !value.is_object() {
        return Err(HarnessError::Config(format!(
            "{} does not contain a JSON object",
            path.display()
        )));
    }
    tracing::debug!(path = %path.display(), "loaded connector configuration");
    Ok(value)
}

#[async_trait]
impl DestinationTestSubject for ExternallyConfiguredSubject {
    fn image_name(&self) -> Result<String> {
        self.config
            .image_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| HarnessError::not_configured("image_name"))
    }

    fn config(&self) -> Result<Value> {
        let path = self
            .config
            .config_path
            .as_deref()
            .ok_or_else(|| HarnessError::not_configured("config_path"))?;
        load_json_document(path)
    }

    fn fail_check_config(&self) -> Result<Value> {
        let path = self
            .config
            .fail_config_path
            .as_deref()
            .ok_or_else(|| HarnessError::not_configured("fail_config_path"))?;
        load_json_document(path)
    }

    async fn setup(&self, env: &TestDestinationEnv) -> Result<()> {
        let dir = env.local_root().join(self.scratch_name());
        tokio::fs::create_dir_all(&dir).await?;
        let previous = self
            .lock_provisioned()?
            .insert(env.local_root().to_path_buf(), dir.clone());
        if let Some(previous) = previous.filter(|p| *p != dir) {
            tracing::warn!(path = %previous.display(), "setup called twice, releasing earlier scratch dir");
            remove_dir_if_present(&previous).await?;
        }
        tracing::debug!(path = %dir.display(), "provisioned scratch dir");
        Ok(())
    }

    async fn tear_down(&self, env: &TestDestinationEnv) -> Result<()> {
        let dir = self.lock_provisioned()?.remove(env.local_root());
        match dir {
            Some(dir) => {
                remove_dir_if_present(&dir).await?;
                tracing::debug!(path = %dir.display(), "released scratch dir");
            }
            None => tracing::trace!("tear_down with nothing provisioned"),
        }
        Ok(())
    }

    async fn retrieve_records(
        &self,
        _env: &TestDestinationEnv,
        stream_name: &str,
        namespace: Option<&str>,
        _stream_schema: &Value,
    ) -> Result<Vec<Value>> {
        let store = self
            .records
            .as_ref()
            .ok_or_else(|| HarnessError::not_configured("record store"))?;
        let records = store
            .fetch_records(stream_name, namespace)
            .await
            .map_err(|e| match e {
                HarnessError::Retrieval(_) => e,
                other => HarnessError::Retrieval(other.to_string()),
            })?;
        tracing::info!(
            stream = stream_name,
            namespace = namespace.unwrap_or(store.default_namespace()),
            records = records.len(),
            "retrieved records"
        );
        Ok(records)
    }
}

async fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
