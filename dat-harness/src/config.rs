//! Configuration for a harness run.
//!
//! The destination under test is chosen entirely from outside the process: a TOML or YAML
//! file, command-line flags and environment overrides all feed a [`HarnessConfig`], whose
//! [`TestConfiguration`] is handed to the adapter once, at construction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::runner::TestCase;

pub const CONFIG_ENV_VAR: &str = "DAT_HARNESS_CONFIG";
pub const IMAGE_NAME_ENV_VAR: &str = "DAT_IMAGE_NAME";
pub const CONFIG_PATH_ENV_VAR: &str = "DAT_CONFIG_PATH";
pub const FAIL_CONFIG_PATH_ENV_VAR: &str = "DAT_FAIL_CONFIG_PATH";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Which destination to test and where its connector configs live.
    pub test: TestConfiguration,
    pub docker: DockerConfig,
    pub records: RecordsConfig,
    pub runner: RunnerConfig,
}

/// Externally supplied description of the destination under test.
///
/// Every field is optional at the type level. Accessors on the adapter report
/// [`HarnessError::NotConfigured`] for a field that is needed but absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TestConfiguration {
    /// Container image of the destination, e.g. `vendor/destination-foo:1.0`.
    #[serde(alias = "imageName")]
    pub image_name: Option<String>,
    /// JSON connector configuration expected to pass the connection check.
    #[serde(alias = "configPath")]
    pub config_path: Option<PathBuf>,
    /// JSON connector configuration expected to fail the connection check.
    #[serde(alias = "failConfigPath")]
    pub fail_config_path: Option<PathBuf>,
    /// Configured catalog for the round-trip case (built-in fixture when absent).
    #[serde(alias = "catalogPath")]
    pub catalog_path: Option<PathBuf>,
    /// JSON-lines protocol messages for the round-trip case (built-in fixture when absent).
    #[serde(alias = "messagesPath")]
    pub messages_path: Option<PathBuf>,
}

/// How destination containers are launched.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Container runtime binary (default: `docker`).
    pub binary: String,
    /// Network to attach the container to.
    pub network: Option<String>,
    /// Per-command timeout in milliseconds (default: 300000).
    pub timeout_ms: u64,
    /// Extra arguments inserted before the image name.
    pub extra_args: Vec<String>,
}

/// Where `retrieve_records` reads written records from.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecordsConfig {
    pub kind: RecordStoreKind,
    /// DuckDB database file.
    pub path: Option<PathBuf>,
    /// PostgreSQL connection string (URL or key-value form).
    pub connection_string: Option<String>,
    /// Schema used for streams without a namespace.
    pub default_schema: Option<String>,
    /// Maximum concurrent queries (default: 16).
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStoreKind {
    #[default]
    None,
    #[serde(alias = "duck_db")]
    Duckdb,
    Postgres,
}

/// Which cases run and how failures are handled.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Cases to run, in order (default: all).
    pub cases: Vec<TestCase>,
    /// Stop after the first failing case (default: false).
    pub fail_fast: bool,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            network: None,
            timeout_ms: 300_000,
            extra_args: Vec::new(),
        }
    }
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            kind: RecordStoreKind::None,
            path: None,
            connection_string: None,
            default_schema: None,
            max_concurrency: 16,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cases: TestCase::ALL.to_vec(),
            fail_fast: false,
        }
    }
}

impl TestConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image_name(mut self, image: impl Into<String>) -> Self {
        self.image_name = Some(image.into());
        self
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_fail_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fail_config_path = Some(path.into());
        self
    }

    pub fn with_fixtures(
        mut self,
        catalog_path: impl Into<PathBuf>,
        messages_path: impl Into<PathBuf>,
    ) -> Self {
        self.catalog_path = Some(catalog_path.into());
        self.messages_path = Some(messages_path.into());
        self
    }

    /// Catalog and messages paths, if custom fixtures were configured.
    pub fn fixture_paths(&self) -> Result<Option<(&Path, &Path)>> {
        match (&self.catalog_path, &self.messages_path) {
            (Some(catalog), Some(messages)) => Ok(Some((catalog.as_path(), messages.as_path()))),
            (None, None) => Ok(None),
            (Some(_), None) => Err(HarnessError::Config(
                "catalog_path is set but messages_path is not".to_string(),
            )),
            (None, Some(_)) => Err(HarnessError::Config(
                "messages_path is set but catalog_path is not".to_string(),
            )),
        }
    }

    /// Replace file values with `DAT_IMAGE_NAME`, `DAT_CONFIG_PATH` and
    /// `DAT_FAIL_CONFIG_PATH` when they are set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with a custom lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(image) = non_empty(IMAGE_NAME_ENV_VAR) {
            tracing::debug!(image = %image, "image name overridden from environment");
            self.image_name = Some(image);
        }
        if let Some(path) = non_empty(CONFIG_PATH_ENV_VAR) {
            tracing::debug!(path = %path, "config path overridden from environment");
            self.config_path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty(FAIL_CONFIG_PATH_ENV_VAR) {
            tracing::debug!(path = %path, "fail config path overridden from environment");
            self.fail_config_path = Some(PathBuf::from(path));
        }
    }

    /// Resolve relative paths against `base` (the directory of the config file).
    pub fn resolve_relative_to(&mut self, base: &Path) {
        for path in [
            &mut self.config_path,
            &mut self.fail_config_path,
            &mut self.catalog_path,
            &mut self.messages_path,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a file. `.yml`/`.yaml` files are parsed as YAML, anything
    /// else as TOML. Relative paths in `[test]` resolve against the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| HarnessError::ResourceUnavailable {
                path: path.to_path_buf(),
                source: e,
            })?;
        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yml") | Some("yaml")
        );
        let mut cfg = if is_yaml {
            Self::from_yaml(&contents)?
        } else {
            Self::from_toml(&contents)?
        };
        if let Some(parent) = path.parent() {
            cfg.test.resolve_relative_to(parent);
        }
        Ok(cfg)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| HarnessError::Config(format!("failed to parse config: {e}")))
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml_str)?)
    }

    /// Load from default locations (env var, cwd, user config dir, or defaults).
    ///
    /// Search order:
    /// 1. `DAT_HARNESS_CONFIG` environment variable
    /// 2. `./dat-harness.toml` (current directory)
    /// 3. `~/.config/dat-harness/config.toml` (user config dir)
    /// 4. Built-in defaults
    ///
    /// An explicit `DAT_HARNESS_CONFIG` that cannot be loaded is an error.
    pub fn load_default() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let cfg = Self::from_file(&path)?;
            tracing::info!(path = %path, "loaded config from {CONFIG_ENV_VAR}");
            return Ok(cfg);
        }

        let local = Path::new("dat-harness.toml");
        if local.exists() {
            let cfg = Self::from_file(local)?;
            tracing::info!("loaded config from ./dat-harness.toml");
            return Ok(cfg);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("dat-harness").join("config.toml");
            if user_config.exists() {
                let cfg = Self::from_file(&user_config)?;
                tracing::info!(path = %user_config.display(), "loaded config from user config dir");
                return Ok(cfg);
            }
        }

        tracing::debug!("no config file found, using defaults");
        Ok(Self::default())
    }
}
