//! Per-case filesystem environment.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::Result;

/// What a test subject gets to see of the current case.
#[derive(Debug, Clone)]
pub struct TestDestinationEnv {
    local_root: PathBuf,
}

impl TestDestinationEnv {
    pub fn new(local_root: impl Into<PathBuf>) -> Self {
        Self {
            local_root: local_root.into(),
        }
    }

    /// Host directory a subject may use for local destination state.
    pub fn local_root(&self) -> &Path {
        &self.local_root
    }
}

/// Temporary local root for one case; removed on drop.
#[derive(Debug)]
pub struct TestWorkspace {
    root: TempDir,
    local_root: PathBuf,
}

impl TestWorkspace {
    pub fn create() -> Result<Self> {
        let root = tempfile::Builder::new().prefix("dat-harness-").tempdir()?;
        let local_root = root.path().join("local");
        std::fs::create_dir_all(&local_root)?;
        tracing::debug!(root = %root.path().display(), "created test workspace");
        Ok(Self { root, local_root })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn env(&self) -> TestDestinationEnv {
        TestDestinationEnv::new(&self.local_root)
    }
}
