//! Shared fakes for the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dat_harness::protocol::{AirbyteMessage, ConfiguredCatalog, ConnectionStatus, MessageType};
use dat_harness::{DestinationLauncher, HarnessError, RecordStore, TestDestinationEnv};
use serde_json::{json, Value};

type StreamKey = (String, Option<String>);

/// Record store backed by a map; unknown streams behave like a missing raw table.
#[derive(Default)]
pub struct MemoryStore {
    streams: Mutex<HashMap<StreamKey, Vec<Value>>>,
}

impl MemoryStore {
    pub fn insert(&self, stream: &str, namespace: Option<&str>, record: Value) {
        self.streams
            .lock()
            .unwrap()
            .entry((stream.to_string(), namespace.map(str::to_string)))
            .or_default()
            .push(record);
    }

    pub fn create_stream(&self, stream: &str, namespace: Option<&str>) {
        self.streams
            .lock()
            .unwrap()
            .entry((stream.to_string(), namespace.map(str::to_string)))
            .or_default();
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn default_namespace(&self) -> &str {
        "main"
    }

    async fn fetch_records(
        &self,
        stream: &str,
        namespace: Option<&str>,
    ) -> dat_harness::Result<Vec<Value>> {
        self.streams
            .lock()
            .unwrap()
            .get(&(stream.to_string(), namespace.map(str::to_string)))
            .cloned()
            .ok_or_else(|| HarnessError::Retrieval(format!("raw table for {stream} not found")))
    }
}

/// How the fake destination misbehaves, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    #[default]
    Correct,
    /// `check` succeeds for every config.
    AcceptEverything,
    /// `write` drops the last record of every stream.
    DropLastRecord,
    /// `write` never emits state.
    SwallowState,
}

/// Destination that accepts configs with `"password": "secret"` and writes into a store.
pub struct FakeDestination {
    pub store: Arc<MemoryStore>,
    pub behavior: Behavior,
    pub writes: AtomicUsize,
}

impl FakeDestination {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self::with_behavior(store, Behavior::Correct)
    }

    pub fn with_behavior(store: Arc<MemoryStore>, behavior: Behavior) -> Self {
        Self {
            store,
            behavior,
            writes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DestinationLauncher for FakeDestination {
    async fn spec(&self, _env: &TestDestinationEnv) -> dat_harness::Result<Value> {
        Ok(json!({
            "connectionSpecification": {
                "type": "object",
                "required": ["password"],
                "properties": {"password": {"type": "string"}}
            }
        }))
    }

    async fn check(
        &self,
        _env: &TestDestinationEnv,
        config: &Value,
    ) -> dat_harness::Result<ConnectionStatus> {
        if self.behavior == Behavior::AcceptEverything
            || config.get("password").and_then(Value::as_str) == Some("secret")
        {
            Ok(ConnectionStatus::succeeded())
        } else {
            Ok(ConnectionStatus::failed("authentication failed"))
        }
    }

    async fn write(
        &self,
        _env: &TestDestinationEnv,
        _config: &Value,
        catalog: &ConfiguredCatalog,
        messages: &[AirbyteMessage],
    ) -> dat_harness::Result<Vec<AirbyteMessage>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        for configured in &catalog.streams {
            let stream = &configured.stream;
            self.store
                .create_stream(&stream.name, stream.namespace.as_deref());
            let mut records: Vec<Value> = messages
                .iter()
                .filter_map(|m| m.record.as_ref())
                .filter(|r| r.stream == stream.name && r.namespace == stream.namespace)
                .map(|r| {
                    let mut data = r.data.clone();
                    if let Value::Object(map) = &mut data {
                        map.insert("_airbyte_emitted_at".to_string(), json!(r.emitted_at));
                    }
                    data
                })
                .collect();
            if self.behavior == Behavior::DropLastRecord {
                records.pop();
            }
            for record in records {
                self.store
                    .insert(&stream.name, stream.namespace.as_deref(), record);
            }
        }
        if self.behavior == Behavior::SwallowState {
            return Ok(vec![]);
        }
        Ok(messages
            .iter()
            .filter(|m| m.message_type == MessageType::State)
            .cloned()
            .collect())
    }
}

/// Valid and failing connector configs written to a temp dir.
pub struct ConfigFiles {
    pub dir: tempfile::TempDir,
    pub valid: PathBuf,
    pub invalid: PathBuf,
}

pub fn write_config_files() -> ConfigFiles {
    let dir = tempfile::tempdir().unwrap();
    let valid = dir.path().join("valid.json");
    let invalid = dir.path().join("invalid.json");
    write_json(&valid, &json!({"host": "localhost", "password": "secret"}));
    write_json(&invalid, &json!({"host": "localhost", "password": "wrong"}));
    ConfigFiles {
        dir,
        valid,
        invalid,
    }
}

pub fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}
