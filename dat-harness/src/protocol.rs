//! Connector protocol messages exchanged with a destination over JSON lines.
//!
//! Only the parts the harness reads or writes are typed; payloads it passes through
//! untouched (state blobs, specs, traces) stay as [`serde_json::Value`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HarnessError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Record,
    State,
    Log,
    Spec,
    ConnectionStatus,
    Catalog,
    Trace,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AirbyteMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<RecordMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Value>,
    #[serde(
        rename = "connectionStatus",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub connection_status: Option<ConnectionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RecordMessage {
    pub stream: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub data: Value,
    pub emitted_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogMessage {
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionStatus {
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConnectionStatus {
    pub fn succeeded() -> Self {
        Self {
            status: CheckStatus::Succeeded,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Failed,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CheckStatus::Succeeded
    }
}

impl AirbyteMessage {
    fn empty(message_type: MessageType) -> Self {
        Self {
            message_type,
            record: None,
            state: None,
            log: None,
            spec: None,
            connection_status: None,
            catalog: None,
            trace: None,
        }
    }

    pub fn record(
        stream: impl Into<String>,
        namespace: Option<String>,
        data: Value,
        emitted_at: i64,
    ) -> Self {
        Self {
            record: Some(RecordMessage {
                stream: stream.into(),
                namespace,
                data,
                emitted_at,
            }),
            ..Self::empty(MessageType::Record)
        }
    }

    pub fn state(data: Value) -> Self {
        Self {
            state: Some(serde_json::json!({ "data": data })),
            ..Self::empty(MessageType::State)
        }
    }

    pub fn connection_status(status: ConnectionStatus) -> Self {
        Self {
            connection_status: Some(status),
            ..Self::empty(MessageType::ConnectionStatus)
        }
    }

    pub fn spec(spec: Value) -> Self {
        Self {
            spec: Some(spec),
            ..Self::empty(MessageType::Spec)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    FullRefresh,
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationSyncMode {
    Append,
    Overwrite,
    AppendDedup,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Stream {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub json_schema: Value,
    #[serde(default)]
    pub supported_sync_modes: Vec<SyncMode>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConfiguredStream {
    pub stream: Stream,
    pub sync_mode: SyncMode,
    pub destination_sync_mode: DestinationSyncMode,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ConfiguredCatalog {
    pub streams: Vec<ConfiguredStream>,
}

impl ConfiguredCatalog {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| HarnessError::ResourceUnavailable {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn find(&self, name: &str, namespace: Option<&str>) -> Option<&ConfiguredStream> {
        self.streams
            .iter()
            .find(|s| s.stream.name == name && s.stream.namespace.as_deref() == namespace)
    }
}

/// Parse destination output. Lines that are not protocol messages (plain log output,
/// unknown message types) are skipped.
pub fn parse_messages(output: &str) -> Vec<AirbyteMessage> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<AirbyteMessage>(line) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::debug!(error = %e, line, "skipping non-protocol output line");
                None
            }
        })
        .collect()
}

/// Read a JSON-lines file of messages. Unlike [`parse_messages`], every non-blank line
/// must be a valid message: a malformed fixture is a configuration error.
pub fn read_messages_file<P: AsRef<Path>>(path: P) -> Result<Vec<AirbyteMessage>> {
    let path = path.as_ref();
    let contents =
        std::fs::read_to_string(path).map_err(|e| HarnessError::ResourceUnavailable {
            path: path.to_path_buf(),
            source: e,
        })?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| {
                HarnessError::Config(format!("{}:{}: {e}", path.display(), idx + 1))
            })
        })
        .collect()
}

/// Serialize messages as JSON lines (trailing newline included).
pub fn write_messages(messages: &[AirbyteMessage]) -> Result<String> {
    let mut out = String::new();
    for message in messages {
        out.push_str(&serde_json::to_string(message)?);
        out.push('\n');
    }
    Ok(out)
}
