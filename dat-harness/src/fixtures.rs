//! Catalog and messages written during the round-trip case.

use serde_json::{json, Value};

use crate::config::TestConfiguration;
use crate::error::{HarnessError, Result};
use crate::protocol::{
    read_messages_file, AirbyteMessage, ConfiguredCatalog, ConfiguredStream,
    DestinationSyncMode, MessageType, Stream, SyncMode,
};

pub const BUILTIN_STREAM: &str = "exchange_rate";

#[derive(Debug, Clone)]
pub struct Fixture {
    pub catalog: ConfiguredCatalog,
    pub messages: Vec<AirbyteMessage>,
}

/// Records a stream is expected to hold after the write.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecords {
    pub stream: String,
    pub namespace: Option<String>,
    pub schema: Value,
    pub records: Vec<Value>,
}

impl Fixture {
    /// Custom fixtures when the configuration names them, the built-in set otherwise.
    pub fn load(config: &TestConfiguration) -> Result<Self> {
        let fixture = match config.fixture_paths()? {
            Some((catalog, messages)) => {
                tracing::info!(
                    catalog = %catalog.display(),
                    messages = %messages.display(),
                    "loading custom fixtures"
                );
                Self {
                    catalog: ConfiguredCatalog::from_file(catalog)?,
                    messages: read_messages_file(messages)?,
                }
            }
            None => Self::builtin(),
        };
        fixture.validate()?;
        Ok(fixture)
    }

    /// Every record must belong to a stream in the catalog.
    pub fn validate(&self) -> Result<()> {
        for message in &self.messages {
            if let Some(record) = &message.record {
                if self
                    .catalog
                    .find(&record.stream, record.namespace.as_deref())
                    .is_none()
                {
                    return Err(HarnessError::Config(format!(
                        "record for stream {} (namespace {:?}) is not in the catalog",
                        record.stream, record.namespace
                    )));
                }
            }
        }
        Ok(())
    }

    /// Expected records per catalog stream, in catalog order.
    pub fn expected_records(&self) -> Vec<StreamRecords> {
        self.catalog
            .streams
            .iter()
            .map(|configured| {
                let stream = &configured.stream;
                let records = self
                    .messages
                    .iter()
                    .filter(|m| m.message_type == MessageType::Record)
                    .filter_map(|m| m.record.as_ref())
                    .filter(|r| r.stream == stream.name && r.namespace == stream.namespace)
                    .map(|r| r.data.clone())
                    .collect();
                StreamRecords {
                    stream: stream.name.clone(),
                    namespace: stream.namespace.clone(),
                    schema: stream.json_schema.clone(),
                    records,
                }
            })
            .collect()
    }

    pub fn builtin() -> Self {
        let schema = json!({
            "type": "object",
            "properties": {
                "id": {"type": "integer"},
                "currency": {"type": "string"},
                "date": {"type": "string", "format": "date"},
                "HKD": {"type": "number"},
                "NZD": {"type": "number"},
                "USD": {"type": "number"}
            }
        });
        let catalog = ConfiguredCatalog {
            streams: vec![ConfiguredStream {
                stream: Stream {
                    name: BUILTIN_STREAM.to_string(),
                    namespace: None,
                    json_schema: schema,
                    supported_sync_modes: vec![SyncMode::FullRefresh],
                },
                sync_mode: SyncMode::FullRefresh,
                destination_sync_mode: DestinationSyncMode::Overwrite,
            }],
        };
        let rows = [
            json!({"id": 1, "currency": "USD", "date": "2020-08-29", "NZD": 1.14, "HKD": 2.13}),
            json!({"id": 2, "currency": "EUR", "date": "2020-08-30", "NZD": 3.89, "HKD": 7.15}),
            json!({"id": 3, "currency": "GBP", "date": "2020-08-31", "NZD": 2.43, "HKD": 5.47, "USD": 1.0}),
        ];
        let mut messages: Vec<AirbyteMessage> = rows
            .into_iter()
            .enumerate()
            .map(|(idx, data)| {
                AirbyteMessage::record(BUILTIN_STREAM, None, data, 1_602_637_589_000 + idx as i64)
            })
            .collect();
        messages.push(AirbyteMessage::state(json!({"checkpoint": 3})));
        Self { catalog, messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_fixture_groups_records_by_stream() {
        let fixture = Fixture::builtin();
        fixture.validate().unwrap();
        let expected = fixture.expected_records();
        assert_eq!(expected.len(), 1);
        assert_eq!(expected[0].stream, BUILTIN_STREAM);
        assert_eq!(expected[0].records.len(), 3);
        assert_eq!(expected[0].records[1]["currency"], "EUR");
    }

    #[test]
    fn records_outside_catalog_are_rejected() {
        let mut fixture = Fixture::builtin();
        fixture
            .messages
            .push(AirbyteMessage::record("other", None, json!({}), 1));
        assert!(matches!(fixture.validate(), Err(HarnessError::Config(_))));
    }

    #[test]
    fn loads_custom_fixture_files() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("catalog.json");
        let messages_path = dir.path().join("messages.jsonl");
        std::fs::write(
            &catalog_path,
            serde_json::to_string(&Fixture::builtin().catalog).unwrap(),
        )
        .unwrap();
        std::fs::write(
            &messages_path,
            "{\"type\":\"RECORD\",\"record\":{\"stream\":\"exchange_rate\",\"data\":{\"id\":9},\"emitted_at\":1}}\n",
        )
        .unwrap();
        let config = TestConfiguration::new().with_fixtures(&catalog_path, &messages_path);
        let fixture = Fixture::load(&config).unwrap();
        assert_eq!(fixture.expected_records()[0].records, vec![json!({"id": 9})]);
    }
}
