pub mod adapter;
pub mod cli;
pub mod config;
pub mod dialect;
pub mod env;
pub mod error;
pub mod fixtures;
pub mod launcher;
pub mod protocol;
pub mod records;
pub mod runner;
pub mod subject;

pub use adapter::ExternallyConfiguredSubject;
pub use config::{HarnessConfig, TestConfiguration};
pub use env::{TestDestinationEnv, TestWorkspace};
pub use error::{HarnessError, Result};
pub use launcher::{DestinationLauncher, DockerLauncher};
pub use protocol::{AirbyteMessage, ConfiguredCatalog, ConnectionStatus};
pub use records::RecordStore;
#[cfg(feature = "duckdb")]
pub use records::DuckDbRecordStore;
pub use runner::{AcceptanceRunner, CaseStatus, SuiteReport, TestCase};
pub use subject::DestinationTestSubject;
