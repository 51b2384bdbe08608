use async_trait::async_trait;
use serde_json::Value;

use crate::env::TestDestinationEnv;
use crate::error::Result;

/// Everything the acceptance suite needs to know about the destination it is testing.
///
/// The runner calls these in a fixed order: `image_name`, then `config` and
/// `fail_check_config`, then for every case `setup`, the case body (which may call
/// `retrieve_records`), and `tear_down`.
#[async_trait]
pub trait DestinationTestSubject: Send + Sync {
    /// Container image of the destination under test.
    fn image_name(&self) -> Result<String>;

    /// Connector configuration expected to pass the connection check.
    fn config(&self) -> Result<Value>;

    /// Connector configuration expected to fail the connection check.
    fn fail_check_config(&self) -> Result<Value>;

    /// Provision per-case resources.
    async fn setup(&self, env: &TestDestinationEnv) -> Result<()>;

    /// Release whatever `setup` provisioned. Must be safe to call more than once.
    async fn tear_down(&self, env: &TestDestinationEnv) -> Result<()>;

    /// All records the destination stored for `stream_name` in `namespace`, as JSON
    /// documents, oldest first.
    async fn retrieve_records(
        &self,
        env: &TestDestinationEnv,
        stream_name: &str,
        namespace: Option<&str>,
        stream_schema: &Value,
    ) -> Result<Vec<Value>>;
}
