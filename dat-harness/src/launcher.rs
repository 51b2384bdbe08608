//! Running destination commands.
//!
//! A destination is a container image that understands `spec`, `check` and `write`. It
//! reads its configuration and catalog from files, records from stdin, and answers with
//! protocol messages on stdout. The case's local root is mounted at [`CONTAINER_LOCAL_DIR`]
//! so file-based destinations leave their output where the subject can read it back.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::config::DockerConfig;
use crate::env::TestDestinationEnv;
use crate::error::{HarnessError, Result};
use crate::protocol::{
    parse_messages, write_messages, AirbyteMessage, ConfiguredCatalog, ConnectionStatus,
    MessageType,
};

/// Mount point of the job directory inside the container.
pub const CONTAINER_DATA_DIR: &str = "/data";
/// Mount point of the case's local root inside the container.
pub const CONTAINER_LOCAL_DIR: &str = "/local";
const CONFIG_FILE: &str = "config.json";
const CATALOG_FILE: &str = "catalog.json";
const STDERR_TAIL_LINES: usize = 20;

/// Unified interface for running destination commands.
#[async_trait]
pub trait DestinationLauncher: Send + Sync {
    /// The connector specification (the payload of the `SPEC` message).
    async fn spec(&self, env: &TestDestinationEnv) -> Result<Value>;

    async fn check(&self, env: &TestDestinationEnv, config: &Value) -> Result<ConnectionStatus>;

    /// Write `messages` and return whatever the destination emitted (usually `STATE`).
    async fn write(
        &self,
        env: &TestDestinationEnv,
        config: &Value,
        catalog: &ConfiguredCatalog,
        messages: &[AirbyteMessage],
    ) -> Result<Vec<AirbyteMessage>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorCommand {
    Spec,
    Check,
    Write,
}

impl ConnectorCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorCommand::Spec => "spec",
            ConnectorCommand::Check => "check",
            ConnectorCommand::Write => "write",
        }
    }

    fn takes_config(&self) -> bool {
        !matches!(self, ConnectorCommand::Spec)
    }

    fn takes_catalog(&self) -> bool {
        matches!(self, ConnectorCommand::Write)
    }
}

/// Output of one container run.
#[derive(Debug)]
struct ProcessOutput {
    messages: Vec<AirbyteMessage>,
    exit_code: Option<i32>,
    stderr_tail: String,
}

impl ProcessOutput {
    fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn failure(&self, image: &str, command: ConnectorCommand) -> HarnessError {
        HarnessError::Launch(format!(
            "{image} {} exited with {}: {}",
            command.as_str(),
            self.exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            self.stderr_tail
        ))
    }
}

/// Runs destination images through a container runtime CLI.
#[derive(Debug, Clone)]
pub struct DockerLauncher {
    image: String,
    docker: DockerConfig,
}

impl DockerLauncher {
    pub fn new(image: impl Into<String>, docker: DockerConfig) -> Self {
        let image = image.into();
        tracing::info!(image = %image, binary = %docker.binary, "creating docker launcher");
        Self { image, docker }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Arguments passed to the runtime binary for `command`, with `job_root` mounted at
    /// [`CONTAINER_DATA_DIR`] and `local_root` at [`CONTAINER_LOCAL_DIR`].
    pub fn command_args(
        &self,
        job_root: &Path,
        local_root: &Path,
        command: ConnectorCommand,
    ) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-i".to_string(),
            "--init".to_string(),
            "-v".to_string(),
            format!("{}:{CONTAINER_DATA_DIR}", job_root.display()),
            "-v".to_string(),
            format!("{}:{CONTAINER_LOCAL_DIR}", local_root.display()),
            "-w".to_string(),
            CONTAINER_DATA_DIR.to_string(),
        ];
        if let Some(network) = &self.docker.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        args.extend(self.docker.extra_args.iter().cloned());
        args.push(self.image.clone());
        args.push(command.as_str().to_string());
        if command.takes_config() {
            args.push("--config".to_string());
            args.push(format!("{CONTAINER_DATA_DIR}/{CONFIG_FILE}"));
        }
        if command.takes_catalog() {
            args.push("--catalog".to_string());
            args.push(format!("{CONTAINER_DATA_DIR}/{CATALOG_FILE}"));
        }
        args
    }

    async fn run(
        &self,
        env: &TestDestinationEnv,
        command: ConnectorCommand,
        config: Option<&Value>,
        catalog: Option<&ConfiguredCatalog>,
        input: Option<String>,
    ) -> Result<ProcessOutput> {
        let job = tempfile::Builder::new().prefix("dat-job-").tempdir()?;
        if let Some(config) = config {
            std::fs::write(job.path().join(CONFIG_FILE), serde_json::to_vec(config)?)?;
        }
        if let Some(catalog) = catalog {
            std::fs::write(job.path().join(CATALOG_FILE), serde_json::to_vec(catalog)?)?;
        }

        let args = self.command_args(job.path(), env.local_root(), command);
        tracing::info!(image = %self.image, command = command.as_str(), "running destination");
        tracing::debug!(binary = %self.docker.binary, args = ?args, "spawning container");

        let start = Instant::now();
        let mut child = Command::new(&self.docker.binary)
            .args(&args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarnessError::Launch(format!("spawn {}: {e}", self.docker.binary)))?;

        let stdin = child.stdin.take();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::Launch("stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| HarnessError::Launch("stderr not captured".to_string()))?;

        let feed = async move {
            if let (Some(mut stdin), Some(input)) = (stdin, input) {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    // the destination may exit before draining its input
                    tracing::warn!(error = %e, "failed to write destination stdin");
                }
                let _ = stdin.shutdown().await;
            }
        };
        // destinations are free to log arbitrary bytes, so decoding is lossy
        let read_stdout = async {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await.map(|_| buf)
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).await.map(|_| buf)
        };

        let timeout = Duration::from_millis(self.docker.timeout_ms);
        let waited = tokio::time::timeout(timeout, async {
            let ((), out, err) = futures::join!(feed, read_stdout, read_stderr);
            let status = child.wait().await;
            (out, err, status)
        })
        .await;

        let (out, err, status) = match waited {
            Ok(parts) => parts,
            Err(_) => {
                let _ = child.kill().await;
                tracing::error!(
                    image = %self.image,
                    command = command.as_str(),
                    timeout_ms = self.docker.timeout_ms,
                    "destination timed out"
                );
                return Err(HarnessError::Launch(format!(
                    "{} {} timed out after {}ms",
                    self.image,
                    command.as_str(),
                    self.docker.timeout_ms
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&out?).into_owned();
        let stderr = String::from_utf8_lossy(&err?).into_owned();
        let status = status?;
        for line in stderr.lines() {
            tracing::debug!(image = %self.image, "{line}");
        }

        let messages = parse_messages(&stdout);
        tracing::debug!(
            messages = messages.len(),
            exit_code = ?status.code(),
            ms = start.elapsed().as_millis(),
            "destination finished"
        );

        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        Ok(ProcessOutput {
            messages,
            exit_code: status.code(),
            stderr_tail: tail,
        })
    }
}

#[async_trait]
impl DestinationLauncher for DockerLauncher {
    async fn spec(&self, env: &TestDestinationEnv) -> Result<Value> {
        let output = self
            .run(env, ConnectorCommand::Spec, None, None, None)
            .await?;
        if !output.success() {
            return Err(output.failure(&self.image, ConnectorCommand::Spec));
        }
        output
            .messages
            .into_iter()
            .find(|m| m.message_type == MessageType::Spec)
            .and_then(|m| m.spec)
            .ok_or_else(|| HarnessError::Launch(format!("{} emitted no SPEC message", self.image)))
    }

    async fn check(&self, env: &TestDestinationEnv, config: &Value) -> Result<ConnectionStatus> {
        let output = self
            .run(env, ConnectorCommand::Check, Some(config), None, None)
            .await?;
        let exited_ok = output.success();
        let status = output
            .messages
            .iter()
            .find(|m| m.message_type == MessageType::ConnectionStatus)
            .and_then(|m| m.connection_status.clone());
        match status {
            Some(status) => {
                if !exited_ok {
                    tracing::warn!(
                        image = %self.image,
                        exit_code = ?output.exit_code,
                        "check reported a status but exited abnormally"
                    );
                }
                Ok(status)
            }
            None if !exited_ok => Err(output.failure(&self.image, ConnectorCommand::Check)),
            None => Err(HarnessError::Launch(format!(
                "{} emitted no CONNECTION_STATUS message",
                self.image
            ))),
        }
    }

    async fn write(
        &self,
        env: &TestDestinationEnv,
        config: &Value,
        catalog: &ConfiguredCatalog,
        messages: &[AirbyteMessage],
    ) -> Result<Vec<AirbyteMessage>> {
        let input = write_messages(messages)?;
        let output = self
            .run(
                env,
                ConnectorCommand::Write,
                Some(config),
                Some(catalog),
                Some(input),
            )
            .await?;
        if !output.success() {
            return Err(output.failure(&self.image, ConnectorCommand::Write));
        }
        Ok(output.messages)
    }
}
