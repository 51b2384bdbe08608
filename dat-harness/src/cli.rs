//! Command-line driver.
//!
//! ## Commands
//!
//! - `run` - resolve the configuration and run the acceptance suite
//! - `show-config` - print the configuration `run` would use
//!
//! Precedence, lowest to highest: config file, `DAT_*` environment variables, flags.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::adapter::ExternallyConfiguredSubject;
use crate::config::{HarnessConfig, RecordStoreKind};
use crate::error::{HarnessError, Result};
use crate::fixtures::Fixture;
use crate::launcher::DockerLauncher;
use crate::records;
use crate::runner::{AcceptanceRunner, SuiteReport, TestCase};
use crate::subject::DestinationTestSubject;

/// Exit code when every case passed.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code when at least one case failed.
pub const EXIT_FAILED_CASES: i32 = 1;
/// Exit code for configuration and I/O errors.
pub const EXIT_ERROR: i32 = 2;

/// Acceptance tests for data destinations, configured from outside
#[derive(Parser, Debug)]
#[command(name = "dat-harness")]
#[command(version)]
#[command(about = "Run destination acceptance tests against an externally configured image", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the acceptance suite
    Run(RunArgs),
    /// Print the resolved configuration
    ShowConfig(ConfigArgs),
}

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Harness config file (TOML, or YAML with a .yml/.yaml extension)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Destination image under test
    #[arg(long, value_name = "IMAGE")]
    pub image: Option<String>,

    /// Connector config expected to pass the connection check
    #[arg(long, value_name = "FILE")]
    pub config_path: Option<PathBuf>,

    /// Connector config expected to fail the connection check
    #[arg(long, value_name = "FILE")]
    pub fail_config_path: Option<PathBuf>,

    /// Read written records back from this DuckDB file
    #[arg(long, value_name = "PATH")]
    pub duckdb: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Case to run (repeatable; default: all)
    #[arg(long = "case", value_name = "CASE", value_parser = parse_case)]
    pub cases: Vec<TestCase>,

    /// Stop after the first failing case
    #[arg(long)]
    pub fail_fast: bool,
}

fn parse_case(s: &str) -> std::result::Result<TestCase, String> {
    s.parse().map_err(|e: HarnessError| e.to_string())
}

impl ConfigArgs {
    /// Load the file layer, then apply environment overrides and flags.
    pub fn resolve(&self) -> Result<HarnessConfig> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Same as [`resolve`](Self::resolve) with `lookup` standing in for the environment.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<HarnessConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match &self.config {
            Some(path) => HarnessConfig::from_file(path)?,
            None => HarnessConfig::load_default()?,
        };
        cfg.test.apply_overrides_from(lookup);
        if let Some(image) = &self.image {
            cfg.test.image_name = Some(image.clone());
        }
        if let Some(path) = &self.config_path {
            cfg.test.config_path = Some(path.clone());
        }
        if let Some(path) = &self.fail_config_path {
            cfg.test.fail_config_path = Some(path.clone());
        }
        if let Some(path) = &self.duckdb {
            cfg.records.kind = RecordStoreKind::Duckdb;
            cfg.records.path = Some(path.clone());
        }
        Ok(cfg)
    }
}

impl RunArgs {
    pub fn resolve(&self) -> Result<HarnessConfig> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    pub fn resolve_with<F>(&self, lookup: F) -> Result<HarnessConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = self.config.resolve_with(lookup)?;
        if !self.cases.is_empty() {
            cfg.runner.cases = self.cases.clone();
        }
        if self.fail_fast {
            cfg.runner.fail_fast = true;
        }
        Ok(cfg)
    }
}

/// Run the suite described by `cfg` against a Docker-launched destination.
///
/// Everything the selected cases need is resolved before the first container starts.
pub async fn execute(cfg: HarnessConfig) -> Result<SuiteReport> {
    let fixture = Fixture::load(&cfg.test)?;
    let store = records::from_config(&cfg.records)?;
    if store.is_none() && cfg.runner.cases.contains(&TestCase::SyncRoundTrip) {
        return Err(HarnessError::not_configured(format!(
            "[records] store (required by {})",
            TestCase::SyncRoundTrip
        )));
    }
    let mut subject = ExternallyConfiguredSubject::new(cfg.test);
    if let Some(store) = store {
        subject = subject.with_record_store(store);
    }
    let launcher = DockerLauncher::new(subject.image_name()?, cfg.docker);
    AcceptanceRunner::new(&subject, &launcher)
        .with_cases(cfg.runner.cases)
        .fail_fast(cfg.runner.fail_fast)
        .with_fixture(fixture)
        .run()
        .await
}

fn render_config(cfg: &HarnessConfig) -> Result<String> {
    toml::to_string_pretty(cfg).map_err(|e| HarnessError::Config(format!("render config: {e}")))
}

/// Execute a parsed command line and return the process exit code.
pub async fn run(cli: Cli) -> i32 {
    let outcome = match cli.command {
        Command::Run(args) => match args.resolve() {
            Ok(cfg) => execute(cfg).await.map(|report| {
                println!("{report}");
                if report.is_success() {
                    EXIT_SUCCESS
                } else {
                    EXIT_FAILED_CASES
                }
            }),
            Err(e) => Err(e),
        },
        Command::ShowConfig(args) => args
            .resolve()
            .and_then(|cfg| render_config(&cfg))
            .map(|rendered| {
                println!("{rendered}");
                EXIT_SUCCESS
            }),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "harness run aborted");
            eprintln!("error: {e}");
            EXIT_ERROR
        }
    }
}
