//! The acceptance suite.
//!
//! [`AcceptanceRunner`] drives any [`DestinationTestSubject`] through a fixed lifecycle:
//! resolve the image and connector configs, then for every case provision a fresh
//! workspace, `setup`, run the case, and `tear_down`. Configuration problems abort the
//! run with an error; a misbehaving destination only fails the case.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::env::{TestDestinationEnv, TestWorkspace};
use crate::error::{HarnessError, Result};
use crate::fixtures::Fixture;
use crate::launcher::DestinationLauncher;
use crate::protocol::{AirbyteMessage, MessageType};
use crate::records::compare_records;
use crate::subject::DestinationTestSubject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCase {
    /// The destination returns a connector specification.
    Spec,
    /// `check` with the valid config reports success.
    CheckSuccess,
    /// `check` with the failing config reports failure.
    CheckFailure,
    /// Records written through the destination can be read back unchanged.
    SyncRoundTrip,
}

impl TestCase {
    pub const ALL: [TestCase; 4] = [
        TestCase::Spec,
        TestCase::CheckSuccess,
        TestCase::CheckFailure,
        TestCase::SyncRoundTrip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestCase::Spec => "spec",
            TestCase::CheckSuccess => "check_success",
            TestCase::CheckFailure => "check_failure",
            TestCase::SyncRoundTrip => "sync_round_trip",
        }
    }

    fn needs_config(&self) -> bool {
        matches!(self, TestCase::CheckSuccess | TestCase::SyncRoundTrip)
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestCase {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        TestCase::ALL
            .into_iter()
            .find(|case| case.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<_> = TestCase::ALL.iter().map(TestCase::as_str).collect();
                HarnessError::Config(format!(
                    "unknown test case {s} (expected one of {})",
                    known.join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseStatus {
    Passed,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CaseOutcome {
    pub case: TestCase,
    pub status: CaseStatus,
    pub elapsed: Duration,
}

impl CaseOutcome {
    pub fn passed(&self) -> bool {
        self.status == CaseStatus::Passed
    }
}

#[derive(Debug, Clone)]
pub struct SuiteReport {
    pub image: String,
    pub outcomes: Vec<CaseOutcome>,
}

impl SuiteReport {
    /// True when at least one case ran and none failed.
    pub fn is_success(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(CaseOutcome::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    pub fn outcome(&self, case: TestCase) -> Option<&CaseOutcome> {
        self.outcomes.iter().find(|o| o.case == case)
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "acceptance report for {}", self.image)?;
        for outcome in &self.outcomes {
            let ms = outcome.elapsed.as_millis();
            match &outcome.status {
                CaseStatus::Passed => writeln!(f, "  PASS {} ({ms}ms)", outcome.case)?,
                CaseStatus::Failed(reason) => {
                    writeln!(f, "  FAIL {} ({ms}ms): {reason}", outcome.case)?
                }
            }
        }
        let failed = self.failures().count();
        write!(
            f,
            "{} passed, {failed} failed",
            self.outcomes.len() - failed
        )
    }
}

/// Connector configs resolved once per run.
struct ResolvedConfigs {
    config: Option<Value>,
    fail_config: Option<Value>,
}

pub struct AcceptanceRunner<'a> {
    subject: &'a dyn DestinationTestSubject,
    launcher: &'a dyn DestinationLauncher,
    cases: Vec<TestCase>,
    fail_fast: bool,
    fixture: Fixture,
}

impl<'a> AcceptanceRunner<'a> {
    pub fn new(
        subject: &'a dyn DestinationTestSubject,
        launcher: &'a dyn DestinationLauncher,
    ) -> Self {
        Self {
            subject,
            launcher,
            cases: TestCase::ALL.to_vec(),
            fail_fast: false,
            fixture: Fixture::builtin(),
        }
    }

    pub fn with_cases(mut self, cases: Vec<TestCase>) -> Self {
        self.cases = cases;
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_fixture(mut self, fixture: Fixture) -> Self {
        self.fixture = fixture;
        self
    }

    pub async fn run(&self) -> Result<SuiteReport> {
        let image = self.subject.image_name()?;
        let configs = ResolvedConfigs {
            config: if self.cases.iter().any(TestCase::needs_config) {
                Some(self.subject.config()?)
            } else {
                None
            },
            fail_config: if self.cases.contains(&TestCase::CheckFailure) {
                Some(self.subject.fail_check_config()?)
            } else {
                None
            },
        };
        tracing::info!(image = %image, cases = self.cases.len(), "starting acceptance suite");

        let mut outcomes = Vec::with_capacity(self.cases.len());
        for &case in &self.cases {
            let outcome = self.run_case(case, &configs).await?;
            match &outcome.status {
                CaseStatus::Passed => tracing::info!(case = case.as_str(), "case passed"),
                CaseStatus::Failed(reason) => {
                    tracing::warn!(case = case.as_str(), reason = %reason, "case failed")
                }
            }
            let stop = self.fail_fast && !outcome.passed();
            outcomes.push(outcome);
            if stop {
                tracing::info!("fail-fast enabled, skipping remaining cases");
                break;
            }
        }

        let report = SuiteReport { image, outcomes };
        tracing::info!(success = report.is_success(), "acceptance suite finished");
        Ok(report)
    }

    async fn run_case(&self, case: TestCase, configs: &ResolvedConfigs) -> Result<CaseOutcome> {
        let start = Instant::now();
        let workspace = TestWorkspace::create()?;
        let env = workspace.env();

        let body = match self.subject.setup(&env).await {
            Ok(()) => self.run_body(case, configs, &env).await,
            Err(e) if e.is_configuration_error() => Err(e),
            Err(e) => Err(HarnessError::Lifecycle(format!("setup failed: {e}"))),
        };
        let torn_down = self.subject.tear_down(&env).await;

        let mut status = match body {
            Ok(status) => status,
            Err(e) if e.is_configuration_error() => return Err(e),
            Err(e) => CaseStatus::Failed(e.to_string()),
        };
        if let Err(e) = torn_down {
            status = match status {
                CaseStatus::Passed => CaseStatus::Failed(format!("tear down failed: {e}")),
                CaseStatus::Failed(reason) => {
                    CaseStatus::Failed(format!("{reason}; tear down failed: {e}"))
                }
            };
        }

        Ok(CaseOutcome {
            case,
            status,
            elapsed: start.elapsed(),
        })
    }

    async fn run_body(
        &self,
        case: TestCase,
        configs: &ResolvedConfigs,
        env: &TestDestinationEnv,
    ) -> Result<CaseStatus> {
        match case {
            TestCase::Spec => {
                let spec = self.launcher.spec(env).await?;
                if spec
                    .get("connectionSpecification")
                    .is_some_and(Value::is_object)
                {
                    Ok(CaseStatus::Passed)
                } else {
                    Ok(CaseStatus::Failed(
                        "spec has no connectionSpecification object".to_string(),
                    ))
                }
            }
            TestCase::CheckSuccess => {
                let status = self
                    .launcher
                    .check(env, required(&configs.config)?)
                    .await?;
                if status.is_success() {
                    Ok(CaseStatus::Passed)
                } else {
                    Ok(CaseStatus::Failed(format!(
                        "expected check to succeed, destination reported: {}",
                        status.message.as_deref().unwrap_or("no message")
                    )))
                }
            }
            TestCase::CheckFailure => {
                let status = self
                    .launcher
                    .check(env, required(&configs.fail_config)?)
                    .await?;
                if status.is_success() {
                    Ok(CaseStatus::Failed(
                        "expected check to fail with the failing config, but it succeeded"
                            .to_string(),
                    ))
                } else {
                    Ok(CaseStatus::Passed)
                }
            }
            TestCase::SyncRoundTrip => self.round_trip(required(&configs.config)?, env).await,
        }
    }

    async fn round_trip(&self, config: &Value, env: &TestDestinationEnv) -> Result<CaseStatus> {
        let emitted = self
            .launcher
            .write(env, config, &self.fixture.catalog, &self.fixture.messages)
            .await?;

        if let Some(expected_state) = last_state(&self.fixture.messages) {
            if last_state(&emitted) != Some(expected_state) {
                return Ok(CaseStatus::Failed(
                    "destination did not emit the final STATE message".to_string(),
                ));
            }
        }

        for expected in self.fixture.expected_records() {
            let actual = self
                .subject
                .retrieve_records(
                    env,
                    &expected.stream,
                    expected.namespace.as_deref(),
                    &expected.schema,
                )
                .await?;
            if actual.is_empty() && !expected.records.is_empty() {
                return Ok(CaseStatus::Failed(format!(
                    "no records retrieved for stream {} ({} expected)",
                    expected.stream,
                    expected.records.len()
                )));
            }
            let comparison = compare_records(&expected.records, &actual);
            if !comparison.is_match() {
                return Ok(CaseStatus::Failed(format!(
                    "stream {}: {comparison}",
                    expected.stream
                )));
            }
        }
        Ok(CaseStatus::Passed)
    }
}

fn required(value: &Option<Value>) -> Result<&Value> {
    value
        .as_ref()
        .ok_or_else(|| HarnessError::Lifecycle("connector config was not resolved".to_string()))
}

fn last_state(messages: &[AirbyteMessage]) -> Option<&Value> {
    messages
        .iter()
        .rev()
        .find(|m| m.message_type == MessageType::State)
        .and_then(|m| m.state.as_ref())
}
