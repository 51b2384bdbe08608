//! Integration tests for the acceptance runner.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dat_harness::fixtures::Fixture;
use dat_harness::{
    AcceptanceRunner, CaseStatus, DestinationLauncher, DestinationTestSubject,
    ExternallyConfiguredSubject, HarnessError, TestCase, TestConfiguration, TestDestinationEnv,
};
use serde_json::{json, Value};

use common::{write_config_files, Behavior, ConfigFiles, FakeDestination, MemoryStore};

fn configured_subject(files: &ConfigFiles, store: Arc<MemoryStore>) -> ExternallyConfiguredSubject {
    ExternallyConfiguredSubject::new(
        TestConfiguration::new()
            .with_image_name("vendor/dest:1.0")
            .with_config_path(&files.valid)
            .with_fail_config_path(&files.invalid),
    )
    .with_record_store(store)
}

#[tokio::test]
async fn correct_destination_passes_every_case() -> anyhow::Result<()> {
    let files = write_config_files();
    let store = Arc::new(MemoryStore::default());
    let subject = configured_subject(&files, store.clone());
    let destination = FakeDestination::new(store);

    let report = AcceptanceRunner::new(&subject, &destination).run().await?;

    assert_eq!(report.image, "vendor/dest:1.0");
    assert_eq!(report.outcomes.len(), 4);
    assert!(report.is_success(), "{report}");
    assert_eq!(destination.writes.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn failing_config_reports_check_failure() -> anyhow::Result<()> {
    let files = write_config_files();
    let store = Arc::new(MemoryStore::default());
    let subject = configured_subject(&files, store.clone());
    let destination = FakeDestination::new(store);

    let env = TestDestinationEnv::new(std::env::temp_dir());
    let status = destination
        .check(&env, &subject.fail_check_config()?)
        .await?;
    assert!(!status.is_success());
    assert_eq!(status.message.as_deref(), Some("authentication failed"));

    let report = AcceptanceRunner::new(&subject, &destination)
        .with_cases(vec![TestCase::CheckFailure])
        .run()
        .await?;
    assert!(report.is_success(), "{report}");
    Ok(())
}

#[tokio::test]
async fn destination_accepting_bad_config_fails_the_case() -> anyhow::Result<()> {
    let files = write_config_files();
    let store = Arc::new(MemoryStore::default());
    let subject = configured_subject(&files, store.clone());
    let destination = FakeDestination::with_behavior(store, Behavior::AcceptEverything);

    let report = AcceptanceRunner::new(&subject, &destination).run().await?;

    assert!(!report.is_success());
    let outcome = report.outcome(TestCase::CheckFailure).unwrap();
    assert!(matches!(&outcome.status, CaseStatus::Failed(reason) if reason.contains("succeeded")));
    assert!(report.outcome(TestCase::CheckSuccess).unwrap().passed());
    Ok(())
}

#[tokio::test]
async fn lost_records_fail_the_round_trip() -> anyhow::Result<()> {
    let files = write_config_files();
    let store = Arc::new(MemoryStore::default());
    let subject = configured_subject(&files, store.clone());
    let destination = FakeDestination::with_behavior(store, Behavior::DropLastRecord);

    let report = AcceptanceRunner::new(&subject, &destination)
        .with_cases(vec![TestCase::SyncRoundTrip])
        .run()
        .await?;

    let outcome = report.outcome(TestCase::SyncRoundTrip).unwrap();
    match &outcome.status {
        CaseStatus::Failed(reason) => assert!(reason.contains("1 missing"), "{reason}"),
        CaseStatus::Passed => panic!("round trip should fail"),
    }
    Ok(())
}

#[tokio::test]
async fn missing_state_fails_the_round_trip() -> anyhow::Result<()> {
    let files = write_config_files();
    let store = Arc::new(MemoryStore::default());
    let subject = configured_subject(&files, store.clone());
    let destination = FakeDestination::with_behavior(store, Behavior::SwallowState);

    let report = AcceptanceRunner::new(&subject, &destination)
        .with_cases(vec![TestCase::SyncRoundTrip])
        .run()
        .await?;
    assert!(!report.is_success());
    Ok(())
}

#[tokio::test]
async fn empty_retrieval_never_passes_vacuously() -> anyhow::Result<()> {
    let files = write_config_files();
    // the subject reads an empty raw table while writes land elsewhere
    let reader_store = Arc::new(MemoryStore::default());
    reader_store.create_stream(dat_harness::fixtures::BUILTIN_STREAM, None);
    let subject = configured_subject(&files, reader_store);
    let destination = FakeDestination::new(Arc::new(MemoryStore::default()));

    let report = AcceptanceRunner::new(&subject, &destination)
        .with_cases(vec![TestCase::SyncRoundTrip])
        .run()
        .await?;
    let outcome = report.outcome(TestCase::SyncRoundTrip).unwrap();
    assert!(
        matches!(&outcome.status, CaseStatus::Failed(reason) if reason.contains("no records retrieved"))
    );
    Ok(())
}

#[tokio::test]
async fn unconfigured_subject_aborts_the_run() {
    let subject = ExternallyConfiguredSubject::new(TestConfiguration::default());
    let destination = FakeDestination::new(Arc::new(MemoryStore::default()));

    let err = AcceptanceRunner::new(&subject, &destination)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::NotConfigured(_)));
}

#[tokio::test]
async fn round_trip_without_record_store_aborts_the_run() {
    let files = write_config_files();
    let subject = ExternallyConfiguredSubject::new(
        TestConfiguration::new()
            .with_image_name("vendor/dest:1.0")
            .with_config_path(&files.valid),
    );
    let destination = FakeDestination::new(Arc::new(MemoryStore::default()));

    let err = AcceptanceRunner::new(&subject, &destination)
        .with_cases(vec![TestCase::SyncRoundTrip])
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::NotConfigured(_)));
}

#[tokio::test]
async fn only_needed_configs_are_resolved() -> anyhow::Result<()> {
    // no fail config path, but the failure check is not requested
    let files = write_config_files();
    let subject = ExternallyConfiguredSubject::new(
        TestConfiguration::new()
            .with_image_name("vendor/dest:1.0")
            .with_config_path(&files.valid),
    );
    let destination = FakeDestination::new(Arc::new(MemoryStore::default()));

    let report = AcceptanceRunner::new(&subject, &destination)
        .with_cases(vec![TestCase::Spec, TestCase::CheckSuccess])
        .run()
        .await?;
    assert!(report.is_success(), "{report}");
    Ok(())
}

/// Subject whose lifecycle hooks are counted and whose retrieval always errors.
struct CountingSubject {
    inner: ExternallyConfiguredSubject,
    setups: AtomicUsize,
    tear_downs: AtomicUsize,
}

#[async_trait]
impl DestinationTestSubject for CountingSubject {
    fn image_name(&self) -> dat_harness::Result<String> {
        self.inner.image_name()
    }

    fn config(&self) -> dat_harness::Result<Value> {
        self.inner.config()
    }

    fn fail_check_config(&self) -> dat_harness::Result<Value> {
        self.inner.fail_check_config()
    }

    async fn setup(&self, env: &TestDestinationEnv) -> dat_harness::Result<()> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        self.inner.setup(env).await
    }

    async fn tear_down(&self, env: &TestDestinationEnv) -> dat_harness::Result<()> {
        self.tear_downs.fetch_add(1, Ordering::SeqCst);
        self.inner.tear_down(env).await
    }

    async fn retrieve_records(
        &self,
        _env: &TestDestinationEnv,
        stream_name: &str,
        _namespace: Option<&str>,
        _stream_schema: &Value,
    ) -> dat_harness::Result<Vec<Value>> {
        Err(HarnessError::Retrieval(format!("{stream_name}: connection refused")))
    }
}

#[tokio::test]
async fn tear_down_runs_after_every_case_even_on_failure() -> anyhow::Result<()> {
    let files = write_config_files();
    let subject = CountingSubject {
        inner: configured_subject(&files, Arc::new(MemoryStore::default())),
        setups: AtomicUsize::new(0),
        tear_downs: AtomicUsize::new(0),
    };
    let destination = FakeDestination::new(Arc::new(MemoryStore::default()));

    let report = AcceptanceRunner::new(&subject, &destination).run().await?;

    assert_eq!(subject.setups.load(Ordering::SeqCst), 4);
    assert_eq!(subject.tear_downs.load(Ordering::SeqCst), 4);
    let outcome = report.outcome(TestCase::SyncRoundTrip).unwrap();
    assert!(
        matches!(&outcome.status, CaseStatus::Failed(reason) if reason.contains("connection refused"))
    );
    Ok(())
}

#[tokio::test]
async fn fail_fast_stops_after_first_failure() -> anyhow::Result<()> {
    let files = write_config_files();
    let store = Arc::new(MemoryStore::default());
    let subject = configured_subject(&files, store.clone());
    let destination = FakeDestination::with_behavior(store, Behavior::AcceptEverything);

    let report = AcceptanceRunner::new(&subject, &destination)
        .with_cases(vec![TestCase::CheckFailure, TestCase::CheckSuccess])
        .fail_fast(true)
        .run()
        .await?;
    assert_eq!(report.outcomes.len(), 1);
    assert!(!report.is_success());
    Ok(())
}

#[tokio::test]
async fn custom_fixture_streams_are_all_checked() -> anyhow::Result<()> {
    let files = write_config_files();
    let store = Arc::new(MemoryStore::default());
    let subject = configured_subject(&files, store.clone());
    let destination = FakeDestination::new(store);

    let mut fixture = Fixture::builtin();
    let mut second = fixture.catalog.streams[0].clone();
    second.stream.name = "users".to_string();
    second.stream.namespace = Some("crm".to_string());
    fixture.catalog.streams.push(second);
    fixture.messages.insert(
        0,
        dat_harness::AirbyteMessage::record("users", Some("crm".to_string()), json!({"id": 7}), 1),
    );

    let report = AcceptanceRunner::new(&subject, &destination)
        .with_cases(vec![TestCase::SyncRoundTrip])
        .with_fixture(fixture)
        .run()
        .await?;
    assert!(report.is_success(), "{report}");
    Ok(())
}
