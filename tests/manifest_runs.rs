//! Whole-manifest runs against the simulated provider.

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use infra_reconciler::config::{ManifestParser, ManifestValidator};
use infra_reconciler::gateway::{Call, Operation, SimulatedProvider};
use infra_reconciler::runner::{ManifestRunner, ResourceStatus};
use infra_reconciler::state::{LocalProviderStore, LocalState, StateStore};

const MANIFEST: &str = r"
defaults:
  tags:
    owner: platform
resources:
  - kind: queue
    name: orders
    visibility_timeout: 60
  - kind: instance
    name: worker
    instance_type: t3.micro
    image_id: ami-123
    deletion_policy: Stop
  - kind: table
    name: sessions
    hash_key: { name: id, type: S }
    deletion_policy: Retain
";

const DATABASES: &str = r"
engine:
  snapshot_prefix: nightly
resources:
  - kind: db_instance
    name: orders-db
    engine: postgres
    instance_class: db.t3.micro
    allocated_storage: 20
    master_username: admin
    deletion_policy: Snapshot
  - kind: db_instance
    name: billing-db
    engine: postgres
    instance_class: db.t3.micro
    allocated_storage: 20
    master_username: admin
    deletion_policy: Snapshot
    final_snapshot_id: billing-final
";

fn load(yaml: &str) -> infra_reconciler::config::Manifest {
    let mut manifest = ManifestParser::new().parse_yaml(yaml, None).unwrap();
    manifest.apply_defaults();
    ManifestValidator::new().validate(&mut manifest).unwrap();
    manifest
}

#[tokio::test]
async fn test_first_sync_creates_everything_once() {
    let provider = SimulatedProvider::new();
    let mut manifest = load(MANIFEST);

    let report = ManifestRunner::new(&provider)
        .sync_all(&mut manifest.resources)
        .await;

    assert!(report.is_success(), "{report}");
    assert_eq!(report.count(ResourceStatus::Created), 3);
    assert_eq!(provider.queues.count(Operation::Create), 1);
    assert_eq!(provider.instances.count(Operation::Create), 1);
    assert_eq!(provider.tables.count(Operation::Create), 1);
    assert!(
        manifest
            .resources
            .iter()
            .all(|r| !r.meta().identifier.is_empty())
    );
}

#[tokio::test]
async fn test_second_sync_is_idempotent() {
    let provider = SimulatedProvider::new();
    let mut manifest = load(MANIFEST);
    let runner = ManifestRunner::new(&provider);

    runner.sync_all(&mut manifest.resources).await;
    provider.queues.clear_journal();
    provider.instances.clear_journal();
    provider.tables.clear_journal();

    let report = runner.sync_all(&mut manifest.resources).await;

    assert!(report.is_success(), "{report}");
    assert_eq!(report.count(ResourceStatus::Unchanged), 3);
    assert!(provider.queues.mutating_calls().is_empty());
    assert!(provider.instances.mutating_calls().is_empty());
    assert!(provider.tables.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_external_change_is_converged_with_one_update() {
    let provider = SimulatedProvider::new();
    let mut manifest = load(MANIFEST);
    let runner = ManifestRunner::new(&provider);
    runner.sync_all(&mut manifest.resources).await;

    assert!(provider.queues.mutate("orders", |q| q.visibility_timeout = 30));
    provider.queues.clear_journal();

    let report = runner.sync_all(&mut manifest.resources).await;

    assert_eq!(report.resources[0].status, ResourceStatus::Updated);
    assert_eq!(report.resources[0].changes, vec!["VisibilityTimeout(60)"]);
    assert_eq!(provider.queues.count(Operation::Update), 1);
    assert_eq!(provider.queues.count(Operation::Create), 0);
    assert!(report.resources[1].ready);
}

#[tokio::test]
async fn test_delete_runs_in_reverse_and_honors_policies() {
    let provider = SimulatedProvider::new();
    let mut manifest = load(MANIFEST);
    let runner = ManifestRunner::new(&provider);
    runner.sync_all(&mut manifest.resources).await;

    let report = runner.delete_all(&manifest.resources).await;

    assert!(report.is_success(), "{report}");
    assert_eq!(
        report.labels(),
        vec!["table/sessions", "instance/worker", "queue/orders"]
    );
    assert_eq!(report.resources[0].status, ResourceStatus::Skipped);
    assert_eq!(report.resources[1].status, ResourceStatus::Stopped);
    assert_eq!(report.resources[2].status, ResourceStatus::Deleted);
    assert_eq!(provider.tables.count(Operation::Delete), 0);
    assert_eq!(provider.instances.count(Operation::Delete), 0);
    assert_eq!(provider.instances.count(Operation::Stop), 1);
    assert!(provider.queues.current("orders").is_none());
}

#[tokio::test]
async fn test_snapshot_policy_hands_final_snapshot_to_provider() {
    let provider = SimulatedProvider::new();
    let mut manifest = load(DATABASES);
    let runner = ManifestRunner::new(&provider)
        .with_snapshot_prefix(manifest.engine.snapshot_prefix.clone());
    runner.sync_all(&mut manifest.resources).await;
    provider.db_instances.clear_journal();

    let report = runner.delete_all(&manifest.resources).await;

    assert!(report.is_success(), "{report}");
    assert_eq!(report.count(ResourceStatus::Deleted), 2);

    let snapshots: Vec<String> = provider
        .db_instances
        .mutating_calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Delete {
                final_snapshot_id, ..
            } => final_snapshot_id,
            _ => None,
        })
        .collect();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0], "billing-final");
    assert!(snapshots[1].starts_with("nightly-orders-db-"), "{}", snapshots[1]);
    assert!(provider.db_instances.export().is_empty());
}

#[tokio::test]
async fn test_best_effort_failure_is_reported_once() {
    let provider = SimulatedProvider::new();
    provider.tables.fail_next(
        Operation::Update,
        infra_reconciler::error::GatewayError::rejected("backups unavailable"),
    );
    let mut manifest = load(
        r"
resources:
  - kind: table
    name: sessions
    hash_key: { name: id, type: S }
    point_in_time_recovery: true
",
    );

    let report = ManifestRunner::new(&provider)
        .sync_all(&mut manifest.resources)
        .await;

    assert!(report.is_success(), "{report}");
    assert_eq!(report.resources[0].status, ResourceStatus::Created);
    assert_eq!(report.resources[0].warnings.len(), 1);
    assert!(report.resources[0].warnings[0].error.contains("backups unavailable"));
}

#[tokio::test]
async fn test_failure_halts_run_unless_continuing() {
    let provider = SimulatedProvider::new();
    provider.queues.fail_next(
        Operation::Create,
        infra_reconciler::error::GatewayError::transport("connection reset"),
    );
    let mut manifest = load(MANIFEST);

    let report = ManifestRunner::new(&provider)
        .sync_all(&mut manifest.resources)
        .await;

    assert!(!report.is_success());
    assert_eq!(report.resources[0].status, ResourceStatus::Failed);
    assert_eq!(report.count(ResourceStatus::NotRun), 2);
    assert_eq!(provider.instances.count(Operation::Create), 0);
}

#[tokio::test]
async fn test_continue_on_error_processes_later_resources() {
    let provider = SimulatedProvider::new();
    provider.queues.fail_next(
        Operation::Create,
        infra_reconciler::error::GatewayError::transport("connection reset"),
    );
    let mut manifest = load(MANIFEST);

    let report = ManifestRunner::new(&provider)
        .with_continue_on_error(true)
        .sync_all(&mut manifest.resources)
        .await;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.count(ResourceStatus::Created), 2);
}

#[tokio::test]
async fn test_cancelled_run_stops_immediately() {
    let provider = SimulatedProvider::new();
    let mut manifest = load(MANIFEST);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = ManifestRunner::new(&provider)
        .with_continue_on_error(true)
        .with_cancellation(cancel)
        .sync_all(&mut manifest.resources)
        .await;

    assert!(report.cancelled);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.count(ResourceStatus::NotRun), 2);
    assert!(provider.queues.calls().is_empty());
}

#[tokio::test]
async fn test_state_carries_identifiers_across_runs() {
    let dir = TempDir::new().unwrap();
    let store = LocalProviderStore::with_base_dir(dir.path());

    // First run: create and persist
    let provider = SimulatedProvider::new();
    let mut manifest = load(MANIFEST);
    ManifestRunner::new(&provider)
        .sync_all(&mut manifest.resources)
        .await;
    let mut state = LocalState::new();
    state.provider = provider.snapshot();
    state.record_resources(manifest.resources.iter().cloned());
    store.save(&state).await.unwrap();

    // Second run: a fresh process restores the provider and adopts identifiers
    let state = store.load().await.unwrap().unwrap();
    let provider = SimulatedProvider::from_snapshot(state.provider.clone());
    let mut manifest = load(MANIFEST);
    assert_eq!(manifest.adopt_recorded(&state.resources), 3);

    let report = ManifestRunner::new(&provider)
        .sync_all(&mut manifest.resources)
        .await;

    assert_eq!(report.count(ResourceStatus::Unchanged), 3);
    assert_eq!(provider.queues.count(Operation::Create), 0);
}
