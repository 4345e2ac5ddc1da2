//! Reconciliation engine.
//!
//! `Engine::sync` converges one specification toward the provider:
//! normalize and validate, detect presence, create or converge mutable
//! fields, reconcile tags, stamp the sync time. `Engine::delete` applies
//! the resolved deletion policy. Both are strictly sequential and never
//! retry; every gateway call runs under the caller's cancellation token.

use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, ReconcilerError, Result};
use crate::gateway::{GatewayResult, Operation, ProviderGateway};
use crate::resource::{ObservedState, Resource, Tags};

use super::policy::{self, DEFAULT_SNAPSHOT_PREFIX, DeleteAction, DeletionContext};
use super::tags::{TagPlan, plan_tags};

/// Reconciliation engine for one resource kind, bound to one gateway.
#[derive(Debug)]
pub struct Engine<R, G> {
    /// Provider gateway for this kind.
    gateway: G,
    /// Prefix for generated final snapshot names.
    snapshot_prefix: String,
    _kind: PhantomData<fn() -> R>,
}

/// How a sync converged the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// The resource did not exist and was created.
    Created,
    /// The identifier pointed at a vanished resource; a fresh one was created.
    Recreated,
    /// One or more mutable fields were updated.
    Updated,
    /// Nothing but tags needed attention.
    Unchanged,
}

/// A best-effort step that failed without failing the sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubStepWarning {
    /// The step that failed.
    pub step: String,
    /// Why it failed.
    pub error: String,
}

/// Result of a successful sync.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome<C> {
    /// How the resource converged.
    pub action: SyncAction,
    /// Changes applied, in order.
    pub applied: Vec<C>,
    /// Tag mutations issued.
    pub tags: TagPlan,
    /// Best-effort steps that failed.
    pub warnings: Vec<SubStepWarning>,
}

/// Result of a successful delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    /// Action taken.
    pub action: DeleteAction,
}

impl<R, G> Engine<R, G>
where
    R: Resource,
    G: ProviderGateway<R>,
{
    /// Creates an engine bound to `gateway`.
    #[must_use]
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            snapshot_prefix: String::from(DEFAULT_SNAPSHOT_PREFIX),
            _kind: PhantomData,
        }
    }

    /// Sets the prefix of generated final snapshot names.
    #[must_use]
    pub fn with_snapshot_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.snapshot_prefix = prefix.into();
        self
    }

    /// Returns the bound gateway.
    #[must_use]
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Converges `spec` toward the provider.
    ///
    /// On failure `spec` keeps everything the successful steps wrote,
    /// including a freshly assigned identifier, so the next sync resumes.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any gateway call, a provider error
    /// wrapped with kind and operation, or a cancellation error.
    pub async fn sync(&self, spec: &mut R, cancel: &CancellationToken) -> Result<SyncOutcome<R::Change>> {
        spec.prepare()?;

        info!("Syncing {} '{}'", R::KIND, spec.natural_key());

        let mut applied = Vec::new();
        let mut warnings = Vec::new();

        let (action, current_tags) = match self.locate(spec, cancel).await? {
            Presence::Found(current) => {
                self.converge(spec, &current, &mut applied, &mut warnings, cancel)
                    .await?;
                let action = if applied.is_empty() {
                    SyncAction::Unchanged
                } else {
                    SyncAction::Updated
                };
                (action, current.tags().clone())
            }
            Presence::Missing { drifted } => {
                self.create(spec, &mut applied, &mut warnings, cancel).await?;
                let action = if drifted {
                    SyncAction::Recreated
                } else {
                    SyncAction::Created
                };
                (action, Tags::new())
            }
        };

        if !applied.is_empty() {
            self.refresh(spec, cancel).await?;
        }

        let tags = self.reconcile_tags(spec, &current_tags, cancel).await?;

        spec.meta_mut().last_sync_time = Some(Utc::now());

        info!(
            "Synced {} '{}' ({action}, {} change(s), {} warning(s))",
            R::KIND,
            spec.natural_key(),
            applied.len(),
            warnings.len()
        );

        Ok(SyncOutcome {
            action,
            applied,
            tags,
            warnings,
        })
    }

    /// Applies the resolved deletion policy for `spec`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid policy, a provider error, or
    /// a cancellation error.
    pub async fn delete(&self, spec: &R, cancel: &CancellationToken) -> Result<DeleteOutcome> {
        let policy = spec.deletion_policy()?;

        let ctx = DeletionContext {
            kind: R::KIND,
            identifier: spec.identifier(),
            natural_key: spec.natural_key(),
            final_snapshot_id: spec.meta().final_snapshot_id.as_deref(),
            quiesced: spec.is_quiesced(),
            snapshot_prefix: &self.snapshot_prefix,
        };
        let action = policy::resolve(policy, &ctx);

        info!(
            "Deleting {} '{}' with policy {policy}: {action}",
            R::KIND,
            spec.natural_key()
        );

        match &action {
            DeleteAction::Skip { .. } => {}
            DeleteAction::Delete => {
                self.call(Operation::Delete, cancel, self.gateway.delete(spec, None))
                    .await?;
            }
            DeleteAction::SnapshotThenDelete { snapshot_id } => {
                self.call(
                    Operation::Delete,
                    cancel,
                    self.gateway.delete(spec, Some(snapshot_id.clone())),
                )
                .await?;
            }
            DeleteAction::Stop => {
                self.call(Operation::Stop, cancel, self.gateway.stop(spec))
                    .await?;
            }
        }

        Ok(DeleteOutcome { action })
    }

    /// Detects whether the resource exists and reads its state if so.
    async fn locate(&self, spec: &mut R, cancel: &CancellationToken) -> Result<Presence<R::Current>> {
        if !spec.identifier().is_empty() {
            let identifier = spec.identifier().to_string();
            if self
                .call(Operation::Exists, cancel, self.gateway.exists(&identifier))
                .await?
            {
                let current = self
                    .call(Operation::Get, cancel, self.gateway.get(&identifier))
                    .await?;
                return Ok(Presence::Found(current));
            }

            warn!(
                "{} '{}' ({identifier}) disappeared from the provider",
                R::KIND,
                spec.natural_key()
            );
            spec.meta_mut().identifier.clear();
            spec.clear_observed();

            // Something else may have recreated it under the same name
            return Ok(match self.locate_by_key(spec, cancel).await? {
                Presence::Missing { .. } => Presence::Missing { drifted: true },
                found => found,
            });
        }

        self.locate_by_key(spec, cancel).await
    }

    /// Presence check by natural key, adopting the identifier if found.
    async fn locate_by_key(&self, spec: &mut R, cancel: &CancellationToken) -> Result<Presence<R::Current>> {
        let key = spec.natural_key().to_string();
        if self
            .call(Operation::Exists, cancel, self.gateway.exists(&key))
            .await?
        {
            let current = self
                .call(Operation::Get, cancel, self.gateway.get(&key))
                .await?;
            debug!("Adopting existing {} '{key}' ({})", R::KIND, current.identifier());
            spec.meta_mut().identifier = current.identifier().to_string();
            return Ok(Presence::Found(current));
        }

        Ok(Presence::Missing { drifted: false })
    }

    /// Creates the resource, then runs the secondary steps in order.
    async fn create(
        &self,
        spec: &mut R,
        applied: &mut Vec<R::Change>,
        warnings: &mut Vec<SubStepWarning>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!("Creating {} '{}'", R::KIND, spec.natural_key());

        self.call(Operation::Create, cancel, self.gateway.create(spec))
            .await?;

        if spec.identifier().is_empty() {
            return Err(ReconcilerError::Provider {
                kind: R::KIND,
                operation: Operation::Create,
                source: GatewayError::rejected("create returned no identifier"),
            });
        }

        info!(
            "Created {} '{}' ({})",
            R::KIND,
            spec.natural_key(),
            spec.identifier()
        );

        for change in spec.post_create() {
            self.apply(spec, change, applied, warnings, cancel).await?;
        }

        Ok(())
    }

    /// Copies observed fields and applies one update per differing field.
    async fn converge(
        &self,
        spec: &mut R,
        current: &R::Current,
        applied: &mut Vec<R::Change>,
        warnings: &mut Vec<SubStepWarning>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        spec.observe(current);

        let changes = spec.diff(current);
        if changes.is_empty() {
            debug!("{} '{}' is up to date", R::KIND, spec.natural_key());
            return Ok(());
        }

        for change in changes {
            self.apply(spec, change, applied, warnings, cancel).await?;
        }

        Ok(())
    }

    /// Re-reads the provider after updates so observed fields are current.
    async fn refresh(&self, spec: &mut R, cancel: &CancellationToken) -> Result<()> {
        let identifier = spec.identifier().to_string();
        let current = self
            .call(Operation::Get, cancel, self.gateway.get(&identifier))
            .await?;
        spec.observe(&current);
        Ok(())
    }

    /// Applies one change, downgrading best-effort failures to warnings.
    async fn apply(
        &self,
        spec: &R,
        change: R::Change,
        applied: &mut Vec<R::Change>,
        warnings: &mut Vec<SubStepWarning>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        debug!("Updating {} '{}': {:?}", R::KIND, spec.natural_key(), change);

        let result = self
            .call(Operation::Update, cancel, self.gateway.update(spec, &change))
            .await;

        match result {
            Ok(()) => {
                applied.push(change);
                Ok(())
            }
            Err(err) if R::is_best_effort(&change) && !err.is_cancelled() => {
                warn!(
                    "Best-effort step {:?} failed for {} '{}': {err}",
                    change,
                    R::KIND,
                    spec.natural_key()
                );
                warnings.push(SubStepWarning {
                    step: format!("{change:?}"),
                    error: err.to_string(),
                });
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Upserts (and for removal kinds, removes) tags.
    async fn reconcile_tags(
        &self,
        spec: &R,
        current: &Tags,
        cancel: &CancellationToken,
    ) -> Result<TagPlan> {
        if spec.tags().is_empty() || spec.identifier().is_empty() {
            return Ok(TagPlan::default());
        }

        let plan = plan_tags(spec.tags(), current, R::TAG_STRATEGY);
        if plan.is_empty() {
            debug!("Tags of {} '{}' are converged", R::KIND, spec.natural_key());
            return Ok(plan);
        }

        info!("Reconciling tags of {} '{}': {plan}", R::KIND, spec.natural_key());

        if !plan.upsert.is_empty() {
            self.call(
                Operation::TagResource,
                cancel,
                self.gateway.tag_resource(spec.identifier(), &plan.upsert),
            )
            .await?;
        }

        if !plan.remove.is_empty() {
            self.call(
                Operation::UntagResource,
                cancel,
                self.gateway.untag_resource(spec.identifier(), &plan.remove),
            )
            .await?;
        }

        Ok(plan)
    }

    /// Runs one gateway call under the cancellation token.
    async fn call<T>(
        &self,
        operation: Operation,
        cancel: &CancellationToken,
        call: impl Future<Output = GatewayResult<T>>,
    ) -> Result<T> {
        if cancel.is_cancelled() {
            return Err(ReconcilerError::Cancelled {
                kind: R::KIND,
                operation,
            });
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ReconcilerError::Cancelled {
                kind: R::KIND,
                operation,
            }),
            result = call => result.map_err(|source| ReconcilerError::Provider {
                kind: R::KIND,
                operation,
                source,
            }),
        }
    }
}

/// Outcome of the presence check.
enum Presence<C> {
    /// The resource exists.
    Found(C),
    /// The resource does not exist.
    Missing {
        /// An identifier was set but the resource vanished.
        drifted: bool,
    },
}

impl<C> SyncOutcome<C> {
    /// Returns true if a best-effort step failed.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Recreated => "recreated",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Call, MemoryGateway, Simulated};
    use crate::resource::{Identifiable, ResourceMeta};
    use crate::resource::kinds::{
        DbInstance, Function, FunctionChange, FunctionCode, Instance, InstanceStatus, Key, KeyChange,
        Queue, QueueChange, Table, TableChange,
    };
    use std::time::Duration;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn function(name: &str) -> Function {
        Function {
            name: name.to_string(),
            runtime: String::from("python3.12"),
            handler: Some(String::from("app.handler")),
            role: String::from("arn:sim:role:lambda"),
            code: FunctionCode {
                zip_file: Some(String::from("UEsDBA==")),
                ..FunctionCode::default()
            },
            ..Function::default()
        }
    }

    fn database(policy: &str) -> DbInstance {
        DbInstance {
            name: String::from("orders-db"),
            instance_class: String::from("db.t3.micro"),
            allocated_storage: 20,
            master_username: String::from("admin"),
            meta: ResourceMeta::default().with_policy(policy),
            ..DbInstance::default()
        }
    }

    #[tokio::test]
    async fn test_sync_creates_missing_resource_once() {
        let engine = Engine::new(MemoryGateway::<Queue>::new());
        let cancel = CancellationToken::new();
        let mut queue = Queue::new("net-a");

        let outcome = engine.sync(&mut queue, &cancel).await.unwrap();

        assert_eq!(outcome.action, SyncAction::Created);
        assert!(!queue.identifier().is_empty());
        assert!(queue.meta.last_sync_time.is_some());
        assert!(queue.is_ready());
        assert_eq!(engine.gateway().count(Operation::Create), 1);
        assert_eq!(
            engine.gateway().calls()[..2],
            [
                Call::Exists(String::from("net-a")),
                Call::Create(String::from("net-a"))
            ]
        );
    }

    #[tokio::test]
    async fn test_sync_never_creates_existing_resource() {
        let existing = Queue::new("net-a").materialize("queue-existing");
        let engine = Engine::new(MemoryGateway::<Queue>::with_resources([existing]));
        let mut queue = Queue::new("net-a");

        let outcome = engine
            .sync(&mut queue, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.action, SyncAction::Unchanged);
        assert_eq!(queue.identifier(), "queue-existing");
        assert_eq!(engine.gateway().count(Operation::Create), 0);
    }

    #[tokio::test]
    async fn test_second_sync_is_a_noop() {
        let engine = Engine::new(MemoryGateway::<Queue>::new());
        let cancel = CancellationToken::new();
        let mut queue = Queue {
            meta: ResourceMeta::with_tags(tags(&[("env", "prod")])),
            ..Queue::new("orders")
        };

        engine.sync(&mut queue, &cancel).await.unwrap();
        engine.gateway().clear_journal();

        let outcome = engine.sync(&mut queue, &cancel).await.unwrap();

        assert_eq!(outcome.action, SyncAction::Unchanged);
        assert!(outcome.tags.is_empty());
        assert!(engine.gateway().mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_single_field_difference_issues_one_update() {
        let mut seed = function("resize");
        seed.prepare().unwrap();
        let mut current = seed.materialize("id-123");
        current.timeout = 30;

        let engine = Engine::new(MemoryGateway::<Function>::with_resources([current]));
        let mut desired = Function {
            timeout: Some(60),
            ..function("resize")
        };
        desired.meta.identifier = String::from("id-123");

        let outcome = engine
            .sync(&mut desired, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.action, SyncAction::Updated);
        assert_eq!(outcome.applied, vec![FunctionChange::Timeout(60)]);
        assert_eq!(
            engine.gateway().mutating_calls(),
            vec![Call::Update {
                identifier: String::from("id-123"),
                change: FunctionChange::Timeout(60),
            }]
        );
    }

    #[tokio::test]
    async fn test_additive_tags_leave_unknown_keys() {
        let mut current = Queue::new("orders").materialize("queue-1");
        current.tags = tags(&[("env", "dev"), ("team", "x")]);
        let engine = Engine::new(MemoryGateway::<Queue>::with_resources([current]));

        let mut queue = Queue::new("orders");
        queue.meta.tags = tags(&[("env", "prod")]);
        engine
            .sync(&mut queue, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            engine.gateway().mutating_calls(),
            vec![Call::Tag {
                identifier: String::from("queue-1"),
                tags: tags(&[("env", "prod")]),
            }]
        );
        let hosted = engine.gateway().current("queue-1").unwrap();
        assert_eq!(hosted.tags, tags(&[("env", "prod"), ("team", "x")]));
    }

    #[tokio::test]
    async fn test_removal_strategy_untags_stale_keys() {
        let mut seed = function("resize");
        seed.prepare().unwrap();
        let mut current = seed.materialize("fn-1");
        current.tags = tags(&[("env", "prod"), ("team", "x")]);
        let engine = Engine::new(MemoryGateway::<Function>::with_resources([current]));

        let mut desired = function("resize");
        desired.meta.tags = tags(&[("env", "prod")]);
        let outcome = engine
            .sync(&mut desired, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.tags.remove, vec![String::from("team")]);
        assert_eq!(
            engine.gateway().mutating_calls(),
            vec![Call::Untag {
                identifier: String::from("fn-1"),
                keys: vec![String::from("team")],
            }]
        );
    }

    #[tokio::test]
    async fn test_invalid_spec_makes_no_gateway_calls() {
        let engine = Engine::new(MemoryGateway::<Queue>::new());
        let mut queue = Queue::new("");

        let err = engine
            .sync(&mut queue, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert!(engine.gateway().calls().is_empty());
    }

    #[tokio::test]
    async fn test_vanished_resource_is_recreated() {
        let engine = Engine::new(MemoryGateway::<Queue>::new());
        let cancel = CancellationToken::new();
        let mut queue = Queue::new("orders");
        engine.sync(&mut queue, &cancel).await.unwrap();
        let first = queue.identifier().to_string();

        engine.gateway().remove(&first);
        let outcome = engine.sync(&mut queue, &cancel).await.unwrap();

        assert_eq!(outcome.action, SyncAction::Recreated);
        assert_ne!(queue.identifier(), first);
        assert_eq!(engine.gateway().count(Operation::Create), 2);
    }

    #[tokio::test]
    async fn test_drifted_resource_recreated_by_name_is_adopted() {
        let engine = Engine::new(MemoryGateway::<Queue>::new());
        let cancel = CancellationToken::new();
        let mut queue = Queue::new("orders");
        engine.sync(&mut queue, &cancel).await.unwrap();

        engine
            .gateway()
            .import([Queue::new("orders").materialize("queue-external")]);
        engine.gateway().clear_journal();
        let outcome = engine.sync(&mut queue, &cancel).await.unwrap();

        assert_eq!(outcome.action, SyncAction::Unchanged);
        assert_eq!(queue.identifier(), "queue-external");
        assert_eq!(engine.gateway().count(Operation::Create), 0);
    }

    #[tokio::test]
    async fn test_update_refreshes_observed_fields() {
        let hosted = Key {
            alias: String::from("alias/app"),
            enabled: Some(false),
            ..Key::default()
        }
        .materialize("key-1");
        let engine = Engine::new(MemoryGateway::<Key>::with_resources([hosted]));
        let mut key = Key {
            alias: String::from("app"),
            ..Key::default()
        };

        let outcome = engine
            .sync(&mut key, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.action, SyncAction::Updated);
        assert_eq!(outcome.applied, vec![KeyChange::Enabled(true)]);
        assert_eq!(key.observed.key_state, "Enabled");
        assert!(key.is_ready());
    }

    #[tokio::test]
    async fn test_provider_error_carries_kind_and_operation() {
        let engine = Engine::new(MemoryGateway::<Queue>::new());
        engine
            .gateway()
            .fail_next(Operation::Create, GatewayError::transport("connection reset"));

        let err = engine
            .sync(&mut Queue::new("orders"), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ReconcilerError::Provider {
                kind, operation, ..
            } => {
                assert_eq!(kind, "queue");
                assert_eq!(operation, Operation::Create);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(engine.gateway().export().is_empty());
    }

    #[tokio::test]
    async fn test_failed_update_keeps_identifier() {
        let engine = Engine::new(MemoryGateway::<Queue>::new());
        let cancel = CancellationToken::new();
        let mut queue = Queue::new("orders");
        engine.sync(&mut queue, &cancel).await.unwrap();
        let identifier = queue.identifier().to_string();

        queue.visibility_timeout = Some(90);
        engine
            .gateway()
            .fail_next(Operation::Update, GatewayError::Throttled { retry_after_secs: 2 });
        let err = engine.sync(&mut queue, &cancel).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(queue.identifier(), identifier);

        let outcome = engine.sync(&mut queue, &cancel).await.unwrap();
        assert_eq!(outcome.applied, vec![QueueChange::VisibilityTimeout(90)]);
    }

    #[tokio::test]
    async fn test_best_effort_failure_becomes_warning() {
        let engine = Engine::new(MemoryGateway::<Table>::new());
        engine
            .gateway()
            .fail_next(Operation::Update, GatewayError::rejected("backups unavailable"));
        let mut table = Table {
            point_in_time_recovery: true,
            ..Table::new("sessions", "id")
        };

        let outcome = engine
            .sync(&mut table, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.action, SyncAction::Created);
        assert!(outcome.is_partial());
        assert!(outcome.applied.is_empty());
        assert!(!table.identifier().is_empty());
    }

    #[tokio::test]
    async fn test_post_create_step_runs_after_create() {
        let engine = Engine::new(MemoryGateway::<Table>::new());
        let mut table = Table {
            point_in_time_recovery: true,
            ..Table::new("sessions", "id")
        };

        let outcome = engine
            .sync(&mut table, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.applied, vec![TableChange::PointInTimeRecovery(true)]);
        let hosted = engine.gateway().current("sessions").unwrap();
        assert!(hosted.point_in_time_recovery);
    }

    #[tokio::test]
    async fn test_delete_with_stop_policy_stops_running_instance() {
        let engine = Engine::new(MemoryGateway::<Instance>::new());
        let cancel = CancellationToken::new();
        let mut instance = Instance::new("web", "t3.micro", "ami-1");
        instance.meta.deletion_policy = Some(String::from("Stop"));
        engine.sync(&mut instance, &cancel).await.unwrap();
        engine.gateway().clear_journal();

        let outcome = engine.delete(&instance, &cancel).await.unwrap();

        assert_eq!(outcome.action, DeleteAction::Stop);
        assert_eq!(engine.gateway().count(Operation::Stop), 1);
        assert_eq!(engine.gateway().count(Operation::Delete), 0);
        let hosted = engine.gateway().current("web").unwrap();
        assert_eq!(hosted.status, InstanceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_snapshot_policy_passes_supplied_snapshot_name() {
        let engine = Engine::new(MemoryGateway::<DbInstance>::new());
        let cancel = CancellationToken::new();
        let mut db = database("Snapshot");
        db.meta.final_snapshot_id = Some(String::from("orders-final"));
        engine.sync(&mut db, &cancel).await.unwrap();
        engine.gateway().clear_journal();

        let outcome = engine.delete(&db, &cancel).await.unwrap();

        assert_eq!(
            outcome.action,
            DeleteAction::SnapshotThenDelete {
                snapshot_id: String::from("orders-final")
            }
        );
        assert_eq!(
            engine.gateway().mutating_calls(),
            vec![Call::Delete {
                identifier: db.identifier().to_string(),
                final_snapshot_id: Some(String::from("orders-final")),
            }]
        );
        assert!(engine.gateway().export().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_policy_generates_prefixed_name() {
        let engine =
            Engine::new(MemoryGateway::<DbInstance>::new()).with_snapshot_prefix("nightly");
        let cancel = CancellationToken::new();
        let mut db = database("Snapshot");
        engine.sync(&mut db, &cancel).await.unwrap();
        engine.gateway().clear_journal();

        let outcome = engine.delete(&db, &cancel).await.unwrap();

        let snapshot_id = match outcome.action {
            DeleteAction::SnapshotThenDelete { snapshot_id } => snapshot_id,
            other => panic!("unexpected action: {other}"),
        };
        assert!(snapshot_id.starts_with("nightly-orders-db-"), "{snapshot_id}");
        assert_eq!(
            engine.gateway().mutating_calls(),
            vec![Call::Delete {
                identifier: db.identifier().to_string(),
                final_snapshot_id: Some(snapshot_id),
            }]
        );
    }

    #[tokio::test]
    async fn test_delete_never_created_is_noop() {
        let engine = Engine::new(MemoryGateway::<Queue>::new());

        let outcome = engine
            .delete(&Queue::new("orders"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.action.is_noop());
        assert!(engine.gateway().calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let engine = Engine::new(MemoryGateway::<Queue>::new());
        let cancel = CancellationToken::new();
        let mut queue = Queue::new("orders");
        engine.sync(&mut queue, &cancel).await.unwrap();

        engine.delete(&queue, &cancel).await.unwrap();
        engine.delete(&queue, &cancel).await.unwrap();

        assert_eq!(engine.gateway().count(Operation::Delete), 2);
        assert!(engine.gateway().export().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_any_call() {
        let engine = Engine::new(MemoryGateway::<Queue>::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine
            .sync(&mut Queue::new("orders"), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(engine.gateway().calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_slow_call() {
        let engine = Engine::new(
            MemoryGateway::<Queue>::new().with_latency(Duration::from_secs(30)),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = engine
            .sync(&mut Queue::new("orders"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReconcilerError::Cancelled {
                operation: Operation::Exists,
                ..
            }
        ));
        assert_eq!(engine.gateway().count(Operation::Create), 0);
    }
}
