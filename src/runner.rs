//! Manifest runner.
//!
//! Drives one engine per resource over a whole manifest: sync in manifest
//! order, delete in reverse order. Stops at the first failure unless told to
//! continue; cancellation always stops the run.

use serde::Serialize;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ManifestResource;
use crate::error::Result;
use crate::gateway::{ProviderGateway, SimulatedProvider};
use crate::reconciler::{DEFAULT_SNAPSHOT_PREFIX, DeleteAction, Engine, SubStepWarning, SyncAction};
use crate::resource::Resource;

/// Runs engines over every resource of a manifest.
#[derive(Debug)]
pub struct ManifestRunner<'a> {
    /// Gateways, one per kind.
    provider: &'a SimulatedProvider,
    /// Prefix for generated final snapshot names.
    snapshot_prefix: String,
    /// Whether to continue after a failed resource.
    continue_on_error: bool,
    /// Cancellation shared by every engine call.
    cancel: CancellationToken,
}

/// Outcome for a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceReport {
    /// Resource kind.
    pub kind: &'static str,
    /// Natural key.
    pub name: String,
    /// Provider identifier after the run.
    pub identifier: String,
    /// What happened.
    pub status: ResourceStatus,
    /// Whether the provider reports the resource as usable.
    pub ready: bool,
    /// Changes applied, rendered for display.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,
    /// Tag keys upserted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags_upserted: Vec<String>,
    /// Tag keys removed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags_removed: Vec<String>,
    /// Best-effort steps that failed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<SubStepWarning>,
    /// Delete action taken.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_action: Option<DeleteAction>,
    /// Error message, if the resource failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-resource status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Sync created the resource.
    Created,
    /// Sync recreated a vanished resource.
    Recreated,
    /// Sync updated mutable fields.
    Updated,
    /// Sync found nothing to change.
    Unchanged,
    /// Delete removed the resource.
    Deleted,
    /// Delete quiesced the resource.
    Stopped,
    /// Delete left the resource in place.
    Skipped,
    /// The resource failed.
    Failed,
    /// The run stopped before reaching the resource.
    NotRun,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Per-resource outcomes, in processing order.
    pub resources: Vec<ResourceReport>,
    /// Whether the run was cancelled.
    pub cancelled: bool,
}

impl<'a> ManifestRunner<'a> {
    /// Creates a runner over `provider`.
    #[must_use]
    pub fn new(provider: &'a SimulatedProvider) -> Self {
        Self {
            provider,
            snapshot_prefix: String::from(DEFAULT_SNAPSHOT_PREFIX),
            continue_on_error: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the prefix of generated final snapshot names.
    #[must_use]
    pub fn with_snapshot_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.snapshot_prefix = prefix.into();
        self
    }

    /// Sets whether to continue after a failed resource.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Uses `cancel` for every engine call.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Syncs every resource in order.
    pub async fn sync_all(&self, resources: &mut [ManifestResource]) -> RunReport {
        info!("Syncing {} resource(s)", resources.len());
        let mut report = RunReport::default();
        let mut halted = false;

        for resource in resources.iter_mut() {
            if halted {
                report.resources.push(ResourceReport::new(resource, ResourceStatus::NotRun));
                continue;
            }

            let result = self.sync_one(resource).await;
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    error!("Failed to sync {} '{}': {e}", resource.kind(), resource.name());
                    report.cancelled |= e.is_cancelled();
                    halted = !self.continue_on_error || e.is_cancelled();
                    ResourceReport::failed(resource, &e)
                }
            };
            report.resources.push(entry);
        }

        report
    }

    /// Deletes every resource in reverse order.
    pub async fn delete_all(&self, resources: &[ManifestResource]) -> RunReport {
        info!("Deleting {} resource(s)", resources.len());
        let mut report = RunReport::default();
        let mut halted = false;

        for resource in resources.iter().rev() {
            if halted {
                report.resources.push(ResourceReport::new(resource, ResourceStatus::NotRun));
                continue;
            }

            let result = self.delete_one(resource).await;
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    error!("Failed to delete {} '{}': {e}", resource.kind(), resource.name());
                    report.cancelled |= e.is_cancelled();
                    halted = !self.continue_on_error || e.is_cancelled();
                    ResourceReport::failed(resource, &e)
                }
            };
            report.resources.push(entry);
        }

        report
    }

    async fn sync_one(&self, resource: &mut ManifestResource) -> Result<ResourceReport> {
        let p = self.provider;
        match resource {
            ManifestResource::Queue(r) => self.sync_with(&p.queues, r).await,
            ManifestResource::Instance(r) => self.sync_with(&p.instances, r).await,
            ManifestResource::DbInstance(r) => self.sync_with(&p.db_instances, r).await,
            ManifestResource::Key(r) => self.sync_with(&p.keys, r).await,
            ManifestResource::HostedZone(r) => self.sync_with(&p.hosted_zones, r).await,
            ManifestResource::Function(r) => self.sync_with(&p.functions, r).await,
            ManifestResource::Table(r) => self.sync_with(&p.tables, r).await,
        }
    }

    async fn delete_one(&self, resource: &ManifestResource) -> Result<ResourceReport> {
        let p = self.provider;
        match resource {
            ManifestResource::Queue(r) => self.delete_with(&p.queues, r).await,
            ManifestResource::Instance(r) => self.delete_with(&p.instances, r).await,
            ManifestResource::DbInstance(r) => self.delete_with(&p.db_instances, r).await,
            ManifestResource::Key(r) => self.delete_with(&p.keys, r).await,
            ManifestResource::HostedZone(r) => self.delete_with(&p.hosted_zones, r).await,
            ManifestResource::Function(r) => self.delete_with(&p.functions, r).await,
            ManifestResource::Table(r) => self.delete_with(&p.tables, r).await,
        }
    }

    async fn sync_with<R, G>(&self, gateway: G, spec: &mut R) -> Result<ResourceReport>
    where
        R: Resource,
        G: ProviderGateway<R>,
    {
        let engine = Engine::new(gateway).with_snapshot_prefix(self.snapshot_prefix.as_str());
        let outcome = engine.sync(spec, &self.cancel).await?;

        let status = match outcome.action {
            SyncAction::Created => ResourceStatus::Created,
            SyncAction::Recreated => ResourceStatus::Recreated,
            SyncAction::Updated => ResourceStatus::Updated,
            SyncAction::Unchanged => ResourceStatus::Unchanged,
        };

        let mut tags_upserted: Vec<String> = outcome.tags.upsert.keys().cloned().collect();
        tags_upserted.sort_unstable();

        Ok(ResourceReport {
            kind: R::KIND,
            name: spec.natural_key().to_string(),
            identifier: spec.identifier().to_string(),
            status,
            ready: spec.is_ready(),
            changes: outcome.applied.iter().map(|c| format!("{c:?}")).collect(),
            tags_upserted,
            tags_removed: outcome.tags.remove.clone(),
            warnings: outcome.warnings,
            delete_action: None,
            error: None,
        })
    }

    async fn delete_with<R, G>(&self, gateway: G, spec: &R) -> Result<ResourceReport>
    where
        R: Resource,
        G: ProviderGateway<R>,
    {
        let engine = Engine::new(gateway).with_snapshot_prefix(self.snapshot_prefix.as_str());
        let outcome = engine.delete(spec, &self.cancel).await?;

        let status = match outcome.action {
            DeleteAction::Skip { .. } => ResourceStatus::Skipped,
            DeleteAction::Delete | DeleteAction::SnapshotThenDelete { .. } => {
                ResourceStatus::Deleted
            }
            DeleteAction::Stop => ResourceStatus::Stopped,
        };

        Ok(ResourceReport {
            kind: R::KIND,
            name: spec.natural_key().to_string(),
            identifier: spec.identifier().to_string(),
            status,
            ready: false,
            changes: Vec::new(),
            tags_upserted: Vec::new(),
            tags_removed: Vec::new(),
            warnings: Vec::new(),
            delete_action: Some(outcome.action),
            error: None,
        })
    }
}

impl ResourceReport {
    fn new(resource: &ManifestResource, status: ResourceStatus) -> Self {
        Self {
            kind: resource.kind(),
            name: resource.name().to_string(),
            identifier: resource.meta().identifier.clone(),
            status,
            ready: resource.is_ready(),
            changes: Vec::new(),
            tags_upserted: Vec::new(),
            tags_removed: Vec::new(),
            warnings: Vec::new(),
            delete_action: None,
            error: None,
        }
    }

    fn failed(resource: &ManifestResource, error: &impl fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(resource, ResourceStatus::Failed)
        }
    }

    /// Label used in logs and output.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

impl RunReport {
    /// Returns true if no resource failed and the run was not cancelled.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed() == 0
    }

    /// Number of resources with `status`.
    #[must_use]
    pub fn count(&self, status: ResourceStatus) -> usize {
        self.resources.iter().filter(|r| r.status == status).count()
    }

    /// Number of failed resources.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(ResourceStatus::Failed)
    }

    /// Number of best-effort warnings across all resources.
    #[must_use]
    pub fn warnings(&self) -> usize {
        self.resources.iter().map(|r| r.warnings.len()).sum()
    }

    /// First error message, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.resources.iter().find_map(|r| r.error.as_deref())
    }

    /// Labels of every processed resource.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.resources.iter().map(ResourceReport::label).collect()
    }
}

impl ResourceStatus {
    /// Returns true for the outcomes of a successful sync.
    #[must_use]
    pub const fn is_sync(self) -> bool {
        matches!(
            self,
            Self::Created | Self::Recreated | Self::Updated | Self::Unchanged
        )
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Recreated => "recreated",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Deleted => "deleted",
            Self::Stopped => "stopped",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::NotRun => "not run",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run Report")?;
        writeln!(f, "==========")?;
        writeln!(f)?;
        for r in &self.resources {
            write!(f, "  {:<28} {}", r.label(), r.status)?;
            if let Some(err) = &r.error {
                write!(f, " ({err})")?;
            }
            writeln!(f)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Summary: {} created, {} updated, {} deleted, {} failed, {} warning(s)",
            self.count(ResourceStatus::Created) + self.count(ResourceStatus::Recreated),
            self.count(ResourceStatus::Updated),
            self.count(ResourceStatus::Deleted),
            self.failed(),
            self.warnings()
        )
    }
}
