//! Manifest types.
//!
//! A manifest is the YAML document listing every resource to reconcile:
//!
//! ```yaml
//! defaults:
//!   tags:
//!     owner: platform
//! engine:
//!   snapshot_prefix: final
//! resources:
//!   - kind: queue
//!     name: orders
//!     visibility_timeout: 60
//!   - kind: table
//!     name: sessions
//!     hash_key: { name: id, type: S }
//!     deletion_policy: Retain
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::reconciler::DEFAULT_SNAPSHOT_PREFIX;
use crate::resource::kinds::{DbInstance, Function, HostedZone, Instance, Key, Queue, Table};
use crate::resource::{Identifiable, Resource, ResourceMeta, Tags};

/// Root of a manifest file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    /// Values applied to every resource.
    #[serde(default)]
    pub defaults: Defaults,
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Resources, in reconciliation order.
    #[serde(default)]
    pub resources: Vec<ManifestResource>,
}

/// Values applied to every resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Defaults {
    /// Tags merged under each resource's own tags.
    #[serde(default)]
    pub tags: Tags,
}

/// Engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Prefix of generated final snapshot names.
    #[serde(default = "default_snapshot_prefix")]
    pub snapshot_prefix: String,
}

/// One resource entry, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManifestResource {
    /// Message queue.
    Queue(Queue),
    /// Compute instance.
    Instance(Instance),
    /// Database instance.
    DbInstance(DbInstance),
    /// Encryption key.
    Key(Key),
    /// DNS hosted zone.
    HostedZone(HostedZone),
    /// Serverless function.
    Function(Function),
    /// Key-value table.
    Table(Table),
}

fn default_snapshot_prefix() -> String {
    String::from(DEFAULT_SNAPSHOT_PREFIX)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_prefix: default_snapshot_prefix(),
        }
    }
}

/// Runs `$body` with `$r` bound to the inner specification.
macro_rules! each_kind {
    ($value:expr, $r:ident => $body:expr) => {
        match $value {
            ManifestResource::Queue($r) => $body,
            ManifestResource::Instance($r) => $body,
            ManifestResource::DbInstance($r) => $body,
            ManifestResource::Key($r) => $body,
            ManifestResource::HostedZone($r) => $body,
            ManifestResource::Function($r) => $body,
            ManifestResource::Table($r) => $body,
        }
    };
}

impl ManifestResource {
    /// Kind name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Queue(_) => Queue::KIND,
            Self::Instance(_) => Instance::KIND,
            Self::DbInstance(_) => DbInstance::KIND,
            Self::Key(_) => Key::KIND,
            Self::HostedZone(_) => HostedZone::KIND,
            Self::Function(_) => Function::KIND,
            Self::Table(_) => Table::KIND,
        }
    }

    /// Natural key.
    #[must_use]
    pub fn name(&self) -> &str {
        each_kind!(self, r => r.natural_key())
    }

    /// Shared metadata.
    #[must_use]
    pub fn meta(&self) -> &ResourceMeta {
        each_kind!(self, r => r.meta())
    }

    /// Mutable shared metadata.
    pub fn meta_mut(&mut self) -> &mut ResourceMeta {
        each_kind!(self, r => r.meta_mut())
    }

    /// Returns true when the provider reports the resource as usable.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        each_kind!(self, r => r.is_ready())
    }

    /// Normalizes, fills the default policy, then validates.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn prepare(&mut self) -> Result<(), ValidationError> {
        each_kind!(self, r => r.prepare())
    }

    /// Merges `defaults` under the resource's own tags.
    pub fn apply_default_tags(&mut self, defaults: &Tags) {
        let tags = &mut self.meta_mut().tags;
        for (key, value) in defaults {
            tags.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    /// Takes over the identifier and observed fields recorded by an earlier run.
    ///
    /// Returns false if `recorded` is a different kind.
    pub fn adopt(&mut self, recorded: &Self) -> bool {
        macro_rules! take {
            ($a:ident, $b:ident) => {{
                $a.meta.identifier.clone_from(&$b.meta.identifier);
                $a.meta.last_sync_time = $b.meta.last_sync_time;
                $a.observed.clone_from(&$b.observed);
                true
            }};
        }

        match (self, recorded) {
            (Self::Queue(a), Self::Queue(b)) => take!(a, b),
            (Self::Instance(a), Self::Instance(b)) => take!(a, b),
            (Self::DbInstance(a), Self::DbInstance(b)) => take!(a, b),
            (Self::Key(a), Self::Key(b)) => take!(a, b),
            (Self::HostedZone(a), Self::HostedZone(b)) => take!(a, b),
            (Self::Function(a), Self::Function(b)) => take!(a, b),
            (Self::Table(a), Self::Table(b)) => take!(a, b),
            _ => false,
        }
    }
}

impl Manifest {
    /// Applies manifest-wide defaults to every resource.
    pub fn apply_defaults(&mut self) {
        if self.defaults.tags.is_empty() {
            return;
        }
        for resource in &mut self.resources {
            resource.apply_default_tags(&self.defaults.tags);
        }
    }

    /// Adopts identifiers recorded for resources with the same kind and name.
    ///
    /// Returns the number of resources adopted.
    pub fn adopt_recorded(&mut self, recorded: &[ManifestResource]) -> usize {
        let mut adopted = 0;
        for resource in &mut self.resources {
            let found = recorded
                .iter()
                .find(|r| r.kind() == resource.kind() && r.name() == resource.name());
            if let Some(previous) = found
                && resource.adopt(previous)
            {
                adopted += 1;
            }
        }
        adopted
    }

    /// Finds a resource by kind and name.
    #[must_use]
    pub fn find(&self, kind: &str, name: &str) -> Option<&ManifestResource> {
        self.resources
            .iter()
            .find(|r| r.kind() == kind && r.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r"
defaults:
  tags:
    owner: platform
    env: dev
resources:
  - kind: queue
    name: orders
    tags:
      env: prod
  - kind: hosted_zone
    name: Example.com
  - kind: key
    alias: payments
    deletion_policy: Delete
";

    #[test]
    fn test_parse_tagged_resources() {
        let manifest: Manifest = serde_yaml::from_str(MANIFEST).unwrap();

        assert_eq!(manifest.resources.len(), 3);
        assert_eq!(manifest.resources[0].kind(), "queue");
        assert_eq!(manifest.resources[1].kind(), "hosted_zone");
        assert_eq!(manifest.engine.snapshot_prefix, DEFAULT_SNAPSHOT_PREFIX);
        assert_eq!(
            manifest.resources[2].meta().deletion_policy.as_deref(),
            Some("Delete")
        );
    }

    #[test]
    fn test_resource_tags_win_over_defaults() {
        let mut manifest: Manifest = serde_yaml::from_str(MANIFEST).unwrap();
        manifest.apply_defaults();

        let tags = &manifest.resources[0].meta().tags;
        assert_eq!(tags.get("env").map(String::as_str), Some("prod"));
        assert_eq!(tags.get("owner").map(String::as_str), Some("platform"));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let yaml = "resources:\n  - kind: bucket\n    name: x\n";
        assert!(serde_yaml::from_str::<Manifest>(yaml).is_err());
    }

    #[test]
    fn test_adopt_recorded_by_kind_and_name() {
        let mut recorded = ManifestResource::Queue(Queue::new("orders"));
        recorded.meta_mut().identifier = String::from("queue-1");
        let other = ManifestResource::Table(Table::new("orders", "id"));

        let mut manifest = Manifest {
            resources: vec![ManifestResource::Queue(Queue::new("orders"))],
            ..Manifest::default()
        };

        assert_eq!(manifest.adopt_recorded(&[other, recorded]), 1);
        assert_eq!(manifest.resources[0].meta().identifier, "queue-1");
        assert!(manifest.find("queue", "orders").is_some());
        assert!(manifest.find("table", "orders").is_none());
    }
}
