//! DNS hosted zone.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::gateway::Simulated;
use crate::resource::{
    Diffable, Identifiable, Normalizable, ObservedState, Resource, ResourceMeta, Taggable, Tags,
    Validatable, require,
};

/// Comment applied when none is declared.
pub const DEFAULT_COMMENT: &str = "Managed by infra-reconcile";

/// Desired state of a hosted zone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostedZone {
    /// Domain name, stored lowercase with a trailing dot.
    pub name: String,
    /// Private zones resolve only inside their network.
    #[serde(default)]
    pub private_zone: bool,
    /// Network the private zone is attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    /// Region of that network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_region: Option<String>,
    /// Free-form comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Shared metadata.
    #[serde(flatten)]
    pub meta: ResourceMeta,
    /// Fields reported by the provider.
    #[serde(default)]
    pub observed: HostedZoneObserved,
}

/// Provider-owned zone fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostedZoneObserved {
    /// Delegation name servers; empty for private zones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name_servers: Vec<String>,
    /// Number of record sets.
    #[serde(default)]
    pub record_count: u64,
}

/// Hosted zone as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostedZoneState {
    /// Zone id, used as identifier.
    pub zone_id: String,
    /// Domain name.
    pub name: String,
    /// Private flag.
    pub private_zone: bool,
    /// Comment.
    pub comment: String,
    /// Delegation name servers.
    pub name_servers: Vec<String>,
    /// Number of record sets.
    pub record_count: u64,
    /// Applied tags.
    pub tags: Tags,
}

/// One zone update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostedZoneChange {
    /// Update the comment.
    Comment(String),
}

impl Normalizable for HostedZone {
    fn normalize(&mut self) {
        let mut name = self.name.trim().to_lowercase();
        if !name.is_empty() && !name.ends_with('.') {
            name.push('.');
        }
        self.name = name;
        self.comment
            .get_or_insert_with(|| String::from(DEFAULT_COMMENT));
    }
}

impl Validatable for HostedZone {
    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "name", &self.name)?;

        let has_vpc = self.vpc_id.is_some() || self.vpc_region.is_some();
        if self.private_zone {
            require(Self::KIND, "vpc_id", self.vpc_id.as_deref().unwrap_or_default())?;
            require(
                Self::KIND,
                "vpc_region",
                self.vpc_region.as_deref().unwrap_or_default(),
            )?;
        } else if has_vpc {
            return Err(ValidationError::new(
                Self::KIND,
                "vpc_id",
                "public hosted zone cannot be attached to a network",
            ));
        }

        Ok(())
    }
}

impl Identifiable for HostedZone {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

impl Diffable for HostedZone {
    type Current = HostedZoneState;
    type Change = HostedZoneChange;

    fn observe(&mut self, current: &HostedZoneState) {
        self.observed = HostedZoneObserved {
            name_servers: current.name_servers.clone(),
            record_count: current.record_count,
        };
    }

    fn clear_observed(&mut self) {
        self.observed = HostedZoneObserved::default();
    }

    fn diff(&self, current: &HostedZoneState) -> Vec<HostedZoneChange> {
        self.comment
            .as_ref()
            .filter(|c| **c != current.comment)
            .map(|c| HostedZoneChange::Comment(c.clone()))
            .into_iter()
            .collect()
    }
}

impl Taggable for HostedZone {}

impl Resource for HostedZone {
    const KIND: &'static str = "hosted_zone";

    fn is_ready(&self) -> bool {
        self.meta.is_created() && (self.private_zone || !self.observed.name_servers.is_empty())
    }
}

impl ObservedState for HostedZoneState {
    fn identifier(&self) -> &str {
        &self.zone_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }
}

impl Simulated for HostedZone {
    const ID_PREFIX: &'static str = "zone";

    fn materialize(&self, identifier: &str) -> HostedZoneState {
        let name_servers = if self.private_zone {
            Vec::new()
        } else {
            (1..=4).map(|n| format!("ns-{n}.dns.sim.")).collect()
        };
        HostedZoneState {
            zone_id: identifier.to_string(),
            name: self.name.clone(),
            private_zone: self.private_zone,
            comment: self.comment.clone().unwrap_or_default(),
            name_servers,
            // SOA and NS
            record_count: 2,
            tags: Tags::new(),
        }
    }

    fn apply(current: &mut HostedZoneState, change: &HostedZoneChange) {
        match change {
            HostedZoneChange::Comment(c) => current.comment.clone_from(c),
        }
    }

    fn tags_mut(current: &mut HostedZoneState) -> &mut Tags {
        &mut current.tags
    }
}
