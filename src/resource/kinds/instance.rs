//! Compute instance.
//!
//! The only kind that accepts the `Stop` deletion policy: deleting a stopped
//! instance under `Stop` is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::gateway::Simulated;
use crate::resource::{
    DeletionPolicy, Diffable, Identifiable, Normalizable, ObservedState, Resource, ResourceMeta,
    Taggable, Tags, Validatable, require,
};

/// Default root volume type.
pub const DEFAULT_VOLUME_TYPE: &str = "gp3";

/// Desired state of a compute instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instance {
    /// Instance name.
    pub name: String,
    /// Instance type (e.g. "t3.micro").
    pub instance_type: String,
    /// Machine image.
    pub image_id: String,
    /// Subnet to launch into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    /// SSH key pair name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    /// Detailed monitoring.
    #[serde(default)]
    pub monitoring: bool,
    /// Root volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_volume: Option<RootVolume>,
    /// Shared metadata.
    #[serde(flatten)]
    pub meta: ResourceMeta,
    /// Fields reported by the provider.
    #[serde(default)]
    pub observed: InstanceObserved,
}

/// Root block device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootVolume {
    /// Size in GiB.
    pub size_gb: u32,
    /// Volume type, defaults to gp3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
}

/// Lifecycle state reported by the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Launching.
    #[default]
    Pending,
    /// Running.
    Running,
    /// Stopping.
    Stopping,
    /// Stopped.
    Stopped,
    /// Terminating.
    ShuttingDown,
    /// Terminated.
    Terminated,
}

/// Provider-owned instance fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceObserved {
    /// Lifecycle state.
    #[serde(default)]
    pub status: InstanceStatus,
    /// Private address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,
    /// Launch time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_time: Option<DateTime<Utc>>,
}

/// Instance as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceState {
    /// Instance id.
    pub instance_id: String,
    /// Value of the name tag.
    pub name: String,
    /// Instance type.
    pub instance_type: String,
    /// Machine image.
    pub image_id: String,
    /// Detailed monitoring.
    pub monitoring: bool,
    /// Lifecycle state.
    pub status: InstanceStatus,
    /// Private address.
    pub private_ip: Option<String>,
    /// Applied tags.
    pub tags: Tags,
    /// Launch time.
    pub launch_time: Option<DateTime<Utc>>,
}

/// One instance update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceChange {
    /// Change the instance type.
    InstanceType(String),
    /// Toggle detailed monitoring.
    Monitoring(bool),
}

impl Instance {
    /// Creates an instance specification.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        instance_type: impl Into<String>,
        image_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            instance_type: instance_type.into(),
            image_id: image_id.into(),
            ..Self::default()
        }
    }
}

impl Normalizable for Instance {
    fn normalize(&mut self) {
        if let Some(volume) = &mut self.root_volume {
            volume
                .volume_type
                .get_or_insert_with(|| String::from(DEFAULT_VOLUME_TYPE));
        }
    }
}

impl Validatable for Instance {
    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "name", &self.name)?;
        require(Self::KIND, "instance_type", &self.instance_type)?;
        require(Self::KIND, "image_id", &self.image_id)?;

        if let Some(volume) = &self.root_volume
            && volume.size_gb == 0
        {
            return Err(ValidationError::new(
                Self::KIND,
                "root_volume.size_gb",
                "root volume size must be positive",
            ));
        }

        Ok(())
    }
}

impl Identifiable for Instance {
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

impl Diffable for Instance {
    type Current = InstanceState;
    type Change = InstanceChange;

    fn observe(&mut self, current: &InstanceState) {
        self.observed = InstanceObserved {
            status: current.status,
            private_ip: current.private_ip.clone(),
            launch_time: current.launch_time,
        };
    }

    fn clear_observed(&mut self) {
        self.observed = InstanceObserved::default();
    }

    fn diff(&self, current: &InstanceState) -> Vec<InstanceChange> {
        let mut changes = Vec::new();
        if self.instance_type != current.instance_type {
            changes.push(InstanceChange::InstanceType(self.instance_type.clone()));
        }
        if self.monitoring != current.monitoring {
            changes.push(InstanceChange::Monitoring(self.monitoring));
        }
        changes
    }
}

impl Taggable for Instance {}

impl Resource for Instance {
    const KIND: &'static str = "instance";

    const ALLOWED_POLICIES: &'static [DeletionPolicy] = &[
        DeletionPolicy::Delete,
        DeletionPolicy::Retain,
        DeletionPolicy::Orphan,
        DeletionPolicy::Stop,
    ];

    fn is_ready(&self) -> bool {
        self.observed.status == InstanceStatus::Running
    }

    fn is_quiesced(&self) -> bool {
        self.observed.status == InstanceStatus::Stopped
    }
}

impl ObservedState for InstanceState {
    fn identifier(&self) -> &str {
        &self.instance_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }
}

impl Simulated for Instance {
    const ID_PREFIX: &'static str = "i";

    fn materialize(&self, identifier: &str) -> InstanceState {
        InstanceState {
            instance_id: identifier.to_string(),
            name: self.name.clone(),
            instance_type: self.instance_type.clone(),
            image_id: self.image_id.clone(),
            monitoring: self.monitoring,
            status: InstanceStatus::Running,
            private_ip: Some(String::from("10.0.0.10")),
            tags: Tags::new(),
            launch_time: Some(Utc::now()),
        }
    }

    fn apply(current: &mut InstanceState, change: &InstanceChange) {
        match change {
            InstanceChange::InstanceType(t) => current.instance_type.clone_from(t),
            InstanceChange::Monitoring(m) => current.monitoring = *m,
        }
    }

    fn tags_mut(current: &mut InstanceState) -> &mut Tags {
        &mut current.tags
    }

    fn stop(current: &mut InstanceState) -> bool {
        current.status = InstanceStatus::Stopped;
        true
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_fields() {
        let mut instance = Instance::new("web", "", "ami-1");
        let err = instance.prepare().unwrap_err();
        assert_eq!(err.field, "instance_type");
    }

    #[test]
    fn test_root_volume_defaults_to_gp3() {
        let mut instance = Instance {
            root_volume: Some(RootVolume {
                size_gb: 20,
                volume_type: None,
            }),
            ..Instance::new("web", "t3.micro", "ami-1")
        };
        instance.prepare().unwrap();
        assert_eq!(
            instance.root_volume.unwrap().volume_type.as_deref(),
            Some(DEFAULT_VOLUME_TYPE)
        );
    }

    #[test]
    fn test_stop_policy_allowed() {
        let mut instance = Instance::new("web", "t3.micro", "ami-1");
        instance.meta.deletion_policy = Some(String::from("stop"));
        instance.prepare().unwrap();
        assert_eq!(instance.deletion_policy(), Ok(DeletionPolicy::Stop));
        assert!(!instance.is_deletable());
    }

    #[test]
    fn test_quiesced_follows_status() {
        let mut instance = Instance::new("web", "t3.micro", "ami-1");
        let mut current = instance.materialize("i-1");
        instance.observe(&current);
        assert!(instance.is_ready());
        assert!(!instance.is_quiesced());

        assert!(Instance::stop(&mut current));
        instance.observe(&current);
        assert!(instance.is_quiesced());
    }

    #[test]
    fn test_diff() {
        let instance = Instance {
            monitoring: true,
            ..Instance::new("web", "t3.large", "ami-1")
        };
        let current = Instance::new("web", "t3.micro", "ami-1").materialize("i-1");

        assert_eq!(
            instance.diff(&current),
            vec![
                InstanceChange::InstanceType(String::from("t3.large")),
                InstanceChange::Monitoring(true),
            ]
        );
    }
}
