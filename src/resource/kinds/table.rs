//! Key-value table.
//!
//! Point-in-time recovery is switched on right after creation as a
//! best-effort step: a failure there is logged and the sync still succeeds.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::gateway::Simulated;
use crate::resource::{
    DeletionPolicy, Diffable, Identifiable, Normalizable, ObservedState, Resource, ResourceMeta,
    Taggable, Tags, Validatable, require,
};

const STATUS_ACTIVE: &str = "ACTIVE";
const DEFAULT_STREAM_VIEW: &str = "NEW_AND_OLD_IMAGES";

/// Desired state of a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Partition key.
    pub hash_key: KeyAttribute,
    /// Sort key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_key: Option<KeyAttribute>,
    /// Capacity billing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_mode: Option<BillingMode>,
    /// Provisioned capacity; required with `PROVISIONED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput: Option<Throughput>,
    /// Continuous backups.
    #[serde(default)]
    pub point_in_time_recovery: bool,
    /// Change stream.
    #[serde(default)]
    pub stream_enabled: bool,
    /// What the stream carries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_view_type: Option<String>,
    /// Shared metadata.
    #[serde(flatten)]
    pub meta: ResourceMeta,
    /// Fields reported by the provider.
    #[serde(default)]
    pub observed: TableObserved,
}

/// A key attribute.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyAttribute {
    /// Attribute name.
    pub name: String,
    /// Attribute type.
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
}

/// Scalar key attribute types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum AttributeType {
    /// String.
    #[default]
    S,
    /// Number.
    N,
    /// Binary.
    B,
}

/// Capacity billing mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingMode {
    /// On-demand.
    #[default]
    PayPerRequest,
    /// Provisioned capacity.
    Provisioned,
}

/// Provisioned read and write capacity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Throughput {
    /// Read capacity units.
    pub read_capacity: u64,
    /// Write capacity units.
    pub write_capacity: u64,
}

/// Provider-owned table fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableObserved {
    /// Table ARN.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arn: String,
    /// Lifecycle status.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Approximate item count.
    #[serde(default)]
    pub item_count: u64,
}

/// Table as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableState {
    /// Table ARN, used as identifier.
    pub arn: String,
    /// Table name.
    pub name: String,
    /// Billing mode.
    pub billing_mode: BillingMode,
    /// Provisioned capacity.
    pub throughput: Option<Throughput>,
    /// Continuous backups.
    pub point_in_time_recovery: bool,
    /// Lifecycle status.
    pub status: String,
    /// Approximate item count.
    pub item_count: u64,
    /// Applied tags.
    pub tags: Tags,
}

/// One table update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableChange {
    /// Switch billing mode and capacity.
    Billing {
        /// New mode.
        mode: BillingMode,
        /// Capacity for provisioned mode.
        throughput: Option<Throughput>,
    },
    /// Enable or disable continuous backups.
    PointInTimeRecovery(bool),
}

impl Table {
    /// Creates an on-demand table keyed by a string attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, hash_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash_key: KeyAttribute {
                name: hash_key.into(),
                attribute_type: AttributeType::S,
            },
            ..Self::default()
        }
    }

    fn billing(&self) -> BillingMode {
        self.billing_mode.unwrap_or_default()
    }
}

impl Normalizable for Table {
    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.billing_mode.get_or_insert(BillingMode::PayPerRequest);
        if self.stream_enabled {
            self.stream_view_type
                .get_or_insert_with(|| String::from(DEFAULT_STREAM_VIEW));
        }
    }
}

impl Validatable for Table {
    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "name", &self.name)?;
        require(Self::KIND, "hash_key.name", &self.hash_key.name)?;
        if let Some(range) = &self.range_key {
            require(Self::KIND, "range_key.name", &range.name)?;
        }

        match (self.billing(), self.throughput) {
            (BillingMode::Provisioned, None) => Err(ValidationError::new(
                Self::KIND,
                "throughput",
                "provisioned billing requires read and write capacity",
            )),
            (BillingMode::Provisioned, Some(t)) if t.read_capacity == 0 || t.write_capacity == 0 => {
                Err(ValidationError::new(
                    Self::KIND,
                    "throughput",
                    "capacity units must be positive",
                ))
            }
            (BillingMode::PayPerRequest, Some(_)) => Err(ValidationError::new(
                Self::KIND,
                "throughput",
                "on-demand tables take no provisioned capacity",
            )),
            _ => Ok(()),
        }
    }
}

impl Identifiable for Table {
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

impl Diffable for Table {
    type Current = TableState;
    type Change = TableChange;

    fn observe(&mut self, current: &TableState) {
        self.observed = TableObserved {
            arn: current.arn.clone(),
            status: current.status.clone(),
            item_count: current.item_count,
        };
    }

    fn clear_observed(&mut self) {
        self.observed = TableObserved::default();
    }

    fn diff(&self, current: &TableState) -> Vec<TableChange> {
        let mut changes = Vec::new();
        if self.billing() != current.billing_mode || self.throughput != current.throughput {
            changes.push(TableChange::Billing {
                mode: self.billing(),
                throughput: self.throughput,
            });
        }
        if self.point_in_time_recovery != current.point_in_time_recovery {
            changes.push(TableChange::PointInTimeRecovery(self.point_in_time_recovery));
        }
        changes
    }

    fn post_create(&self) -> Vec<TableChange> {
        if self.point_in_time_recovery {
            vec![TableChange::PointInTimeRecovery(true)]
        } else {
            Vec::new()
        }
    }

    fn is_best_effort(change: &TableChange) -> bool {
        matches!(change, TableChange::PointInTimeRecovery(_))
    }
}

impl Taggable for Table {}

impl Resource for Table {
    const KIND: &'static str = "table";

    const ALLOWED_POLICIES: &'static [DeletionPolicy] = &[
        DeletionPolicy::Delete,
        DeletionPolicy::Retain,
        DeletionPolicy::Orphan,
        DeletionPolicy::Snapshot,
    ];

    fn is_ready(&self) -> bool {
        self.observed.status == STATUS_ACTIVE
    }
}

impl ObservedState for TableState {
    fn identifier(&self) -> &str {
        &self.arn
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }
}

impl Simulated for Table {
    const ID_PREFIX: &'static str = "table";

    fn materialize(&self, identifier: &str) -> TableState {
        TableState {
            arn: identifier.to_string(),
            name: self.name.clone(),
            billing_mode: self.billing(),
            throughput: self.throughput,
            point_in_time_recovery: false,
            status: String::from(STATUS_ACTIVE),
            item_count: 0,
            tags: Tags::new(),
        }
    }

    fn apply(current: &mut TableState, change: &TableChange) {
        match change {
            TableChange::Billing { mode, throughput } => {
                current.billing_mode = *mode;
                current.throughput = *throughput;
            }
            TableChange::PointInTimeRecovery(enabled) => current.point_in_time_recovery = *enabled,
        }
    }

    fn tags_mut(current: &mut TableState) -> &mut Tags {
        &mut current.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_on_demand() {
        let mut table = Table::new("sessions", "id");
        table.prepare().unwrap();
        assert_eq!(table.billing_mode, Some(BillingMode::PayPerRequest));
        assert!(table.stream_view_type.is_none());
    }

    #[test]
    fn test_stream_view_default() {
        let mut table = Table {
            stream_enabled: true,
            ..Table::new("sessions", "id")
        };
        table.prepare().unwrap();
        assert_eq!(table.stream_view_type.as_deref(), Some(DEFAULT_STREAM_VIEW));
    }

    #[test]
    fn test_provisioned_needs_throughput() {
        let mut table = Table {
            billing_mode: Some(BillingMode::Provisioned),
            ..Table::new("sessions", "id")
        };
        assert_eq!(table.prepare().unwrap_err().field, "throughput");

        table.throughput = Some(Throughput {
            read_capacity: 5,
            write_capacity: 5,
        });
        assert!(table.prepare().is_ok());
    }

    #[test]
    fn test_attribute_types_parse() {
        let yaml = "name: sessions\nhash_key:\n  name: id\n  type: N\n";
        let table: Table = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(table.hash_key.attribute_type, AttributeType::N);

        let bad = "name: sessions\nhash_key:\n  name: id\n  type: X\n";
        assert!(serde_yaml::from_str::<Table>(bad).is_err());
    }

    #[test]
    fn test_pitr_is_best_effort_post_create_step() {
        let table = Table {
            point_in_time_recovery: true,
            ..Table::new("sessions", "id")
        };
        let steps = table.post_create();
        assert_eq!(steps, vec![TableChange::PointInTimeRecovery(true)]);
        assert!(Table::is_best_effort(&steps[0]));
        assert!(!Table::is_best_effort(&TableChange::Billing {
            mode: BillingMode::PayPerRequest,
            throughput: None,
        }));
    }
}
