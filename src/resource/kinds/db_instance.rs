//! Managed relational database instance.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::gateway::Simulated;
use crate::resource::{
    DeletionPolicy, Diffable, Identifiable, Normalizable, ObservedState, Resource, ResourceMeta,
    Taggable, Tags, Validatable, require, require_range,
};

/// Default backup retention in days.
pub const DEFAULT_BACKUP_RETENTION: u32 = 7;

/// Minimum allocated storage in GiB.
pub const MIN_ALLOCATED_STORAGE: u32 = 20;

const STATUS_AVAILABLE: &str = "available";

/// Desired state of a database instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbInstance {
    /// Instance name chosen by the caller.
    pub name: String,
    /// Database engine.
    pub engine: DbEngine,
    /// Engine version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    /// Instance class (e.g. "db.t3.micro").
    pub instance_class: String,
    /// Allocated storage in GiB.
    pub allocated_storage: u32,
    /// Master user name.
    pub master_username: String,
    /// Master password; never persisted.
    #[serde(default, skip_serializing)]
    pub master_password: String,
    /// Listener port, defaults per engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Backup retention in days (0..=35).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_retention_period: Option<u32>,
    /// Standby in a second zone.
    #[serde(default)]
    pub multi_az: bool,
    /// Shared metadata.
    #[serde(flatten)]
    pub meta: ResourceMeta,
    /// Fields reported by the provider.
    #[serde(default)]
    pub observed: DbInstanceObserved,
}

/// Supported database engines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbEngine {
    /// `PostgreSQL`.
    #[default]
    Postgres,
    /// `MySQL`.
    Mysql,
    /// `MariaDB`.
    Mariadb,
}

/// Provider-owned database fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbInstanceObserved {
    /// Instance ARN.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arn: String,
    /// Lifecycle status.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Connection endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Database instance as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbInstanceState {
    /// Instance ARN, used as identifier.
    pub arn: String,
    /// Instance name.
    pub name: String,
    /// Engine.
    pub engine: DbEngine,
    /// Instance class.
    pub instance_class: String,
    /// Allocated storage.
    pub allocated_storage: u32,
    /// Backup retention.
    pub backup_retention_period: u32,
    /// Multi-zone standby.
    pub multi_az: bool,
    /// Lifecycle status.
    pub status: String,
    /// Connection endpoint.
    pub endpoint: Option<String>,
    /// Applied tags.
    pub tags: Tags,
}

/// One database update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbInstanceChange {
    /// Change the instance class.
    InstanceClass(String),
    /// Change allocated storage.
    AllocatedStorage(u32),
    /// Change backup retention.
    BackupRetentionPeriod(u32),
    /// Toggle the multi-zone standby.
    MultiAz(bool),
}

impl DbEngine {
    /// Returns the engine's default port.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::Mysql | Self::Mariadb => 3306,
        }
    }
}

impl Normalizable for DbInstance {
    fn normalize(&mut self) {
        self.name = self.name.trim().to_lowercase();
        self.port.get_or_insert(self.engine.default_port());
        self.backup_retention_period
            .get_or_insert(DEFAULT_BACKUP_RETENTION);
    }
}

impl Validatable for DbInstance {
    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "name", &self.name)?;
        require(Self::KIND, "instance_class", &self.instance_class)?;
        require(Self::KIND, "master_username", &self.master_username)?;

        if self.allocated_storage < MIN_ALLOCATED_STORAGE {
            return Err(ValidationError::new(
                Self::KIND,
                "allocated_storage",
                format!("allocated storage must be at least {MIN_ALLOCATED_STORAGE} GiB"),
            ));
        }

        if let Some(days) = self.backup_retention_period {
            require_range(Self::KIND, "backup_retention_period", days, 0, 35)?;
        }

        Ok(())
    }
}

impl Identifiable for DbInstance {
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

impl Diffable for DbInstance {
    type Current = DbInstanceState;
    type Change = DbInstanceChange;

    fn observe(&mut self, current: &DbInstanceState) {
        self.observed = DbInstanceObserved {
            arn: current.arn.clone(),
            status: current.status.clone(),
            endpoint: current.endpoint.clone(),
        };
    }

    fn clear_observed(&mut self) {
        self.observed = DbInstanceObserved::default();
    }

    fn diff(&self, current: &DbInstanceState) -> Vec<DbInstanceChange> {
        let mut changes = Vec::new();
        if self.instance_class != current.instance_class {
            changes.push(DbInstanceChange::InstanceClass(self.instance_class.clone()));
        }
        if self.allocated_storage != current.allocated_storage {
            changes.push(DbInstanceChange::AllocatedStorage(self.allocated_storage));
        }
        if let Some(days) = self
            .backup_retention_period
            .filter(|d| *d != current.backup_retention_period)
        {
            changes.push(DbInstanceChange::BackupRetentionPeriod(days));
        }
        if self.multi_az != current.multi_az {
            changes.push(DbInstanceChange::MultiAz(self.multi_az));
        }
        changes
    }
}

impl Taggable for DbInstance {}

impl Resource for DbInstance {
    const KIND: &'static str = "db_instance";

    const ALLOWED_POLICIES: &'static [DeletionPolicy] = &[
        DeletionPolicy::Delete,
        DeletionPolicy::Retain,
        DeletionPolicy::Orphan,
        DeletionPolicy::Snapshot,
    ];

    fn is_ready(&self) -> bool {
        self.observed.status == STATUS_AVAILABLE
    }
}

impl ObservedState for DbInstanceState {
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

impl Simulated for DbInstance {
    const ID_PREFIX: &'static str = "db";

    fn materialize(&self, identifier: &str) -> DbInstanceState {
        let port = self.port.unwrap_or_else(|| self.engine.default_port());
        DbInstanceState {
            arn: identifier.to_string(),
            name: self.name.clone(),
            engine: self.engine,
            instance_class: self.instance_class.clone(),
            allocated_storage: self.allocated_storage,
            backup_retention_period: self
                .backup_retention_period
                .unwrap_or(DEFAULT_BACKUP_RETENTION),
            multi_az: self.multi_az,
            status: String::from(STATUS_AVAILABLE),
            endpoint: Some(format!("{}.db.internal:{port}", self.name)),
            tags: Tags::new(),
        }
    }

    fn apply(current: &mut DbInstanceState, change: &DbInstanceChange) {
        match change {
            DbInstanceChange::InstanceClass(c) => current.instance_class.clone_from(c),
            DbInstanceChange::AllocatedStorage(s) => current.allocated_storage = *s,
            DbInstanceChange::BackupRetentionPeriod(d) => current.backup_retention_period = *d,
            DbInstanceChange::MultiAz(m) => current.multi_az = *m,
        }
    }

    fn tags_mut(current: &mut DbInstanceState) -> &mut Tags {
        &mut current.tags
    }
}

impl fmt::Display for DbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Mariadb => "mariadb",
        };
        write!(f, "{s}")
    }
}
