//! Fields shared by every resource specification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Desired tag set: key to value, keys unique, order irrelevant.
pub type Tags = HashMap<String, String>;

/// What `delete` does to the provider-side resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DeletionPolicy {
    /// Delete the provider resource.
    Delete,
    /// Leave the provider resource in place.
    Retain,
    /// Leave the provider resource in place and stop tracking it.
    Orphan,
    /// Take a final snapshot, then delete.
    Snapshot,
    /// Quiesce the resource instead of deleting it.
    Stop,
}

/// A deletion policy string that names no known policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown deletion policy '{0}'")]
pub struct UnknownPolicy(pub String);

/// Metadata carried by every resource specification.
///
/// `identifier` and `last_sync_time` are written by the engine only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceMeta {
    /// Provider-assigned external key. Empty until the first successful create.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub identifier: String,
    /// Desired tags.
    #[serde(default)]
    pub tags: Tags,
    /// Declared deletion policy, as written by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
    /// Final snapshot name used by the `Snapshot` policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_snapshot_id: Option<String>,
    /// When the last successful sync finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl DeletionPolicy {
    /// All policies, in declaration order.
    pub const ALL: &'static [Self] = &[
        Self::Delete,
        Self::Retain,
        Self::Orphan,
        Self::Snapshot,
        Self::Stop,
    ];

    /// Returns the canonical policy name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "Delete",
            Self::Retain => "Retain",
            Self::Orphan => "Orphan",
            Self::Snapshot => "Snapshot",
            Self::Stop => "Stop",
        }
    }
}

impl fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeletionPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPolicy(s.to_string()))
    }
}

impl ResourceMeta {
    /// Creates metadata with the given tags and no policy.
    #[must_use]
    pub fn with_tags(tags: Tags) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }

    /// Sets the declared deletion policy.
    #[must_use]
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.deletion_policy = Some(policy.into());
        self
    }

    /// Sets the provider identifier.
    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Returns true once the resource has been created on the provider.
    #[must_use]
    pub fn is_created(&self) -> bool {
        !self.identifier.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parse_is_case_insensitive() {
        assert_eq!("delete".parse::<DeletionPolicy>(), Ok(DeletionPolicy::Delete));
        assert_eq!("Snapshot".parse::<DeletionPolicy>(), Ok(DeletionPolicy::Snapshot));
        assert_eq!(" STOP ".parse::<DeletionPolicy>(), Ok(DeletionPolicy::Stop));
    }

    #[test]
    fn test_policy_parse_unknown() {
        let err = "Archive".parse::<DeletionPolicy>();
        assert_eq!(err, Err(UnknownPolicy(String::from("Archive"))));
    }

    #[test]
    fn test_meta_round_trip_skips_empty_fields() {
        let meta = ResourceMeta::default();
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"tags":{}}"#);
    }
}
