//! Tag reconciliation.
//!
//! Computes the smallest set of tag mutations that converges the provider's
//! tags toward the desired set.

use serde::Serialize;
use std::fmt;

use crate::resource::Tags;

/// How a kind treats tags present on the provider but not desired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagStrategy {
    /// Upsert desired tags, leave unknown tags alone.
    #[default]
    Additive,
    /// Upsert desired tags and remove every tag not desired.
    AdditiveWithRemoval,
}

/// Tag mutations for one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagPlan {
    /// Tags to add or overwrite.
    pub upsert: Tags,
    /// Keys to remove, sorted.
    pub remove: Vec<String>,
}

/// Plans the tag mutations needed to move `current` toward `desired`.
#[must_use]
pub fn plan_tags(desired: &Tags, current: &Tags, strategy: TagStrategy) -> TagPlan {
    let upsert: Tags = desired
        .iter()
        .filter(|(key, value)| current.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let remove = match strategy {
        TagStrategy::Additive => Vec::new(),
        TagStrategy::AdditiveWithRemoval => {
            let mut stale: Vec<String> = current
                .keys()
                .filter(|key| !desired.contains_key(*key))
                .cloned()
                .collect();
            stale.sort_unstable();
            stale
        }
    };

    TagPlan { upsert, remove }
}

impl TagPlan {
    /// Returns true if no tag call is needed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upsert.is_empty() && self.remove.is_empty()
    }
}

impl fmt::Display for TagPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut upsert: Vec<&String> = self.upsert.keys().collect();
        upsert.sort_unstable();
        write!(f, "+{upsert:?} -{:?}", self.remove)
    }
}
