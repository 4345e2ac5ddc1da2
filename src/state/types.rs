//! Persisted state types.
//!
//! The state file carries the simulated provider's resources together with
//! the specifications reconciled against them, so that a later run can find
//! the identifiers an earlier run was assigned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ManifestResource;
use crate::gateway::ProviderSnapshot;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum number of history entries kept.
pub const MAX_HISTORY: usize = 50;

/// The complete persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalState {
    /// State format version.
    pub version: String,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Resources hosted by the simulated provider.
    #[serde(default)]
    pub provider: ProviderSnapshot,
    /// Specifications as last reconciled, with identifiers and observed fields.
    #[serde(default)]
    pub resources: Vec<ManifestResource>,
    /// Recent runs, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// A single entry in the run history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    /// What the run did.
    pub operation: RunOperation,
    /// Resources touched, as `kind/name`.
    pub resources: Vec<String>,
    /// Whether every resource succeeded.
    pub success: bool,
    /// First error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Kinds of runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunOperation {
    /// Sync of every resource.
    Sync,
    /// Deletion of every resource.
    Delete,
}

impl Default for LocalState {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            last_updated: Utc::now(),
            provider: ProviderSnapshot::default(),
            resources: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Records the reconciled specifications.
    ///
    /// Entries with the same kind and name are replaced; others are kept.
    pub fn record_resources(&mut self, resources: impl IntoIterator<Item = ManifestResource>) {
        for resource in resources {
            self.resources
                .retain(|r| !(r.kind() == resource.kind() && r.name() == resource.name()));
            self.resources.push(resource);
        }
        self.last_updated = Utc::now();
    }

    /// Forgets a recorded specification.
    pub fn forget(&mut self, kind: &str, name: &str) -> Option<ManifestResource> {
        let index = self
            .resources
            .iter()
            .position(|r| r.kind() == kind && r.name() == name)?;
        self.last_updated = Utc::now();
        Some(self.resources.remove(index))
    }

    /// Appends a history entry, dropping the oldest beyond the limit.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
        self.last_updated = Utc::now();
    }
}

impl HistoryEntry {
    /// Creates a history entry.
    #[must_use]
    pub fn new(operation: RunOperation, resources: Vec<String>, error: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: error.is_none(),
            error,
        }
    }
}

impl std::fmt::Display for RunOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Sync => "sync",
            Self::Delete => "delete",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::kinds::Queue;

    #[test]
    fn test_record_replaces_same_resource() {
        let mut state = LocalState::new();
        let mut first = ManifestResource::Queue(Queue::new("orders"));
        first.meta_mut().identifier = String::from("queue-1");
        let mut second = ManifestResource::Queue(Queue::new("orders"));
        second.meta_mut().identifier = String::from("queue-2");

        state.record_resources([first]);
        state.record_resources([second]);

        assert_eq!(state.resources.len(), 1);
        assert_eq!(state.resources[0].meta().identifier, "queue-2");
        assert!(state.forget("queue", "orders").is_some());
        assert!(state.resources.is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = LocalState::new();
        for _ in 0..(MAX_HISTORY + 5) {
            state.add_history(HistoryEntry::new(RunOperation::Sync, Vec::new(), None));
        }
        assert_eq!(state.history.len(), MAX_HISTORY);
    }
}
