//! Deletion policy resolution.
//!
//! Maps a declared [`DeletionPolicy`] and the resource's lifecycle state to
//! the single action `delete` performs.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::resource::DeletionPolicy;

/// Default prefix of generated final snapshot names.
pub const DEFAULT_SNAPSHOT_PREFIX: &str = "final";

/// What `delete` does on the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DeleteAction {
    /// Nothing to do; the gateway is not contacted.
    Skip {
        /// Why nothing happens.
        reason: SkipReason,
    },
    /// Delete the provider resource.
    Delete,
    /// Take a final snapshot, then delete.
    SnapshotThenDelete {
        /// Name of the final snapshot.
        snapshot_id: String,
    },
    /// Quiesce the resource.
    Stop,
}

/// Why a deletion resolved to no action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The resource was never created.
    NeverCreated,
    /// The policy is `Retain`.
    Retained,
    /// The policy is `Orphan`.
    Orphaned,
    /// The policy is `Stop` and the resource is already quiesced.
    AlreadyStopped,
}

/// Inputs to deletion resolution.
#[derive(Debug, Clone, Copy)]
pub struct DeletionContext<'a> {
    /// Resource kind.
    pub kind: &'a str,
    /// Provider identifier, empty if never created.
    pub identifier: &'a str,
    /// Natural key of the resource.
    pub natural_key: &'a str,
    /// Snapshot name supplied by the caller.
    pub final_snapshot_id: Option<&'a str>,
    /// Whether the resource is already quiesced.
    pub quiesced: bool,
    /// Prefix for generated snapshot names.
    pub snapshot_prefix: &'a str,
}

/// Resolves the action for `policy`.
#[must_use]
pub fn resolve(policy: DeletionPolicy, ctx: &DeletionContext<'_>) -> DeleteAction {
    if ctx.identifier.is_empty() {
        return DeleteAction::Skip {
            reason: SkipReason::NeverCreated,
        };
    }

    match policy {
        DeletionPolicy::Delete => DeleteAction::Delete,
        DeletionPolicy::Retain => DeleteAction::Skip {
            reason: SkipReason::Retained,
        },
        DeletionPolicy::Orphan => DeleteAction::Skip {
            reason: SkipReason::Orphaned,
        },
        DeletionPolicy::Snapshot => {
            let snapshot_id = ctx
                .final_snapshot_id
                .filter(|id| !id.trim().is_empty())
                .map_or_else(|| snapshot_id(ctx), String::from);
            DeleteAction::SnapshotThenDelete { snapshot_id }
        }
        DeletionPolicy::Stop if ctx.quiesced => DeleteAction::Skip {
            reason: SkipReason::AlreadyStopped,
        },
        DeletionPolicy::Stop => DeleteAction::Stop,
    }
}

/// Generates a deterministic final snapshot name.
///
/// The same kind and identifier always yield the same name. The result
/// starts with a letter and contains only lowercase alphanumerics and hyphens.
#[must_use]
pub fn snapshot_id(ctx: &DeletionContext<'_>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ctx.kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(ctx.identifier.as_bytes());
    let digest = hex::encode(hasher.finalize());

    let raw = format!("{}-{}-{}", ctx.snapshot_prefix, ctx.natural_key, &digest[..8]);
    let mut id = String::with_capacity(raw.len() + 1);
    let mut last_hyphen = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            id.push('-');
            last_hyphen = true;
        }
    }

    if !id.starts_with(|c: char| c.is_ascii_lowercase()) {
        id.insert(0, 's');
    }
    id
}

impl DeleteAction {
    /// Returns true if the gateway is not contacted.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }
}

impl fmt::Display for DeleteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip { reason } => write!(f, "skip ({reason})"),
            Self::Delete => write!(f, "delete"),
            Self::SnapshotThenDelete { snapshot_id } => {
                write!(f, "snapshot to {snapshot_id}, then delete")
            }
            Self::Stop => write!(f, "stop"),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NeverCreated => "never created",
            Self::Retained => "retained",
            Self::Orphaned => "orphaned",
            Self::AlreadyStopped => "already stopped",
        };
        write!(f, "{s}")
    }
}
