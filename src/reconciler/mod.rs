//! Reconciliation.
//!
//! This module contains:
//! - [`Engine`]: the per-kind sync and delete algorithms
//! - Deletion policy resolution
//! - Tag reconciliation

mod engine;
mod policy;
mod tags;

pub use engine::{DeleteOutcome, Engine, SubStepWarning, SyncAction, SyncOutcome};
pub use policy::{
    DEFAULT_SNAPSHOT_PREFIX, DeleteAction, DeletionContext, SkipReason, resolve, snapshot_id,
};
pub use tags::{TagPlan, TagStrategy, plan_tags};
