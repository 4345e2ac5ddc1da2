//! Resource specification contract.
//!
//! Every resource kind implements the same capability set:
//! - [`Normalizable`]: fill unset optional fields with kind defaults
//! - [`Validatable`]: check required fields and cross-field constraints
//! - [`Identifiable`]: expose the provider identifier and natural key
//! - [`Diffable`]: compare against provider state and copy observed fields
//! - [`Taggable`]: declare the tag convergence strategy
//!
//! [`Resource`] ties them together and is what the engine is written against.

mod meta;
pub mod kinds;

pub use meta::{DeletionPolicy, ResourceMeta, Tags, UnknownPolicy};

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

use crate::error::ValidationError;
use crate::reconciler::TagStrategy;

/// Fills unset optional fields with kind-specific defaults.
///
/// Must be idempotent: normalizing twice equals normalizing once.
pub trait Normalizable {
    /// Fills defaults in place.
    fn normalize(&mut self);
}

/// Pure validation of a normalized specification.
pub trait Validatable {
    /// Checks required fields, cross-field constraints and enumerated values.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Access to the shared metadata and the lookup keys.
pub trait Identifiable {
    /// Shared metadata.
    fn meta(&self) -> &ResourceMeta;

    /// Mutable shared metadata.
    fn meta_mut(&mut self) -> &mut ResourceMeta;

    /// Human-assigned name used to find the resource before it has an identifier.
    fn natural_key(&self) -> &str;

    /// Provider-assigned identifier; empty until created.
    fn identifier(&self) -> &str {
        &self.meta().identifier
    }
}

/// Provider-side state returned by a gateway `get`.
pub trait ObservedState {
    /// Provider identifier of this resource.
    fn identifier(&self) -> &str;

    /// Natural key of this resource.
    fn name(&self) -> &str;

    /// Tags currently applied on the provider.
    fn tags(&self) -> &Tags;
}

/// Comparison against provider state.
pub trait Diffable {
    /// State returned by the gateway.
    type Current: ObservedState + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// One narrowly-scoped mutation the gateway knows how to apply.
    type Change: Clone + Debug + PartialEq + Send + Sync + 'static;

    /// Copies provider-owned fields from `current` into the observed fields.
    fn observe(&mut self, current: &Self::Current);

    /// Forgets every provider-owned field.
    fn clear_observed(&mut self);

    /// Returns one change per mutable field that differs from `current`.
    fn diff(&self, current: &Self::Current) -> Vec<Self::Change>;

    /// Secondary steps to run right after a successful create.
    fn post_create(&self) -> Vec<Self::Change> {
        Vec::new()
    }

    /// Returns true if a failure of `change` must not fail the sync.
    fn is_best_effort(_change: &Self::Change) -> bool {
        false
    }
}

/// Tag convergence for a kind.
pub trait Taggable: Identifiable {
    /// How stale tags are handled.
    const TAG_STRATEGY: TagStrategy = TagStrategy::Additive;

    /// Desired tags.
    fn tags(&self) -> &Tags {
        &self.meta().tags
    }
}

/// A reconcilable resource kind.
pub trait Resource:
    Normalizable + Validatable + Identifiable + Diffable + Taggable + Send + Sync + 'static
{
    /// Kind name used in logs and errors.
    const KIND: &'static str;

    /// Policy applied when the caller declares none.
    const DEFAULT_POLICY: DeletionPolicy = DeletionPolicy::Delete;

    /// Policies this kind accepts.
    const ALLOWED_POLICIES: &'static [DeletionPolicy] = &[
        DeletionPolicy::Delete,
        DeletionPolicy::Retain,
        DeletionPolicy::Orphan,
    ];

    /// Returns true when the provider reports the resource as usable.
    fn is_ready(&self) -> bool;

    /// Returns true when the resource is already quiesced (for `Stop`).
    fn is_quiesced(&self) -> bool {
        false
    }

    /// Resolves the declared deletion policy against the allowed set.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown or disallowed policies.
    fn deletion_policy(&self) -> Result<DeletionPolicy, ValidationError> {
        let Some(raw) = self.meta().deletion_policy.as_deref() else {
            return Ok(Self::DEFAULT_POLICY);
        };

        let policy: DeletionPolicy = raw
            .parse()
            .map_err(|e: UnknownPolicy| ValidationError::new(Self::KIND, "deletion_policy", e.to_string()))?;

        if Self::ALLOWED_POLICIES.contains(&policy) {
            Ok(policy)
        } else {
            Err(ValidationError::new(
                Self::KIND,
                "deletion_policy",
                format!("deletion policy {policy} is not supported for {}", Self::KIND),
            ))
        }
    }

    /// Returns true if `delete` removes the provider resource.
    fn is_deletable(&self) -> bool {
        matches!(
            self.deletion_policy(),
            Ok(DeletionPolicy::Delete | DeletionPolicy::Snapshot)
        )
    }

    /// Normalizes, fills the default policy, then validates.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    fn prepare(&mut self) -> Result<(), ValidationError> {
        self.normalize();

        let meta = self.meta_mut();
        if meta.deletion_policy.is_none() {
            meta.deletion_policy = Some(Self::DEFAULT_POLICY.to_string());
        }

        self.deletion_policy()?;
        self.validate()
    }
}

/// Returns an error when `value` is empty.
pub(crate) fn require(kind: &'static str, field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new(kind, field, format!("{field} is required")))
    } else {
        Ok(())
    }
}

/// Returns an error when `value` lies outside `min..=max`.
pub(crate) fn require_range(
    kind: &'static str,
    field: &str,
    value: u32,
    min: u32,
    max: u32,
) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            kind,
            field,
            format!("{field} must be between {min} and {max}, got {value}"),
        ))
    }
}
