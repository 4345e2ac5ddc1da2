//! Provider gateway contract.
//!
//! One gateway per resource kind translates the engine's requests into
//! provider calls. The engine never sees provider-specific types: a
//! gateway must answer "not found" during a presence check with `false`,
//! and must treat deleting an already-deleted resource as success.

mod memory;
mod simulated;

pub use memory::{Call, MemoryGateway, Simulated};
pub use simulated::{ProviderSnapshot, SimulatedProvider};

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use crate::error::GatewayError;
use crate::resource::{Diffable, Resource, Tags};

/// Result type alias for gateway calls.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Gateway operations, used for error context and call journals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Presence check.
    Exists,
    /// Resource creation.
    Create,
    /// Current state read.
    Get,
    /// Narrowly-scoped mutation.
    Update,
    /// Deletion, optionally with a final snapshot.
    Delete,
    /// Quiesce without deleting.
    Stop,
    /// Tag upsert.
    TagResource,
    /// Tag removal.
    UntagResource,
}

/// Provider operations for one resource kind.
#[async_trait]
pub trait ProviderGateway<R: Resource>: Send + Sync {
    /// Checks whether a resource exists under an identifier or natural key.
    ///
    /// Errors only on transport or auth failures, never for "not found".
    async fn exists(&self, key: &str) -> GatewayResult<bool>;

    /// Creates the resource and writes its identifier and observed fields into `spec`.
    async fn create(&self, spec: &mut R) -> GatewayResult<()>;

    /// Reads the current provider state.
    async fn get(&self, key: &str) -> GatewayResult<R::Current>;

    /// Applies one narrowly-scoped change.
    async fn update(&self, spec: &R, change: &R::Change) -> GatewayResult<()>;

    /// Deletes the resource. Deleting a missing resource succeeds.
    async fn delete(&self, spec: &R, final_snapshot_id: Option<String>) -> GatewayResult<()>;

    /// Quiesces the resource without deleting it.
    async fn stop(&self, spec: &R) -> GatewayResult<()> {
        let _ = spec;
        Err(GatewayError::Unsupported {
            operation: Operation::Stop,
        })
    }

    /// Adds or overwrites tags.
    async fn tag_resource(&self, identifier: &str, tags: &Tags) -> GatewayResult<()>;

    /// Removes tags by key. Only kinds using tag removal need this.
    async fn untag_resource(&self, identifier: &str, keys: &[String]) -> GatewayResult<()> {
        let _ = (identifier, keys);
        Err(GatewayError::Unsupported {
            operation: Operation::UntagResource,
        })
    }
}

#[async_trait]
impl<R, G> ProviderGateway<R> for &G
where
    R: Resource,
    G: ProviderGateway<R> + ?Sized,
{
    async fn exists(&self, key: &str) -> GatewayResult<bool> {
        (**self).exists(key).await
    }

    async fn create(&self, spec: &mut R) -> GatewayResult<()> {
        (**self).create(spec).await
    }

    async fn get(&self, key: &str) -> GatewayResult<<R as Diffable>::Current> {
        (**self).get(key).await
    }

    async fn update(&self, spec: &R, change: &<R as Diffable>::Change) -> GatewayResult<()> {
        (**self).update(spec, change).await
    }

    async fn delete(&self, spec: &R, final_snapshot_id: Option<String>) -> GatewayResult<()> {
        (**self).delete(spec, final_snapshot_id).await
    }

    async fn stop(&self, spec: &R) -> GatewayResult<()> {
        (**self).stop(spec).await
    }

    async fn tag_resource(&self, identifier: &str, tags: &Tags) -> GatewayResult<()> {
        (**self).tag_resource(identifier, tags).await
    }

    async fn untag_resource(&self, identifier: &str, keys: &[String]) -> GatewayResult<()> {
        (**self).untag_resource(identifier, keys).await
    }
}

impl Operation {
    /// Returns true if the operation changes provider state.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        !matches!(self, Self::Exists | Self::Get)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exists => "exists",
            Self::Create => "create",
            Self::Get => "get",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Stop => "stop",
            Self::TagResource => "tag",
            Self::UntagResource => "untag",
        };
        write!(f, "{s}")
    }
}
