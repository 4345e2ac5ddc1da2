//! State store trait definition.

use async_trait::async_trait;

use super::types::LocalState;
use crate::error::Result;

/// Trait for state storage backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the persisted state.
    ///
    /// Returns `None` if no state exists yet.
    async fn load(&self) -> Result<Option<LocalState>>;

    /// Saves the state.
    async fn save(&self, state: &LocalState) -> Result<()>;

    /// Deletes the state.
    async fn delete(&self) -> Result<()>;

    /// Checks if state exists.
    async fn exists(&self) -> Result<bool>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
