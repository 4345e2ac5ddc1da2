//! State persistence.
//!
//! Stores the simulated provider and the reconciled specifications between
//! runs, along with a short run history.

mod local;
mod store;
mod types;

pub use local::{LocalProviderStore, STATE_DIR};
pub use store::StateStore;
pub use types::{HistoryEntry, LocalState, MAX_HISTORY, RunOperation, STATE_VERSION};
