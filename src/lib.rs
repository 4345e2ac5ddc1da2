// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Infra Reconciler
//!
//! A declarative, idempotent reconciliation engine for cloud resources.
//!
//! ## Overview
//!
//! Each resource kind is described by a specification type. The engine takes a
//! specification and converges the provider to it:
//!
//! - Create the resource when it does not exist yet, or has vanished
//! - Update only the mutable fields that differ from the observed state
//! - Converge tags without ever removing tags owned by someone else
//! - Delete according to a per-resource deletion policy
//!
//! Every provider call goes through the [`gateway::ProviderGateway`] trait, so
//! the engine is independent of any particular cloud API.
//!
//! ## Architecture
//!
//! 1. **Desired State**: a [`resource::Resource`] specification
//! 2. **Observed State**: fetched through the gateway
//! 3. **Engine**: [`reconciler::Engine`] diffs the two and applies the changes
//!
//! ## Modules
//!
//! - [`resource`]: Specification contract and the concrete resource kinds
//! - [`gateway`]: Provider gateway trait and the in-memory provider
//! - [`reconciler`]: Sync and delete engine, deletion policies and tags
//! - [`runner`]: Manifest-wide sync and delete
//! - [`config`]: Manifest parsing and validation
//! - [`state`]: Local state storage
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! defaults:
//!   tags:
//!     owner: platform
//!
//! resources:
//!   - kind: queue
//!     name: orders
//!     visibility_timeout: 60
//!   - kind: table
//!     name: sessions
//!     hash_key: { name: id, type: S }
//!     deletion_policy: Snapshot
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod reconciler;
pub mod resource;
pub mod runner;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{Manifest, ManifestParser, ManifestResource, ManifestValidator};
pub use error::{ReconcilerError, Result};
pub use gateway::{MemoryGateway, ProviderGateway, SimulatedProvider};
pub use reconciler::{DeleteAction, DeleteOutcome, Engine, SyncAction, SyncOutcome};
pub use resource::{DeletionPolicy, Resource, ResourceMeta};
pub use runner::{ManifestRunner, RunReport};
pub use state::{LocalProviderStore, LocalState, StateStore};
