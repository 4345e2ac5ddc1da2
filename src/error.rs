//! Error types for the reconciliation engine.
//!
//! This module provides the error hierarchy for every stage of a
//! reconciliation: specification validation, provider gateway calls,
//! manifest loading, and local state persistence.

use std::path::PathBuf;
use thiserror::Error;

use crate::gateway::Operation;

/// The main error type for the reconciliation engine.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// The resource specification is invalid. No provider call was made.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A provider gateway call failed.
    #[error("{kind} {operation} failed: {source}")]
    Provider {
        /// Resource kind being reconciled.
        kind: &'static str,
        /// Gateway operation that failed.
        operation: Operation,
        /// Underlying gateway error.
        #[source]
        source: GatewayError,
    },

    /// The caller cancelled the reconciliation.
    #[error("{kind} {operation} cancelled")]
    Cancelled {
        /// Resource kind being reconciled.
        kind: &'static str,
        /// Gateway operation that was in flight or about to start.
        operation: Operation,
    },

    /// Manifest loading errors.
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Local state persistence errors.
    #[error("State error: {0}")]
    Store(#[from] StoreError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specification failed validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}.{field}: {message}")]
pub struct ValidationError {
    /// Resource kind that failed validation.
    pub kind: &'static str,
    /// Field that failed validation.
    pub field: String,
    /// Description of the problem.
    pub message: String,
}

/// Errors reported by a provider gateway.
///
/// "Not found" during a presence check is never an error: `exists` answers
/// `false` instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The provider could not be reached or the credentials were refused.
    #[error("transport failure: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// The provider throttled the request.
    #[error("throttled, retry after {retry_after_secs} seconds")]
    Throttled {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// The provider rejected the request.
    #[error("request rejected: {message}")]
    Rejected {
        /// Description of the rejection.
        message: String,
    },

    /// A resource addressed by a non-presence call does not exist.
    #[error("resource not found: {key}")]
    NotFound {
        /// Key that was looked up.
        key: String,
    },

    /// The gateway does not implement the operation for this kind.
    #[error("operation {operation} is not supported")]
    Unsupported {
        /// The unsupported operation.
        operation: Operation,
    },
}

/// Manifest loading errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file was not found.
    #[error("Manifest file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The manifest could not be parsed.
    #[error("Failed to parse manifest: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Two resources of the same kind share a name.
    #[error("Duplicate {kind} name: {name}")]
    DuplicateName {
        /// Kind of the duplicated resource.
        kind: String,
        /// The duplicated name.
        name: String,
    },

    /// One or more resources failed validation.
    #[error("{count} resource(s) failed validation, first: {first}")]
    Invalid {
        /// Number of failing resources.
        count: usize,
        /// The first validation failure.
        first: ValidationError,
    },
}

/// Local state persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcilerError>;

impl ReconcilerError {
    /// Returns true if the caller may retry the same call later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider {
                source: GatewayError::Throttled { .. } | GatewayError::Transport { .. },
                ..
            }
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Provider {
                source: GatewayError::Throttled { retry_after_secs },
                ..
            } => Some(*retry_after_secs),
            Self::Provider {
                source: GatewayError::Transport { .. },
                ..
            } => Some(5),
            _ => None,
        }
    }

    /// Returns true if this error was raised by validation.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this error reports a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl ValidationError {
    /// Creates a validation error for a field of a resource kind.
    #[must_use]
    pub fn new(kind: &'static str, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl GatewayError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a rejection error.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

impl StoreError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}
