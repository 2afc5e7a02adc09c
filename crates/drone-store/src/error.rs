//! Store error types

use drone_types::{ObjectKey, ResourceKind};
use thiserror::Error;

/// Store errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: ResourceKind, key: ObjectKey },

    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: ResourceKind, key: ObjectKey },

    /// The record changed since the caller read it
    #[error("{kind} {key} changed concurrently: expected version {expected}, found {current}")]
    Conflict {
        kind: ResourceKind,
        key: ObjectKey,
        expected: u64,
        current: u64,
    },

    #[error("No index named {index} registered for {kind}")]
    IndexNotFound { kind: ResourceKind, index: String },

    #[error("Invalid {kind}: {reason}")]
    InvalidObject { kind: ResourceKind, reason: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Transient failures that a later attempt may not hit again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. }
                | StoreError::AlreadyExists { .. }
                | StoreError::NotFound { .. }
                | StoreError::Unavailable(_)
        )
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
