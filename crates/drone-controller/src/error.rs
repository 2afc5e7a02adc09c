//! Reconciliation error types

use drone_store::StoreError;
use thiserror::Error;

/// Reconciliation errors
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid controller configuration: {0}")]
    Config(String),
}

impl ReconcileError {
    /// Whether the hosting runtime should retry with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Store(e) => e.is_transient(),
            ReconcileError::Config(_) => false,
        }
    }
}

/// Result type for reconciliation
pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;
