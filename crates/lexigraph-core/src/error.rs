//! Error taxonomy shared by every lexical graph layer

use thiserror::Error;

pub use crate::tenant::TenantIdError;
pub use crate::versioning::VersioningError;

/// Errors raised by language or embedding model calls
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Authorization failure; retrying cannot help
    #[error("Model permission denied: {0}")]
    PermissionDenied(String),

    /// Transient failure already retried by the model-call layer
    #[error("Transient model error: {0}")]
    Transient(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Permission errors abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, ModelError::PermissionDenied(_))
    }
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised by graph and vector stores
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another writer touched an overlapping node set
    #[error("Concurrent modification conflict: {0}")]
    ConcurrentModification(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Invalid store input: {0}")]
    InvalidInput(String),

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),
}

impl StoreError {
    /// Only conflicts are retried by the build stage
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrentModification(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
