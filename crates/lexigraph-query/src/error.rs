//! Query errors

use lexigraph_config::{ConfigError, ContextFormat};
use lexigraph_core::{ModelError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    /// Only the blocking `query` entry point is implemented
    #[error("Streaming queries are not supported; call `query` instead")]
    StreamingUnsupported,

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to serialize context as {format}: {message}")]
    Format {
        format: ContextFormat,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl QueryError {
    pub(crate) fn format(format: ContextFormat, err: impl std::fmt::Display) -> Self {
        QueryError::Format {
            format,
            message: err.to_string(),
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
