//! Pipeline errors and non-fatal warnings

use lexigraph_config::ConfigError;
use lexigraph_core::{ModelError, StoreError, TenantId, TenantIdError, VersioningError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Authorization failure from the model; the whole run stops
    #[error("Fatal model error: {0}")]
    Fatal(ModelError),

    /// `continue_on_error` is off and an item failed
    #[error("Run aborted after {completed} items: '{item_id}' failed: {reason}")]
    Aborted {
        item_id: String,
        reason: String,
        completed: usize,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Model error: {0}")]
    Model(ModelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Versioning(#[from] VersioningError),

    #[error(transparent)]
    InvalidTenantId(#[from] TenantIdError),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl From<ModelError> for PipelineError {
    fn from(err: ModelError) -> Self {
        if err.is_fatal() {
            PipelineError::Fatal(err)
        } else {
            PipelineError::Model(err)
        }
    }
}

impl PipelineError {
    /// Fatal errors stop the run regardless of `continue_on_error`
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Fatal(_) | PipelineError::Config(_))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Something the caller should know about that did not fail the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// Extraction always writes to the default tenant
    ExtractionIgnoresTenant { configured: TenantId },

    /// A chunk's extraction failed and it was left out of the fragment
    ChunkSkipped {
        source_id: String,
        chunk_id: String,
        error: String,
    },

    /// The classification pre-pass failed; preferred classifications were used
    ClassificationFallback { error: String },
}
