//! # Lexical graph configuration
//!
//! One explicit configuration struct passed to pipeline and query
//! construction. Every field has a default, so an empty file is a valid
//! configuration.
//!
//! ```rust,no_run
//! use lexigraph_config::LexicalGraphConfig;
//!
//! let config = LexicalGraphConfig::load_from_file("lexigraph.toml")?;
//! assert!(config.build.batch_write_size > 0);
//! # Ok::<(), lexigraph_config::ConfigError>(())
//! ```

pub mod components;

use std::path::Path;

use lexigraph_core::{TenantId, TenantIdError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use components::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("Unsupported config file extension: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error(transparent)]
    InvalidTenantId(#[from] TenantIdError),
}

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexicalGraphConfig {
    /// Tenant targeted by build and query; extraction ignores it
    #[serde(default)]
    pub tenant_id: TenantId,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

impl LexicalGraphConfig {
    /// Load and validate a config file; the format follows the extension
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let config = match extension.as_str() {
            #[cfg(feature = "toml")]
            "toml" => Self::from_toml_str(&contents)?,
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => Self::from_yaml_str(&contents)?,
            "json" => Self::from_json_str(&contents)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        debug!(path = %path.display(), tenant = %config.tenant_id, "loaded configuration");
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            format: "toml",
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "yaml",
                message: e.to_string(),
            })?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
            format: "json",
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Builder-style: set the target tenant
    pub fn with_tenant(mut self, tenant: &str) -> Result<Self, ConfigError> {
        self.tenant_id = TenantId::new(tenant)?;
        Ok(self)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&str, usize); 7] = [
            ("build.batch_write_size", self.build.batch_write_size),
            ("build.write_concurrency", self.build.write_concurrency),
            ("batch.num_workers", self.batch.num_workers),
            ("batch.batch_size", self.batch.batch_size),
            ("batch.num_threads_per_worker", self.batch.num_threads_per_worker),
            ("query.top_k", self.query.top_k),
            ("query.max_statements_per_topic", self.query.max_statements_per_topic),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: "must be greater than 0".to_string(),
                });
            }
        }

        if self.build.max_conflict_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "build.max_conflict_attempts".to_string(),
                value: "must be at least 1".to_string(),
            });
        }
        if self.build.conflict_backoff_base_ms > self.build.conflict_backoff_max_ms {
            return Err(ConfigError::InvalidValue {
                field: "build.conflict_backoff_base_ms".to_string(),
                value: format!(
                    "{} exceeds conflict_backoff_max_ms {}",
                    self.build.conflict_backoff_base_ms, self.build.conflict_backoff_max_ms
                ),
            });
        }
        if self.extraction.infer_entity_classifications
            && self.extraction.classification_sample_size == 0
        {
            return Err(ConfigError::InvalidValue {
                field: "extraction.classification_sample_size".to_string(),
                value: "must be greater than 0 when inferring classifications".to_string(),
            });
        }
        Ok(())
    }
}
