//! Extraction stage settings

use serde::{Deserialize, Serialize};

/// Controls how chunks are turned into topics, statements, facts and entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Run the per-batch classification pre-pass
    #[serde(default = "default_true")]
    pub infer_entity_classifications: bool,
    /// Chunks sampled by the pre-pass
    #[serde(default = "default_classification_sample_size")]
    pub classification_sample_size: usize,
    /// Classifications always offered to the model, merged ahead of inferred ones
    #[serde(default)]
    pub preferred_entity_classifications: Vec<String>,
    #[serde(default = "default_true")]
    pub include_classification_in_entity_id: bool,
    #[serde(default = "default_true")]
    pub use_chunk_id_delimiter: bool,
    /// Write extraction output to the default tenant
    #[serde(default = "default_true")]
    pub persist_extracted: bool,
    /// Prompt overrides; `None` uses the built-in prompts
    pub extract_topic_prompt: Option<String>,
    pub extract_fact_prompt: Option<String>,
    pub classification_prompt: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_classification_sample_size() -> usize {
    8
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            infer_entity_classifications: true,
            classification_sample_size: default_classification_sample_size(),
            preferred_entity_classifications: Vec::new(),
            include_classification_in_entity_id: true,
            use_chunk_id_delimiter: true,
            persist_extracted: true,
            extract_topic_prompt: None,
            extract_fact_prompt: None,
            classification_prompt: None,
        }
    }
}
