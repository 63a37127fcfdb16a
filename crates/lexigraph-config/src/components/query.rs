//! Query engine settings

use std::fmt;

use serde::{Deserialize, Serialize};

/// Serialization of retrieved context handed to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextFormat {
    Json,
    Yaml,
    Xml,
    Text,
    BedrockXml,
}

impl ContextFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextFormat::Json => "json",
            ContextFormat::Yaml => "yaml",
            ContextFormat::Xml => "xml",
            ContextFormat::Text => "text",
            ContextFormat::BedrockXml => "bedrock_xml",
        }
    }
}

impl fmt::Display for ContextFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Seeds taken from each vector index
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Also seed from the chunk index
    #[serde(default)]
    pub include_chunk_seeds: bool,
    /// Fact/entity expansion depth
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    /// `None` uses the profile default
    pub context_format: Option<ContextFormat>,
    /// Answer fully (true) or concisely (false)
    #[serde(default = "default_true")]
    pub verbose: bool,
    #[serde(default = "default_true")]
    pub include_source_trace: bool,
    /// Restrict retrieval to source versions current at the query's `as_of`
    #[serde(default)]
    pub versioning: bool,
    #[serde(default = "default_max_statements_per_topic")]
    pub max_statements_per_topic: usize,
}

fn default_top_k() -> usize {
    10
}

fn default_max_hops() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_max_statements_per_topic() -> usize {
    10
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            include_chunk_seeds: false,
            max_hops: default_max_hops(),
            context_format: None,
            verbose: true,
            include_source_trace: true,
            versioning: false,
            max_statements_per_topic: default_max_statements_per_topic(),
        }
    }
}
