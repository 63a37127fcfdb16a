//! Deterministic content-hash identities
//!
//! Every node id is a hash of normalized content, so extracting identical
//! content twice produces the same ids and every write becomes an idempotent
//! upsert. Ids never include the tenant: one extraction can be built into any
//! number of tenants.

use serde::{Deserialize, Serialize};

use crate::model::Metadata;

/// Joins chunk text and metadata before hashing when the delimiter is enabled
const CHUNK_ID_DELIMITER: char = '\0';

/// Prefix of every source id
pub const SOURCE_ID_PREFIX: &str = "lg";

/// MD5 hex digest of a string (32 lowercase hex characters)
pub fn get_hash(s: &str) -> String {
    format!("{:x}", md5::compute(s.as_bytes()))
}

/// Render metadata as sorted `key:value` pairs joined by `;`
///
/// Returns `default` when there is no metadata.
pub fn metadata_str(metadata: &Metadata, default: &str) -> String {
    if metadata.is_empty() {
        return default.to_string();
    }
    // BTreeMap iteration is already key-sorted
    metadata
        .iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => format!("{k}:{s}"),
            other => format!("{k}:{other}"),
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Generates node ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGenerator {
    /// Include the entity classification in entity ids
    pub include_classification_in_entity_id: bool,
    /// Separate text and metadata when hashing chunk ids
    pub use_chunk_id_delimiter: bool,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self {
            include_classification_in_entity_id: true,
            use_chunk_id_delimiter: true,
        }
    }
}

impl IdGenerator {
    pub fn new(include_classification_in_entity_id: bool, use_chunk_id_delimiter: bool) -> Self {
        Self {
            include_classification_in_entity_id,
            use_chunk_id_delimiter,
        }
    }

    /// `lg::<8 hex of text>:<4 hex of metadata>`
    pub fn create_source_id(&self, text: &str, metadata_str: &str) -> String {
        format!(
            "{SOURCE_ID_PREFIX}::{}:{}",
            &get_hash(text)[..8],
            &get_hash(metadata_str)[..4]
        )
    }

    /// `<source_id>:<8 hex>`
    ///
    /// Without the delimiter, `("hello", "world")` and `("hell", "oworld")`
    /// collide; that mode exists only to reproduce ids of graphs built before
    /// the delimiter was introduced.
    pub fn create_chunk_id(&self, source_id: &str, text: &str, metadata_str: &str) -> String {
        let hash_input = if self.use_chunk_id_delimiter {
            format!("{text}{CHUNK_ID_DELIMITER}{metadata_str}")
        } else {
            format!("{text}{metadata_str}")
        };
        format!("{source_id}:{}", &get_hash(&hash_input)[..8])
    }

    pub fn create_topic_id(&self, source_id: &str, topic: &str) -> String {
        create_node_id("topic", source_id, Some(topic))
    }

    pub fn create_statement_id(&self, topic_id: &str, statement: &str) -> String {
        create_node_id("statement", topic_id, Some(statement))
    }

    pub fn create_fact_id(&self, fact: &str) -> String {
        create_node_id("fact", fact, None)
    }

    pub fn create_local_entity_id(&self, source_id: &str, value: &str) -> String {
        create_node_id("local-entity", value, Some(source_id))
    }

    pub fn create_entity_id(&self, value: &str, classification: &str) -> String {
        if self.include_classification_in_entity_id {
            create_node_id("entity", value, Some(classification))
        } else {
            create_node_id("entity", value, None)
        }
    }
}

fn normalize(value: &str) -> String {
    value.to_lowercase().replace(' ', "_")
}

fn create_node_id(node_type: &str, v1: &str, v2: Option<&str>) -> String {
    let hashable = match v2.filter(|v| !v.is_empty()) {
        Some(v2) => format!("{}::{}::{}", node_type, normalize(v1), normalize(v2)),
        None => format!("{}::{}", node_type, normalize(v1)),
    };
    get_hash(&hashable)
}
