//! Lexical graph data model
//!
//! Nodes are keyed by their content-hash id (see [`crate::ids`]); the graph
//! store treats every write as an upsert on that id.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::versioning::VersionInfo;

/// Arbitrary key/value metadata attached to a source
pub type Metadata = BTreeMap<String, serde_json::Value>;

// ============================================================================
// Node types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Source,
    Chunk,
    Topic,
    Statement,
    Fact,
    Entity,
}

impl NodeType {
    /// Write order for a build: parents before children
    pub const ALL: [NodeType; 6] = [
        NodeType::Source,
        NodeType::Chunk,
        NodeType::Topic,
        NodeType::Statement,
        NodeType::Fact,
        NodeType::Entity,
    ];

    /// Unscoped graph label name
    pub fn label(&self) -> &'static str {
        match self {
            NodeType::Source => "Source",
            NodeType::Chunk => "Chunk",
            NodeType::Topic => "Topic",
            NodeType::Statement => "Statement",
            NodeType::Fact => "Fact",
            NodeType::Entity => "Entity",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub source_id: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Source {
    pub fn version_info(&self) -> Option<VersionInfo> {
        VersionInfo::from_metadata(&self.metadata)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub source_id: String,
    pub text: String,
    /// Position within the source
    pub sequence: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub topic_id: String,
    pub source_id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub statement_id: String,
    pub topic_id: String,
    pub text: String,
    /// Unstructured extras the fact extractor could not turn into triples
    #[serde(default)]
    pub details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub fact_id: String,
    pub subject_id: String,
    pub predicate: String,
    pub object_id: Option<String>,
    /// Literal object when it did not resolve to an entity
    pub complement: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    pub value: String,
    pub classification: String,
}

/// Any node of the lexical graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphNode {
    Source(Source),
    Chunk(Chunk),
    Topic(Topic),
    Statement(Statement),
    Fact(Fact),
    Entity(Entity),
}

impl GraphNode {
    pub fn id(&self) -> &str {
        match self {
            GraphNode::Source(n) => &n.source_id,
            GraphNode::Chunk(n) => &n.chunk_id,
            GraphNode::Topic(n) => &n.topic_id,
            GraphNode::Statement(n) => &n.statement_id,
            GraphNode::Fact(n) => &n.fact_id,
            GraphNode::Entity(n) => &n.entity_id,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            GraphNode::Source(_) => NodeType::Source,
            GraphNode::Chunk(_) => NodeType::Chunk,
            GraphNode::Topic(_) => NodeType::Topic,
            GraphNode::Statement(_) => NodeType::Statement,
            GraphNode::Fact(_) => NodeType::Fact,
            GraphNode::Entity(_) => NodeType::Entity,
        }
    }

    /// Merge a re-extracted copy of the same node into this one
    ///
    /// Source metadata keys are overwritten, statement details are unioned,
    /// everything else is content-addressed and therefore already equal.
    pub fn merge(&mut self, incoming: GraphNode) {
        match (self, incoming) {
            (GraphNode::Source(existing), GraphNode::Source(new)) => {
                existing.metadata.extend(new.metadata);
            }
            (GraphNode::Statement(existing), GraphNode::Statement(new)) => {
                for detail in new.details {
                    if !existing.details.contains(&detail) {
                        existing.details.push(detail);
                    }
                }
            }
            (existing, new) => *existing = new,
        }
    }

    pub fn as_source(&self) -> Option<&Source> {
        match self {
            GraphNode::Source(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_chunk(&self) -> Option<&Chunk> {
        match self {
            GraphNode::Chunk(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_topic(&self) -> Option<&Topic> {
        match self {
            GraphNode::Topic(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_statement(&self) -> Option<&Statement> {
        match self {
            GraphNode::Statement(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_fact(&self) -> Option<&Fact> {
        match self {
            GraphNode::Fact(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            GraphNode::Entity(e) => Some(e),
            _ => None,
        }
    }
}

// ============================================================================
// Edges
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// chunk -> source
    ExtractedFrom,
    /// chunk -> following chunk
    Next,
    /// topic or statement -> chunk
    MentionedIn,
    /// statement -> topic
    BelongsTo,
    /// fact -> statement
    Supports,
    /// fact -> subject entity
    Subject,
    /// fact -> object entity
    Object,
}

/// A directed edge; `(kind, from, to)` is its identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphEdge {
    pub kind: EdgeKind,
    pub from: String,
    pub to: String,
}

impl GraphEdge {
    pub fn new(kind: EdgeKind, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind,
            from: from.into(),
            to: to.into(),
        }
    }

    /// Stable identifier used in reports
    pub fn id(&self) -> String {
        format!("{}-[{:?}]->{}", self.from, self.kind, self.to)
    }
}

/// Nodes and edges written as one atomic group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteBatch {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl WriteBatch {
    pub fn nodes(nodes: Vec<GraphNode>) -> Self {
        Self {
            nodes,
            edges: Vec::new(),
        }
    }

    pub fn edges(edges: Vec<GraphEdge>) -> Self {
        Self {
            nodes: Vec::new(),
            edges,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }

    /// Ids of everything in the batch
    pub fn item_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .map(|n| n.id().to_string())
            .chain(self.edges.iter().map(GraphEdge::id))
            .collect()
    }
}

// ============================================================================
// Vectors
// ============================================================================

/// The vector indexes a lexical graph maintains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorIndex {
    Statement,
    Chunk,
}

impl VectorIndex {
    pub fn name(&self) -> &'static str {
        match self {
            VectorIndex::Statement => "statement",
            VectorIndex::Chunk => "chunk",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: String,
    pub vector: Vec<f32>,
    /// Copy of the owning source's metadata, used for filtering
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

/// Embedding produced during extraction, not yet tied to a tenant index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub index: VectorIndex,
    pub id: String,
    pub source_id: String,
    pub vector: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_source_metadata() {
        let mut existing = GraphNode::Source(Source {
            source_id: "s".into(),
            metadata: Metadata::from([("a".to_string(), json!(1))]),
        });
        existing.merge(GraphNode::Source(Source {
            source_id: "s".into(),
            metadata: Metadata::from([("b".to_string(), json!(2))]),
        }));

        let source = existing.as_source().unwrap();
        assert_eq!(source.metadata.len(), 2);
    }

    #[test]
    fn test_merge_statement_details_is_idempotent() {
        let statement = Statement {
            statement_id: "st".into(),
            topic_id: "t".into(),
            text: "text".into(),
            details: vec!["d1".into()],
        };
        let mut node = GraphNode::Statement(statement.clone());
        node.merge(GraphNode::Statement(statement.clone()));
        node.merge(GraphNode::Statement(Statement {
            details: vec!["d2".into()],
            ..statement
        }));

        assert_eq!(node.as_statement().unwrap().details, vec!["d1", "d2"]);
    }

    #[test]
    fn test_node_serde_tag() {
        let node = GraphNode::Entity(Entity {
            entity_id: "e".into(),
            value: "Amazon".into(),
            classification: "Company".into(),
        });
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "entity");
        assert_eq!(serde_json::from_value::<GraphNode>(value).unwrap(), node);
    }

    #[test]
    fn test_write_batch_item_ids() {
        let batch = WriteBatch {
            nodes: vec![GraphNode::Topic(Topic {
                topic_id: "t".into(),
                source_id: "s".into(),
                label: "Climate".into(),
            })],
            edges: vec![GraphEdge::new(EdgeKind::MentionedIn, "t", "c")],
        };
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.item_ids(), vec!["t", "t-[MentionedIn]->c"]);
    }
}
