//! Extraction fragments: tenant-independent graph output of the extraction
//! stage, deduplicated by node id

use std::collections::{BTreeMap, BTreeSet};

use lexigraph_core::{Embedding, GraphEdge, GraphNode, NodeType, Source, VectorIndex};
use serde::{Deserialize, Serialize};

/// Nodes, edges and embeddings produced by extraction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionFragment {
    nodes: BTreeMap<String, GraphNode>,
    edges: BTreeSet<GraphEdge>,
    /// keyed by `<index>:<id>`
    embeddings: BTreeMap<String, Embedding>,
}

impl ExtractionFragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, merging with an existing node of the same id
    pub fn add_node(&mut self, node: GraphNode) {
        match self.nodes.get_mut(node.id()) {
            Some(existing) => existing.merge(node),
            None => {
                self.nodes.insert(node.id().to_string(), node);
            }
        }
    }

    pub fn add_edge(&mut self, edge: GraphEdge) {
        self.edges.insert(edge);
    }

    pub fn add_embedding(&mut self, embedding: Embedding) {
        let key = format!("{}:{}", embedding.index.name(), embedding.id);
        self.embeddings.insert(key, embedding);
    }

    pub fn merge(&mut self, other: ExtractionFragment) {
        for node in other.nodes.into_values() {
            self.add_node(node);
        }
        self.edges.extend(other.edges);
        self.embeddings.extend(other.embeddings);
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Nodes in build order: sources first, entities last
    pub fn nodes_in_write_order(&self) -> Vec<&GraphNode> {
        let mut nodes: Vec<&GraphNode> = self.nodes.values().collect();
        nodes.sort_by(|a, b| (a.node_type(), a.id()).cmp(&(b.node_type(), b.id())));
        nodes
    }

    pub fn nodes_of(&self, node_type: NodeType) -> impl Iterator<Item = &GraphNode> {
        self.nodes
            .values()
            .filter(move |n| n.node_type() == node_type)
    }

    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.nodes.values().filter_map(GraphNode::as_source)
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources().map(|s| s.source_id.clone()).collect()
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter()
    }

    pub fn embeddings(&self) -> impl Iterator<Item = &Embedding> {
        self.embeddings.values()
    }

    pub fn embedding(&self, index: VectorIndex, id: &str) -> Option<&Embedding> {
        self.embeddings.get(&format!("{}:{}", index.name(), id))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn count(&self, node_type: NodeType) -> usize {
        self.nodes_of(node_type).count()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// What `build` reads from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FragmentRef {
    /// Fragment held in memory
    InMemory { fragment: ExtractionFragment },
    /// Sources persisted under the default tenant
    Persisted { source_ids: Vec<String> },
}

impl FragmentRef {
    pub fn source_ids(&self) -> Vec<String> {
        match self {
            FragmentRef::InMemory { fragment } => fragment.source_ids(),
            FragmentRef::Persisted { source_ids } => source_ids.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexigraph_core::{EdgeKind, Statement, Topic};

    fn statement(id: &str, details: &[&str]) -> GraphNode {
        GraphNode::Statement(Statement {
            statement_id: id.into(),
            topic_id: "t".into(),
            text: "text".into(),
            details: details.iter().map(|d| d.to_string()).collect(),
        })
    }

    #[test]
    fn test_duplicate_nodes_collapse() {
        let mut fragment = ExtractionFragment::new();
        fragment.add_node(statement("st", &["a"]));
        fragment.add_node(statement("st", &["b"]));
        fragment.add_edge(GraphEdge::new(EdgeKind::BelongsTo, "st", "t"));
        fragment.add_edge(GraphEdge::new(EdgeKind::BelongsTo, "st", "t"));

        assert_eq!(fragment.node_count(), 1);
        assert_eq!(fragment.edge_count(), 1);
        let merged = fragment.node("st").and_then(GraphNode::as_statement).unwrap();
        assert_eq!(merged.details, vec!["a", "b"]);
    }

    #[test]
    fn test_write_order_puts_parents_first() {
        let mut fragment = ExtractionFragment::new();
        fragment.add_node(statement("st", &[]));
        fragment.add_node(GraphNode::Topic(Topic {
            topic_id: "t".into(),
            source_id: "s".into(),
            label: "Topic".into(),
        }));

        let order: Vec<NodeType> = fragment
            .nodes_in_write_order()
            .iter()
            .map(|n| n.node_type())
            .collect();
        assert_eq!(order, vec![NodeType::Topic, NodeType::Statement]);
    }
}
