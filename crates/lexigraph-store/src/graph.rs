//! In-memory graph backend
//!
//! Nodes live in tables keyed by their tenant-scoped label
//! (`__Chunk__acme__`), edges in one table per tenant. A single write lock
//! makes every batch atomic.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use lexigraph_core::{
    DeletedNodes, Direction, EdgeKind, GraphEdge, GraphNode, GraphPattern, GraphRow, GraphStore,
    NodeType, StoreResult, TenantId, WriteBatch,
};
use parking_lot::RwLock;
use tracing::debug;

/// Label of a tenant's edge table
const EDGE_LABEL: &str = "Edge";

#[derive(Debug, Default)]
struct EdgeTable {
    outgoing: HashMap<String, BTreeSet<GraphEdge>>,
    incoming: HashMap<String, BTreeSet<GraphEdge>>,
    len: usize,
}

impl EdgeTable {
    fn insert(&mut self, edge: GraphEdge) {
        let added = self
            .outgoing
            .entry(edge.from.clone())
            .or_default()
            .insert(edge.clone());
        if added {
            self.incoming
                .entry(edge.to.clone())
                .or_default()
                .insert(edge);
            self.len += 1;
        }
    }

    fn remove(&mut self, edge: &GraphEdge) {
        let removed = self
            .outgoing
            .get_mut(&edge.from)
            .is_some_and(|set| set.remove(edge));
        if removed {
            if let Some(set) = self.incoming.get_mut(&edge.to) {
                set.remove(edge);
            }
            self.len -= 1;
        }
    }

    fn touching(&self, id: &str, direction: Direction) -> impl Iterator<Item = &GraphEdge> {
        let index = match direction {
            Direction::Outgoing => &self.outgoing,
            Direction::Incoming => &self.incoming,
        };
        index.get(id).into_iter().flatten()
    }

    fn all(&self) -> impl Iterator<Item = &GraphEdge> {
        self.outgoing.values().flatten()
    }

    /// Remove every edge touching `id`
    fn detach(&mut self, id: &str) {
        let touching: Vec<GraphEdge> = self
            .touching(id, Direction::Outgoing)
            .chain(self.touching(id, Direction::Incoming))
            .cloned()
            .collect();
        for edge in &touching {
            self.remove(edge);
        }
    }
}

#[derive(Debug, Default)]
struct GraphState {
    /// label -> id -> node
    nodes: HashMap<String, HashMap<String, GraphNode>>,
    /// tenant edge label -> edges
    edges: HashMap<String, EdgeTable>,
}

impl GraphState {
    fn table(&self, node_type: NodeType, tenant: &TenantId) -> Option<&HashMap<String, GraphNode>> {
        self.nodes.get(&tenant.format_label(node_type.label()))
    }

    fn table_mut(&mut self, node_type: NodeType, tenant: &TenantId) -> &mut HashMap<String, GraphNode> {
        self.nodes
            .entry(tenant.format_label(node_type.label()))
            .or_default()
    }

    fn edge_table(&self, tenant: &TenantId) -> Option<&EdgeTable> {
        self.edges.get(&tenant.format_label(EDGE_LABEL))
    }

    fn edge_table_mut(&mut self, tenant: &TenantId) -> &mut EdgeTable {
        self.edges
            .entry(tenant.format_label(EDGE_LABEL))
            .or_default()
    }

    fn remove_node(&mut self, node_type: NodeType, id: &str, tenant: &TenantId) -> bool {
        let removed = self.table_mut(node_type, tenant).remove(id).is_some();
        self.edge_table_mut(tenant).detach(id);
        removed
    }

    fn edge_ids(
        &self,
        tenant: &TenantId,
        kind: EdgeKind,
        id: &str,
        direction: Direction,
    ) -> Vec<String> {
        self.edge_table(tenant)
            .map(|table| {
                table
                    .touching(id, direction)
                    .filter(|e| e.kind == kind)
                    .map(|e| match direction {
                        Direction::Outgoing => e.to.clone(),
                        Direction::Incoming => e.from.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Graph store kept entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    name: String,
    state: RwLock<GraphState>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Labels that currently hold at least one node
    pub fn labels(&self) -> Vec<String> {
        let state = self.state.read();
        let mut labels: Vec<String> = state
            .nodes
            .iter()
            .filter(|(_, table)| !table.is_empty())
            .map(|(label, _)| label.clone())
            .collect();
        labels.sort();
        labels
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn upsert(&self, batch: WriteBatch, tenant: &TenantId) -> StoreResult<()> {
        let (node_count, edge_count) = (batch.nodes.len(), batch.edges.len());
        let mut state = self.state.write();

        for node in batch.nodes {
            let table = state.table_mut(node.node_type(), tenant);
            match table.get_mut(node.id()) {
                Some(existing) => existing.merge(node),
                None => {
                    table.insert(node.id().to_string(), node);
                }
            }
        }

        let edges = state.edge_table_mut(tenant);
        for edge in batch.edges {
            edges.insert(edge);
        }

        debug!(store = %self.name, tenant = %tenant, nodes = node_count, edges = edge_count, "upserted batch");
        Ok(())
    }

    async fn query(&self, pattern: GraphPattern, tenant: &TenantId) -> StoreResult<Vec<GraphRow>> {
        let state = self.state.read();

        let rows = match pattern {
            GraphPattern::Nodes { node_type, ids } => {
                let Some(table) = state.table(node_type, tenant) else {
                    return Ok(Vec::new());
                };
                match ids {
                    Some(ids) => {
                        let mut seen = HashSet::new();
                        ids.iter()
                            .filter(|id| seen.insert(id.as_str()))
                            .filter_map(|id| table.get(id))
                            .cloned()
                            .map(GraphRow::Node)
                            .collect()
                    }
                    None => {
                        let mut nodes: Vec<&GraphNode> = table.values().collect();
                        nodes.sort_by(|a, b| a.id().cmp(b.id()));
                        nodes.into_iter().cloned().map(GraphRow::Node).collect()
                    }
                }
            }
            GraphPattern::Edges {
                kind,
                anchors,
                direction,
            } => {
                let Some(table) = state.edge_table(tenant) else {
                    return Ok(Vec::new());
                };
                let matches_kind = |e: &&GraphEdge| kind.map_or(true, |k| e.kind == k);
                let edges: BTreeSet<&GraphEdge> = match anchors {
                    Some(anchors) => anchors
                        .iter()
                        .flat_map(|id| table.touching(id, direction))
                        .filter(matches_kind)
                        .collect(),
                    None => table.all().filter(matches_kind).collect(),
                };
                edges.into_iter().cloned().map(GraphRow::Edge).collect()
            }
            GraphPattern::Count { node_type } => {
                vec![GraphRow::Count(state.table(node_type, tenant).map_or(0, HashMap::len))]
            }
            GraphPattern::EdgeCount => {
                vec![GraphRow::Count(state.edge_table(tenant).map_or(0, |t| t.len))]
            }
        };
        Ok(rows)
    }

    async fn delete_source(
        &self,
        source_id: &str,
        tenant: &TenantId,
    ) -> StoreResult<DeletedNodes> {
        let mut state = self.state.write();
        let mut deleted = DeletedNodes::default();

        let chunk_ids = state.edge_ids(tenant, EdgeKind::ExtractedFrom, source_id, Direction::Incoming);
        let topic_ids: Vec<String> = state
            .table(NodeType::Topic, tenant)
            .map(|table| {
                table
                    .values()
                    .filter_map(GraphNode::as_topic)
                    .filter(|t| t.source_id == source_id)
                    .map(|t| t.topic_id.clone())
                    .collect()
            })
            .unwrap_or_default();
        let statement_ids: BTreeSet<String> = topic_ids
            .iter()
            .flat_map(|topic_id| {
                state.edge_ids(tenant, EdgeKind::BelongsTo, topic_id, Direction::Incoming)
            })
            .collect();

        // Facts and entities only go if nothing else references them
        let fact_candidates: BTreeSet<String> = statement_ids
            .iter()
            .flat_map(|st| state.edge_ids(tenant, EdgeKind::Supports, st, Direction::Incoming))
            .collect();

        if state.remove_node(NodeType::Source, source_id, tenant) {
            deleted.record(NodeType::Source, source_id);
        }
        for (node_type, ids) in [
            (NodeType::Chunk, chunk_ids.iter().collect::<Vec<_>>()),
            (NodeType::Topic, topic_ids.iter().collect()),
            (NodeType::Statement, statement_ids.iter().collect()),
        ] {
            for id in ids {
                if state.remove_node(node_type, id, tenant) {
                    deleted.record(node_type, id.as_str());
                }
            }
        }

        let mut entity_candidates = BTreeSet::new();
        for fact_id in &fact_candidates {
            let supported = !state
                .edge_ids(tenant, EdgeKind::Supports, fact_id, Direction::Outgoing)
                .is_empty();
            if supported {
                continue;
            }
            for kind in [EdgeKind::Subject, EdgeKind::Object] {
                entity_candidates.extend(state.edge_ids(tenant, kind, fact_id, Direction::Outgoing));
            }
            if state.remove_node(NodeType::Fact, fact_id, tenant) {
                deleted.record(NodeType::Fact, fact_id.as_str());
            }
        }

        for entity_id in &entity_candidates {
            let referenced = [EdgeKind::Subject, EdgeKind::Object].iter().any(|kind| {
                !state
                    .edge_ids(tenant, *kind, entity_id, Direction::Incoming)
                    .is_empty()
            });
            if !referenced && state.remove_node(NodeType::Entity, entity_id, tenant) {
                deleted.record(NodeType::Entity, entity_id.as_str());
            }
        }

        debug!(store = %self.name, tenant = %tenant, source_id, removed = deleted.total(), "deleted source");
        Ok(deleted)
    }
}
