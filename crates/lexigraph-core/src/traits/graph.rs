//! Graph store capability

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::model::{EdgeKind, GraphEdge, GraphNode, NodeType, WriteBatch};
use crate::tenant::TenantId;

// ============================================================================
// Query patterns
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Edges whose `from` is an anchor
    Outgoing,
    /// Edges whose `to` is an anchor
    Incoming,
}

/// The fixed set of lookups the lexical graph needs from a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphPattern {
    /// Nodes of one type, optionally restricted to ids
    Nodes {
        node_type: NodeType,
        ids: Option<Vec<String>>,
    },

    /// Edges, optionally of one kind, optionally anchored at ids
    Edges {
        kind: Option<EdgeKind>,
        anchors: Option<Vec<String>>,
        direction: Direction,
    },

    /// Number of nodes of one type
    Count { node_type: NodeType },

    /// Number of edges in the tenant subgraph
    EdgeCount,
}

impl GraphPattern {
    pub fn all_nodes(node_type: NodeType) -> Self {
        GraphPattern::Nodes {
            node_type,
            ids: None,
        }
    }

    pub fn nodes_by_id(node_type: NodeType, ids: Vec<String>) -> Self {
        GraphPattern::Nodes {
            node_type,
            ids: Some(ids),
        }
    }

    pub fn outgoing(kind: EdgeKind, from: Vec<String>) -> Self {
        GraphPattern::Edges {
            kind: Some(kind),
            anchors: Some(from),
            direction: Direction::Outgoing,
        }
    }

    pub fn incoming(kind: EdgeKind, to: Vec<String>) -> Self {
        GraphPattern::Edges {
            kind: Some(kind),
            anchors: Some(to),
            direction: Direction::Incoming,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphRow {
    Node(GraphNode),
    Edge(GraphEdge),
    Count(usize),
}

impl GraphRow {
    pub fn into_node(self) -> Option<GraphNode> {
        match self {
            GraphRow::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn into_edge(self) -> Option<GraphEdge> {
        match self {
            GraphRow::Edge(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<usize> {
        match self {
            GraphRow::Count(c) => Some(*c),
            _ => None,
        }
    }
}

/// Ids removed by a source deletion, grouped by node type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedNodes {
    pub by_type: BTreeMap<NodeType, Vec<String>>,
}

impl DeletedNodes {
    pub fn ids(&self, node_type: NodeType) -> &[String] {
        self.by_type
            .get(&node_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn record(&mut self, node_type: NodeType, id: impl Into<String>) {
        self.by_type.entry(node_type).or_default().push(id.into());
    }

    pub fn total(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }
}

// ============================================================================
// GraphStore Trait
// ============================================================================

/// Tenant-partitioned lexical graph storage
///
/// Implementations partition data by [`TenantId::format_label`]; node ids are
/// shared across tenants. Handles are shared between workers, so every method
/// takes `&self`.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upsert all nodes and edges of `batch` atomically
    ///
    /// Returns [`StoreError::ConcurrentModification`](crate::StoreError) when a
    /// concurrent writer touched an overlapping node set; nothing from the
    /// batch is applied in that case.
    async fn upsert(&self, batch: WriteBatch, tenant: &TenantId) -> StoreResult<()>;

    async fn query(&self, pattern: GraphPattern, tenant: &TenantId) -> StoreResult<Vec<GraphRow>>;

    /// Delete a source with its chunks, topics and statements
    ///
    /// Facts left without a supporting statement and entities left without a
    /// referencing fact are removed too. Deleting an unknown source succeeds.
    async fn delete_source(&self, source_id: &str, tenant: &TenantId)
        -> StoreResult<DeletedNodes>;

    /// Fetch nodes of one type by id; unknown ids are skipped
    async fn get_nodes(
        &self,
        node_type: NodeType,
        ids: Vec<String>,
        tenant: &TenantId,
    ) -> StoreResult<Vec<GraphNode>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .query(GraphPattern::nodes_by_id(node_type, ids), tenant)
            .await?;
        Ok(rows.into_iter().filter_map(GraphRow::into_node).collect())
    }

    /// Edges of `kind` touching `anchors` in `direction`
    async fn edges(
        &self,
        kind: EdgeKind,
        anchors: Vec<String>,
        direction: Direction,
        tenant: &TenantId,
    ) -> StoreResult<Vec<GraphEdge>> {
        if anchors.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = GraphPattern::Edges {
            kind: Some(kind),
            anchors: Some(anchors),
            direction,
        };
        let rows = self.query(pattern, tenant).await?;
        Ok(rows.into_iter().filter_map(GraphRow::into_edge).collect())
    }

    async fn count_nodes(&self, node_type: NodeType, tenant: &TenantId) -> StoreResult<usize> {
        let rows = self.query(GraphPattern::Count { node_type }, tenant).await?;
        Ok(rows.first().and_then(GraphRow::as_count).unwrap_or(0))
    }

    async fn count_edges(&self, tenant: &TenantId) -> StoreResult<usize> {
        let rows = self.query(GraphPattern::EdgeCount, tenant).await?;
        Ok(rows.first().and_then(GraphRow::as_count).unwrap_or(0))
    }
}

#[async_trait]
impl<T: GraphStore + ?Sized> GraphStore for std::sync::Arc<T> {
    async fn upsert(&self, batch: WriteBatch, tenant: &TenantId) -> StoreResult<()> {
        (**self).upsert(batch, tenant).await
    }

    async fn query(&self, pattern: GraphPattern, tenant: &TenantId) -> StoreResult<Vec<GraphRow>> {
        (**self).query(pattern, tenant).await
    }

    async fn delete_source(
        &self,
        source_id: &str,
        tenant: &TenantId,
    ) -> StoreResult<DeletedNodes> {
        (**self).delete_source(source_id, tenant).await
    }

    async fn get_nodes(
        &self,
        node_type: NodeType,
        ids: Vec<String>,
        tenant: &TenantId,
    ) -> StoreResult<Vec<GraphNode>> {
        (**self).get_nodes(node_type, ids, tenant).await
    }

    async fn edges(
        &self,
        kind: EdgeKind,
        anchors: Vec<String>,
        direction: Direction,
        tenant: &TenantId,
    ) -> StoreResult<Vec<GraphEdge>> {
        (**self).edges(kind, anchors, direction, tenant).await
    }

    async fn count_nodes(&self, node_type: NodeType, tenant: &TenantId) -> StoreResult<usize> {
        (**self).count_nodes(node_type, tenant).await
    }

    async fn count_edges(&self, tenant: &TenantId) -> StoreResult<usize> {
        (**self).count_edges(tenant).await
    }
}
