//! Build stage: write an extraction fragment into a tenant's stores
//!
//! Nodes are written before edges, in write groups of `batch_write_size`.
//! Each group is one graph transaction followed by the vector upserts for the
//! statements and chunks it contains. A group rejected with a
//! concurrent-modification conflict is retried with exponential backoff; when
//! attempts run out the group is reported and the build carries on.
//!
//! Version relinking is a read-modify-write over every source of the tenant;
//! each attempt re-reads the sources, so a conflicting build that lands in
//! between is folded into the retry.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use lexigraph_config::BuildConfig;
use lexigraph_core::versioning::link_versions;
use lexigraph_core::{
    GraphEdge, GraphNode, GraphPattern, GraphRow, GraphStore, Metadata, NodeType, StoreError,
    TenantId, VectorEntry, VectorIndex, VectorStore, WriteBatch,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::fragment::ExtractionFragment;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedGroup {
    pub index: usize,
    pub item_ids: Vec<String>,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub tenant: TenantId,
    pub nodes_written: usize,
    pub edges_written: usize,
    pub vectors_written: usize,
    pub total_groups: usize,
    pub failed_groups: Vec<FailedGroup>,
    /// Sources whose `valid_to` was recomputed
    pub versions_updated: usize,
}

impl BuildReport {
    fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            nodes_written: 0,
            edges_written: 0,
            vectors_written: 0,
            total_groups: 0,
            failed_groups: Vec::new(),
            versions_updated: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed_groups.is_empty()
    }

    pub fn succeeded_groups(&self) -> usize {
        self.total_groups - self.failed_groups.len()
    }

    /// Ids of every node and edge in a failed group
    pub fn failed_item_ids(&self) -> Vec<&str> {
        self.failed_groups
            .iter()
            .flat_map(|g| g.item_ids.iter().map(String::as_str))
            .collect()
    }

    /// Fold a later build of the same tenant into this report
    pub fn absorb(&mut self, other: BuildReport) {
        self.nodes_written += other.nodes_written;
        self.edges_written += other.edges_written;
        self.vectors_written += other.vectors_written;
        self.total_groups += other.total_groups;
        self.failed_groups.extend(other.failed_groups);
        self.versions_updated += other.versions_updated;
    }
}

/// One write group: a graph batch plus its vector entries
struct WriteGroup {
    index: usize,
    batch: WriteBatch,
    vectors: Vec<(VectorIndex, Vec<VectorEntry>)>,
}

impl WriteGroup {
    fn vector_count(&self) -> usize {
        self.vectors.iter().map(|(_, entries)| entries.len()).sum()
    }
}

struct GroupOutcome {
    nodes: usize,
    edges: usize,
    vectors: usize,
    failure: Option<FailedGroup>,
}

/// Store error after the retry loop gave up
#[derive(Debug)]
struct WriteFailure {
    attempts: u32,
    error: StoreError,
}

pub struct GraphBuilder {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    config: BuildConfig,
}

impl GraphBuilder {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        config: BuildConfig,
    ) -> Self {
        Self {
            graph,
            vectors,
            config,
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Merge `fragment` into `tenant`
    ///
    /// Store failures are reported per group; the returned error is reserved
    /// for failures outside any group.
    pub async fn build(
        &self,
        fragment: &ExtractionFragment,
        tenant: &TenantId,
    ) -> PipelineResult<BuildReport> {
        let start = Instant::now();
        let mut report = BuildReport::new(tenant.clone());
        let group_size = self.config.group_size();

        // Nodes
        let node_groups: Vec<WriteGroup> = fragment
            .nodes_in_write_order()
            .chunks(group_size)
            .enumerate()
            .map(|(index, nodes)| self.node_group(index, nodes, fragment))
            .collect();
        let node_group_count = node_groups.len();
        self.run_groups(node_groups, tenant, &mut report).await;
        info!(
            tenant = %tenant,
            groups = node_group_count,
            nodes = report.nodes_written,
            vectors = report.vectors_written,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "node groups written"
        );

        // Versions
        if fragment.sources().any(|s| s.version_info().is_some()) {
            let index = report.total_groups;
            report.total_groups += 1;
            match self.relink(index, tenant).await {
                Ok(changed) => report.versions_updated = changed.len(),
                Err(failure) => report.failed_groups.push(FailedGroup {
                    index,
                    item_ids: fragment.source_ids(),
                    attempts: failure.attempts,
                    error: failure.error.to_string(),
                }),
            }
        }

        // Edges
        let offset = report.total_groups;
        let edges: Vec<&GraphEdge> = fragment.edges().collect();
        let edge_groups: Vec<WriteGroup> = edges
            .chunks(group_size)
            .enumerate()
            .map(|(index, edges)| WriteGroup {
                index: offset + index,
                batch: WriteBatch::edges(edges.iter().map(|e| (*e).clone()).collect()),
                vectors: Vec::new(),
            })
            .collect();
        self.run_groups(edge_groups, tenant, &mut report).await;

        if report.is_success() {
            info!(
                tenant = %tenant,
                nodes = report.nodes_written,
                edges = report.edges_written,
                vectors = report.vectors_written,
                groups = report.total_groups,
                versions_updated = report.versions_updated,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "build complete"
            );
        } else {
            warn!(
                tenant = %tenant,
                failed_groups = report.failed_groups.len(),
                groups = report.total_groups,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "build finished with failed groups"
            );
        }
        Ok(report)
    }

    /// Recompute `valid_to` for every versioned source of `tenant`
    ///
    /// Returns the ids of sources that changed. Runs as write group 0.
    pub async fn refresh_versions(&self, tenant: &TenantId) -> PipelineResult<Vec<String>> {
        self.relink(0, tenant)
            .await
            .map_err(|failure| PipelineError::Store(failure.error))
    }

    // ========================================================================
    // Groups
    // ========================================================================

    fn node_group(
        &self,
        index: usize,
        nodes: &[&GraphNode],
        fragment: &ExtractionFragment,
    ) -> WriteGroup {
        let mut vectors: BTreeMap<VectorIndex, Vec<VectorEntry>> = BTreeMap::new();
        for node in nodes {
            let vector_index = match node.node_type() {
                NodeType::Statement => VectorIndex::Statement,
                NodeType::Chunk => VectorIndex::Chunk,
                _ => continue,
            };
            if let Some(embedding) = fragment.embedding(vector_index, node.id()) {
                let metadata = fragment
                    .node(&embedding.source_id)
                    .and_then(GraphNode::as_source)
                    .map(|s| s.metadata.clone())
                    .unwrap_or_else(Metadata::new);
                vectors.entry(vector_index).or_default().push(VectorEntry {
                    id: embedding.id.clone(),
                    vector: embedding.vector.clone(),
                    metadata,
                });
            }
        }

        WriteGroup {
            index,
            batch: WriteBatch::nodes(nodes.iter().map(|n| (*n).clone()).collect()),
            vectors: vectors.into_iter().collect(),
        }
    }

    async fn run_groups(&self, groups: Vec<WriteGroup>, tenant: &TenantId, report: &mut BuildReport) {
        report.total_groups += groups.len();
        let outcomes: Vec<GroupOutcome> = stream::iter(groups)
            .map(|group| self.write_group(group, tenant))
            .buffer_unordered(self.config.write_concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome.failure {
                Some(failed) => report.failed_groups.push(failed),
                None => {
                    report.nodes_written += outcome.nodes;
                    report.edges_written += outcome.edges;
                    report.vectors_written += outcome.vectors;
                }
            }
        }
        report.failed_groups.sort_by_key(|g| g.index);
    }

    async fn write_group(&self, group: WriteGroup, tenant: &TenantId) -> GroupOutcome {
        let mut outcome = GroupOutcome {
            nodes: group.batch.nodes.len(),
            edges: group.batch.edges.len(),
            vectors: group.vector_count(),
            failure: None,
        };

        if let Err(failure) = self
            .write_with_retry(group.index, &group.batch, &group.vectors, tenant)
            .await
        {
            outcome.failure = Some(FailedGroup {
                index: group.index,
                item_ids: group.batch.item_ids(),
                attempts: failure.attempts,
                error: failure.error.to_string(),
            });
        }
        outcome
    }

    /// Returns the number of attempts used
    async fn write_with_retry(
        &self,
        group: usize,
        batch: &WriteBatch,
        vectors: &[(VectorIndex, Vec<VectorEntry>)],
        tenant: &TenantId,
    ) -> Result<u32, WriteFailure> {
        let ((), attempts) = self
            .retry_conflicts(group, || self.write_once(batch, vectors, tenant))
            .await?;
        Ok(attempts)
    }

    /// Run `attempt_once` until it succeeds, fails with a non-conflict
    /// error, or `max_conflict_attempts` is used up
    async fn retry_conflicts<T, F, Fut>(
        &self,
        group: usize,
        mut attempt_once: F,
    ) -> Result<(T, u32), WriteFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.config.max_conflict_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match attempt_once().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(group, attempt, "write group recovered after conflict");
                    } else {
                        debug!(group, "write group committed");
                    }
                    return Ok((value, attempt));
                }
                Err(e) if e.is_conflict() && attempt < max_attempts => {
                    let delay = self.config.backoff_for(attempt);
                    warn!(
                        group,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "write conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(group, attempts = attempt, error = %e, "write group failed");
                    return Err(WriteFailure {
                        attempts: attempt,
                        error: e,
                    });
                }
            }
        }
    }

    async fn write_once(
        &self,
        batch: &WriteBatch,
        vectors: &[(VectorIndex, Vec<VectorEntry>)],
        tenant: &TenantId,
    ) -> Result<(), StoreError> {
        self.graph.upsert(batch.clone(), tenant).await?;
        for (index, entries) in vectors {
            self.vectors
                .upsert_embeddings(*index, entries.clone(), tenant)
                .await?;
        }
        Ok(())
    }

    // ========================================================================
    // Versioning
    // ========================================================================

    async fn relink(&self, group: usize, tenant: &TenantId) -> Result<Vec<String>, WriteFailure> {
        let (changed, _) = self
            .retry_conflicts(group, || self.relink_once(tenant))
            .await?;
        Ok(changed)
    }

    /// Read every source, relink, write back the ones that changed
    async fn relink_once(&self, tenant: &TenantId) -> Result<Vec<String>, StoreError> {
        let rows = self
            .graph
            .query(GraphPattern::all_nodes(NodeType::Source), tenant)
            .await?;
        let mut sources: Vec<_> = rows
            .into_iter()
            .filter_map(GraphRow::into_node)
            .filter_map(|n| match n {
                GraphNode::Source(s) => Some(s),
                _ => None,
            })
            .collect();

        let changed = link_versions(&mut sources);
        if changed.is_empty() {
            return Ok(changed);
        }

        let updated: Vec<GraphNode> = sources
            .into_iter()
            .filter(|s| changed.contains(&s.source_id))
            .map(GraphNode::Source)
            .collect();
        debug!(tenant = %tenant, sources = updated.len(), "relinking source versions");
        self.graph.upsert(WriteBatch::nodes(updated), tenant).await?;
        Ok(changed)
    }
}
