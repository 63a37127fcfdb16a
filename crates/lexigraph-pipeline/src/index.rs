//! `LexicalGraphIndex`: the build-side entry points
//!
//! Extraction always writes to the default tenant; `build` copies a fragment
//! into any tenant. Stats, source listing and deletion are tenant-scoped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use lexigraph_config::LexicalGraphConfig;
use lexigraph_core::filter::matches_optional;
use lexigraph_core::{
    Direction, EdgeKind, Embedding, EmbeddingModel, GraphNode, GraphPattern, GraphRow, GraphStore,
    LanguageModel, MetadataFilter, NodeType, Source, TenantId, VectorIndex, VectorStore,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::build::{BuildReport, GraphBuilder};
use crate::document::SourceDocument;
use crate::error::{PipelineResult, PipelineWarning};
use crate::extraction::Extractor;
use crate::fragment::{ExtractionFragment, FragmentRef};
use crate::orchestrator::{BatchOrchestrator, FailedItem, Progress};

/// Result of `extract`
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractReport {
    pub fragment: FragmentRef,
    /// Source ids of documents that were extracted
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedItem>,
    pub skipped: Vec<String>,
    pub warnings: Vec<PipelineWarning>,
    /// Write of the fragment into the default tenant, when persisted
    pub persisted: Option<BuildReport>,
}

impl ExtractReport {
    pub fn has_warning(&self, predicate: impl Fn(&PipelineWarning) -> bool) -> bool {
        self.warnings.iter().any(predicate)
    }
}

/// Result of `extract_and_build`
#[derive(Debug, Clone, PartialEq)]
pub struct IndexReport {
    pub extraction: ExtractReport,
    pub build: BuildReport,
}

impl IndexReport {
    pub fn is_success(&self) -> bool {
        self.extraction.failed.is_empty()
            && self.extraction.skipped.is_empty()
            && self.build.is_success()
    }
}

/// Node counts and connectivity of one tenant subgraph
///
/// With `N` nodes and `E` edges, `local_connectivity` is the average degree
/// `2E / N` and `global_connectivity` the density `2E / (N (N - 1))`; both are
/// 0 for an empty graph, and density is 0 when `N < 2`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub sources: usize,
    pub chunks: usize,
    pub topics: usize,
    pub statements: usize,
    pub facts: usize,
    pub entities: usize,
    pub edges: usize,
    pub local_connectivity: f64,
    pub global_connectivity: f64,
}

impl GraphStats {
    pub fn from_counts(counts: &BTreeMap<NodeType, usize>, edges: usize) -> Self {
        let count = |t: NodeType| counts.get(&t).copied().unwrap_or(0);
        let mut stats = Self {
            sources: count(NodeType::Source),
            chunks: count(NodeType::Chunk),
            topics: count(NodeType::Topic),
            statements: count(NodeType::Statement),
            facts: count(NodeType::Fact),
            entities: count(NodeType::Entity),
            edges,
            ..Self::default()
        };

        let n = stats.node_count() as f64;
        let e = edges as f64;
        if stats.node_count() > 0 {
            stats.local_connectivity = 2.0 * e / n;
        }
        if stats.node_count() > 1 {
            stats.global_connectivity = 2.0 * e / (n * (n - 1.0));
        }
        stats
    }

    pub fn node_count(&self) -> usize {
        self.sources + self.chunks + self.topics + self.statements + self.facts + self.entities
    }
}

pub struct LexicalGraphIndex {
    config: LexicalGraphConfig,
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    extractor: Arc<Extractor>,
    builder: GraphBuilder,
    orchestrator: BatchOrchestrator,
}

impl LexicalGraphIndex {
    /// Validates `config` before anything touches a store
    pub fn new(
        config: LexicalGraphConfig,
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        let extractor = Arc::new(Extractor::new(llm, embedder, config.extraction.clone()));
        let builder = GraphBuilder::new(graph.clone(), vectors.clone(), config.build.clone());
        let orchestrator = BatchOrchestrator::new(config.batch.clone());
        Ok(Self {
            config,
            graph,
            vectors,
            extractor,
            builder,
            orchestrator,
        })
    }

    pub fn config(&self) -> &LexicalGraphConfig {
        &self.config
    }

    /// Live document progress across every run of this index
    pub fn progress(&self) -> Progress {
        self.orchestrator.progress()
    }

    // ========================================================================
    // Extract / Build
    // ========================================================================

    /// Extract documents into the default tenant
    ///
    /// The configured tenant is ignored; a non-default one is reported as a
    /// warning.
    pub async fn extract(&self, documents: Vec<SourceDocument>) -> PipelineResult<ExtractReport> {
        let (fragment, mut report) = self.extract_fragment(documents).await?;

        if self.config.extraction.persist_extracted {
            let persisted = self.builder.build(&fragment, &TenantId::default()).await?;
            report.fragment = FragmentRef::Persisted {
                source_ids: fragment.source_ids(),
            };
            report.persisted = Some(persisted);
        } else {
            report.fragment = FragmentRef::InMemory { fragment };
        }
        Ok(report)
    }

    /// Merge a fragment into `tenant`
    pub async fn build(
        &self,
        fragment: &FragmentRef,
        tenant: &TenantId,
    ) -> PipelineResult<BuildReport> {
        match fragment {
            FragmentRef::InMemory { fragment } => self.builder.build(fragment, tenant).await,
            FragmentRef::Persisted { source_ids } => {
                let loaded = self.load_fragment(source_ids).await?;
                self.builder.build(&loaded, tenant).await
            }
        }
    }

    /// Extract, then build into `tenant`
    pub async fn extract_and_build(
        &self,
        documents: Vec<SourceDocument>,
        tenant: &TenantId,
    ) -> PipelineResult<IndexReport> {
        let (fragment, mut extraction) = self.extract_fragment(documents).await?;

        if self.config.extraction.persist_extracted && !tenant.is_default() {
            extraction.persisted = Some(self.builder.build(&fragment, &TenantId::default()).await?);
        }
        let build = self.builder.build(&fragment, tenant).await?;

        extraction.fragment = if self.config.extraction.persist_extracted {
            FragmentRef::Persisted {
                source_ids: fragment.source_ids(),
            }
        } else {
            FragmentRef::InMemory { fragment }
        };
        Ok(IndexReport { extraction, build })
    }

    async fn extract_fragment(
        &self,
        documents: Vec<SourceDocument>,
    ) -> PipelineResult<(ExtractionFragment, ExtractReport)> {
        let start = Instant::now();
        let mut warnings = Vec::new();
        if !self.config.tenant_id.is_default() {
            warn!(
                tenant = %self.config.tenant_id,
                "extraction ignores the configured tenant and writes to the default tenant"
            );
            warnings.push(PipelineWarning::ExtractionIgnoresTenant {
                configured: self.config.tenant_id.clone(),
            });
        }

        let batch = self.orchestrator.run(self.extractor.clone(), documents).await?;

        let mut fragment = ExtractionFragment::new();
        let mut succeeded = Vec::new();
        for extraction in batch.succeeded {
            for warning in extraction.warnings {
                if !warnings.contains(&warning) {
                    warnings.push(warning);
                }
            }
            succeeded.push(extraction.source_id);
            fragment.merge(extraction.fragment);
        }

        info!(
            documents = succeeded.len(),
            failed = batch.failed.len(),
            nodes = fragment.node_count(),
            edges = fragment.edge_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "extraction finished"
        );

        let report = ExtractReport {
            fragment: FragmentRef::Persisted {
                source_ids: Vec::new(),
            },
            succeeded,
            failed: batch.failed,
            skipped: batch.skipped,
            warnings,
            persisted: None,
        };
        Ok((fragment, report))
    }

    /// Read persisted sources back out of the default tenant
    async fn load_fragment(&self, source_ids: &[String]) -> PipelineResult<ExtractionFragment> {
        let tenant = TenantId::default();
        let graph = &self.graph;
        let mut fragment = ExtractionFragment::new();

        let sources = graph
            .get_nodes(NodeType::Source, source_ids.to_vec(), &tenant)
            .await?;
        let source_ids: Vec<String> = sources.iter().map(|n| n.id().to_string()).collect();

        let extracted_from = graph
            .edges(EdgeKind::ExtractedFrom, source_ids.clone(), Direction::Incoming, &tenant)
            .await?;
        let chunk_ids = unique(extracted_from.iter().map(|e| e.from.clone()));
        let chunks = graph.get_nodes(NodeType::Chunk, chunk_ids.clone(), &tenant).await?;
        let next = graph
            .edges(EdgeKind::Next, chunk_ids.clone(), Direction::Outgoing, &tenant)
            .await?;

        let mentioned_in = graph
            .edges(EdgeKind::MentionedIn, chunk_ids.clone(), Direction::Incoming, &tenant)
            .await?;
        let mention_ids = unique(mentioned_in.iter().map(|e| e.from.clone()));
        let topics = graph.get_nodes(NodeType::Topic, mention_ids.clone(), &tenant).await?;
        let statements = graph.get_nodes(NodeType::Statement, mention_ids, &tenant).await?;
        let statement_ids: Vec<String> = statements.iter().map(|n| n.id().to_string()).collect();
        let belongs_to = graph
            .edges(EdgeKind::BelongsTo, statement_ids.clone(), Direction::Outgoing, &tenant)
            .await?;

        let supports = graph
            .edges(EdgeKind::Supports, statement_ids.clone(), Direction::Incoming, &tenant)
            .await?;
        let fact_ids = unique(supports.iter().map(|e| e.from.clone()));
        let facts = graph.get_nodes(NodeType::Fact, fact_ids.clone(), &tenant).await?;
        let subjects = graph
            .edges(EdgeKind::Subject, fact_ids.clone(), Direction::Outgoing, &tenant)
            .await?;
        let objects = graph
            .edges(EdgeKind::Object, fact_ids, Direction::Outgoing, &tenant)
            .await?;
        let entity_ids = unique(subjects.iter().chain(&objects).map(|e| e.to.clone()));
        let entities = graph.get_nodes(NodeType::Entity, entity_ids, &tenant).await?;

        // owning source of each embedded node
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        let topic_sources: BTreeMap<&str, &str> = topics
            .iter()
            .filter_map(GraphNode::as_topic)
            .map(|t| (t.topic_id.as_str(), t.source_id.as_str()))
            .collect();
        for chunk in chunks.iter().filter_map(GraphNode::as_chunk) {
            owners.insert(chunk.chunk_id.clone(), chunk.source_id.clone());
        }
        for statement in statements.iter().filter_map(GraphNode::as_statement) {
            if let Some(source_id) = topic_sources.get(statement.topic_id.as_str()) {
                owners.insert(statement.statement_id.clone(), source_id.to_string());
            }
        }

        for (index, ids) in [
            (VectorIndex::Chunk, &chunk_ids),
            (VectorIndex::Statement, &statement_ids),
        ] {
            for entry in self.vectors.get_embeddings(index, ids, &tenant).await? {
                let source_id = owners.get(&entry.id).cloned().unwrap_or_default();
                fragment.add_embedding(Embedding {
                    index,
                    id: entry.id,
                    source_id,
                    vector: entry.vector,
                });
            }
        }

        for node in sources
            .into_iter()
            .chain(chunks)
            .chain(topics)
            .chain(statements)
            .chain(facts)
            .chain(entities)
        {
            fragment.add_node(node);
        }
        for edge in extracted_from
            .into_iter()
            .chain(next)
            .chain(mentioned_in)
            .chain(belongs_to)
            .chain(supports)
            .chain(subjects)
            .chain(objects)
        {
            fragment.add_edge(edge);
        }

        debug!(
            sources = source_ids.len(),
            nodes = fragment.node_count(),
            edges = fragment.edge_count(),
            "loaded persisted fragment"
        );
        Ok(fragment)
    }

    // ========================================================================
    // Stats / sources / deletion
    // ========================================================================

    pub async fn get_stats(&self, tenant: &TenantId) -> PipelineResult<GraphStats> {
        let mut counts = BTreeMap::new();
        for node_type in NodeType::ALL {
            counts.insert(node_type, self.graph.count_nodes(node_type, tenant).await?);
        }
        let edges = self.graph.count_edges(tenant).await?;
        Ok(GraphStats::from_counts(&counts, edges))
    }

    /// Sources of `tenant` whose metadata matches `filter`, ordered by id
    pub async fn get_sources(
        &self,
        filter: Option<&MetadataFilter>,
        tenant: &TenantId,
    ) -> PipelineResult<Vec<Source>> {
        let rows = self
            .graph
            .query(GraphPattern::all_nodes(NodeType::Source), tenant)
            .await?;
        let mut sources: Vec<Source> = rows
            .into_iter()
            .filter_map(GraphRow::into_node)
            .filter_map(|n| match n {
                GraphNode::Source(s) => Some(s),
                _ => None,
            })
            .filter(|s| matches_optional(filter, &s.metadata))
            .collect();
        sources.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(sources)
    }

    /// Delete matching sources with their subgraphs and vector entries
    ///
    /// Returns the deleted source ids. Remaining versions of a deleted
    /// source's logical document are relinked.
    pub async fn delete_sources(
        &self,
        filter: Option<&MetadataFilter>,
        tenant: &TenantId,
    ) -> PipelineResult<Vec<String>> {
        let sources = self.get_sources(filter, tenant).await?;
        let versioned = sources.iter().any(|s| s.version_info().is_some());

        let mut deleted = Vec::with_capacity(sources.len());
        for source in sources {
            let removed = self.graph.delete_source(&source.source_id, tenant).await?;
            self.vectors
                .delete(VectorIndex::Statement, removed.ids(NodeType::Statement), tenant)
                .await?;
            self.vectors
                .delete(VectorIndex::Chunk, removed.ids(NodeType::Chunk), tenant)
                .await?;
            debug!(
                tenant = %tenant,
                source_id = %source.source_id,
                nodes = removed.total(),
                "deleted source"
            );
            deleted.push(source.source_id);
        }

        if versioned {
            self.builder.refresh_versions(tenant).await?;
        }
        info!(tenant = %tenant, sources = deleted.len(), "sources deleted");
        Ok(deleted)
    }
}

fn unique(ids: impl Iterator<Item = String>) -> Vec<String> {
    ids.collect::<BTreeSet<_>>().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_formulas() {
        let counts = BTreeMap::from([(NodeType::Source, 1), (NodeType::Chunk, 3)]);
        let stats = GraphStats::from_counts(&counts, 3);

        assert_eq!(stats.node_count(), 4);
        assert!((stats.local_connectivity - 1.5).abs() < 1e-9);
        assert!((stats.global_connectivity - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_connectivity_of_tiny_graphs() {
        let empty = GraphStats::from_counts(&BTreeMap::new(), 0);
        assert_eq!(empty.local_connectivity, 0.0);
        assert_eq!(empty.global_connectivity, 0.0);

        let single = GraphStats::from_counts(&BTreeMap::from([(NodeType::Source, 1)]), 0);
        assert_eq!(single.local_connectivity, 0.0);
        assert_eq!(single.global_connectivity, 0.0);
    }
}
