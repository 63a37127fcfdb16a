//! Seed search and graph expansion
//!
//! Seeds are statements found by similarity search (optionally through
//! chunks). Expansion walks statement -> fact -> entity -> fact -> statement,
//! one hop per round, pulling in neighbouring statements at a decayed score.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lexigraph_core::filter::matches_optional;
use lexigraph_core::{
    Direction, EdgeKind, EmbeddingModel, GraphNode, GraphStore, MetadataFilter, NodeType,
    ScoredId, Source, TenantId, VectorIndex, VectorStore,
};
use tracing::debug;

use crate::error::QueryResult;
use crate::results::{RetrievedStatement, SearchResults, TopicGroup};

/// Score multiplier for statements reached through shared entities
pub const NEIGHBOUR_DECAY: f32 = 0.5;

/// Retrieval knobs resolved for one query
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub include_chunk_seeds: bool,
    /// 0 disables fact expansion
    pub max_hops: usize,
    /// Drop statements whose source is not current at `as_of`
    pub versioning: bool,
    pub as_of: i64,
}

/// Statement ids with their best score, in order of first appearance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Seeds {
    order: Vec<String>,
    scores: BTreeMap<String, f32>,
    /// statement -> supporting fact ids
    facts: BTreeMap<String, BTreeSet<String>>,
}

impl Seeds {
    /// Keep the best score per id; returns true for a new id
    pub fn record(&mut self, id: &str, score: f32) -> bool {
        match self.scores.get_mut(id) {
            Some(best) => {
                if score > *best {
                    *best = score;
                }
                false
            }
            None => {
                self.scores.insert(id.to_string(), score);
                self.order.push(id.to_string());
                true
            }
        }
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn score(&self, id: &str) -> Option<f32> {
        self.scores.get(id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

pub struct GraphRetriever {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingModel>,
}

impl GraphRetriever {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> Self {
        Self {
            graph,
            vectors,
            embedder,
        }
    }

    // ========================================================================
    // Seed search
    // ========================================================================

    pub async fn seed_search(
        &self,
        question: &str,
        filter: Option<&MetadataFilter>,
        settings: &RetrievalSettings,
        tenant: &TenantId,
    ) -> QueryResult<Seeds> {
        let vector = self.embedder.embed(question).await?;
        let mut seeds = Seeds::default();

        let hits = self
            .current_hits(VectorIndex::Statement, &vector, filter, settings, tenant)
            .await?;
        for hit in hits {
            seeds.record(&hit.id, hit.score);
        }

        if settings.include_chunk_seeds {
            let chunk_hits = self
                .current_hits(VectorIndex::Chunk, &vector, filter, settings, tenant)
                .await?;
            let chunk_scores: BTreeMap<String, f32> =
                chunk_hits.into_iter().map(|h| (h.id, h.score)).collect();
            let mentions = self
                .graph
                .edges(
                    EdgeKind::MentionedIn,
                    chunk_scores.keys().cloned().collect(),
                    Direction::Incoming,
                    tenant,
                )
                .await?;
            // topics mention chunks too; they drop out when statements are fetched
            for edge in mentions {
                if let Some(score) = chunk_scores.get(&edge.to) {
                    seeds.record(&edge.from, *score);
                }
            }
        }

        debug!(tenant = %tenant, seeds = seeds.len(), "seed search");
        Ok(seeds)
    }

    /// Top `top_k` hits from `index`, skipping entries of superseded sources
    ///
    /// A superseded version can outscore the current one, so with versioning on
    /// the search widens until `top_k` current hits are found or the index has
    /// no more entries.
    async fn current_hits(
        &self,
        index: VectorIndex,
        vector: &[f32],
        filter: Option<&MetadataFilter>,
        settings: &RetrievalSettings,
        tenant: &TenantId,
    ) -> QueryResult<Vec<ScoredId>> {
        if !settings.versioning {
            return Ok(self
                .vectors
                .similarity_search(index, vector, settings.top_k, filter, tenant)
                .await?);
        }

        let mut k = settings.top_k;
        loop {
            let hits = self
                .vectors
                .similarity_search(index, vector, k, filter, tenant)
                .await?;
            let exhausted = hits.len() < k;

            let owners = self
                .owning_sources(index, hits.iter().map(|h| h.id.clone()).collect(), tenant)
                .await?;
            let current = self
                .current_sources(unique(owners.values().cloned()), settings.as_of, tenant)
                .await?;
            let fetched = hits.len();
            let kept: Vec<ScoredId> = hits
                .into_iter()
                .filter(|h| owners.get(&h.id).is_some_and(|s| current.contains(s)))
                .take(settings.top_k)
                .collect();

            if kept.len() >= settings.top_k || exhausted {
                debug!(
                    index = index.name(),
                    fetched,
                    kept = kept.len(),
                    as_of = settings.as_of,
                    "versioned seed search"
                );
                return Ok(kept);
            }
            k = k.saturating_mul(2);
        }
    }

    /// Map statement or chunk ids to the id of the source they came from
    async fn owning_sources(
        &self,
        index: VectorIndex,
        ids: Vec<String>,
        tenant: &TenantId,
    ) -> QueryResult<BTreeMap<String, String>> {
        match index {
            VectorIndex::Chunk => Ok(self
                .graph
                .get_nodes(NodeType::Chunk, ids, tenant)
                .await?
                .iter()
                .filter_map(GraphNode::as_chunk)
                .map(|c| (c.chunk_id.clone(), c.source_id.clone()))
                .collect()),
            VectorIndex::Statement => {
                let statement_topics: Vec<(String, String)> = self
                    .graph
                    .get_nodes(NodeType::Statement, ids, tenant)
                    .await?
                    .iter()
                    .filter_map(GraphNode::as_statement)
                    .map(|s| (s.statement_id.clone(), s.topic_id.clone()))
                    .collect();
                let topic_sources: BTreeMap<String, String> = self
                    .graph
                    .get_nodes(
                        NodeType::Topic,
                        unique(statement_topics.iter().map(|(_, t)| t.clone())),
                        tenant,
                    )
                    .await?
                    .iter()
                    .filter_map(GraphNode::as_topic)
                    .map(|t| (t.topic_id.clone(), t.source_id.clone()))
                    .collect();
                Ok(statement_topics
                    .into_iter()
                    .filter_map(|(statement, topic)| {
                        topic_sources.get(&topic).map(|source| (statement, source.clone()))
                    })
                    .collect())
            }
        }
    }

    /// Ids among `source_ids` that are unversioned or current at `as_of`
    async fn current_sources(
        &self,
        source_ids: Vec<String>,
        as_of: i64,
        tenant: &TenantId,
    ) -> QueryResult<BTreeSet<String>> {
        Ok(self
            .graph
            .get_nodes(NodeType::Source, source_ids, tenant)
            .await?
            .iter()
            .filter_map(GraphNode::as_source)
            .filter(|s| s.version_info().map_or(true, |v| v.is_current_at(as_of)))
            .map(|s| s.source_id.clone())
            .collect())
    }

    // ========================================================================
    // Expansion
    // ========================================================================

    /// Walk outward from the seeds for up to `max_hops` rounds
    pub async fn expand(
        &self,
        seeds: &mut Seeds,
        settings: &RetrievalSettings,
        tenant: &TenantId,
    ) -> QueryResult<()> {
        let mut frontier: Vec<String> = seeds.order.clone();

        for hop in 1..=settings.max_hops {
            if frontier.is_empty() {
                break;
            }

            let supports = self
                .graph
                .edges(EdgeKind::Supports, frontier, Direction::Incoming, tenant)
                .await?;
            let mut fact_scores: BTreeMap<String, f32> = BTreeMap::new();
            for edge in &supports {
                seeds
                    .facts
                    .entry(edge.to.clone())
                    .or_default()
                    .insert(edge.from.clone());
                let score = seeds.score(&edge.to).unwrap_or(0.0);
                keep_best(&mut fact_scores, &edge.from, score);
            }
            if hop == settings.max_hops || fact_scores.is_empty() {
                break;
            }

            // facts -> entities
            let fact_ids: Vec<String> = fact_scores.keys().cloned().collect();
            let mut entity_scores: BTreeMap<String, f32> = BTreeMap::new();
            for kind in [EdgeKind::Subject, EdgeKind::Object] {
                for edge in self
                    .graph
                    .edges(kind, fact_ids.clone(), Direction::Outgoing, tenant)
                    .await?
                {
                    let score = fact_scores.get(&edge.from).copied().unwrap_or(0.0);
                    keep_best(&mut entity_scores, &edge.to, score);
                }
            }

            // entities -> neighbouring facts
            let entity_ids: Vec<String> = entity_scores.keys().cloned().collect();
            let mut neighbour_facts: BTreeMap<String, f32> = BTreeMap::new();
            for kind in [EdgeKind::Subject, EdgeKind::Object] {
                for edge in self
                    .graph
                    .edges(kind, entity_ids.clone(), Direction::Incoming, tenant)
                    .await?
                {
                    let score = entity_scores.get(&edge.to).copied().unwrap_or(0.0);
                    keep_best(&mut neighbour_facts, &edge.from, score);
                }
            }

            // neighbouring facts -> the statements they support
            let supported = self
                .graph
                .edges(
                    EdgeKind::Supports,
                    neighbour_facts.keys().cloned().collect(),
                    Direction::Outgoing,
                    tenant,
                )
                .await?;
            let mut next = Vec::new();
            for edge in supported {
                let score = neighbour_facts.get(&edge.from).copied().unwrap_or(0.0) * NEIGHBOUR_DECAY;
                if seeds.record(&edge.to, score) {
                    next.push(edge.to);
                }
            }
            debug!(hop, facts = fact_ids.len(), entities = entity_ids.len(), added = next.len(), "expanded");
            frontier = next;
        }
        Ok(())
    }

    // ========================================================================
    // Assembly
    // ========================================================================

    /// Resolve seeds into topic groups
    ///
    /// Statements whose source fails `filter`, or is not current at `as_of`
    /// when versioning is on, are dropped. Groups keep first-appearance order.
    pub async fn assemble(
        &self,
        seeds: &Seeds,
        filter: Option<&MetadataFilter>,
        settings: &RetrievalSettings,
        tenant: &TenantId,
    ) -> QueryResult<SearchResults> {
        if seeds.is_empty() {
            return Ok(SearchResults::default());
        }

        let statements = self
            .graph
            .get_nodes(NodeType::Statement, seeds.order.clone(), tenant)
            .await?;
        let statements: BTreeMap<String, _> = statements
            .into_iter()
            .filter_map(|n| match n {
                GraphNode::Statement(s) => Some((s.statement_id.clone(), s)),
                _ => None,
            })
            .collect();

        let topic_ids = unique(statements.values().map(|s| s.topic_id.clone()));
        let topics: BTreeMap<String, _> = self
            .graph
            .get_nodes(NodeType::Topic, topic_ids, tenant)
            .await?
            .into_iter()
            .filter_map(|n| match n {
                GraphNode::Topic(t) => Some((t.topic_id.clone(), t)),
                _ => None,
            })
            .collect();

        let source_ids = unique(topics.values().map(|t| t.source_id.clone()));
        let sources: BTreeMap<String, Source> = self
            .graph
            .get_nodes(NodeType::Source, source_ids, tenant)
            .await?
            .into_iter()
            .filter_map(|n| match n {
                GraphNode::Source(s) => Some((s.source_id.clone(), s)),
                _ => None,
            })
            .filter(|(_, s)| matches_optional(filter, &s.metadata))
            .filter(|(_, s)| {
                !settings.versioning
                    || s.version_info()
                        .map_or(true, |v| v.is_current_at(settings.as_of))
            })
            .collect();

        let fact_ids = unique(seeds.facts.values().flatten().cloned());
        let fact_values: BTreeMap<String, String> = self
            .graph
            .get_nodes(NodeType::Fact, fact_ids, tenant)
            .await?
            .into_iter()
            .filter_map(|n| match n {
                GraphNode::Fact(f) => Some((f.fact_id, f.value)),
                _ => None,
            })
            .collect();

        let mut results = SearchResults::default();
        for statement_id in &seeds.order {
            let Some(statement) = statements.get(statement_id) else {
                continue;
            };
            let Some(topic) = topics.get(&statement.topic_id) else {
                continue;
            };
            let Some(source) = sources.get(&topic.source_id) else {
                continue;
            };

            let facts = seeds
                .facts
                .get(statement_id)
                .map(|ids| ids.iter().filter_map(|id| fact_values.get(id).cloned()).collect())
                .unwrap_or_default();
            let retrieved = RetrievedStatement {
                statement_id: statement_id.clone(),
                text: statement.text.clone(),
                score: seeds.score(statement_id).unwrap_or(0.0),
                facts,
                details: statement.details.clone(),
            };

            match results.groups.iter_mut().find(|g| g.topic_id == topic.topic_id) {
                Some(group) => group.statements.push(retrieved),
                None => results.groups.push(TopicGroup {
                    topic_id: topic.topic_id.clone(),
                    topic: topic.label.clone(),
                    source_id: source.source_id.clone(),
                    statements: vec![retrieved],
                }),
            }
            if results.source(&source.source_id).is_none() {
                results.sources.push(source.clone());
            }
        }

        debug!(
            tenant = %tenant,
            groups = results.groups.len(),
            statements = results.statement_count(),
            "assembled search results"
        );
        Ok(results)
    }
}

fn keep_best(scores: &mut BTreeMap<String, f32>, id: &str, score: f32) {
    let entry = scores.entry(id.to_string()).or_insert(score);
    if score > *entry {
        *entry = score;
    }
}

fn unique(ids: impl Iterator<Item = String>) -> Vec<String> {
    ids.collect::<BTreeSet<_>>().into_iter().collect()
}
