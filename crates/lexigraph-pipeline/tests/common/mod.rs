//! Shared fixtures for the pipeline integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lexigraph_config::LexicalGraphConfig;
use lexigraph_core::test_support::{MockEmbeddingModel, MockLanguageModel};
use lexigraph_core::{
    DeletedNodes, GraphPattern, GraphRow, GraphStore, Metadata, StoreError, StoreResult, TenantId,
    WriteBatch,
};
use lexigraph_pipeline::{LexicalGraphIndex, SourceDocument};
use lexigraph_store::{MemoryGraphStore, MemoryVectorStore};
use serde_json::json;

pub const CLASSIFY: &str = "Propose a small closed set";
pub const TOPICS: &str = "Extract topics and propositions";
pub const FACTS: &str = "Extract entities and facts";

/// Nodes produced by [`documents`]
pub const FIXTURE_NODES: usize = 18;
/// Edges produced by [`documents`]
pub const FIXTURE_EDGES: usize = 21;

/// Two documents: one about the Amazon (two chunks), one about Brasilia
pub fn documents() -> Vec<SourceDocument> {
    vec![
        SourceDocument::new(vec![
            "The Amazon river flows through Brazil.".into(),
            "The Amazon rainforest is the largest rainforest on Earth.".into(),
        ])
        .with_metadata(metadata(&[("title", "amazon"), ("kind", "geography")])),
        SourceDocument::new(vec!["Brasilia has been Brazil's capital since 1960.".into()])
            .with_metadata(metadata(&[("title", "brasilia"), ("kind", "geography")])),
    ]
}

pub fn metadata(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

/// Model that answers every prompt the fixture documents produce
pub fn fixture_llm() -> MockLanguageModel {
    let llm = MockLanguageModel::new();
    llm.respond_when(&[CLASSIFY], "Location\nCountry\nCity");

    llm.respond_when(
        &[TOPICS, "flows through Brazil"],
        "topic: Amazon River\nproposition: The Amazon river flows through Brazil",
    );
    llm.respond_when(
        &[TOPICS, "largest rainforest"],
        "topic: Amazon Rainforest\nproposition: The Amazon rainforest is the largest rainforest",
    );
    llm.respond_when(
        &[TOPICS, "Brasilia"],
        "topic: Brazil\nproposition: Brasilia is the capital of Brazil",
    );

    llm.respond_when(
        &[FACTS, "river flows through Brazil"],
        "entities:\nAmazon River|Location\nBrazil|Country\nfacts:\nAmazon River|FLOWS THROUGH|Brazil",
    );
    llm.respond_when(
        &[FACTS, "is the largest rainforest"],
        "entities:\nAmazon Rainforest|Location\nfacts:\nAmazon Rainforest|IS|largest rainforest",
    );
    llm.respond_when(
        &[FACTS, "capital of Brazil"],
        "entities:\nBrasilia|City\nBrazil|Country\nfacts:\nBrasilia|CAPITAL OF|Brazil",
    );
    llm
}

pub struct Harness {
    pub index: LexicalGraphIndex,
    pub graph: Arc<MemoryGraphStore>,
    pub vectors: Arc<MemoryVectorStore>,
    pub llm: MockLanguageModel,
}

/// Route pipeline logs to the test writer; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("lexigraph_pipeline=debug")
        .with_test_writer()
        .try_init();
}

pub fn harness(config: LexicalGraphConfig) -> Harness {
    init_tracing();
    let graph = Arc::new(MemoryGraphStore::new());
    let vectors = Arc::new(MemoryVectorStore::new());
    let llm = fixture_llm();
    let index = LexicalGraphIndex::new(
        config,
        graph.clone(),
        vectors.clone(),
        Arc::new(llm.clone()),
        Arc::new(MockEmbeddingModel::new(32)),
    )
    .expect("valid config");
    Harness {
        index,
        graph,
        vectors,
        llm,
    }
}

pub fn tenant(name: &str) -> TenantId {
    TenantId::new(name).expect("valid tenant")
}

// ============================================================================
// Conflict injection
// ============================================================================

/// Graph store that rejects upserts with a concurrent-modification conflict
///
/// Only batches containing an item id that includes `target` are affected
/// (every batch when `target` is empty). The first `conflicts` matching
/// upserts fail; `u32::MAX` means they always fail.
pub struct ConflictingGraphStore {
    pub inner: Arc<MemoryGraphStore>,
    target: String,
    remaining: AtomicU32,
    injected: AtomicU32,
}

impl ConflictingGraphStore {
    pub fn new(inner: Arc<MemoryGraphStore>, target: &str, conflicts: u32) -> Self {
        Self {
            inner,
            target: target.to_string(),
            remaining: AtomicU32::new(conflicts),
            injected: AtomicU32::new(0),
        }
    }

    /// Conflicts returned so far
    pub fn injected(&self) -> u32 {
        self.injected.load(Ordering::SeqCst)
    }

    fn should_conflict(&self, batch: &WriteBatch) -> bool {
        let matches = self.target.is_empty()
            || batch.item_ids().iter().any(|id| id.contains(&self.target));
        if !matches {
            return false;
        }
        let take = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            });
        take.is_ok()
    }
}

#[async_trait]
impl GraphStore for ConflictingGraphStore {
    async fn upsert(&self, batch: WriteBatch, tenant: &TenantId) -> StoreResult<()> {
        if self.should_conflict(&batch) {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::ConcurrentModification(format!(
                "{} items overlap a concurrent write",
                batch.len()
            )));
        }
        self.inner.upsert(batch, tenant).await
    }

    async fn query(&self, pattern: GraphPattern, tenant: &TenantId) -> StoreResult<Vec<GraphRow>> {
        self.inner.query(pattern, tenant).await
    }

    async fn delete_source(
        &self,
        source_id: &str,
        tenant: &TenantId,
    ) -> StoreResult<DeletedNodes> {
        self.inner.delete_source(source_id, tenant).await
    }
}
