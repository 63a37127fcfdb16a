//! Graph fixtures for the query engine tests

#![allow(dead_code)]

use std::sync::Arc;

use lexigraph_config::{LexicalGraphConfig, QueryConfig};
use lexigraph_core::test_support::{MockEmbeddingModel, MockLanguageModel};
use lexigraph_core::{Metadata, TenantId};
use lexigraph_pipeline::{LexicalGraphIndex, SourceDocument};
use lexigraph_query::{QueryResult, TraversalQueryEngine};
use lexigraph_store::{MemoryGraphStore, MemoryVectorStore};
use serde_json::json;

pub const ANSWER: &str = "Brasilia is the capital of Brazil.";

/// Only answer prompts carry the search results block
pub const ANSWER_MARKER: &str = "<search_results>";

pub const AMAZON_RIVER: &str = "The Amazon river flows through Brazil";
pub const RAINFOREST: &str = "The Amazon rainforest is the largest rainforest";
pub const CAPITAL: &str = "Brasilia is the capital of Brazil";

pub fn metadata(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

pub fn documents() -> Vec<SourceDocument> {
    vec![
        SourceDocument::new(vec![
            "The Amazon river flows through Brazil.".into(),
            "The Amazon rainforest is the largest rainforest on Earth.".into(),
        ])
        .with_metadata(metadata(&[("title", "amazon")])),
        SourceDocument::new(vec!["Brasilia has been Brazil's capital since 1960.".into()])
            .with_metadata(metadata(&[("title", "brasilia")])),
    ]
}

pub fn model() -> MockLanguageModel {
    let llm = MockLanguageModel::new();
    llm.respond_when(&[ANSWER_MARKER], ANSWER);
    llm.respond_when(&["Propose a small closed set"], "Location\nCountry\nCity");

    let topics = "Extract topics and propositions";
    llm.respond_when(
        &[topics, "flows through Brazil"],
        &format!("topic: Amazon River\nproposition: {AMAZON_RIVER}"),
    );
    llm.respond_when(
        &[topics, "largest rainforest"],
        &format!("topic: Amazon Rainforest\nproposition: {RAINFOREST}"),
    );
    llm.respond_when(
        &[topics, "Brasilia"],
        &format!("topic: Brazil\nproposition: {CAPITAL}"),
    );

    let facts = "Extract entities and facts";
    llm.respond_when(
        &[facts, "river flows through Brazil"],
        "entities:\nAmazon River|Location\nBrazil|Country\nfacts:\nAmazon River|FLOWS THROUGH|Brazil",
    );
    llm.respond_when(
        &[facts, "is the largest rainforest"],
        "entities:\nAmazon Rainforest|Location\nfacts:\nAmazon Rainforest|IS|largest rainforest",
    );
    llm.respond_when(
        &[facts, "capital of Brazil"],
        "entities:\nBrasilia|City\nBrazil|Country\nfacts:\nBrasilia|CAPITAL OF|Brazil",
    );
    llm
}

pub struct Fixture {
    pub index: LexicalGraphIndex,
    pub graph: Arc<MemoryGraphStore>,
    pub vectors: Arc<MemoryVectorStore>,
    pub embedder: Arc<MockEmbeddingModel>,
    pub llm: MockLanguageModel,
}

impl Fixture {
    pub fn new() -> Self {
        let mut config = LexicalGraphConfig::default();
        config.extraction.persist_extracted = false;

        let graph = Arc::new(MemoryGraphStore::new());
        let vectors = Arc::new(MemoryVectorStore::new());
        let embedder = Arc::new(MockEmbeddingModel::new(256));
        let llm = model();
        let index = LexicalGraphIndex::new(
            config,
            graph.clone(),
            vectors.clone(),
            Arc::new(llm.clone()),
            embedder.clone(),
        )
        .expect("valid config");
        Self {
            index,
            graph,
            vectors,
            embedder,
            llm,
        }
    }

    pub async fn built(tenant: &TenantId) -> Self {
        let fixture = Self::new();
        fixture
            .index
            .extract_and_build(documents(), tenant)
            .await
            .expect("fixture builds");
        fixture
    }

    pub fn traversal(&self, config: QueryConfig) -> QueryResult<TraversalQueryEngine> {
        TraversalQueryEngine::for_traversal_based_search(
            config,
            self.graph.clone(),
            self.vectors.clone(),
            Arc::new(self.llm.clone()),
            self.embedder.clone(),
        )
    }

    pub fn similarity(&self, config: QueryConfig) -> QueryResult<TraversalQueryEngine> {
        TraversalQueryEngine::for_similarity_based_search(
            config,
            self.graph.clone(),
            self.vectors.clone(),
            Arc::new(self.llm.clone()),
            self.embedder.clone(),
        )
    }
}

pub fn tenant(name: &str) -> TenantId {
    TenantId::new(name).expect("valid tenant")
}
