//! Error propagation from the model layer

mod common;

use std::sync::Arc;

use common::{documents, tenant, FACTS, TOPICS};
use lexigraph_config::LexicalGraphConfig;
use lexigraph_core::test_support::{MockEmbeddingModel, MockLanguageModel};
use lexigraph_core::{ModelError, TenantId};
use lexigraph_pipeline::{LexicalGraphIndex, PipelineError, PipelineWarning};
use lexigraph_store::{MemoryGraphStore, MemoryVectorStore};

fn index_with(llm: MockLanguageModel, config: LexicalGraphConfig) -> LexicalGraphIndex {
    LexicalGraphIndex::new(
        config,
        Arc::new(MemoryGraphStore::new()),
        Arc::new(MemoryVectorStore::new()),
        Arc::new(llm),
        Arc::new(MockEmbeddingModel::new(32)),
    )
    .unwrap()
}

#[tokio::test]
async fn permission_error_aborts_the_run() {
    let llm = MockLanguageModel::new();
    llm.fail_when(
        &[TOPICS],
        ModelError::PermissionDenied("model access not granted".into()),
    );
    let index = index_with(llm, LexicalGraphConfig::default());

    let err = index
        .extract_and_build(documents(), &tenant("acme"))
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, PipelineError::Fatal(ModelError::PermissionDenied(_))));
    assert_eq!(
        index
            .get_stats(&TenantId::default())
            .await
            .unwrap()
            .node_count(),
        0
    );
}

#[tokio::test]
async fn progress_settles_when_a_fatal_error_stops_the_run() {
    let llm = MockLanguageModel::new();
    llm.fail_when(
        &[TOPICS],
        ModelError::PermissionDenied("model access not granted".into()),
    );
    let mut config = LexicalGraphConfig::default();
    config.batch.num_workers = 1;
    config.batch.batch_size = 1;
    config.batch.num_threads_per_worker = 1;
    let index = index_with(llm, config);

    let err = index.extract(documents()).await.unwrap_err();
    assert!(err.is_fatal());

    let progress = index.progress();
    assert_eq!(progress.total(), 2);
    assert_eq!(progress.completed(), progress.total());
    assert_eq!(progress.skipped(), 1);
}

#[tokio::test]
async fn transient_chunk_failure_skips_only_that_chunk() {
    let llm = MockLanguageModel::new();
    llm.fail_when(
        &[TOPICS, "largest rainforest"],
        ModelError::Transient("throttled".into()),
    );
    llm.respond_when(
        &[TOPICS, "flows through Brazil"],
        "topic: Amazon River\nproposition: The Amazon river flows through Brazil",
    );
    llm.respond_when(
        &[TOPICS, "Brasilia"],
        "topic: Brazil\nproposition: Brasilia is the capital of Brazil",
    );
    llm.respond_when(
        &[FACTS],
        "entities:\nBrazil|Country\nfacts:\nBrazil|HAS|rivers",
    );

    let mut config = LexicalGraphConfig::default();
    config.extraction.persist_extracted = false;
    let index = index_with(llm, config);

    let report = index.extract(documents()).await.unwrap();

    assert_eq!(report.succeeded.len(), 2);
    let skipped: Vec<_> = report
        .warnings
        .iter()
        .filter(|w| matches!(w, PipelineWarning::ChunkSkipped { .. }))
        .collect();
    assert_eq!(skipped.len(), 1);
}

#[tokio::test]
async fn invalid_config_fails_before_any_store_call() {
    let mut config = LexicalGraphConfig::default();
    config.build.batch_write_size = 0;

    let result = LexicalGraphIndex::new(
        config,
        Arc::new(MemoryGraphStore::new()),
        Arc::new(MemoryVectorStore::new()),
        Arc::new(MockLanguageModel::new()),
        Arc::new(MockEmbeddingModel::new(8)),
    );

    assert!(matches!(result, Err(PipelineError::Config(_))));
}
