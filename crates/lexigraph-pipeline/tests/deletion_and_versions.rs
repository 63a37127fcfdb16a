//! Source deletion cascade and version linking

mod common;

use common::{documents, harness, metadata, tenant};
use lexigraph_config::LexicalGraphConfig;
use lexigraph_core::{
    GraphStore, MetadataFilter, NodeType, VectorIndex, VectorStore, VersionInfo,
};
use lexigraph_pipeline::SourceDocument;
use serde_json::json;

fn in_memory_config() -> LexicalGraphConfig {
    let mut config = LexicalGraphConfig::default();
    config.extraction.persist_extracted = false;
    config
}

#[tokio::test]
async fn deleting_a_source_cascades() {
    let h = harness(in_memory_config());
    let acme = tenant("acme");
    h.index.extract_and_build(documents(), &acme).await.unwrap();

    let filter = MetadataFilter::from_dicts(&[metadata(&[("title", "brasilia")])]);
    let deleted = h.index.delete_sources(Some(&filter), &acme).await.unwrap();
    assert_eq!(deleted.len(), 1);

    let stats = h.index.get_stats(&acme).await.unwrap();
    assert_eq!(stats.sources, 1);
    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.statements, 2);
    assert_eq!(stats.facts, 2);
    // Brasilia is gone; Brazil is still referenced by the Amazon fact
    assert_eq!(stats.entities, 3);

    let entities = h
        .graph
        .query(
            lexigraph_core::GraphPattern::all_nodes(NodeType::Entity),
            &acme,
        )
        .await
        .unwrap();
    let values: Vec<String> = entities
        .into_iter()
        .filter_map(|row| row.into_node())
        .filter_map(|n| n.as_entity().map(|e| e.value.clone()))
        .collect();
    assert!(values.contains(&"Brazil".to_string()));
    assert!(!values.contains(&"Brasilia".to_string()));

    assert_eq!(h.vectors.count(VectorIndex::Statement, &acme).await.unwrap(), 2);
    assert_eq!(h.vectors.count(VectorIndex::Chunk, &acme).await.unwrap(), 2);
}

#[tokio::test]
async fn deleting_unmatched_filter_is_a_no_op() {
    let h = harness(in_memory_config());
    let acme = tenant("acme");
    h.index.extract_and_build(documents(), &acme).await.unwrap();

    let filter = MetadataFilter::property_eq("title", json!("nothing"));
    let deleted = h.index.delete_sources(Some(&filter), &acme).await.unwrap();

    assert!(deleted.is_empty());
    assert_eq!(h.index.get_stats(&acme).await.unwrap().sources, 2);
}

fn versioned(text: &str, valid_from: i64) -> SourceDocument {
    SourceDocument::new(vec![text.to_string()])
        .with_metadata(metadata(&[("url", "https://example.com/amazon")]))
        .with_versioning(&["url"], valid_from)
        .unwrap()
}

async fn versions(h: &common::Harness, tenant: &lexigraph_core::TenantId) -> Vec<VersionInfo> {
    let mut infos: Vec<VersionInfo> = h
        .index
        .get_sources(None, tenant)
        .await
        .unwrap()
        .iter()
        .filter_map(|s| s.version_info())
        .collect();
    infos.sort_by_key(|v| v.valid_from);
    infos
}

#[tokio::test]
async fn versions_are_linked_across_builds() {
    let h = harness(in_memory_config());
    let acme = tenant("acme");

    h.index
        .extract_and_build(vec![versioned("The Amazon river flows through Brazil.", 100)], &acme)
        .await
        .unwrap();
    let report = h
        .index
        .extract_and_build(
            vec![versioned("The Amazon rainforest is the largest rainforest.", 200)],
            &acme,
        )
        .await
        .unwrap();
    assert_eq!(report.build.versions_updated, 1);

    let infos = versions(&h, &acme).await;
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].valid_to, Some(200));
    assert_eq!(infos[1].valid_to, None);
    assert!(infos[0].is_current_at(150));
    assert!(!infos[1].is_current_at(150));
}

#[tokio::test]
async fn deleting_latest_version_reopens_previous() {
    let h = harness(in_memory_config());
    let acme = tenant("acme");
    h.index
        .extract_and_build(
            vec![
                versioned("The Amazon river flows through Brazil.", 100),
                versioned("The Amazon rainforest is the largest rainforest.", 200),
            ],
            &acme,
        )
        .await
        .unwrap();

    let latest = h
        .index
        .get_sources(None, &acme)
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.version_info().is_some_and(|v| v.valid_from == 200))
        .unwrap();
    let filter = MetadataFilter::property_eq(
        lexigraph_core::versioning::VERSIONING_METADATA_KEY,
        latest.metadata[lexigraph_core::versioning::VERSIONING_METADATA_KEY].clone(),
    );
    h.index.delete_sources(Some(&filter), &acme).await.unwrap();

    let infos = versions(&h, &acme).await;
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].valid_from, 100);
    assert_eq!(infos[0].valid_to, None);

    let remaining = h
        .graph
        .get_nodes(NodeType::Source, vec![latest.source_id.clone()], &acme)
        .await
        .unwrap();
    assert!(remaining.is_empty());
}
