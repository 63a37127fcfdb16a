//! In-memory vector backend with cosine similarity

use std::collections::HashMap;

use async_trait::async_trait;
use lexigraph_core::filter::matches_optional;
use lexigraph_core::{
    MetadataFilter, ScoredId, StoreError, StoreResult, TenantId, VectorEntry, VectorIndex,
    VectorStore,
};
use parking_lot::RwLock;
use tracing::debug;

/// Vector store kept entirely in process memory
///
/// Entries are grouped by tenant-scoped index name (`statement_acme`).
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    name: String,
    indexes: RwLock<HashMap<String, HashMap<String, VectorEntry>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: RwLock::default(),
        }
    }

    /// Index names that currently hold at least one entry
    pub fn index_names(&self) -> Vec<String> {
        let indexes = self.indexes.read();
        let mut names: Vec<String> = indexes
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert_embeddings(
        &self,
        index: VectorIndex,
        entries: Vec<VectorEntry>,
        tenant: &TenantId,
    ) -> StoreResult<()> {
        let index_name = tenant.format_index_name(index.name());
        let mut indexes = self.indexes.write();
        let table = indexes.entry(index_name.clone()).or_default();

        let dimensions = table.values().next().map(|e| e.vector.len());
        if let Some(dims) = dimensions {
            if let Some(bad) = entries.iter().find(|e| e.vector.len() != dims) {
                return Err(StoreError::InvalidInput(format!(
                    "vector for '{}' has {} dimensions, index {} expects {}",
                    bad.id,
                    bad.vector.len(),
                    index_name,
                    dims
                )));
            }
        }

        let count = entries.len();
        for entry in entries {
            table.insert(entry.id.clone(), entry);
        }
        debug!(store = %self.name, index = %index_name, count, "upserted embeddings");
        Ok(())
    }

    async fn similarity_search(
        &self,
        index: VectorIndex,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
        tenant: &TenantId,
    ) -> StoreResult<Vec<ScoredId>> {
        let indexes = self.indexes.read();
        let Some(table) = indexes.get(&tenant.format_index_name(index.name())) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<ScoredId> = table
            .values()
            .filter(|e| e.vector.len() == vector.len())
            .filter(|e| matches_optional(filter, &e.metadata))
            .map(|e| ScoredId {
                id: e.id.clone(),
                score: cosine_similarity(vector, &e.vector),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete(
        &self,
        index: VectorIndex,
        ids: &[String],
        tenant: &TenantId,
    ) -> StoreResult<()> {
        let mut indexes = self.indexes.write();
        if let Some(table) = indexes.get_mut(&tenant.format_index_name(index.name())) {
            for id in ids {
                table.remove(id);
            }
        }
        Ok(())
    }

    async fn get_embeddings(
        &self,
        index: VectorIndex,
        ids: &[String],
        tenant: &TenantId,
    ) -> StoreResult<Vec<VectorEntry>> {
        let indexes = self.indexes.read();
        let Some(table) = indexes.get(&tenant.format_index_name(index.name())) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| table.get(id)).cloned().collect())
    }

    async fn count(&self, index: VectorIndex, tenant: &TenantId) -> StoreResult<usize> {
        let indexes = self.indexes.read();
        Ok(indexes
            .get(&tenant.format_index_name(index.name()))
            .map_or(0, HashMap::len))
    }
}
