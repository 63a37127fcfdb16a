//! Vector store capability

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::filter::MetadataFilter;
use crate::model::{ScoredId, VectorEntry, VectorIndex};
use crate::tenant::TenantId;

/// Tenant-partitioned embedding storage
///
/// Index names are scoped with [`TenantId::format_index_name`]. Entry ids are
/// the ids of the graph nodes they embed.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace entries by id
    async fn upsert_embeddings(
        &self,
        index: VectorIndex,
        entries: Vec<VectorEntry>,
        tenant: &TenantId,
    ) -> StoreResult<()>;

    /// Top `k` ids by descending similarity, restricted to entries whose
    /// metadata matches `filter`
    async fn similarity_search(
        &self,
        index: VectorIndex,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
        tenant: &TenantId,
    ) -> StoreResult<Vec<ScoredId>>;

    /// Delete entries by id; unknown ids are ignored
    async fn delete(&self, index: VectorIndex, ids: &[String], tenant: &TenantId)
        -> StoreResult<()>;

    /// Read entries back by id; unknown ids are skipped
    async fn get_embeddings(
        &self,
        index: VectorIndex,
        ids: &[String],
        tenant: &TenantId,
    ) -> StoreResult<Vec<VectorEntry>>;

    async fn count(&self, index: VectorIndex, tenant: &TenantId) -> StoreResult<usize>;
}

#[async_trait]
impl<T: VectorStore + ?Sized> VectorStore for std::sync::Arc<T> {
    async fn upsert_embeddings(
        &self,
        index: VectorIndex,
        entries: Vec<VectorEntry>,
        tenant: &TenantId,
    ) -> StoreResult<()> {
        (**self).upsert_embeddings(index, entries, tenant).await
    }

    async fn similarity_search(
        &self,
        index: VectorIndex,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
        tenant: &TenantId,
    ) -> StoreResult<Vec<ScoredId>> {
        (**self)
            .similarity_search(index, vector, k, filter, tenant)
            .await
    }

    async fn delete(
        &self,
        index: VectorIndex,
        ids: &[String],
        tenant: &TenantId,
    ) -> StoreResult<()> {
        (**self).delete(index, ids, tenant).await
    }

    async fn get_embeddings(
        &self,
        index: VectorIndex,
        ids: &[String],
        tenant: &TenantId,
    ) -> StoreResult<Vec<VectorEntry>> {
        (**self).get_embeddings(index, ids, tenant).await
    }

    async fn count(&self, index: VectorIndex, tenant: &TenantId) -> StoreResult<usize> {
        (**self).count(index, tenant).await
    }
}
