//! Core abstractions for the lexical graph
//!
//! Identity (content-hash ids, tenant-scoped names), source versioning, the
//! graph data model, metadata filters, the error taxonomy, and the capability
//! traits every backend implements.

pub mod error;
pub mod filter;
pub mod ids;
pub mod model;
pub mod template;
pub mod tenant;
pub mod traits;
pub mod versioning;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use error::{ModelError, ModelResult, StoreError, StoreResult};
pub use filter::{MetadataFilter, Op};
pub use ids::{get_hash, metadata_str, IdGenerator};
pub use model::{
    Chunk, EdgeKind, Embedding, Entity, Fact, GraphEdge, GraphNode, Metadata, NodeType,
    ScoredId, Source, Statement, Topic, VectorEntry, VectorIndex, WriteBatch,
};
pub use tenant::{validate_tenant_id, TenantId, TenantIdError};
pub use traits::{
    DeletedNodes, Direction, EmbeddingModel, GraphPattern, GraphRow, GraphStore, InferOptions,
    LanguageModel, VectorStore,
};
pub use versioning::{VersionInfo, VersioningError};
