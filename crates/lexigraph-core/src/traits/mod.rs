//! Capability traits the pipeline and query engine are written against
//!
//! Backends (graph stores, vector stores, model clients) implement these;
//! nothing in the core depends on a concrete backend.

pub mod graph;
pub mod model;
pub mod vector;

pub use graph::{DeletedNodes, Direction, GraphPattern, GraphRow, GraphStore};
pub use model::{EmbeddingModel, InferOptions, LanguageModel};
pub use vector::VectorStore;
