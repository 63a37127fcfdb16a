//! Storage backends for the lexical graph
//!
//! Implements the [`GraphStore`](lexigraph_core::GraphStore) and
//! [`VectorStore`](lexigraph_core::VectorStore) capabilities. Backends are
//! selected by connection string:
//!
//! ```rust,ignore
//! use lexigraph_store::{open_graph_store, open_vector_store};
//!
//! let graph = open_graph_store("memory://")?;
//! let vectors = open_vector_store("memory://")?;
//! ```

pub mod connection;
pub mod graph;
pub mod vector;

pub use connection::{open_graph_store, open_vector_store, Backend};
pub use graph::MemoryGraphStore;
pub use vector::MemoryVectorStore;
