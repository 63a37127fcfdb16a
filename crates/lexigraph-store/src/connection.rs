//! Backend selection from connection strings

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use lexigraph_core::{GraphStore, StoreError, StoreResult, VectorStore};
use tracing::info;

use crate::graph::MemoryGraphStore;
use crate::vector::MemoryVectorStore;

const MEMORY_SCHEME: &str = "memory://";

/// A parsed connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// `memory://` or `memory://<name>`
    Memory { name: String },
}

impl FromStr for Backend {
    type Err = StoreError;

    fn from_str(conn: &str) -> Result<Self, Self::Err> {
        match conn.strip_prefix(MEMORY_SCHEME) {
            Some(name) => Ok(Backend::Memory {
                name: if name.is_empty() {
                    "default".to_string()
                } else {
                    name.to_string()
                },
            }),
            None => Err(StoreError::UnsupportedBackend(conn.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Memory { name } => write!(f, "{MEMORY_SCHEME}{name}"),
        }
    }
}

/// Open a graph store for `conn`
pub fn open_graph_store(conn: &str) -> StoreResult<Arc<dyn GraphStore>> {
    let backend: Backend = conn.parse()?;
    info!(backend = %backend, "opening graph store");
    match backend {
        Backend::Memory { name } => Ok(Arc::new(MemoryGraphStore::named(name))),
    }
}

/// Open a vector store for `conn`
pub fn open_vector_store(conn: &str) -> StoreResult<Arc<dyn VectorStore>> {
    let backend: Backend = conn.parse()?;
    info!(backend = %backend, "opening vector store");
    match backend {
        Backend::Memory { name } => Ok(Arc::new(MemoryVectorStore::named(name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory() {
        assert_eq!(
            "memory://".parse::<Backend>().unwrap(),
            Backend::Memory {
                name: "default".into()
            }
        );
        assert_eq!(
            "memory://graph-a".parse::<Backend>().unwrap().to_string(),
            "memory://graph-a"
        );
    }

    #[test]
    fn test_unsupported_backend() {
        for conn in ["neptune-db://host", "", "memory:/x"] {
            let err = open_graph_store(conn).err().unwrap();
            assert!(matches!(err, StoreError::UnsupportedBackend(_)));
            assert!(open_vector_store(conn).is_err());
        }
    }

    #[test]
    fn test_open_memory() {
        assert!(open_graph_store("memory://").is_ok());
        assert!(open_vector_store("memory://vectors").is_ok());
    }
}
