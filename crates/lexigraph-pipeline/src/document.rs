//! Input documents: normalized text chunks plus source metadata

use lexigraph_core::versioning::stamp;
use lexigraph_core::{metadata_str, IdGenerator, Metadata, VersioningError};
use serde::{Deserialize, Serialize};

/// Metadata string used for hashing when a document has no metadata
pub(crate) const EMPTY_METADATA: &str = "";

/// A source document already split into chunks by a reader
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    #[serde(default)]
    pub metadata: Metadata,
    pub chunks: Vec<String>,
}

impl SourceDocument {
    pub fn new(chunks: Vec<String>) -> Self {
        Self {
            metadata: Metadata::new(),
            chunks,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Stamp the metadata with a versioning block
    pub fn with_versioning<S: AsRef<str>>(
        mut self,
        id_fields: &[S],
        valid_from: i64,
    ) -> Result<Self, VersioningError> {
        self.metadata = stamp(self.metadata, id_fields, valid_from)?;
        Ok(self)
    }

    pub fn full_text(&self) -> String {
        self.chunks.join("\n")
    }

    pub fn metadata_str(&self) -> String {
        metadata_str(&self.metadata, EMPTY_METADATA)
    }

    pub fn source_id(&self, ids: &IdGenerator) -> String {
        ids.create_source_id(&self.full_text(), &self.metadata_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_id_depends_on_metadata() {
        let ids = IdGenerator::default();
        let doc = SourceDocument::new(vec!["one".into(), "two".into()]);
        let tagged = doc
            .clone()
            .with_metadata(Metadata::from([("url".to_string(), json!("a"))]));

        assert_eq!(doc.source_id(&ids), doc.clone().source_id(&ids));
        assert_ne!(doc.source_id(&ids), tagged.source_id(&ids));
    }

    #[test]
    fn test_versions_get_distinct_source_ids() {
        let ids = IdGenerator::default();
        let base = SourceDocument::new(vec!["text".into()])
            .with_metadata(Metadata::from([("url".to_string(), json!("a"))]));
        let v1 = base.clone().with_versioning(&["url"], 100).unwrap();
        let v2 = base.with_versioning(&["url"], 200).unwrap();

        assert_ne!(v1.source_id(&ids), v2.source_id(&ids));
    }
}
