//! Point-in-time validity for sources
//!
//! A stamped source carries a reserved metadata block naming the metadata keys
//! that form its logical identity and the instant it became valid. Sources with
//! equal identity values form one linear history; `valid_to` of each version is
//! derived from the `valid_from` of the next one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Metadata, Source};

/// Metadata key holding the versioning block
pub const VERSIONING_METADATA_KEY: &str = "__lg_versioning__";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersioningError {
    #[error("Invalid versioning input: id_fields must not be empty")]
    EmptyIdFields,

    #[error("Invalid versioning input: id field '{0}' is missing from metadata")]
    MissingIdField(String),

    #[error("Invalid versioning input: '{0}' is a reserved metadata key")]
    ReservedIdField(String),
}

/// The reserved versioning block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub id_fields: Vec<String>,
    /// Epoch millis
    pub valid_from: i64,
    /// Epoch millis; `None` while this is the current version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<i64>,
}

impl VersionInfo {
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        metadata
            .get(VERSIONING_METADATA_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn write_to(&self, metadata: &mut Metadata) {
        if let Ok(value) = serde_json::to_value(self) {
            metadata.insert(VERSIONING_METADATA_KEY.to_string(), value);
        }
    }

    /// Whether this version was the current one at `as_of`
    pub fn is_current_at(&self, as_of: i64) -> bool {
        self.valid_from <= as_of && self.valid_to.map_or(true, |to| as_of < to)
    }

    /// Logical identity: the id field names paired with their values
    pub fn identity_key(&self, metadata: &Metadata) -> String {
        let pairs: Vec<(&str, Option<&serde_json::Value>)> = self
            .id_fields
            .iter()
            .map(|field| (field.as_str(), metadata.get(field)))
            .collect();
        serde_json::to_string(&pairs).unwrap_or_default()
    }
}

/// Attach a versioning block to `metadata`
pub fn stamp<S: AsRef<str>>(
    mut metadata: Metadata,
    id_fields: &[S],
    valid_from: i64,
) -> Result<Metadata, VersioningError> {
    if id_fields.is_empty() {
        return Err(VersioningError::EmptyIdFields);
    }
    for field in id_fields {
        let field = field.as_ref();
        if field == VERSIONING_METADATA_KEY {
            return Err(VersioningError::ReservedIdField(field.to_string()));
        }
        if !metadata.contains_key(field) {
            return Err(VersioningError::MissingIdField(field.to_string()));
        }
    }

    VersionInfo {
        id_fields: id_fields.iter().map(|f| f.as_ref().to_string()).collect(),
        valid_from,
        valid_to: None,
    }
    .write_to(&mut metadata);
    Ok(metadata)
}

/// Current time in epoch millis
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Recompute `valid_to` across every logical identity in `sources`
///
/// Returns the ids of sources whose versioning block changed. Unstamped
/// sources are left alone.
pub fn link_versions(sources: &mut [Source]) -> Vec<String> {
    let mut histories: BTreeMap<String, Vec<(i64, String, usize)>> = BTreeMap::new();
    for (idx, source) in sources.iter().enumerate() {
        if let Some(info) = source.version_info() {
            histories
                .entry(info.identity_key(&source.metadata))
                .or_default()
                .push((info.valid_from, source.source_id.clone(), idx));
        }
    }

    let mut changed = Vec::new();
    for versions in histories.values_mut() {
        versions.sort();
        for pos in 0..versions.len() {
            let idx = versions[pos].2;
            let valid_to = versions.get(pos + 1).map(|(from, _, _)| *from);
            let source = &mut sources[idx];
            if let Some(mut info) = source.version_info() {
                if info.valid_to != valid_to {
                    info.valid_to = valid_to;
                    info.write_to(&mut source.metadata);
                    changed.push(source.source_id.clone());
                }
            }
        }
    }
    changed
}
