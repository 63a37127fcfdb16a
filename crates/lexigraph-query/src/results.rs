//! Retrieved statements grouped by topic and source

use lexigraph_core::{Metadata, Source};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedStatement {
    pub statement_id: String,
    pub text: String,
    pub score: f32,
    /// Values of the facts reached from this statement
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub details: Vec<String>,
}

/// Statements sharing one topic; topics are source-scoped, so this is also a
/// (topic, source) group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicGroup {
    pub topic_id: String,
    pub topic: String,
    pub source_id: String,
    pub statements: Vec<RetrievedStatement>,
}

impl TopicGroup {
    /// Best statement score
    pub fn score(&self) -> f32 {
        self.statements
            .iter()
            .map(|s| s.score)
            .fold(f32::MIN, f32::max)
    }
}

/// Source entry of a query trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTrace {
    pub source_id: String,
    pub metadata: Metadata,
}

/// Output of seed search and expansion, input of the post-processors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub groups: Vec<TopicGroup>,
    /// Sources referenced by `groups`
    pub sources: Vec<Source>,
    /// Context already serialized by a post-processor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prebuilt_context: Option<String>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.statements.is_empty())
    }

    pub fn statement_count(&self) -> usize {
        self.groups.iter().map(|g| g.statements.len()).sum()
    }

    pub fn source(&self, source_id: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }

    /// Sources in order of first appearance in `groups`
    pub fn source_trace(&self) -> Vec<SourceTrace> {
        let mut trace: Vec<SourceTrace> = Vec::new();
        for group in &self.groups {
            if trace.iter().any(|t| t.source_id == group.source_id) {
                continue;
            }
            trace.push(SourceTrace {
                source_id: group.source_id.clone(),
                metadata: self
                    .source(&group.source_id)
                    .map(|s| s.metadata.clone())
                    .unwrap_or_default(),
            });
        }
        trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(id: &str, score: f32) -> RetrievedStatement {
        RetrievedStatement {
            statement_id: id.into(),
            text: id.into(),
            score,
            facts: Vec::new(),
            details: Vec::new(),
        }
    }

    fn group(topic_id: &str, source_id: &str, scores: &[f32]) -> TopicGroup {
        TopicGroup {
            topic_id: topic_id.into(),
            topic: topic_id.into(),
            source_id: source_id.into(),
            statements: scores
                .iter()
                .enumerate()
                .map(|(i, s)| statement(&format!("{topic_id}-{i}"), *s))
                .collect(),
        }
    }

    #[test]
    fn test_source_trace_order() {
        let results = SearchResults {
            groups: vec![group("t1", "s2", &[0.5]), group("t2", "s1", &[0.9]), group("t3", "s2", &[0.1])],
            sources: Vec::new(),
            prebuilt_context: None,
        };
        let ids: Vec<String> = results.source_trace().into_iter().map(|t| t.source_id).collect();
        assert_eq!(ids, vec!["s2", "s1"]);
        assert_eq!(results.statement_count(), 3);
    }

    #[test]
    fn test_group_score_is_best_statement() {
        assert_eq!(group("t", "s", &[0.2, 0.7, 0.4]).score(), 0.7);
        assert!(SearchResults::default().is_empty());
    }
}
