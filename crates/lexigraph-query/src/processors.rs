//! Post-processors applied to search results before formatting
//!
//! Processors run in the order they were registered on the engine; each
//! receives the previous processor's output.

use std::cmp::Ordering;

use crate::error::QueryResult;
use crate::format::format_bedrock_xml;
use crate::results::SearchResults;

pub trait PostProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, results: SearchResults, query: &str) -> QueryResult<SearchResults>;
}

fn by_score_desc(a: f32, b: f32) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Orders statements within each topic, then topics, by descending score
///
/// The sort is stable, so ties keep retrieval order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreRerank;

impl PostProcessor for ScoreRerank {
    fn name(&self) -> &str {
        "score_rerank"
    }

    fn process(&self, mut results: SearchResults, _query: &str) -> QueryResult<SearchResults> {
        for group in &mut results.groups {
            group.statements.sort_by(|a, b| by_score_desc(a.score, b.score));
        }
        results.groups.sort_by(|a, b| by_score_desc(a.score(), b.score()));
        Ok(results)
    }
}

/// Caps the number of statements kept per topic
#[derive(Debug, Clone, Copy)]
pub struct StatementLimit(pub usize);

impl PostProcessor for StatementLimit {
    fn name(&self) -> &str {
        "statement_limit"
    }

    fn process(&self, mut results: SearchResults, _query: &str) -> QueryResult<SearchResults> {
        for group in &mut results.groups {
            group.statements.truncate(self.0);
        }
        results.groups.retain(|g| !g.statements.is_empty());
        Ok(results)
    }
}

/// Pre-builds the `bedrock_xml` context
#[derive(Debug, Clone, Copy, Default)]
pub struct BedrockXmlFormatter;

impl PostProcessor for BedrockXmlFormatter {
    fn name(&self) -> &str {
        "bedrock_xml_formatter"
    }

    fn process(&self, mut results: SearchResults, _query: &str) -> QueryResult<SearchResults> {
        results.prebuilt_context = Some(format_bedrock_xml(&results)?);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{RetrievedStatement, TopicGroup};

    fn group(topic: &str, scores: &[f32]) -> TopicGroup {
        TopicGroup {
            topic_id: topic.into(),
            topic: topic.into(),
            source_id: "s".into(),
            statements: scores
                .iter()
                .enumerate()
                .map(|(i, score)| RetrievedStatement {
                    statement_id: format!("{topic}{i}"),
                    text: format!("{topic}{i}"),
                    score: *score,
                    facts: Vec::new(),
                    details: Vec::new(),
                })
                .collect(),
        }
    }

    fn results() -> SearchResults {
        SearchResults {
            groups: vec![group("a", &[0.1, 0.5]), group("b", &[0.9, 0.2, 0.3])],
            ..SearchResults::default()
        }
    }

    #[test]
    fn test_rerank_orders_statements_and_topics() {
        let ranked = ScoreRerank.process(results(), "q").unwrap();
        assert_eq!(ranked.groups[0].topic, "b");
        let order: Vec<&str> = ranked.groups[0]
            .statements
            .iter()
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(order, vec!["b0", "b2", "b1"]);
        assert_eq!(ranked.groups[1].statements[0].text, "a1");
    }

    #[test]
    fn test_statement_limit() {
        let limited = StatementLimit(1).process(results(), "q").unwrap();
        assert!(limited.groups.iter().all(|g| g.statements.len() == 1));

        let none = StatementLimit(0).process(results(), "q").unwrap();
        assert!(none.groups.is_empty());
    }

    #[test]
    fn test_bedrock_formatter_sets_prebuilt_context() {
        let processed = BedrockXmlFormatter.process(results(), "q").unwrap();
        let context = processed.prebuilt_context.unwrap();
        assert!(context.starts_with("<sources>"));
        assert!(context.contains("<statement_1.5>"));
    }
}
