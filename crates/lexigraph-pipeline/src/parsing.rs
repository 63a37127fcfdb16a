//! Parsers for the line-oriented extraction responses
//!
//! None of these fail: lines that don't fit the expected shape are reported
//! back so the caller can log them.

use tracing::debug;

/// Topic used for propositions that appear before any `topic:` line
pub const DEFAULT_TOPIC: &str = "context";

/// Classification given to fact subjects that were not declared as entities
pub const LOCAL_ENTITY_CLASSIFICATION: &str = "__Local_Entity__";

const TOPIC_PREFIX: &str = "topic:";
const PROPOSITION_PREFIX: &str = "proposition:";
const ENTITIES_HEADER: &str = "entities:";
const FACTS_HEADER: &str = "facts:";

// ============================================================================
// Topics and propositions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTopic {
    pub label: String,
    pub propositions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicParse {
    pub topics: Vec<ParsedTopic>,
    /// Lines that were neither a topic nor a proposition
    pub garbage: Vec<String>,
}

/// Case-insensitive prefix strip
fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &line[prefix.len()..])
}

/// Parse a `topic:` / `proposition:` response
///
/// Repeated topic labels are merged, duplicate propositions within a topic
/// collapse, and topics without propositions are dropped. Only the first
/// colon separates the keyword, so labels may contain colons.
pub fn parse_topics(response: &str) -> TopicParse {
    let mut parsed = TopicParse::default();
    let mut current: Option<usize> = None;

    for line in response.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(label) = strip_prefix_ci(line, TOPIC_PREFIX) {
            let label = label.trim();
            if label.is_empty() {
                parsed.garbage.push(line.to_string());
                continue;
            }
            current = Some(topic_slot(&mut parsed.topics, label));
        } else if let Some(text) = strip_prefix_ci(line, PROPOSITION_PREFIX) {
            let text = text.trim();
            if text.is_empty() {
                parsed.garbage.push(line.to_string());
                continue;
            }
            let slot = match current {
                Some(slot) => slot,
                None => {
                    let slot = topic_slot(&mut parsed.topics, DEFAULT_TOPIC);
                    current = Some(slot);
                    slot
                }
            };
            let propositions = &mut parsed.topics[slot].propositions;
            if !propositions.iter().any(|p| p == text) {
                propositions.push(text.to_string());
            }
        } else {
            parsed.garbage.push(line.to_string());
        }
    }

    parsed.topics.retain(|t| !t.propositions.is_empty());
    if !parsed.garbage.is_empty() {
        debug!(lines = parsed.garbage.len(), "unparseable lines in topic response");
    }
    parsed
}

fn topic_slot(topics: &mut Vec<ParsedTopic>, label: &str) -> usize {
    match topics.iter().position(|t| t.label == label) {
        Some(idx) => idx,
        None => {
            topics.push(ParsedTopic {
                label: label.to_string(),
                propositions: Vec::new(),
            });
            topics.len() - 1
        }
    }
}

// ============================================================================
// Entities and facts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntity {
    pub value: String,
    pub classification: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFact {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactParse {
    pub entities: Vec<ParsedEntity>,
    pub facts: Vec<ParsedFact>,
    /// Section lines with the wrong number of `|` segments
    pub details: Vec<String>,
    /// Lines before any section header
    pub garbage: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Entities,
    Facts,
}

/// Parse an `entities:` / `facts:` response
pub fn parse_facts(response: &str) -> FactParse {
    let mut parsed = FactParse::default();
    let mut section = Section::None;

    for line in response.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.eq_ignore_ascii_case(ENTITIES_HEADER) {
            section = Section::Entities;
            continue;
        }
        if line.eq_ignore_ascii_case(FACTS_HEADER) {
            section = Section::Facts;
            continue;
        }

        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        match (section, parts.as_slice()) {
            (Section::None, _) => parsed.garbage.push(line.to_string()),
            (Section::Entities, [value, classification]) => {
                let value = clean(value);
                if value.is_empty() || classification.is_empty() {
                    parsed.details.push(line.to_string());
                } else if !parsed.entities.iter().any(|e| e.value.eq_ignore_ascii_case(&value)) {
                    parsed.entities.push(ParsedEntity {
                        value,
                        classification: classification.to_string(),
                    });
                }
            }
            (Section::Facts, [subject, predicate, object]) => {
                let (subject, object) = (clean(subject), clean(object));
                if subject.is_empty() || predicate.is_empty() || object.is_empty() {
                    parsed.details.push(line.to_string());
                } else {
                    parsed.facts.push(ParsedFact {
                        subject,
                        predicate: predicate.to_string(),
                        object,
                    });
                }
            }
            _ => parsed.details.push(line.to_string()),
        }
    }

    if !parsed.garbage.is_empty() {
        debug!(lines = parsed.garbage.len(), "unparseable lines in fact response");
    }
    parsed
}

/// Normalize an entity mention
///
/// Underscores become spaces, everything from the first `(` to the last `)`
/// is removed, runs of spaces collapse, and a leading `a`/`an`/`the` is dropped.
pub fn clean(value: &str) -> String {
    let mut value = value.replace('_', " ");

    if let (Some(open), Some(close)) = (value.find('('), value.rfind(')')) {
        if open < close {
            value.replace_range(open..=close, "");
        }
    }

    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");

    for article in ["a ", "an ", "the "] {
        if let Some(rest) = strip_prefix_ci(&collapsed, article) {
            return rest.trim().to_string();
        }
    }
    collapsed
}

// ============================================================================
// Classifications
// ============================================================================

/// Parse a classification pre-pass response: one label per line
pub fn parse_classifications(response: &str) -> Vec<String> {
    let labels = response
        .lines()
        .map(str::trim)
        .map(|l| l.trim_start_matches(|c: char| c == '-' || c == '*').trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect::<Vec<_>>();
    merge_classifications(&[], &labels)
}

/// Preferred labels first, then new inferred ones; case-insensitive dedup
pub fn merge_classifications(preferred: &[String], inferred: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for label in preferred.iter().chain(inferred) {
        if !merged.iter().any(|m| m.eq_ignore_ascii_case(label)) {
            merged.push(label.clone());
        }
    }
    merged
}

/// Canonical spelling of `label` from `known`, or `label` itself
pub fn resolve_classification(label: &str, known: &[String]) -> String {
    if known.is_empty() {
        return label.to_string();
    }
    match known.iter().find(|k| k.eq_ignore_ascii_case(label)) {
        Some(canonical) => canonical.clone(),
        None => {
            debug!(classification = label, "classification not in the batch set");
            label.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topics() {
        let response = "\
topic: Climate: causes
proposition: CO2 traps heat
proposition: CO2 traps heat
PROPOSITION: Methane traps heat
topic: Empty
topic: Economy
proposition: Carbon taxes raise revenue
this line is noise
";
        let parsed = parse_topics(response);

        assert_eq!(parsed.topics.len(), 2);
        assert_eq!(parsed.topics[0].label, "Climate: causes");
        assert_eq!(
            parsed.topics[0].propositions,
            vec!["CO2 traps heat", "Methane traps heat"]
        );
        assert_eq!(parsed.topics[1].label, "Economy");
        assert_eq!(parsed.garbage, vec!["this line is noise"]);
    }

    #[test]
    fn test_parse_topics_default_topic() {
        let parsed = parse_topics("proposition: Orphan statement\ntopic: A\nproposition: x");
        assert_eq!(parsed.topics[0].label, DEFAULT_TOPIC);
        assert_eq!(parsed.topics[0].propositions, vec!["Orphan statement"]);
        assert_eq!(parsed.topics[1].label, "A");
    }

    #[test]
    fn test_parse_topics_merges_repeated_labels() {
        let parsed = parse_topics("topic: A\nproposition: one\ntopic: B\nproposition: two\ntopic: A\nproposition: three");
        assert_eq!(parsed.topics.len(), 2);
        assert_eq!(parsed.topics[0].propositions, vec!["one", "three"]);
    }

    #[test]
    fn test_parse_facts() {
        let response = "\
noise before sections
entities:
The_Amazon (river)|Location
Brazil|Country
just a note
facts:
Amazon|FLOWS THROUGH|Brazil
Amazon|IS|very long
bad|line
";
        let parsed = parse_facts(response);

        assert_eq!(
            parsed.entities,
            vec![
                ParsedEntity {
                    value: "Amazon".into(),
                    classification: "Location".into()
                },
                ParsedEntity {
                    value: "Brazil".into(),
                    classification: "Country".into()
                },
            ]
        );
        assert_eq!(parsed.facts.len(), 2);
        assert_eq!(parsed.facts[0].predicate, "FLOWS THROUGH");
        assert_eq!(parsed.facts[1].object, "very long");
        assert_eq!(parsed.details, vec!["just a note", "bad|line"]);
        assert_eq!(parsed.garbage, vec!["noise before sections"]);
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean("The_Eiffel_Tower"), "Eiffel Tower");
        assert_eq!(clean("Paris (France)"), "Paris");
        assert_eq!(clean("an  apple"), "apple");
        assert_eq!(clean("Theodore"), "Theodore");
        assert_eq!(clean("A"), "A");
        assert_eq!(clean("x ) y ("), "x ) y (");
    }

    #[test]
    fn test_classifications() {
        let parsed = parse_classifications("# proposed\nPerson\n\n- Organization\nperson\nLocation");
        assert_eq!(parsed, vec!["Person", "Organization", "Location"]);

        let merged = merge_classifications(&["Company".to_string(), "PERSON".to_string()], &parsed);
        assert_eq!(merged, vec!["Company", "PERSON", "Organization", "Location"]);

        assert_eq!(resolve_classification("organization", &merged), "Organization");
        assert_eq!(resolve_classification("Event", &merged), "Event");
        assert_eq!(resolve_classification("Event", &[]), "Event");
    }
}
