//! Built-in extraction prompts
//!
//! Placeholders are substituted in a single pass by [`render`]; overrides
//! from [`ExtractionConfig`](lexigraph_config::ExtractionConfig) use the same
//! placeholders.

pub use lexigraph_core::template::render;

/// `{text}`: sampled chunk text
pub const CLASSIFICATION_PROMPT: &str = "\
You are building a knowledge graph. Propose a small closed set of entity classifications \
(for example Person, Organization, Location) that covers the named things in the text below.
Answer with one classification per line and nothing else.

<text>
{text}
</text>";

/// `{classifications}`, `{text}`: one chunk
pub const EXTRACT_TOPIC_PROMPT: &str = "\
Extract topics and propositions from the text below. A proposition is a short, standalone \
statement that can be understood without the surrounding text.
Known entity classifications: {classifications}

Answer in exactly this format, repeating as needed:
topic: <topic name>
proposition: <proposition>

<text>
{text}
</text>";

/// `{classifications}`, `{topic}`, `{statement}`: one statement
pub const EXTRACT_FACT_PROMPT: &str = "\
Extract entities and facts from the statement below.
Use these entity classifications where possible: {classifications}

Answer in exactly this format:
entities:
<entity>|<classification>
facts:
<subject>|<predicate>|<object>

Topic: {topic}
<statement>
{statement}
</statement>";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let prompt = render(
            EXTRACT_FACT_PROMPT,
            &[
                ("classifications", "Person, Place"),
                ("topic", "Travel"),
                ("statement", "Ada visited Paris"),
            ],
        );
        assert!(prompt.contains("Use these entity classifications where possible: Person, Place"));
        assert!(prompt.contains("Topic: Travel"));
        assert!(prompt.contains("Ada visited Paris"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_statement_text_with_placeholders_stays_literal() {
        let prompt = render(
            EXTRACT_FACT_PROMPT,
            &[
                ("classifications", "Person"),
                ("topic", "Templates"),
                ("statement", "The {topic} field is filled by {classifications}"),
            ],
        );
        assert!(prompt.contains("Topic: Templates"));
        assert!(prompt.contains("The {topic} field is filled by {classifications}"));
    }
}
