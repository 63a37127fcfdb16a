//! Context serialization
//!
//! Retrieved statements are grouped by topic and written in one of the
//! [`ContextFormat`]s. `json`, `yaml`, `xml` and `text` can be parsed back
//! with [`parse_context`]; `bedrock_xml` is write-only and is produced by the
//! [`BedrockXmlFormatter`](crate::processors::BedrockXmlFormatter)
//! post-processor.

use std::io::Cursor;

use lexigraph_config::ContextFormat;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::results::SearchResults;

/// Prefix of metadata keys reserved for internal bookkeeping
const INTERNAL_KEY_PREFIX: &str = "__lg";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextStatement {
    pub statement: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextTopic {
    pub topic: String,
    pub source: String,
    pub statements: Vec<ContextStatement>,
}

pub fn to_context_topics(results: &SearchResults) -> Vec<ContextTopic> {
    results
        .groups
        .iter()
        .map(|group| ContextTopic {
            topic: group.topic.clone(),
            source: group.source_id.clone(),
            statements: group
                .statements
                .iter()
                .map(|s| ContextStatement {
                    statement: s.text.clone(),
                    facts: s.facts.clone(),
                })
                .collect(),
        })
        .collect()
}

// ============================================================================
// Writing
// ============================================================================

/// Serialize topic groups
///
/// `bedrock_xml` needs source metadata, so it goes through
/// [`format_bedrock_xml`] instead and is rejected here.
pub fn format_context(format: ContextFormat, topics: &[ContextTopic]) -> QueryResult<String> {
    match format {
        ContextFormat::Json => {
            serde_json::to_string_pretty(topics).map_err(|e| QueryError::format(format, e))
        }
        ContextFormat::Yaml => serde_yaml::to_string(topics).map_err(|e| QueryError::format(format, e)),
        ContextFormat::Xml => write_xml(topics).map_err(|e| QueryError::format(format, e)),
        ContextFormat::Text => Ok(write_text(topics)),
        ContextFormat::BedrockXml => Err(QueryError::format(
            format,
            "bedrock_xml context is built by the BedrockXmlFormatter post-processor",
        )),
    }
}

fn write_xml(topics: &[ContextTopic]) -> Result<String, quick_xml::Error> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Start(BytesStart::new("context")))?;
    for topic in topics {
        let start = BytesStart::new("topic").with_attributes([
            ("name", topic.topic.as_str()),
            ("source", topic.source.as_str()),
        ]);
        writer.write_event(Event::Start(start))?;
        for statement in &topic.statements {
            writer.write_event(Event::Start(BytesStart::new("statement")))?;
            write_text_element(&mut writer, "text", &statement.statement)?;
            for fact in &statement.facts {
                write_text_element(&mut writer, "fact", fact)?;
            }
            writer.write_event(Event::End(BytesEnd::new("statement")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("topic")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("context")))?;

    Ok(String::from_utf8_lossy(&writer.into_inner().into_inner()).into_owned())
}

fn write_text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    text: &str,
) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_text(topics: &[ContextTopic]) -> String {
    let mut out = String::new();
    for (i, topic) in topics.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("## {}\n", topic.topic));
        out.push_str(&format!("source: {}\n", topic.source));
        for statement in &topic.statements {
            out.push_str(&format!("- {}\n", statement.statement));
            for fact in &statement.facts {
                out.push_str(&format!("  * {}\n", fact));
            }
        }
    }
    out
}

/// Pre-built XML with one element per source and its statements
///
/// ```text
/// <sources>
///   <source_1>
///     <source_1_metadata><title>...</title></source_1_metadata>
///     <statement_1.1>...</statement_1.1>
///   </source_1>
/// </sources>
/// ```
pub fn format_bedrock_xml(results: &SearchResults) -> QueryResult<String> {
    let build = || -> Result<String, quick_xml::Error> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer.write_event(Event::Start(BytesStart::new("sources")))?;

        for (s, trace) in results.source_trace().iter().enumerate() {
            let source_tag = format!("source_{}", s + 1);
            writer.write_event(Event::Start(BytesStart::new(source_tag.as_str())))?;

            let metadata_tag = format!("{source_tag}_metadata");
            writer.write_event(Event::Start(BytesStart::new(metadata_tag.as_str())))?;
            for (key, value) in &trace.metadata {
                if key.starts_with(INTERNAL_KEY_PREFIX) {
                    continue;
                }
                let value = match value {
                    serde_json::Value::String(v) => v.clone(),
                    other => other.to_string(),
                };
                write_text_element(&mut writer, &element_name(key), &value)?;
            }
            writer.write_event(Event::End(BytesEnd::new(metadata_tag.as_str())))?;

            let statements = results
                .groups
                .iter()
                .filter(|g| g.source_id == trace.source_id)
                .flat_map(|g| g.statements.iter());
            for (n, statement) in statements.enumerate() {
                let tag = format!("statement_{}.{}", s + 1, n + 1);
                write_text_element(&mut writer, &tag, &statement.text)?;
            }

            writer.write_event(Event::End(BytesEnd::new(source_tag.as_str())))?;
        }

        writer.write_event(Event::End(BytesEnd::new("sources")))?;
        Ok(String::from_utf8_lossy(&writer.into_inner().into_inner()).into_owned())
    };
    build().map_err(|e| QueryError::format(ContextFormat::BedrockXml, e))
}

/// Metadata keys become element names; anything outside `[A-Za-z0-9_.-]`
/// is replaced and a leading digit gets a prefix
fn element_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse serialized context back into topic groups
pub fn parse_context(format: ContextFormat, input: &str) -> QueryResult<Vec<ContextTopic>> {
    match format {
        ContextFormat::Json => serde_json::from_str(input).map_err(|e| QueryError::format(format, e)),
        ContextFormat::Yaml => serde_yaml::from_str(input).map_err(|e| QueryError::format(format, e)),
        ContextFormat::Xml => parse_xml(input).map_err(|e| QueryError::format(format, e)),
        ContextFormat::Text => Ok(parse_text(input)),
        ContextFormat::BedrockXml => Err(QueryError::format(
            format,
            "bedrock_xml context cannot be parsed back",
        )),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum XmlField {
    None,
    Text,
    Fact,
}

fn parse_xml(input: &str) -> Result<Vec<ContextTopic>, quick_xml::Error> {
    let mut reader = Reader::from_str(input);
    reader.trim_text(true);

    let mut topics: Vec<ContextTopic> = Vec::new();
    let mut field = XmlField::None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"topic" => {
                    let mut topic = ContextTopic::default();
                    if let Some(attr) = e.try_get_attribute("name")? {
                        topic.topic = attr.unescape_value()?.into_owned();
                    }
                    if let Some(attr) = e.try_get_attribute("source")? {
                        topic.source = attr.unescape_value()?.into_owned();
                    }
                    topics.push(topic);
                }
                b"statement" => {
                    if let Some(topic) = topics.last_mut() {
                        topic.statements.push(ContextStatement::default());
                    }
                }
                b"text" => field = XmlField::Text,
                b"fact" => field = XmlField::Fact,
                _ => {}
            },
            Event::Text(t) => {
                let text = t.unescape()?.into_owned();
                if let Some(statement) = topics.last_mut().and_then(|t| t.statements.last_mut()) {
                    match field {
                        XmlField::Text => statement.statement = text,
                        XmlField::Fact => statement.facts.push(text),
                        XmlField::None => {}
                    }
                }
            }
            Event::End(_) => field = XmlField::None,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(topics)
}

fn parse_text(input: &str) -> Vec<ContextTopic> {
    let mut topics: Vec<ContextTopic> = Vec::new();
    for line in input.lines() {
        if let Some(name) = line.strip_prefix("## ") {
            topics.push(ContextTopic {
                topic: name.to_string(),
                ..ContextTopic::default()
            });
            continue;
        }
        let Some(topic) = topics.last_mut() else {
            continue;
        };
        if let Some(source) = line.strip_prefix("source: ") {
            topic.source = source.to_string();
        } else if let Some(statement) = line.strip_prefix("- ") {
            topic.statements.push(ContextStatement {
                statement: statement.to_string(),
                facts: Vec::new(),
            });
        } else if let Some(fact) = line.strip_prefix("  * ") {
            if let Some(statement) = topic.statements.last_mut() {
                statement.facts.push(fact.to_string());
            }
        }
    }
    topics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{RetrievedStatement, TopicGroup};
    use lexigraph_core::Source;
    use serde_json::json;

    fn topics() -> Vec<ContextTopic> {
        vec![
            ContextTopic {
                topic: "Amazon River".into(),
                source: "aws::1111:2222".into(),
                statements: vec![ContextStatement {
                    statement: "The Amazon river flows through Brazil & Peru".into(),
                    facts: vec!["Amazon river FLOWS THROUGH Brazil".into()],
                }],
            },
            ContextTopic {
                topic: "Brazil".into(),
                source: "aws::3333:4444".into(),
                statements: vec![
                    ContextStatement {
                        statement: "Brasilia is the capital of <Brazil>".into(),
                        facts: Vec::new(),
                    },
                    ContextStatement {
                        statement: "Brazil is in South America".into(),
                        facts: Vec::new(),
                    },
                ],
            },
        ]
    }

    #[test]
    fn test_xml_escapes_and_parses_back() {
        let xml = format_context(ContextFormat::Xml, &topics()).unwrap();
        assert!(xml.contains("&amp;"));
        assert!(xml.contains("&lt;Brazil&gt;"));
        assert_eq!(parse_context(ContextFormat::Xml, &xml).unwrap(), topics());
    }

    #[test]
    fn test_text_layout() {
        let text = format_context(ContextFormat::Text, &topics()).unwrap();
        assert!(text.starts_with("## Amazon River\nsource: aws::1111:2222\n- The Amazon"));
        assert!(text.contains("  * Amazon river FLOWS THROUGH Brazil\n"));
        assert_eq!(parse_context(ContextFormat::Text, &text).unwrap(), topics());
    }

    #[test]
    fn test_bedrock_xml_rejected_by_generic_formatter() {
        assert!(format_context(ContextFormat::BedrockXml, &topics()).is_err());
    }

    #[test]
    fn test_bedrock_xml_layout() {
        let mut metadata = lexigraph_core::Metadata::new();
        metadata.insert("title".into(), json!("amazon"));
        metadata.insert("page count".into(), json!(3));
        metadata.insert("__lg_versioning".into(), json!({"valid_from": 1}));

        let results = SearchResults {
            groups: vec![TopicGroup {
                topic_id: "t1".into(),
                topic: "Amazon River".into(),
                source_id: "s1".into(),
                statements: vec![RetrievedStatement {
                    statement_id: "st1".into(),
                    text: "The Amazon river flows through Brazil".into(),
                    score: 0.9,
                    facts: Vec::new(),
                    details: Vec::new(),
                }],
            }],
            sources: vec![Source {
                source_id: "s1".into(),
                metadata,
            }],
            prebuilt_context: None,
        };

        let xml = format_bedrock_xml(&results).unwrap();
        assert!(xml.contains("<source_1>"));
        assert!(xml.contains("<title>amazon</title>"));
        assert!(xml.contains("<page_count>3</page_count>"));
        assert!(xml.contains("<statement_1.1>The Amazon river flows through Brazil</statement_1.1>"));
        assert!(!xml.contains("__lg"));
    }

    #[test]
    fn test_element_name() {
        assert_eq!(element_name("page count"), "page_count");
        assert_eq!(element_name("1st"), "_1st");
        assert_eq!(element_name("url"), "url");
    }
}
