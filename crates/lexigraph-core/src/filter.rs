//! Metadata filters over source metadata
//!
//! Used both at similarity-search time (vector entries carry a copy of their
//! source metadata) and when selecting sources for listing or deletion.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Metadata;

// ============================================================================
// Operators
// ============================================================================

/// Comparison operators for metadata predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Greater than
    Gt,
    /// Less than
    Lt,
    /// Greater than or equal
    Gte,
    /// Less than or equal
    Lte,
    /// Substring (strings) or membership (arrays)
    Contains,
}

impl Op {
    pub fn is_comparison(&self) -> bool {
        matches!(self, Op::Gt | Op::Lt | Op::Gte | Op::Lte)
    }

    fn apply(&self, actual: &Value, expected: &Value) -> bool {
        match self {
            Op::Eq => values_equal(actual, expected),
            Op::Ne => !values_equal(actual, expected),
            Op::Gt => compare(actual, expected) == Some(Ordering::Greater),
            Op::Lt => compare(actual, expected) == Some(Ordering::Less),
            Op::Gte => matches!(
                compare(actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Op::Lte => matches!(
                compare(actual, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Op::Contains => match (actual, expected) {
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
                (Value::Array(items), needle) => items.iter().any(|i| values_equal(i, needle)),
                _ => false,
            },
        }
    }
}

/// Numbers compare by value regardless of integer/float representation
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Numbers compare numerically, strings lexicographically; other types are unordered
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// ============================================================================
// Filter
// ============================================================================

/// Predicate tree over source metadata
///
/// # Examples
///
/// ```ignore
/// // year >= 2020 AND (lang = "en" OR lang = "fr")
/// let filter = MetadataFilter::and(vec![
///     MetadataFilter::Property("year".into(), Op::Gte, json!(2020)),
///     MetadataFilter::or(vec![
///         MetadataFilter::property_eq("lang", json!("en")),
///         MetadataFilter::property_eq("lang", json!("fr")),
///     ]),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataFilter {
    /// Single predicate on a metadata key; a missing key never matches
    Property(String, Op, Value),

    /// Logical AND (empty matches everything)
    And(Vec<MetadataFilter>),

    /// Logical OR (empty matches nothing)
    Or(Vec<MetadataFilter>),
}

impl MetadataFilter {
    pub fn property_eq(key: impl Into<String>, value: Value) -> Self {
        MetadataFilter::Property(key.into(), Op::Eq, value)
    }

    pub fn and(filters: Vec<MetadataFilter>) -> Self {
        MetadataFilter::And(filters)
    }

    pub fn or(filters: Vec<MetadataFilter>) -> Self {
        MetadataFilter::Or(filters)
    }

    /// OR across a list of dicts, each dict an AND of equality predicates
    pub fn from_dicts(dicts: &[Metadata]) -> Self {
        MetadataFilter::Or(
            dicts
                .iter()
                .map(|dict| {
                    MetadataFilter::And(
                        dict.iter()
                            .map(|(k, v)| MetadataFilter::property_eq(k.clone(), v.clone()))
                            .collect(),
                    )
                })
                .collect(),
        )
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            MetadataFilter::Property(key, op, expected) => metadata
                .get(key)
                .is_some_and(|actual| op.apply(actual, expected)),
            MetadataFilter::And(filters) => filters.iter().all(|f| f.matches(metadata)),
            MetadataFilter::Or(filters) => filters.iter().any(|f| f.matches(metadata)),
        }
    }
}

/// `None` matches everything
pub fn matches_optional(filter: Option<&MetadataFilter>, metadata: &Metadata) -> bool {
    filter.map_or(true, |f| f.matches(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Metadata {
        Metadata::from([
            ("year".to_string(), json!(2021)),
            ("lang".to_string(), json!("en")),
            ("title".to_string(), json!("Climate report")),
            ("tags".to_string(), json!(["science", "policy"])),
        ])
    }

    #[test]
    fn test_equality_and_range() {
        let m = doc();
        assert!(MetadataFilter::property_eq("lang", json!("en")).matches(&m));
        assert!(MetadataFilter::property_eq("year", json!(2021.0)).matches(&m));
        assert!(MetadataFilter::Property("year".into(), Op::Gte, json!(2021)).matches(&m));
        assert!(!MetadataFilter::Property("year".into(), Op::Gt, json!(2021)).matches(&m));
        assert!(MetadataFilter::Property("lang".into(), Op::Lt, json!("fr")).matches(&m));
        assert!(!MetadataFilter::Property("year".into(), Op::Gt, json!("2000")).matches(&m));
    }

    #[test]
    fn test_missing_key_never_matches() {
        let m = doc();
        assert!(!MetadataFilter::property_eq("author", json!("x")).matches(&m));
        assert!(!MetadataFilter::Property("author".into(), Op::Ne, json!("x")).matches(&m));
    }

    #[test]
    fn test_contains() {
        let m = doc();
        assert!(MetadataFilter::Property("title".into(), Op::Contains, json!("report")).matches(&m));
        assert!(MetadataFilter::Property("tags".into(), Op::Contains, json!("policy")).matches(&m));
        assert!(!MetadataFilter::Property("tags".into(), Op::Contains, json!("art")).matches(&m));
    }

    #[test]
    fn test_from_dicts_is_or_of_and() {
        let m = doc();
        let filter = MetadataFilter::from_dicts(&[
            Metadata::from([
                ("lang".to_string(), json!("en")),
                ("year".to_string(), json!(1999)),
            ]),
            Metadata::from([("lang".to_string(), json!("en"))]),
        ]);
        assert!(filter.matches(&m));

        let filter = MetadataFilter::from_dicts(&[Metadata::from([(
            "lang".to_string(),
            json!("de"),
        )])]);
        assert!(!filter.matches(&m));
    }

    #[test]
    fn test_empty_compounds() {
        let m = doc();
        assert!(MetadataFilter::and(vec![]).matches(&m));
        assert!(!MetadataFilter::or(vec![]).matches(&m));
        assert!(matches_optional(None, &m));
    }
}
