//! `{name}` placeholder substitution for prompt templates

/// Substitute `{name}` placeholders in a single pass
///
/// Substituted values are never scanned again, so a value that itself
/// contains `{name}` comes through literally. Placeholders without a value
/// are left as they are.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substitution = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(candidate, _)| *candidate == name)
                .map(|(_, value)| (close, *value))
        });
        match substitution {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_are_not_rescanned() {
        let prompt = render(
            "Topic: {topic}\n{statement}",
            &[("topic", "says {statement}"), ("statement", "Ada visited Paris")],
        );
        assert_eq!(prompt, "Topic: says {statement}\nAda visited Paris");
    }

    #[test]
    fn test_unknown_and_unbalanced_braces_are_literal() {
        assert_eq!(render("{other} {x", &[("x", "1")]), "{other} {x");
        assert_eq!(render("{{x}}", &[("x", "1")]), "{1}");
        assert_eq!(render("", &[("x", "1")]), "");
    }
}
