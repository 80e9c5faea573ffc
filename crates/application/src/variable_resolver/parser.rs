//! Parser for `{{name}}` references.

use std::ops::Range;

/// A `{{name}}` reference found in a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableReference {
    /// Trimmed name between the braces.
    pub name: String,

    /// Byte range of the whole reference, braces included.
    pub span: Range<usize>,
}

/// Finds every `{{name}}` reference in `input`, in order.
///
/// Empty names are skipped; an unterminated `{{` ends the scan.
#[must_use]
pub fn parse_variables(input: &str) -> Vec<VariableReference> {
    let mut references = Vec::new();
    let mut offset = 0;

    while let Some(open) = input[offset..].find("{{") {
        let start = offset + open;
        let body = start + 2;
        let Some(close) = input[body..].find("}}") else {
            break;
        };
        let end = body + close + 2;
        let name = input[body..body + close].trim();
        if !name.is_empty() {
            references.push(VariableReference {
                name: name.to_string(),
                span: start..end,
            });
        }
        offset = end;
    }

    references
}

/// Returns true if the input contains at least one reference.
#[must_use]
pub fn has_variables(input: &str) -> bool {
    !parse_variables(input).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(input: &str) -> Vec<String> {
        parse_variables(input).into_iter().map(|r| r.name).collect()
    }

    #[test]
    fn test_parse_simple_variable() {
        let refs = parse_variables("{{name}}");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "name");
        assert_eq!(refs[0].span, 0..8);
    }

    #[test]
    fn test_parse_in_path_and_body() {
        assert_eq!(names("/users/{{ user }}/orders/{{order}}"), vec!["user", "order"]);
        assert_eq!(names(r#"{"token": "{{token}}"}"#), vec!["token"]);
        assert_eq!(names("{{a}}{{b}}"), vec!["a", "b"]);
    }

    #[test]
    fn test_degenerate_input() {
        assert!(names("plain").is_empty());
        assert!(names("{{}}").is_empty());
        assert!(names("{{   }}").is_empty());
        assert!(names("{{open").is_empty());
        assert!(names("{single}").is_empty());
        assert_eq!(names("{{a}} {{b"), vec!["a"]);
    }

    #[test]
    fn test_span_covers_reference() {
        let input = "Hello {{name}}, welcome!";
        let refs = parse_variables(input);
        assert_eq!(&input[refs[0].span.clone()], "{{name}}");
        assert!(has_variables(input));
        assert!(!has_variables("{{ }}"));
    }
}
