//! Inline style declarations and simple stylesheets.

use serde::{Deserialize, Serialize};

/// One stylesheet rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleRule {
    /// Selector list, split on commas
    pub selectors: Vec<String>,
    /// Declarations in source order
    pub declarations: Vec<(String, String)>,
}

impl StyleRule {
    /// Last declared value of a property in this rule
    #[must_use]
    pub fn value_of(&self, property: &str) -> Option<&str> {
        self.declarations
            .iter()
            .rev()
            .find(|(name, _)| name == property)
            .map(|(_, value)| value.as_str())
    }
}

/// Parse a declaration block (`color: red; margin: 0`)
///
/// Property names are lower-cased, values trimmed. Later duplicates replace
/// earlier ones in place so the result has unique names.
#[must_use]
pub fn parse_declarations(block: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for declaration in strip_comments(block).split(';') {
        let Some((name, value)) = declaration.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();
        if name.is_empty() || value.is_empty() {
            continue;
        }
        match out.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => out.push((name, value.to_string())),
        }
    }
    out
}

/// Serialize declarations back to `name: value;` form
#[must_use]
pub fn serialize_declarations(declarations: &[(String, String)]) -> String {
    declarations
        .iter()
        .map(|(name, value)| format!("{name}: {value};"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a stylesheet into plain rules, skipping at-rules
#[must_use]
pub fn parse_stylesheet(css: &str) -> Vec<StyleRule> {
    let css = strip_comments(css);
    let mut rules = Vec::new();
    let mut rest = css.as_str();
    while let Some(open) = rest.find('{') {
        let prelude = rest[..open].trim();
        let body_start = open + 1;
        let Some(close) = matching_brace(&rest[body_start..]) else {
            break;
        };
        let body = &rest[body_start..body_start + close];
        if !prelude.starts_with('@') {
            let selectors: Vec<String> = prelude
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !selectors.is_empty() {
                rules.push(StyleRule {
                    selectors,
                    declarations: parse_declarations(body),
                });
            }
        }
        rest = &rest[body_start + close + 1..];
    }
    rules
}

fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_declarations_dedupes_and_normalizes() {
        let decls = parse_declarations(" Color: red ; margin:0;; color: blue; bad; x: ");
        assert_eq!(
            decls,
            vec![
                ("color".to_string(), "blue".to_string()),
                ("margin".to_string(), "0".to_string()),
            ]
        );
    }

    #[test]
    fn test_serialize_declarations() {
        let decls = vec![
            ("color".to_string(), "red".to_string()),
            ("padding".to_string(), "4px".to_string()),
        ];
        assert_eq!(serialize_declarations(&decls), "color: red; padding: 4px;");
        assert_eq!(serialize_declarations(&[]), "");
    }

    #[test]
    fn test_parse_stylesheet_rules() {
        let rules = parse_stylesheet(
            "/* c */ .a, p > b { color: red; } @media (x) { .a { color: blue } } #z{width:1px}",
        );
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].selectors, vec![".a".to_string(), "p > b".to_string()]);
        assert_eq!(rules[0].value_of("color"), Some("red"));
        assert_eq!(rules[1].selectors, vec!["#z".to_string()]);
        assert_eq!(rules[1].value_of("width"), Some("1px"));
    }

    #[test]
    fn test_unterminated_rule_is_dropped() {
        assert!(parse_stylesheet(".a { color: red").is_empty());
    }
}
