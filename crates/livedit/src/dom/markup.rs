//! Markup parsing for the supported HTML subset.
//!
//! Handles elements with quoted, unquoted and boolean attributes, void
//! elements, raw-text elements (`style`, `script`, `textarea`, `title`),
//! comments, doctype, and the five common named entities plus numeric
//! character references. Unclosed elements are closed at their parent's
//! end tag; stray end tags are ignored.

use crate::result::{LiveditError, LiveditResult};

/// Elements that never have children
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Parsed markup tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    /// Element with attributes in source order
    Element {
        /// Lower-case tag name
        tag: String,
        /// Attributes in source order
        attrs: Vec<(String, String)>,
        /// Child nodes
        children: Vec<MarkupNode>,
    },
    /// Text run with entities decoded
    Text(String),
}

impl MarkupNode {
    /// Tag name for elements
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Element { tag, .. } => Some(tag),
            Self::Text(_) => None,
        }
    }

    /// Whether this is a whitespace-only text node
    #[must_use]
    pub fn is_blank_text(&self) -> bool {
        matches!(self, Self::Text(text) if text.trim().is_empty())
    }
}

/// Parse markup into a forest of top-level nodes
pub fn parse_markup(source: &str) -> LiveditResult<Vec<MarkupNode>> {
    let mut parser = MarkupParser { src: source, pos: 0 };
    let mut stack: Vec<(String, Vec<(String, String)>, Vec<MarkupNode>)> = Vec::new();
    let mut roots: Vec<MarkupNode> = Vec::new();

    fn push_node(
        stack: &mut [(String, Vec<(String, String)>, Vec<MarkupNode>)],
        roots: &mut Vec<MarkupNode>,
        node: MarkupNode,
    ) {
        match stack.last_mut() {
            Some((_, _, children)) => children.push(node),
            None => roots.push(node),
        }
    }

    while parser.pos < source.len() {
        let rest = parser.rest();
        if rest.starts_with("<!--") {
            let end = rest
                .find("-->")
                .ok_or_else(|| LiveditError::markup("unterminated comment"))?;
            parser.pos += end + 3;
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            let end = rest
                .find('>')
                .ok_or_else(|| LiveditError::markup("unterminated declaration"))?;
            parser.pos += end + 1;
        } else if rest.starts_with("</") {
            parser.pos += 2;
            let name = parser.read_name().to_ascii_lowercase();
            parser.skip_until('>')?;
            if let Some(depth) = stack.iter().rposition(|(tag, _, _)| *tag == name) {
                while stack.len() > depth {
                    if let Some((tag, attrs, children)) = stack.pop() {
                        let node = MarkupNode::Element {
                            tag,
                            attrs,
                            children,
                        };
                        push_node(&mut stack, &mut roots, node);
                    }
                }
            }
        } else if rest.starts_with('<')
            && rest[1..].chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        {
            parser.pos += 1;
            let (tag, attrs, self_closing) = parser.read_start_tag()?;
            if VOID_ELEMENTS.contains(&tag.as_str()) || self_closing {
                push_node(
                    &mut stack,
                    &mut roots,
                    MarkupNode::Element {
                        tag,
                        attrs,
                        children: Vec::new(),
                    },
                );
            } else if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                let close = format!("</{tag}");
                let body_end = find_ascii_case_insensitive(parser.rest(), &close)
                    .unwrap_or(parser.rest().len());
                let body = parser.rest()[..body_end].to_string();
                parser.pos += body_end;
                if parser.pos < source.len() {
                    parser.skip_until('>')?;
                }
                let children = if body.is_empty() {
                    Vec::new()
                } else if tag == "textarea" || tag == "title" {
                    vec![MarkupNode::Text(decode_entities(&body))]
                } else {
                    vec![MarkupNode::Text(body)]
                };
                push_node(
                    &mut stack,
                    &mut roots,
                    MarkupNode::Element {
                        tag,
                        attrs,
                        children,
                    },
                );
            } else {
                stack.push((tag, attrs, Vec::new()));
            }
        } else {
            // The run always holds its first char, even a stray `<`
            let first = rest.chars().next().map_or(1, char::len_utf8);
            let end = rest[first..].find('<').map_or(rest.len(), |i| i + first);
            let text = decode_entities(&rest[..end]);
            parser.pos += end;
            push_node(&mut stack, &mut roots, MarkupNode::Text(text));
        }
    }

    while let Some((tag, attrs, children)) = stack.pop() {
        let node = MarkupNode::Element {
            tag,
            attrs,
            children,
        };
        push_node(&mut stack, &mut roots, node);
    }
    Ok(roots)
}

struct MarkupParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> MarkupParser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn skip_until(&mut self, target: char) -> LiveditResult<()> {
        while let Some(c) = self.bump() {
            if c == target {
                return Ok(());
            }
        }
        Err(LiveditError::markup(format!("expected `{target}`")))
    }

    fn read_name(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !c.is_whitespace() && !matches!(c, '>' | '/' | '=' | '"' | '\''))
        {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn read_start_tag(&mut self) -> LiveditResult<(String, Vec<(String, String)>, bool)> {
        let tag = self.read_name().to_ascii_lowercase();
        let mut attrs: Vec<(String, String)> = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(LiveditError::markup(format!("unterminated tag <{tag}>"))),
                Some('>') => {
                    self.bump();
                    return Ok((tag, attrs, false));
                }
                Some('/') => {
                    self.bump();
                    self.skip_whitespace();
                    if self.peek() == Some('>') {
                        self.bump();
                        return Ok((tag, attrs, true));
                    }
                }
                Some(_) => {
                    let name = self.read_name().to_ascii_lowercase();
                    if name.is_empty() {
                        // Skip a stray quote or `=`.
                        self.bump();
                        continue;
                    }
                    self.skip_whitespace();
                    let value = if self.peek() == Some('=') {
                        self.bump();
                        self.skip_whitespace();
                        self.read_attr_value()?
                    } else {
                        String::new()
                    };
                    if !attrs.iter().any(|(existing, _)| *existing == name) {
                        attrs.push((name, value));
                    }
                }
            }
        }
    }

    fn read_attr_value(&mut self) -> LiveditResult<String> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                let rest = self.rest();
                let end = rest
                    .find(quote)
                    .ok_or_else(|| LiveditError::markup("unterminated attribute value"))?;
                let value = decode_entities(&rest[..end]);
                self.pos += end + 1;
                Ok(value)
            }
            _ => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| !c.is_whitespace() && c != '>')
                {
                    self.bump();
                }
                Ok(decode_entities(&self.src[start..self.pos]))
            }
        }
    }
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    if pat.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - pat.len()).find(|&start| hay[start..start + pat.len()].eq_ignore_ascii_case(pat))
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity.strip_prefix('#').and_then(|num| {
                    let code = match num.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }),
            };
            c.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Escape text content for serialization
#[must_use]
pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape an attribute value for a double-quoted serialization
#[must_use]
pub fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}
