//! Structural query subset used by generated locators.
//!
//! Supported grammar:
//!
//! ```text
//! selector  := compound ( combinator compound )*
//! combinator:= whitespace | ">"
//! compound  := ( tag | "*" )? ( "#" ident | "." ident | attr | ":nth-of-type(" n ")" )*
//! attr      := "[" ident ( "=" ( string | ident ) )? "]"
//! ```
//!
//! Identifiers accept CSS escapes, so everything [`escape_ident`] and
//! [`escape_string`] produce parses back to the original value.

use crate::dom::NodeId;
use crate::result::{LiveditError, LiveditResult};

/// Relation between a compound and the one to its left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// Attribute condition
#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrCondition {
    name: String,
    value: Option<String>,
}

/// One compound selector (`div#a.b[c="d"]:nth-of-type(2)`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
    nth_of_type: Option<usize>,
}

/// Read access the matcher needs from a tree
pub(crate) trait SelectorTree {
    /// Lower-case tag name of an element
    fn tag_of(&self, node: NodeId) -> Option<&str>;
    /// Attribute value of an element
    fn attr_of(&self, node: NodeId, name: &str) -> Option<&str>;
    /// Parent element, `None` at a containment root
    fn parent_element_of(&self, node: NodeId) -> Option<NodeId>;
    /// 1-based position among same-tag element siblings
    fn nth_of_type_of(&self, node: NodeId) -> usize;
}

/// A parsed selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    // (combinator to the left, compound); the first entry's combinator is unused
    parts: Vec<(Combinator, Compound)>,
}

impl Selector {
    /// Parse a selector string
    pub fn parse(source: &str) -> LiveditResult<Self> {
        let mut parser = Parser {
            src: source,
            chars: source.char_indices().peekable(),
        };
        let parts = parser.parse_selector()?;
        Ok(Self { parts })
    }

    /// Number of compounds
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the selector has no compounds (never true for parsed selectors)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub(crate) fn matches(&self, tree: &impl SelectorTree, node: NodeId) -> bool {
        let Some(((_, last), rest)) = self.parts.split_last() else {
            return false;
        };
        if !compound_matches(tree, node, last) {
            return false;
        }
        // Right-to-left, with backtracking over descendant combinators.
        match_left(tree, node, rest, self.parts.last().map(|(c, _)| *c))
    }
}

fn match_left(
    tree: &impl SelectorTree,
    node: NodeId,
    remaining: &[(Combinator, Compound)],
    combinator: Option<Combinator>,
) -> bool {
    let Some(((left_combinator, compound), rest)) = remaining.split_last() else {
        return true;
    };
    match combinator.unwrap_or(Combinator::Descendant) {
        Combinator::Child => tree.parent_element_of(node).is_some_and(|parent| {
            compound_matches(tree, parent, compound)
                && match_left(tree, parent, rest, Some(*left_combinator))
        }),
        Combinator::Descendant => {
            let mut cursor = tree.parent_element_of(node);
            while let Some(ancestor) = cursor {
                if compound_matches(tree, ancestor, compound)
                    && match_left(tree, ancestor, rest, Some(*left_combinator))
                {
                    return true;
                }
                cursor = tree.parent_element_of(ancestor);
            }
            false
        }
    }
}

fn compound_matches(tree: &impl SelectorTree, node: NodeId, compound: &Compound) -> bool {
    let Some(tag) = tree.tag_of(node) else {
        return false;
    };
    if compound.tag.as_deref().is_some_and(|want| want != tag) {
        return false;
    }
    if let Some(id) = &compound.id {
        if tree.attr_of(node, "id") != Some(id.as_str()) {
            return false;
        }
    }
    if !compound.classes.is_empty() {
        let classes: Vec<&str> = tree
            .attr_of(node, "class")
            .map(|value| value.split_whitespace().collect())
            .unwrap_or_default();
        if !compound
            .classes
            .iter()
            .all(|class| classes.contains(&class.as_str()))
        {
            return false;
        }
    }
    for attr in &compound.attrs {
        match (tree.attr_of(node, &attr.name), &attr.value) {
            (None, _) => return false,
            (Some(actual), Some(expected)) if actual != expected => return false,
            _ => {}
        }
    }
    if let Some(n) = compound.nth_of_type {
        if tree.nth_of_type_of(node) != n {
            return false;
        }
    }
    true
}

struct Parser<'a> {
    src: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> LiveditError {
        LiveditError::invalid_selector(self.src, message)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn skip_whitespace(&mut self) -> bool {
        let mut skipped = false;
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
            skipped = true;
        }
        skipped
    }

    fn parse_selector(&mut self) -> LiveditResult<Vec<(Combinator, Compound)>> {
        let mut parts = Vec::new();
        self.skip_whitespace();
        let mut combinator = Combinator::Descendant;
        loop {
            let compound = self.parse_compound()?;
            parts.push((combinator, compound));
            let had_space = self.skip_whitespace();
            match self.peek() {
                None => break,
                Some('>') => {
                    self.bump();
                    self.skip_whitespace();
                    combinator = Combinator::Child;
                }
                Some(',') => return Err(self.error("selector lists are not supported")),
                Some(_) if had_space => combinator = Combinator::Descendant,
                Some(c) => return Err(self.error(&format!("unexpected character `{c}`"))),
            }
        }
        Ok(parts)
    }

    fn parse_compound(&mut self) -> LiveditResult<Compound> {
        let mut compound = Compound::default();
        let mut any = false;
        match self.peek() {
            Some('*') => {
                self.bump();
                any = true;
            }
            Some(c) if is_ident_start(c) => {
                compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
                any = true;
            }
            _ => {}
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    compound.id = Some(self.parse_ident()?);
                }
                Some('.') => {
                    self.bump();
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => {
                    self.bump();
                    compound.attrs.push(self.parse_attr()?);
                }
                Some(':') => {
                    self.bump();
                    compound.nth_of_type = Some(self.parse_pseudo()?);
                }
                _ => break,
            }
            any = true;
        }
        if any {
            Ok(compound)
        } else {
            Err(self.error("expected a compound selector"))
        }
    }

    fn parse_ident(&mut self) -> LiveditResult<String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.bump();
                out.push(self.parse_escape()?);
            } else if is_ident_char(c) {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if out.is_empty() {
            Err(self.error("expected an identifier"))
        } else {
            Ok(out)
        }
    }

    fn parse_escape(&mut self) -> LiveditResult<char> {
        let mut hex = String::new();
        while hex.len() < 6 && self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
            if let Some(c) = self.bump() {
                hex.push(c);
            }
        }
        if hex.is_empty() {
            return self.bump().ok_or_else(|| self.error("dangling escape"));
        }
        if self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        let code = u32::from_str_radix(&hex, 16).map_err(|_| self.error("bad hex escape"))?;
        Ok(char::from_u32(code)
            .filter(|c| *c != '\0')
            .unwrap_or('\u{FFFD}'))
    }

    fn parse_attr(&mut self) -> LiveditResult<AttrCondition> {
        self.skip_whitespace();
        let name = self.parse_ident()?.to_ascii_lowercase();
        self.skip_whitespace();
        let value = match self.peek() {
            Some(']') => None,
            Some('=') => {
                self.bump();
                self.skip_whitespace();
                let value = match self.peek() {
                    Some(quote @ ('"' | '\'')) => {
                        self.bump();
                        self.parse_string(quote)?
                    }
                    _ => self.parse_ident()?,
                };
                self.skip_whitespace();
                Some(value)
            }
            _ => return Err(self.error("unsupported attribute operator")),
        };
        if self.bump() == Some(']') {
            Ok(AttrCondition { name, value })
        } else {
            Err(self.error("unterminated attribute selector"))
        }
    }

    fn parse_string(&mut self, quote: char) -> LiveditResult<String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => out.push(self.parse_escape()?),
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_pseudo(&mut self) -> LiveditResult<usize> {
        let name = self.parse_ident()?;
        if !name.eq_ignore_ascii_case("nth-of-type") {
            return Err(self.error(&format!("unsupported pseudo-class `:{name}`")));
        }
        if self.bump() != Some('(') {
            return Err(self.error("expected `(`"));
        }
        self.skip_whitespace();
        let mut digits = String::new();
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            if let Some(c) = self.bump() {
                digits.push(c);
            }
        }
        self.skip_whitespace();
        if self.bump() != Some(')') {
            return Err(self.error("expected `)`"));
        }
        match digits.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(self.error("nth-of-type needs a positive integer")),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-' || c == '\\' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}

/// Escape a value for use as a CSS identifier (`#id`, `.class`)
#[must_use]
pub fn escape_ident(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let chars: Vec<char> = value.chars().collect();
    if chars == ['-'] {
        return "\\-".to_string();
    }
    for (index, &c) in chars.iter().enumerate() {
        let leading_digit = c.is_ascii_digit()
            && (index == 0 || (index == 1 && chars.first() == Some(&'-')));
        if c == '\0' {
            out.push('\u{FFFD}');
        } else if c.is_control() || leading_digit {
            out.push_str(&format!("\\{:x} ", u32::from(c)));
        } else if is_ident_char(c) {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// Escape a value for use inside a double-quoted attribute selector
#[must_use]
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => out.push_str(&format!("\\{:x} ", u32::from(c))),
            c => out.push(c),
        }
    }
    out
}
