//! In-memory document tree.
//!
//! An arena of nodes addressed by [`NodeId`]. Handles are never reused, so a
//! removed node keeps answering reads while [`DocumentHost::is_connected`]
//! reports `false`. Every write appends a [`MutationRecord`] that the host
//! loop drains with [`MemoryDocument::take_records`].
//!
//! Markup extensions:
//! - `<template shadowrootmode="open">` as the first template child of an
//!   element attaches a shadow root.
//! - `<iframe srcdoc="...">` gets a content document parsed from `srcdoc`.
//! - `data-rect="x y w h"` supplies a layout box when none was set with
//!   [`MemoryDocument::set_rect`].

use super::markup::{escape_attribute, escape_text, parse_markup, MarkupNode, VOID_ELEMENTS};
use super::selector::{Selector, SelectorTree};
use super::style::{parse_declarations, parse_stylesheet, serialize_declarations};
use super::{root_scope, DocumentHost, MutationRecord, NodeId, NodeKind, Point, Rect};
use crate::result::{LiveditError, LiveditResult};

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attrs: Vec<(String, String)>,
    shadow_root: Option<NodeId>,
    content_document: Option<NodeId>,
    rect: Option<Rect>,
}

impl ElementData {
    fn new(tag: &str, attrs: Vec<(String, String)>) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs,
            shadow_root: None,
            content_document: None,
            rect: None,
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
enum NodeData {
    Document { frame: Option<NodeId> },
    ShadowRoot { host: NodeId },
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    /// All child nodes, text included
    children: Vec<NodeId>,
}

/// Arena-backed [`DocumentHost`]
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    nodes: Vec<Node>,
    document: NodeId,
    records: Vec<MutationRecord>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    /// Empty document
    #[must_use]
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            document: NodeId(0),
            records: Vec::new(),
        };
        doc.document = doc.alloc(NodeData::Document { frame: None });
        doc
    }

    /// Parse a full document
    pub fn parse(html: &str) -> LiveditResult<Self> {
        let mut doc = Self::new();
        let markup = parse_markup(html)?;
        let root = doc.document;
        doc.build_children(root, &markup)?;
        Ok(doc)
    }

    /// First element in the top-level document matching `selector`
    pub fn select_first(&self, selector: &str) -> LiveditResult<Option<NodeId>> {
        Ok(self.query_all(self.document, selector)?.first().copied())
    }

    /// Drain pending change notifications
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    /// Set an explicit layout box
    pub fn set_rect(&mut self, node: NodeId, rect: Rect) -> LiveditResult<()> {
        let element = self
            .element_mut(node)
            .ok_or_else(|| unknown_element(node))?;
        element.rect = Some(rect);
        Ok(())
    }

    /// Append a `<style>` element to `<head>` (or the first element)
    pub fn inject_stylesheet(&mut self, css: &str) -> LiveditResult<NodeId> {
        let container = match self.select_first("head")? {
            Some(head) => head,
            None => self
                .children(self.document)
                .first()
                .copied()
                .unwrap_or(self.document),
        };
        let style = self.create_element(self.document, "style")?;
        let text = self.alloc(NodeData::Text(css.to_string()));
        self.attach(style, text);
        self.insert_before(container, style, None)?;
        Ok(style)
    }

    /// Replace an element with freshly parsed markup, the way a hot reload
    /// re-renders a component. Returns the new root.
    pub fn replace_with_markup(&mut self, node: NodeId, html: &str) -> LiveditResult<NodeId> {
        let parent = self
            .node(node)
            .and_then(|n| n.parent)
            .ok_or_else(|| LiveditError::invalid_target(format!("{node} is detached")))?;
        let fresh = self.parse_element(self.document, html)?;
        self.insert_before(parent, fresh, Some(node))?;
        self.remove(node)?;
        Ok(fresh)
    }

    // =========================================================================
    // Arena
    // =========================================================================

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        usize::try_from(id.0).ok().and_then(|i| self.nodes.get(i))
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        usize::try_from(id.0).ok().and_then(|i| self.nodes.get_mut(i))
    }

    fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.node(id)?.data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.node_mut(id)?.data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.node_mut(parent) {
            node.children.push(child);
        }
    }

    fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.node_mut(child)?.parent.take()?;
        if let Some(node) = self.node_mut(parent) {
            node.children.retain(|c| *c != child);
        }
        Some(parent)
    }

    fn build_children(&mut self, parent: NodeId, markup: &[MarkupNode]) -> LiveditResult<()> {
        let at_scope = matches!(
            self.node(parent).map(|n| &n.data),
            Some(NodeData::Document { .. } | NodeData::ShadowRoot { .. })
        );
        for child in markup {
            if at_scope && child.is_blank_text() {
                continue;
            }
            match child {
                MarkupNode::Element {
                    tag,
                    attrs,
                    children,
                } if tag == "template"
                    && attrs.iter().any(|(key, _)| key == "shadowrootmode")
                    && self
                        .element(parent)
                        .is_some_and(|element| element.shadow_root.is_none()) =>
                {
                    let root = self.alloc(NodeData::ShadowRoot { host: parent });
                    self.build_children(root, children)?;
                    if let Some(element) = self.element_mut(parent) {
                        element.shadow_root = Some(root);
                    }
                }
                _ => {
                    let id = self.build_node(child)?;
                    self.attach(parent, id);
                }
            }
        }
        Ok(())
    }

    fn build_node(&mut self, markup: &MarkupNode) -> LiveditResult<NodeId> {
        match markup {
            MarkupNode::Text(text) => Ok(self.alloc(NodeData::Text(text.clone()))),
            MarkupNode::Element {
                tag,
                attrs,
                children,
            } => {
                let id = self.alloc(NodeData::Element(ElementData::new(tag, attrs.clone())));
                self.build_children(id, children)?;
                let srcdoc = attrs
                    .iter()
                    .find(|(key, _)| key == "srcdoc")
                    .map(|(_, value)| value.clone());
                if let (true, Some(srcdoc)) = (tag == "iframe", srcdoc) {
                    let frame_doc = self.alloc(NodeData::Document { frame: Some(id) });
                    let inner = parse_markup(&srcdoc)?;
                    self.build_children(frame_doc, &inner)?;
                    if let Some(element) = self.element_mut(id) {
                        element.content_document = Some(frame_doc);
                    }
                }
                Ok(id)
            }
        }
    }

    /// Element descendants of `root` in document order, excluding `root`
    fn element_descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .node(root)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            if matches!(node.data, NodeData::Element(_)) {
                out.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Connected elements in paint order, shadow content before light children
    fn paint_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .node(self.document)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            let NodeData::Element(element) = &node.data else {
                continue;
            };
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
            if let Some(shadow) = element.shadow_root.and_then(|root| self.node(root)) {
                stack.extend(shadow.children.iter().rev().copied());
            }
        }
        out
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.node(current).and_then(|n| n.parent);
        }
        false
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else { return };
        match &node.data {
            NodeData::Text(text) => {
                let raw = node
                    .parent
                    .and_then(|p| self.element(p))
                    .is_some_and(|p| p.tag == "style" || p.tag == "script");
                if raw {
                    out.push_str(text);
                } else {
                    out.push_str(&escape_text(text));
                }
            }
            NodeData::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                for (name, value) in &element.attrs {
                    out.push_str(&format!(" {name}=\"{}\"", escape_attribute(value)));
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&element.tag.as_str()) {
                    return;
                }
                if let Some(shadow) = element.shadow_root.and_then(|root| self.node(root)) {
                    out.push_str("<template shadowrootmode=\"open\">");
                    for child in &shadow.children {
                        self.write_html(*child, out);
                    }
                    out.push_str("</template>");
                }
                for child in &node.children {
                    self.write_html(*child, out);
                }
                out.push_str(&format!("</{}>", element.tag));
            }
            NodeData::Document { .. } | NodeData::ShadowRoot { .. } => {
                for child in &node.children {
                    self.write_html(*child, out);
                }
            }
        }
    }

    fn record(&mut self, record: MutationRecord) {
        self.records.push(record);
    }
}

fn unknown_element(node: NodeId) -> LiveditError {
    LiveditError::invalid_target(format!("{node} is not an element"))
}

fn parse_rect(value: &str) -> Option<Rect> {
    let parts: Vec<f64> = value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [x, y, width, height] => Some(Rect::new(*x, *y, *width, *height)),
        _ => None,
    }
}

fn valid_tag(tag: &str) -> bool {
    tag.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl SelectorTree for MemoryDocument {
    fn tag_of(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|element| element.tag.as_str())
    }

    fn attr_of(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?.attr(name)
    }

    fn parent_element_of(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.node(node)?.parent?;
        self.element(parent).map(|_| parent)
    }

    fn nth_of_type_of(&self, node: NodeId) -> usize {
        let Some(tag) = self.tag_of(node) else {
            return 0;
        };
        let Some(parent) = self.node(node).and_then(|n| n.parent) else {
            return 1;
        };
        let Some(siblings) = self.node(parent).map(|n| &n.children) else {
            return 1;
        };
        let mut position = 0;
        for sibling in siblings {
            if self.tag_of(*sibling) == Some(tag) {
                position += 1;
            }
            if *sibling == node {
                break;
            }
        }
        position
    }
}

impl DocumentHost for MemoryDocument {
    fn document(&self) -> NodeId {
        self.document
    }

    fn node_kind(&self, node: NodeId) -> Option<NodeKind> {
        Some(match self.node(node)?.data {
            NodeData::Document { .. } => NodeKind::Document,
            NodeData::ShadowRoot { .. } => NodeKind::ShadowRoot,
            NodeData::Element(_) => NodeKind::Element,
            NodeData::Text(_) => NodeKind::Text,
        })
    }

    fn query_all(&self, scope: NodeId, selector: &str) -> LiveditResult<Vec<NodeId>> {
        let parsed = Selector::parse(selector)?;
        Ok(self
            .element_descendants(scope)
            .into_iter()
            .filter(|id| parsed.matches(self, *id))
            .collect())
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.element(node).map(|element| element.tag.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.element(node)?.attr(name).map(str::to_string)
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.element(node)
            .map(|element| element.attrs.clone())
            .unwrap_or_default()
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: Option<&str>) -> LiveditResult<()> {
        let name = name.to_ascii_lowercase();
        let element = self
            .element_mut(node)
            .ok_or_else(|| unknown_element(node))?;
        match value {
            Some(value) => match element.attrs.iter_mut().find(|(key, _)| *key == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => element.attrs.push((name.clone(), value.to_string())),
            },
            None => {
                let before = element.attrs.len();
                element.attrs.retain(|(key, _)| *key != name);
                if element.attrs.len() == before {
                    return Ok(());
                }
            }
        }
        self.record(MutationRecord::attribute(node, name));
        Ok(())
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?.parent
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node)
            .map(|n| {
                n.children
                    .iter()
                    .copied()
                    .filter(|child| self.element(*child).is_some())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn shadow_root(&self, host: NodeId) -> Option<NodeId> {
        self.element(host)?.shadow_root
    }

    fn shadow_host(&self, shadow_root: NodeId) -> Option<NodeId> {
        match self.node(shadow_root)?.data {
            NodeData::ShadowRoot { host } => Some(host),
            _ => None,
        }
    }

    fn content_document(&self, frame: NodeId) -> Option<NodeId> {
        self.element(frame)?.content_document
    }

    fn frame_element(&self, document: NodeId) -> Option<NodeId> {
        match self.node(document)?.data {
            NodeData::Document { frame } => frame,
            _ => None,
        }
    }

    fn is_connected(&self, node: NodeId) -> bool {
        let mut cursor = node;
        loop {
            let Some(current) = self.node(cursor) else {
                return false;
            };
            match (current.parent, &current.data) {
                (Some(parent), _) => cursor = parent,
                (None, NodeData::Document { frame: None }) => return cursor == self.document,
                (None, NodeData::Document { frame: Some(frame) }) => cursor = *frame,
                (None, NodeData::ShadowRoot { host }) => cursor = *host,
                (None, _) => return false,
            }
        }
    }

    fn text_content(&self, node: NodeId) -> String {
        let Some(current) = self.node(node) else {
            return String::new();
        };
        match &current.data {
            NodeData::Text(text) => text.clone(),
            _ => current
                .children
                .iter()
                .map(|child| self.text_content(*child))
                .collect(),
        }
    }

    fn set_text_content(&mut self, node: NodeId, text: &str) -> LiveditResult<()> {
        let current = self
            .node_mut(node)
            .ok_or_else(|| LiveditError::invalid_target(format!("unknown {node}")))?;
        if let NodeData::Text(data) = &mut current.data {
            *data = text.to_string();
            self.record(MutationRecord::character_data(node));
            return Ok(());
        }
        if !matches!(current.data, NodeData::Element(_)) {
            return Err(unknown_element(node));
        }
        let removed = std::mem::take(&mut current.children);
        for child in &removed {
            if let Some(child) = self.node_mut(*child) {
                child.parent = None;
            }
        }
        let mut added = Vec::new();
        if !text.is_empty() {
            let text_node = self.alloc(NodeData::Text(text.to_string()));
            self.attach(node, text_node);
            added.push(text_node);
        }
        self.record(MutationRecord::child_list(node, added, removed));
        Ok(())
    }

    fn inline_style(&self, node: NodeId, property: &str) -> Option<String> {
        let style = self.element(node)?.attr("style")?;
        let property = property.to_ascii_lowercase();
        parse_declarations(style)
            .into_iter()
            .find(|(name, _)| *name == property)
            .map(|(_, value)| value)
    }

    fn set_inline_style(
        &mut self,
        node: NodeId,
        property: &str,
        value: Option<&str>,
    ) -> LiveditResult<()> {
        let element = self.element(node).ok_or_else(|| unknown_element(node))?;
        let property = property.to_ascii_lowercase();
        let mut declarations = element
            .attr("style")
            .map(parse_declarations)
            .unwrap_or_default();
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => match declarations.iter_mut().find(|(name, _)| *name == property) {
                Some(slot) => slot.1 = value.to_string(),
                None => declarations.push((property, value.to_string())),
            },
            None => declarations.retain(|(name, _)| *name != property),
        }
        if declarations.is_empty() {
            self.set_attribute(node, "style", None)
        } else {
            self.set_attribute(node, "style", Some(&serialize_declarations(&declarations)))
        }
    }

    fn computed_style(&self, node: NodeId, property: &str) -> Option<String> {
        if let Some(inline) = self.inline_style(node, property) {
            return Some(inline);
        }
        let property = property.to_ascii_lowercase();
        let scope = root_scope(self, node)?;
        let mut value = None;
        for style in self.element_descendants(scope) {
            if self.tag_of(style) != Some("style") {
                continue;
            }
            for rule in parse_stylesheet(&self.text_content(style)) {
                let Some(declared) = rule.value_of(&property) else {
                    continue;
                };
                let applies = rule.selectors.iter().any(|selector| {
                    Selector::parse(selector).is_ok_and(|parsed| parsed.matches(self, node))
                });
                if applies {
                    value = Some(declared.to_string());
                }
            }
        }
        value
    }

    fn outer_html(&self, node: NodeId) -> Option<String> {
        self.element(node)?;
        let mut out = String::new();
        self.write_html(node, &mut out);
        Some(out)
    }

    fn parse_element(&mut self, _document: NodeId, html: &str) -> LiveditResult<NodeId> {
        let markup = parse_markup(html)?;
        let mut roots = markup.iter().filter(|node| !node.is_blank_text());
        match (roots.next(), roots.next()) {
            (Some(root @ MarkupNode::Element { .. }), None) => self.build_node(root),
            _ => Err(LiveditError::markup(
                "markup must contain exactly one root element",
            )),
        }
    }

    fn create_element(&mut self, _document: NodeId, tag: &str) -> LiveditResult<NodeId> {
        if !valid_tag(tag) {
            return Err(LiveditError::markup(format!("invalid tag name `{tag}`")));
        }
        Ok(self.alloc(NodeData::Element(ElementData::new(tag, Vec::new()))))
    }

    fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> LiveditResult<()> {
        match self.node_kind(parent) {
            Some(NodeKind::Element | NodeKind::Document | NodeKind::ShadowRoot) => {}
            _ => {
                return Err(LiveditError::invalid_target(format!(
                    "{parent} cannot have children"
                )))
            }
        }
        if !matches!(self.node_kind(node), Some(NodeKind::Element | NodeKind::Text)) {
            return Err(LiveditError::invalid_target(format!(
                "{node} cannot be inserted"
            )));
        }
        if self.is_inclusive_ancestor(node, parent) {
            return Err(LiveditError::invalid_target(format!(
                "inserting {node} under {parent} would create a cycle"
            )));
        }
        if let Some(reference) = reference {
            if reference == node {
                return Ok(());
            }
            if self.parent(reference) != Some(parent) {
                return Err(LiveditError::invalid_target(format!(
                    "{reference} is not a child of {parent}"
                )));
            }
        }
        if let Some(old_parent) = self.detach(node) {
            self.record(MutationRecord::child_list(old_parent, Vec::new(), vec![node]));
        }
        let Some(parent_node) = self.node_mut(parent) else {
            return Err(LiveditError::invalid_target(format!("unknown {parent}")));
        };
        let index = reference
            .and_then(|r| parent_node.children.iter().position(|c| *c == r))
            .unwrap_or(parent_node.children.len());
        parent_node.children.insert(index, node);
        if let Some(inserted) = self.node_mut(node) {
            inserted.parent = Some(parent);
        }
        self.record(MutationRecord::child_list(parent, vec![node], Vec::new()));
        Ok(())
    }

    fn remove(&mut self, node: NodeId) -> LiveditResult<()> {
        if self.node(node).is_none() {
            return Err(LiveditError::invalid_target(format!("unknown {node}")));
        }
        if let Some(parent) = self.detach(node) {
            self.record(MutationRecord::child_list(parent, Vec::new(), vec![node]));
        }
        Ok(())
    }

    fn bounding_rect(&self, node: NodeId) -> Option<Rect> {
        let element = self.element(node)?;
        if !self.is_connected(node) || self.computed_style(node, "display").as_deref() == Some("none")
        {
            return None;
        }
        element
            .rect
            .or_else(|| element.attr("data-rect").and_then(parse_rect))
    }

    fn elements_from_point(&self, point: Point) -> Vec<NodeId> {
        let mut hits: Vec<NodeId> = self
            .paint_order()
            .into_iter()
            .filter(|id| self.bounding_rect(*id).is_some_and(|rect| rect.contains(point)))
            .collect();
        hits.reverse();
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{owner_document, MutationKind};

    const PAGE: &str = r#"<!DOCTYPE html>
<html><head><style>.card { color: red; } main > .card { padding: 4px; }</style></head>
<body><main id="app">
  <div class="card" data-rect="0 0 100 100"><span class="label" data-rect="10 10 20 20">One</span></div>
  <div class="card" data-rect="0 100 100 100">Two</div>
  <x-widget id="w"><template shadowrootmode="open"><button class="inner">Go</button></template></x-widget>
  <iframe id="f" srcdoc="<p id='inside'>frame</p>"></iframe>
</main></body></html>"#;

    fn page() -> MemoryDocument {
        MemoryDocument::parse(PAGE).unwrap()
    }

    fn first(doc: &MemoryDocument, selector: &str) -> NodeId {
        doc.select_first(selector).unwrap().unwrap()
    }

    mod parsing {
        use super::*;

        #[test]
        fn test_query_in_document_order() {
            let doc = page();
            let cards = doc.query_all(doc.document(), ".card").unwrap();
            assert_eq!(cards.len(), 2);
            assert_eq!(doc.text_content(cards[1]), "Two");
            assert_eq!(
                doc.query_all(doc.document(), "main > div:nth-of-type(2)").unwrap(),
                vec![cards[1]]
            );
        }

        #[test]
        fn test_query_does_not_cross_shadow_or_frames() {
            let doc = page();
            assert!(doc.query_all(doc.document(), ".inner").unwrap().is_empty());
            assert!(doc.query_all(doc.document(), "#inside").unwrap().is_empty());
        }

        #[test]
        fn test_shadow_root_attached() {
            let doc = page();
            let host = first(&doc, "#w");
            let root = doc.shadow_root(host).unwrap();
            assert_eq!(doc.node_kind(root), Some(NodeKind::ShadowRoot));
            assert_eq!(doc.shadow_host(root), Some(host));
            let inner = doc.query_all(root, ".inner").unwrap()[0];
            assert!(doc.is_connected(inner));
            assert_eq!(owner_document(&doc, inner), Some(doc.document()));
            assert!(doc.children(host).is_empty());
        }

        #[test]
        fn test_iframe_content_document() {
            let doc = page();
            let frame = first(&doc, "#f");
            let inner_doc = doc.content_document(frame).unwrap();
            assert_eq!(doc.frame_element(inner_doc), Some(frame));
            let inside = doc.query_all(inner_doc, "#inside").unwrap()[0];
            assert!(doc.is_connected(inside));
            assert_eq!(owner_document(&doc, inside), Some(inner_doc));
        }

        #[test]
        fn test_invalid_selector_is_error() {
            let doc = page();
            assert!(doc.query_all(doc.document(), "a, b").is_err());
        }
    }

    mod mutation {
        use super::*;

        #[test]
        fn test_move_emits_remove_and_add() {
            let mut doc = page();
            let main = first(&doc, "#app");
            let cards = doc.query_all(doc.document(), ".card").unwrap();
            doc.insert_before(main, cards[1], Some(cards[0])).unwrap();
            assert_eq!(doc.children(main)[0], cards[1]);
            let records = doc.take_records();
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].removed, vec![cards[1]]);
            assert_eq!(records[1].added, vec![cards[1]]);
            assert!(doc.take_records().is_empty());
        }

        #[test]
        fn test_cycle_is_rejected() {
            let mut doc = page();
            let main = first(&doc, "#app");
            let card = first(&doc, ".card");
            assert!(doc.insert_before(card, main, None).is_err());
        }

        #[test]
        fn test_removed_node_keeps_handle() {
            let mut doc = page();
            let card = first(&doc, ".card");
            doc.remove(card).unwrap();
            assert!(!doc.is_connected(card));
            assert_eq!(doc.tag_name(card).as_deref(), Some("div"));
            assert!(doc.bounding_rect(card).is_none());
        }

        #[test]
        fn test_inline_style_round_trip() {
            let mut doc = page();
            let card = first(&doc, ".card");
            doc.set_inline_style(card, "Color", Some("blue")).unwrap();
            assert_eq!(doc.inline_style(card, "color").as_deref(), Some("blue"));
            assert_eq!(doc.attribute(card, "style").as_deref(), Some("color: blue;"));
            doc.set_inline_style(card, "color", None).unwrap();
            assert_eq!(doc.attribute(card, "style"), None);
            let records = doc.take_records();
            assert!(records.iter().all(|r| r.kind
                == MutationKind::Attributes {
                    name: "style".to_string()
                }));
        }

        #[test]
        fn test_set_text_content_replaces_children() {
            let mut doc = page();
            let card = first(&doc, ".card");
            doc.set_text_content(card, "Hello").unwrap();
            assert_eq!(doc.text_content(card), "Hello");
            assert!(doc.children(card).is_empty());
            let records = doc.take_records();
            assert_eq!(records[0].kind, MutationKind::ChildList);
            assert_eq!(records[0].removed.len(), 1);
        }

        #[test]
        fn test_replace_with_markup_changes_identity() {
            let mut doc = page();
            let card = first(&doc, ".card");
            let fresh = doc
                .replace_with_markup(card, r#"<div class="card">One</div>"#)
                .unwrap();
            assert_ne!(fresh, card);
            assert!(!doc.is_connected(card));
            assert_eq!(first(&doc, ".card"), fresh);
        }
    }

    mod styling {
        use super::*;

        #[test]
        fn test_computed_style_prefers_inline_then_last_rule() {
            let mut doc = page();
            let card = first(&doc, ".card");
            assert_eq!(doc.computed_style(card, "color").as_deref(), Some("red"));
            assert_eq!(doc.computed_style(card, "padding").as_deref(), Some("4px"));
            assert_eq!(doc.computed_style(card, "margin"), None);
            doc.inject_stylesheet(".card { color: green }").unwrap();
            assert_eq!(doc.computed_style(card, "color").as_deref(), Some("green"));
            doc.set_inline_style(card, "color", Some("black")).unwrap();
            assert_eq!(doc.computed_style(card, "color").as_deref(), Some("black"));
        }

        #[test]
        fn test_display_none_has_no_box() {
            let mut doc = page();
            let card = first(&doc, ".card");
            assert!(doc.bounding_rect(card).is_some());
            doc.set_inline_style(card, "display", Some("none")).unwrap();
            assert!(doc.bounding_rect(card).is_none());
        }
    }

    mod layout {
        use super::*;

        #[test]
        fn test_hit_test_topmost_first() {
            let doc = page();
            let label = first(&doc, ".label");
            let card = first(&doc, ".card");
            assert_eq!(
                doc.elements_from_point(Point::new(15.0, 15.0)),
                vec![label, card]
            );
            assert_eq!(doc.elements_from_point(Point::new(50.0, 150.0)).len(), 1);
            assert!(doc.elements_from_point(Point::new(500.0, 500.0)).is_empty());
        }

        #[test]
        fn test_set_rect_overrides_attribute() {
            let mut doc = page();
            let card = first(&doc, ".card");
            doc.set_rect(card, Rect::new(1.0, 2.0, 3.0, 4.0)).unwrap();
            assert_eq!(doc.bounding_rect(card), Some(Rect::new(1.0, 2.0, 3.0, 4.0)));
        }
    }

    mod serialization {
        use super::*;

        #[test]
        fn test_outer_html_round_trips_through_parse_element() {
            let mut doc = page();
            let host = first(&doc, "#w");
            let html = doc.outer_html(host).unwrap();
            assert_eq!(
                html,
                r#"<x-widget id="w"><template shadowrootmode="open"><button class="inner">Go</button></template></x-widget>"#
            );
            let copy = doc.parse_element(doc.document(), &html).unwrap();
            assert!(doc.shadow_root(copy).is_some());
            assert!(!doc.is_connected(copy));
        }

        #[test]
        fn test_parse_element_requires_single_root() {
            let mut doc = MemoryDocument::new();
            let root = doc.document();
            assert!(doc.parse_element(root, "<p>a</p><p>b</p>").is_err());
            assert!(doc.parse_element(root, "text").is_err());
            assert!(doc.parse_element(root, "  <p>a</p>\n").is_ok());
        }

        #[test]
        fn test_create_element_validates_tag() {
            let mut doc = MemoryDocument::new();
            let root = doc.document();
            assert!(doc.create_element(root, "section").is_ok());
            assert!(doc.create_element(root, "1bad").is_err());
        }
    }
}
