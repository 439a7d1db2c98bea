//! Document capabilities consumed by the editing core.
//!
//! The live tree is owned by someone else (a browser page, a test harness).
//! [`DocumentHost`] is the narrow set of capabilities the locator, the
//! transaction manager and the verifier need from it. [`MemoryDocument`] is
//! a complete in-memory implementation used by tests and edit scripts.
//!
//! Node handles ([`NodeId`]) are opaque and may dangle: a removed node keeps
//! its handle, but [`DocumentHost::is_connected`] turns false. Durable
//! references are [`crate::Locator`] records, never handles.

mod markup;
mod memory;
mod selector;
mod style;

pub use markup::{escape_attribute, escape_text, parse_markup, MarkupNode};
pub use memory::MemoryDocument;
pub use selector::{escape_ident, escape_string, Selector};
pub use style::{parse_declarations, parse_stylesheet, serialize_declarations, StyleRule};

use serde::{Deserialize, Serialize};

use crate::result::LiveditResult;

/// Opaque handle to a node in a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Node categories the core distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Document (top-level or a frame's content document)
    Document,
    /// Shadow root attached to a host element
    ShadowRoot,
    /// Element
    Element,
    /// Text or other character data
    Text,
}

impl NodeKind {
    /// Whether this node is a containment root (document or shadow root)
    #[must_use]
    pub const fn is_scope(self) -> bool {
        matches!(self, Self::Document | Self::ShadowRoot)
    }
}

/// A point in viewport coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl Point {
    /// Create a new point
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    #[must_use]
    pub fn distance(&self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// An axis-aligned rectangle in viewport coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether the point lies inside (edges inclusive)
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    /// Whether the rectangle has no area
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// What a change notification describes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationKind {
    /// Children added to or removed from `target`
    ChildList,
    /// Attribute `name` changed on `target`
    Attributes {
        /// Attribute name
        name: String,
    },
    /// Character data of `target` changed
    CharacterData,
}

/// One change notification, delivered in synchronous batches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    /// Kind of change
    pub kind: MutationKind,
    /// Node the change happened on (the parent for child-list changes)
    pub target: NodeId,
    /// Nodes added (child-list only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<NodeId>,
    /// Nodes removed (child-list only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<NodeId>,
}

impl MutationRecord {
    /// Child-list record
    #[must_use]
    pub fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            added,
            removed,
        }
    }

    /// Attribute record
    #[must_use]
    pub fn attribute(target: NodeId, name: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Attributes { name: name.into() },
            target,
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Character-data record
    #[must_use]
    pub fn character_data(target: NodeId) -> Self {
        Self {
            kind: MutationKind::CharacterData,
            target,
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// Capabilities of a live document tree.
///
/// All reads are infallible and return `None`/empty on unknown handles.
/// Writes and queries return `Result` so that failures surface as values.
pub trait DocumentHost {
    /// Top-level document node
    fn document(&self) -> NodeId;

    /// Kind of a node, `None` for unknown handles
    fn node_kind(&self, node: NodeId) -> Option<NodeKind>;

    /// All elements matching `selector` inside `scope`, in document order.
    /// Does not descend into shadow roots or frames.
    fn query_all(&self, scope: NodeId, selector: &str) -> LiveditResult<Vec<NodeId>>;

    /// Lower-case tag name of an element
    fn tag_name(&self, node: NodeId) -> Option<String>;

    /// Attribute value
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// All attributes in source order
    fn attributes(&self, node: NodeId) -> Vec<(String, String)>;

    /// Set (`Some`) or remove (`None`) an attribute
    fn set_attribute(&mut self, node: NodeId, name: &str, value: Option<&str>) -> LiveditResult<()>;

    /// Parent node of any kind (`None` for scopes and detached roots)
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Element children in order
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Shadow root attached to a host element
    fn shadow_root(&self, host: NodeId) -> Option<NodeId>;

    /// Host element of a shadow root
    fn shadow_host(&self, shadow_root: NodeId) -> Option<NodeId>;

    /// Content document of a frame element
    fn content_document(&self, frame: NodeId) -> Option<NodeId>;

    /// Frame element embedding a document
    fn frame_element(&self, document: NodeId) -> Option<NodeId>;

    /// Whether the node is reachable from the top-level document
    fn is_connected(&self, node: NodeId) -> bool;

    /// Concatenated descendant text
    fn text_content(&self, node: NodeId) -> String;

    /// Replace all children with a single text node
    fn set_text_content(&mut self, node: NodeId, text: &str) -> LiveditResult<()>;

    /// Inline style declaration value
    fn inline_style(&self, node: NodeId, property: &str) -> Option<String>;

    /// Set (`Some`) or remove (`None`) an inline style declaration
    fn set_inline_style(
        &mut self,
        node: NodeId,
        property: &str,
        value: Option<&str>,
    ) -> LiveditResult<()>;

    /// Computed value of a style property
    fn computed_style(&self, node: NodeId, property: &str) -> Option<String>;

    /// Serialized outer markup
    fn outer_html(&self, node: NodeId) -> Option<String>;

    /// Parse markup into exactly one detached root element owned by `document`
    fn parse_element(&mut self, document: NodeId, html: &str) -> LiveditResult<NodeId>;

    /// Create a detached element owned by `document`
    fn create_element(&mut self, document: NodeId, tag: &str) -> LiveditResult<NodeId>;

    /// Insert (or move) `node` under `parent` before `reference`, or append
    fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> LiveditResult<()>;

    /// Detach a node from its parent
    fn remove(&mut self, node: NodeId) -> LiveditResult<()>;

    /// Layout box, `None` when the node is not rendered
    fn bounding_rect(&self, node: NodeId) -> Option<Rect>;

    /// Elements under a point, topmost first
    fn elements_from_point(&self, point: Point) -> Vec<NodeId>;

    /// Ranked selection candidates under a point, when the host has a smarter
    /// picker than a plain hit test
    fn ranked_candidates_at(&self, _point: Point) -> Option<Vec<NodeId>> {
        None
    }

    /// Class tokens in order
    fn class_list(&self, node: NodeId) -> Vec<String> {
        self.attribute(node, "class")
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Replace the class list (an empty list removes the attribute)
    fn set_class_list(&mut self, node: NodeId, classes: &[String]) -> LiveditResult<()> {
        if classes.is_empty() {
            self.set_attribute(node, "class", None)
        } else {
            self.set_attribute(node, "class", Some(&classes.join(" ")))
        }
    }
}

/// Whether the node is an element
pub fn is_element<H: DocumentHost + ?Sized>(host: &H, node: NodeId) -> bool {
    host.node_kind(node) == Some(NodeKind::Element)
}

/// Parent, if it is an element
pub fn parent_element<H: DocumentHost + ?Sized>(host: &H, node: NodeId) -> Option<NodeId> {
    host.parent(node).filter(|parent| is_element(host, *parent))
}

/// Nearest containment root (document or shadow root) of a node
pub fn root_scope<H: DocumentHost + ?Sized>(host: &H, node: NodeId) -> Option<NodeId> {
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        if host.node_kind(current).is_some_and(NodeKind::is_scope) {
            return Some(current);
        }
        cursor = host.parent(current);
    }
    None
}

/// Document owning a node, crossing shadow boundaries but not frames
pub fn owner_document<H: DocumentHost + ?Sized>(host: &H, node: NodeId) -> Option<NodeId> {
    let mut scope = root_scope(host, node)?;
    loop {
        match host.node_kind(scope)? {
            NodeKind::Document => return Some(scope),
            NodeKind::ShadowRoot => {
                let shadow_host = host.shadow_host(scope)?;
                scope = root_scope(host, shadow_host)?;
            }
            NodeKind::Element | NodeKind::Text => return None,
        }
    }
}

/// Whether `ancestor` is `node` or one of its ancestors (same tree only)
pub fn contains<H: DocumentHost + ?Sized>(host: &H, ancestor: NodeId, node: NodeId) -> bool {
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        if current == ancestor {
            return true;
        }
        cursor = host.parent(current);
    }
    false
}

/// Position of an element among its parent's element children
pub fn element_index<H: DocumentHost + ?Sized>(host: &H, node: NodeId) -> Option<usize> {
    let parent = host.parent(node)?;
    host.children(parent).iter().position(|child| *child == node)
}

/// Next element sibling
pub fn next_element_sibling<H: DocumentHost + ?Sized>(host: &H, node: NodeId) -> Option<NodeId> {
    let parent = host.parent(node)?;
    let siblings = host.children(parent);
    let index = siblings.iter().position(|child| *child == node)?;
    siblings.get(index + 1).copied()
}

/// The `id` attribute when non-empty
pub fn element_id<H: DocumentHost + ?Sized>(host: &H, node: NodeId) -> Option<String> {
    host.attribute(node, "id").filter(|id| !id.is_empty())
}

/// Collapse runs of whitespace and trim
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Center of the node's layout box
pub fn center_of<H: DocumentHost + ?Sized>(host: &H, node: NodeId) -> Option<Point> {
    host.bounding_rect(node).map(|rect| rect.center())
}
