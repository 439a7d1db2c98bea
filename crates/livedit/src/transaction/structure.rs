//! Structural edits: wrap, unwrap, delete, duplicate.
//!
//! Wrap and unwrap are element-centric: the transaction's locators follow
//! the element itself and are refreshed after every apply. Delete and
//! duplicate store the element's outer markup and an [`InsertionPoint`]
//! (sibling anchor first, index as fallback) so the element can be
//! recreated by reparsing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{
    AnchorPosition, InsertionPoint, Snapshot, StructureAction, StructureData, Transaction, TxId,
    TxKind, TransactionManager,
};
use crate::clock::Clock;
use crate::config::LocatorConfig;
use crate::dom::{
    element_index, next_element_sibling, owner_document, DocumentHost, NodeId, NodeKind,
};
use crate::locator::{build_locator, Locator};
use crate::result::{LiveditError, LiveditResult, ReplayDirection};

/// Tags that are never the subject or container of a structural edit
const PROTECTED_TAGS: &[&str] = &["html", "head", "body"];

/// Default tag for a wrap without an explicit wrapper
const DEFAULT_WRAPPER_TAG: &str = "div";

/// What to do to an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureRequest {
    /// Edit kind
    pub action: StructureAction,
    /// Wrapper tag for wrap (default `div`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper_tag: Option<String>,
    /// Inline styles for a created wrapper
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper_styles: Option<BTreeMap<String, String>>,
}

impl StructureRequest {
    /// Request with no wrapper options
    #[must_use]
    pub const fn new(action: StructureAction) -> Self {
        Self {
            action,
            wrapper_tag: None,
            wrapper_styles: None,
        }
    }

    /// Wrap in a container with the given tag
    #[must_use]
    pub fn wrap(tag: impl Into<String>) -> Self {
        Self {
            wrapper_tag: Some(tag.into()),
            ..Self::new(StructureAction::Wrap)
        }
    }

    /// Add an inline style to the created wrapper
    #[must_use]
    pub fn with_wrapper_style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.wrapper_styles
            .get_or_insert_with(BTreeMap::new)
            .insert(property.into(), value.into());
        self
    }
}

// =============================================================================
// Target validation
// =============================================================================

fn is_protected<H: DocumentHost + ?Sized>(host: &H, node: NodeId) -> bool {
    match host.node_kind(node) {
        Some(NodeKind::Element) => host
            .tag_name(node)
            .is_some_and(|tag| PROTECTED_TAGS.contains(&tag.as_str())),
        _ => true,
    }
}

fn describe<H: DocumentHost + ?Sized>(host: &H, node: NodeId) -> String {
    match host.node_kind(node) {
        Some(NodeKind::Element) => format!("<{}>", host.tag_name(node).unwrap_or_default()),
        Some(NodeKind::Document) => "the document".to_string(),
        Some(NodeKind::ShadowRoot) => "a shadow root".to_string(),
        Some(NodeKind::Text) => "a text node".to_string(),
        None => format!("unknown {node}"),
    }
}

/// Reject protected subjects; returns the node's container
pub(super) fn check_subject<H: DocumentHost + ?Sized>(
    host: &H,
    node: NodeId,
    operation: &str,
) -> LiveditResult<NodeId> {
    if is_protected(host, node) {
        return Err(LiveditError::structure_rejected(format!(
            "cannot {operation} {}",
            describe(host, node)
        )));
    }
    let parent = host.parent(node).ok_or_else(|| {
        LiveditError::structure_rejected(format!("cannot {operation} a detached element"))
    })?;
    check_container(host, parent, operation)?;
    Ok(parent)
}

/// Reject protected containers
pub(super) fn check_container<H: DocumentHost + ?Sized>(
    host: &H,
    container: NodeId,
    operation: &str,
) -> LiveditResult<()> {
    if is_protected(host, container) {
        return Err(LiveditError::structure_rejected(format!(
            "cannot {operation} inside {}",
            describe(host, container)
        )));
    }
    Ok(())
}

fn check_sole_child<H: DocumentHost + ?Sized>(
    host: &H,
    node: NodeId,
    wrapper: NodeId,
    expected_tag: Option<&str>,
) -> LiveditResult<()> {
    if let Some(tag) = expected_tag {
        if host.tag_name(wrapper).as_deref() != Some(tag) {
            return Err(LiveditError::invalid_target(format!(
                "container is {}, expected <{tag}>",
                describe(host, wrapper)
            )));
        }
    }
    if host.children(wrapper).as_slice() != [node] {
        return Err(LiveditError::structure_rejected(
            "element is not the only child of its container",
        ));
    }
    Ok(())
}

// =============================================================================
// Positions
// =============================================================================

/// Resolve a locator or fail with a replay message
pub(super) fn resolve<H: DocumentHost + ?Sized>(
    host: &H,
    locator: &Locator,
    role: &str,
) -> LiveditResult<NodeId> {
    locator.locate(host).ok_or_else(|| {
        LiveditError::invalid_target(format!(
            "{role} `{}` could not be resolved",
            locator.identity_key()
        ))
    })
}

/// Describe slot `index` among `parent`'s element children, ignoring `exclude`
pub(super) fn point_at<H: DocumentHost + ?Sized>(
    host: &H,
    parent: NodeId,
    index: usize,
    exclude: Option<NodeId>,
    config: &LocatorConfig,
) -> LiveditResult<InsertionPoint> {
    let siblings: Vec<NodeId> = host
        .children(parent)
        .into_iter()
        .filter(|child| Some(*child) != exclude)
        .collect();
    let (anchor, anchor_position) = match siblings.get(index) {
        Some(next) => (Some(*next), AnchorPosition::Before),
        None => match index.checked_sub(1).and_then(|i| siblings.get(i)) {
            Some(previous) => (Some(*previous), AnchorPosition::After),
            None => (None, AnchorPosition::Before),
        },
    };
    Ok(InsertionPoint {
        parent_locator: build_locator(host, parent, config)?,
        insert_index: index,
        anchor_locator: anchor
            .map(|anchor| build_locator(host, anchor, config))
            .transpose()?,
        anchor_position,
    })
}

/// Current position of an attached element
pub(super) fn insertion_point_of<H: DocumentHost + ?Sized>(
    host: &H,
    node: NodeId,
    config: &LocatorConfig,
) -> LiveditResult<InsertionPoint> {
    let parent = host
        .parent(node)
        .ok_or_else(|| LiveditError::invalid_target(format!("{node} is detached")))?;
    let index = element_index(host, node).unwrap_or(0);
    point_at(host, parent, index, Some(node), config)
}

/// Resolve an insertion point to `(parent, reference)`. Falls back to the
/// index when the anchor is gone or no longer a child of the parent.
pub(super) fn resolve_insertion<H: DocumentHost + ?Sized>(
    host: &H,
    point: &InsertionPoint,
    moving: Option<NodeId>,
) -> LiveditResult<(NodeId, Option<NodeId>)> {
    let parent = resolve(host, &point.parent_locator, "container")?;
    let siblings: Vec<NodeId> = host
        .children(parent)
        .into_iter()
        .filter(|child| Some(*child) != moving)
        .collect();
    let anchor = point
        .anchor_locator
        .as_ref()
        .and_then(|locator| locator.locate(host))
        .and_then(|anchor| siblings.iter().position(|s| *s == anchor));
    let reference = match (anchor, point.anchor_position) {
        (Some(i), AnchorPosition::Before) => siblings.get(i).copied(),
        (Some(i), AnchorPosition::After) => siblings.get(i + 1).copied(),
        (None, _) => siblings.get(point.insert_index).copied(),
    };
    Ok((parent, reference))
}

// =============================================================================
// Primitives
// =============================================================================

fn document_of<H: DocumentHost + ?Sized>(host: &H, node: NodeId) -> NodeId {
    owner_document(host, node).unwrap_or_else(|| host.document())
}

/// Put `node` inside a new wrapper at its current position.
///
/// On failure the wrapper is removed again.
fn wrap_node<H: DocumentHost + ?Sized>(
    host: &mut H,
    node: NodeId,
    tag: &str,
    attributes: &[(String, String)],
    styles: Option<&BTreeMap<String, String>>,
) -> LiveditResult<NodeId> {
    let parent = host
        .parent(node)
        .ok_or_else(|| LiveditError::invalid_target(format!("{node} is detached")))?;
    let document = document_of(host, node);
    let wrapper = host.create_element(document, tag)?;
    let placed = decorate(host, wrapper, attributes, styles)
        .and_then(|()| host.insert_before(parent, wrapper, Some(node)))
        .and_then(|()| host.insert_before(wrapper, node, None));
    if let Err(error) = placed {
        if let Err(cleanup) = host.remove(wrapper) {
            warn!(wrapper = %wrapper, error = %cleanup, "could not discard wrapper");
        }
        return Err(error);
    }
    Ok(wrapper)
}

fn decorate<H: DocumentHost + ?Sized>(
    host: &mut H,
    wrapper: NodeId,
    attributes: &[(String, String)],
    styles: Option<&BTreeMap<String, String>>,
) -> LiveditResult<()> {
    for (name, value) in attributes {
        host.set_attribute(wrapper, name, Some(value))?;
    }
    for (property, value) in styles.into_iter().flatten() {
        host.set_inline_style(wrapper, property, Some(value))?;
    }
    Ok(())
}

/// Replace the node's wrapper with the node itself
fn hoist<H: DocumentHost + ?Sized>(host: &mut H, node: NodeId) -> LiveditResult<()> {
    let wrapper = host
        .parent(node)
        .ok_or_else(|| LiveditError::invalid_target(format!("{node} is detached")))?;
    let outer = host
        .parent(wrapper)
        .ok_or_else(|| LiveditError::invalid_target("container is detached"))?;
    host.insert_before(outer, node, Some(wrapper))?;
    host.remove(wrapper)
}

fn structure_data(tx: &Transaction) -> LiveditResult<StructureData> {
    match &tx.kind {
        TxKind::Structure(data) => Ok(data.clone()),
        _ => Err(LiveditError::invalid_target(format!(
            "transaction {} is not structural",
            tx.id
        ))),
    }
}

impl<C: Clock> TransactionManager<C> {
    /// Apply a structural edit and record it.
    ///
    /// Protected targets are rejected before anything is mutated and no
    /// transaction is created.
    pub fn apply_structure<H: DocumentHost + ?Sized>(
        &mut self,
        host: &mut H,
        node: NodeId,
        request: &StructureRequest,
    ) -> LiveditResult<TxId> {
        let action = request.action;
        let verb = action.to_string();
        let parent = match check_subject(host, node, &verb) {
            Ok(parent) => parent,
            Err(error) => return Err(self.report(error)),
        };
        if action == StructureAction::Unwrap {
            let checked = host
                .parent(parent)
                .ok_or_else(|| LiveditError::structure_rejected("container is detached"))
                .and_then(|_| check_sole_child(host, node, parent, None));
            if let Err(error) = checked {
                return Err(self.report(error));
            }
        }

        let element_key = self.element_key(node);
        let config = self.locator_config().clone();
        let target = build_locator(host, node, &config)?;
        let mut data = StructureData {
            action,
            wrapper_tag: None,
            wrapper_styles: None,
            wrapper_attributes: None,
            position: None,
            html: None,
        };

        let after = match action {
            StructureAction::Wrap => {
                let tag = request
                    .wrapper_tag
                    .clone()
                    .unwrap_or_else(|| DEFAULT_WRAPPER_TAG.to_string());
                wrap_node(host, node, &tag, &[], request.wrapper_styles.as_ref())?;
                data.wrapper_tag = Some(tag);
                data.wrapper_styles.clone_from(&request.wrapper_styles);
                Snapshot::located(build_locator(host, node, &config)?)
            }
            StructureAction::Unwrap => {
                data.wrapper_tag = host.tag_name(parent);
                data.wrapper_attributes = Some(host.attributes(parent));
                hoist(host, node)?;
                Snapshot::located(build_locator(host, node, &config)?)
            }
            StructureAction::Delete => {
                let html = host
                    .outer_html(node)
                    .ok_or_else(|| LiveditError::invalid_target("element cannot be serialized"))?;
                let index = element_index(host, node).unwrap_or(0);
                host.remove(node)?;
                data.position = Some(point_at(host, parent, index, None, &config)?);
                data.html = Some(html);
                Snapshot::located(target.clone())
            }
            StructureAction::Duplicate => {
                let html = host
                    .outer_html(node)
                    .ok_or_else(|| LiveditError::invalid_target("element cannot be serialized"))?;
                let clone = host.parse_element(document_of(host, node), &html)?;
                host.set_attribute(clone, "id", None)?;
                let reference = next_element_sibling(host, node);
                host.insert_before(parent, clone, reference)?;
                data.html = host.outer_html(clone);
                data.position = Some(InsertionPoint {
                    parent_locator: build_locator(host, parent, &config)?,
                    insert_index: element_index(host, clone).unwrap_or(0),
                    anchor_locator: Some(build_locator(host, node, &config)?),
                    anchor_position: AnchorPosition::After,
                });
                Snapshot::located(build_locator(host, clone, &config)?)
            }
        };

        debug!(action = %action, target = %target.identity_key(), "structure applied");
        let timestamp_ms = self.clock().now_ms();
        Ok(self.commit(&*host, Transaction {
            id: TxId(0),
            before: Snapshot::located(target.clone()),
            target,
            element_key: Some(element_key),
            after,
            timestamp_ms,
            merged: false,
            kind: TxKind::Structure(data),
        }))
    }

    pub(super) fn replay_structure<H: DocumentHost + ?Sized>(
        &mut self,
        host: &mut H,
        tx: &mut Transaction,
        direction: ReplayDirection,
    ) -> LiveditResult<()> {
        let mut data = structure_data(tx)?;
        let config = self.locator_config().clone();
        let undo = direction == ReplayDirection::Undo;
        let source = if undo { &tx.after } else { &tx.before };
        let tag = data
            .wrapper_tag
            .clone()
            .unwrap_or_else(|| DEFAULT_WRAPPER_TAG.to_string());

        match (data.action, direction) {
            (StructureAction::Wrap, ReplayDirection::Undo)
            | (StructureAction::Unwrap, ReplayDirection::Redo) => {
                let node = resolve(host, &source.locator, "element")?;
                let wrapper = host
                    .parent(node)
                    .ok_or_else(|| LiveditError::invalid_target("element is detached"))?;
                check_sole_child(host, node, wrapper, Some(&tag))?;
                check_container(host, wrapper, "unwrap")?;
                hoist(host, node)?;
                refresh(host, node, side_mut(tx, direction), &config);
            }
            (StructureAction::Wrap, ReplayDirection::Redo)
            | (StructureAction::Unwrap, ReplayDirection::Undo) => {
                let node = resolve(host, &source.locator, "element")?;
                check_subject(host, node, "wrap")?;
                let attributes = data.wrapper_attributes.clone().unwrap_or_default();
                wrap_node(host, node, &tag, &attributes, data.wrapper_styles.as_ref())?;
                refresh(host, node, side_mut(tx, direction), &config);
            }
            (StructureAction::Delete, ReplayDirection::Undo)
            | (StructureAction::Duplicate, ReplayDirection::Redo) => {
                let position = data
                    .position
                    .as_ref()
                    .ok_or_else(|| LiveditError::invalid_target("missing position"))?;
                let html = data
                    .html
                    .as_deref()
                    .ok_or_else(|| LiveditError::invalid_target("missing markup"))?;
                let (parent, reference) = resolve_insertion(host, position, None)?;
                check_container(host, parent, "insert")?;
                let fresh = host.parse_element(document_of(host, parent), html)?;
                host.insert_before(parent, fresh, reference)?;
                if undo {
                    if let Some(key) = &tx.element_key {
                        self.assign_element_key(fresh, key.clone());
                    }
                }
                refresh(host, fresh, side_mut(tx, direction), &config);
            }
            (StructureAction::Delete, ReplayDirection::Redo)
            | (StructureAction::Duplicate, ReplayDirection::Undo) => {
                let node = resolve(host, &source.locator, "element")?;
                let parent = check_subject(host, node, "remove")?;
                let index = element_index(host, node).unwrap_or(0);
                host.remove(node)?;
                if !undo {
                    if let Ok(point) = point_at(host, parent, index, None, &config) {
                        data.position = Some(point);
                    }
                }
            }
        }
        tx.kind = TxKind::Structure(data);
        Ok(())
    }
}

/// Snapshot written by a replay step: `before` on undo, `after` on redo
pub(super) fn side_mut(tx: &mut Transaction, direction: ReplayDirection) -> &mut Snapshot {
    match direction {
        ReplayDirection::Undo => &mut tx.before,
        ReplayDirection::Redo => &mut tx.after,
    }
}

/// Rebuild a snapshot's locator from the live node. Never fails the step:
/// the tree is already mutated at this point.
pub(super) fn refresh<H: DocumentHost + ?Sized>(
    host: &H,
    node: NodeId,
    snapshot: &mut Snapshot,
    config: &LocatorConfig,
) {
    if let Ok(locator) = build_locator(host, node, config) {
        snapshot.locator = locator;
    }
}
