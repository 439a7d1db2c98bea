//! Durable element references.
//!
//! A [`Locator`] is a portable description of how to re-find one element in
//! a tree that may have been re-rendered since it was built: ordered
//! candidate selectors (most specific first), a structural [`Fingerprint`],
//! the child-index path from the containment root, and the frame and shadow
//! host hops needed to reach that root from the top document.
//!
//! Resolution is strict: a selector must match exactly one element and that
//! element must agree with the fingerprint on tag and stored id. A miss is
//! an ordinary `None`, never an error.

mod candidates;
mod fingerprint;

pub use candidates::{generate_selector_candidates, structural_path, TEST_ATTRIBUTES};
pub use fingerprint::Fingerprint;

pub(crate) use candidates::scope_of;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::LocatorConfig;
use crate::dom::{element_index, parent_element, DocumentHost, NodeId, NodeKind};
use crate::result::{LiveditError, LiveditResult};

/// Separator between hops in an identity key
const HOP_SEPARATOR: &str = " >>> ";

/// Portable reference to one element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    /// Candidate selectors, most specific first
    pub selectors: Vec<String>,
    /// Structural signature used to sanity-check matches
    pub fingerprint: Fingerprint,
    /// Element-child indices from the containment root
    pub path: Vec<usize>,
    /// Shadow host selectors from the outermost host inward
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_host_chain: Option<Vec<String>>,
    /// Frame selectors from the top document inward
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_chain: Option<Vec<String>>,
    /// Source location recorded by the build tooling, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_source: Option<String>,
}

impl Locator {
    /// Build a locator for a live element
    pub fn build<H: DocumentHost + ?Sized>(
        host: &H,
        node: NodeId,
        config: &LocatorConfig,
    ) -> LiveditResult<Self> {
        build_locator(host, node, config)
    }

    /// Resolve against the host's top-level document
    pub fn locate<H: DocumentHost + ?Sized>(&self, host: &H) -> Option<NodeId> {
        locate_element(host, self, host.document())
    }

    /// Most specific selector
    #[must_use]
    pub fn primary_selector(&self) -> Option<&str> {
        self.selectors.first().map(String::as_str)
    }

    /// Merge identity: the frame and shadow hops plus the primary selector
    #[must_use]
    pub fn identity_key(&self) -> String {
        self.frame_chain
            .iter()
            .flatten()
            .chain(self.shadow_host_chain.iter().flatten())
            .map(String::as_str)
            .chain(self.primary_selector())
            .collect::<Vec<_>>()
            .join(HOP_SEPARATOR)
    }
}

/// Assemble the full locator for a live element
pub fn build_locator<H: DocumentHost + ?Sized>(
    host: &H,
    node: NodeId,
    config: &LocatorConfig,
) -> LiveditResult<Locator> {
    if host.node_kind(node) != Some(NodeKind::Element) {
        return Err(LiveditError::invalid_target(format!(
            "cannot build a locator for {node}: not an element"
        )));
    }
    let scope = scope_of(host, node);
    let selectors = generate_selector_candidates(host, node, scope, config.max_candidates);
    let fingerprint = Fingerprint::compute(
        host,
        node,
        config.max_fingerprint_classes,
        config.text_hint_len,
    );
    let (shadow_host_chain, frame_chain) = scope_chains(host, scope);
    let debug_source = host
        .attribute(node, &config.debug_source_attribute)
        .filter(|value| !value.is_empty());

    trace!(
        node = %node,
        primary = selectors.first().map(String::as_str).unwrap_or(""),
        "built locator"
    );
    Ok(Locator {
        selectors,
        fingerprint,
        path: child_index_path(host, node),
        shadow_host_chain,
        frame_chain,
        debug_source,
    })
}

/// Element-child indices from the containment root down to `node`
pub fn child_index_path<H: DocumentHost + ?Sized>(host: &H, node: NodeId) -> Vec<usize> {
    let mut path = Vec::new();
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        match element_index(host, current) {
            Some(index) => path.push(index),
            None => break,
        }
        cursor = parent_element(host, current);
    }
    path.reverse();
    path
}

type Chains = (Option<Vec<String>>, Option<Vec<String>>);

fn scope_chains<H: DocumentHost + ?Sized>(host: &H, scope: NodeId) -> Chains {
    let mut shadow_hops = Vec::new();
    let mut frame_hops = Vec::new();
    let mut current = scope;
    loop {
        let (hop, outer, is_frame) = match host.node_kind(current) {
            Some(NodeKind::ShadowRoot) => match host.shadow_host(current) {
                Some(shadow_host) => (shadow_host, scope_of(host, shadow_host), false),
                None => break,
            },
            Some(NodeKind::Document) => match host.frame_element(current) {
                Some(frame) => (frame, scope_of(host, frame), true),
                None => break,
            },
            _ => break,
        };
        let selector = generate_selector_candidates(host, hop, outer, 1)
            .into_iter()
            .next()
            .unwrap_or_default();
        if is_frame {
            frame_hops.push(selector);
        } else {
            shadow_hops.push(selector);
        }
        current = outer;
    }
    shadow_hops.reverse();
    frame_hops.reverse();
    let non_empty = |hops: Vec<String>| (!hops.is_empty()).then_some(hops);
    (non_empty(shadow_hops), non_empty(frame_hops))
}

fn single_match<H: DocumentHost + ?Sized>(host: &H, scope: NodeId, selector: &str) -> Option<NodeId> {
    match host.query_all(scope, selector).ok()?.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

/// Walk the frame then shadow hops from `root` to the locator's scope
pub fn locate_scope<H: DocumentHost + ?Sized>(
    host: &H,
    locator: &Locator,
    root: NodeId,
) -> Option<NodeId> {
    let mut scope = root;
    for selector in locator.frame_chain.iter().flatten() {
        let frame = single_match(host, scope, selector)?;
        scope = host.content_document(frame)?;
    }
    for selector in locator.shadow_host_chain.iter().flatten() {
        let shadow_host = single_match(host, scope, selector)?;
        scope = host.shadow_root(shadow_host)?;
    }
    Some(scope)
}

/// Strictly resolve a locator: first selector matching exactly one element
/// that agrees with the fingerprint
pub fn locate_element<H: DocumentHost + ?Sized>(
    host: &H,
    locator: &Locator,
    root: NodeId,
) -> Option<NodeId> {
    let scope = locate_scope(host, locator, root)?;
    let found = locator.selectors.iter().find_map(|selector| {
        single_match(host, scope, selector)
            .filter(|node| locator.fingerprint.agrees_with(host, *node))
    });
    if found.is_none() {
        trace!(key = %locator.identity_key(), "locator miss");
    }
    found
}
