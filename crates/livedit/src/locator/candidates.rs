//! Selector candidate generation.

use tracing::trace;

use crate::dom::{
    element_id, escape_ident, escape_string, parent_element, root_scope, DocumentHost, NodeId,
};

/// Attributes test fixtures conventionally carry, in priority order
pub const TEST_ATTRIBUTES: &[&str] = &[
    "data-testid",
    "data-test-id",
    "data-test",
    "data-cy",
    "data-qa",
    "name",
    "title",
    "alt",
    "aria-label",
];

/// Cap on class tokens considered for combinations
const MAX_COMBINATION_CLASSES: usize = 8;

/// Whether `selector` matches exactly `node` inside `root`
pub(crate) fn is_unique<H: DocumentHost + ?Sized>(
    host: &H,
    root: NodeId,
    selector: &str,
    node: NodeId,
) -> bool {
    host.query_all(root, selector)
        .is_ok_and(|matches| matches.as_slice() == [node])
}

/// Ordered candidate selectors for `node`, each unique inside `root`.
///
/// Tiers, most specific first: id, test attributes, class combinations,
/// the structural path from the containment root, and an anchor plus
/// relative path. At most `max` uniquely-resolving candidates are kept; the
/// structural path is always present on top of them.
pub fn generate_selector_candidates<H: DocumentHost + ?Sized>(
    host: &H,
    node: NodeId,
    root: NodeId,
    max: usize,
) -> Vec<String> {
    let Some(tag) = host.tag_name(node) else {
        return Vec::new();
    };
    let mut unique: Vec<String> = Vec::new();

    if let Some(id) = element_id(host, node) {
        let selector = format!("#{}", escape_ident(&id));
        if is_unique(host, root, &selector, node) {
            unique.push(selector);
        }
    }

    if let Some(selector) = test_attribute_candidate(host, node, root, &tag) {
        unique.push(selector);
    }

    unique.extend(class_candidates(host, node, root, &tag));

    let structural = structural_path(host, node, root);
    let anchor = anchored_candidate(host, node, root);

    let mut seen = std::collections::HashSet::new();
    unique.retain(|selector| *selector != structural && seen.insert(selector.clone()));
    unique.truncate(max);
    unique.push(structural);
    if let Some(anchor) = anchor.filter(|anchor| !unique.contains(anchor)) {
        if unique.len() <= max {
            unique.push(anchor);
        }
    }
    trace!(node = %node, candidates = unique.len(), "generated selector candidates");
    unique
}

fn test_attribute_candidate<H: DocumentHost + ?Sized>(
    host: &H,
    node: NodeId,
    root: NodeId,
    tag: &str,
) -> Option<String> {
    for attr in TEST_ATTRIBUTES {
        let Some(value) = host.attribute(node, attr).filter(|v| !v.is_empty()) else {
            continue;
        };
        let alone = attribute_selector(attr, &value);
        if is_unique(host, root, &alone, node) {
            return Some(alone);
        }
        let prefixed = format!("{}{alone}", escape_ident(tag));
        if is_unique(host, root, &prefixed, node) {
            return Some(prefixed);
        }
    }
    None
}

fn attribute_selector(attr: &str, value: &str) -> String {
    format!("[{attr}=\"{}\"]", escape_string(value))
}

fn class_candidates<H: DocumentHost + ?Sized>(
    host: &H,
    node: NodeId,
    root: NodeId,
    tag: &str,
) -> Vec<String> {
    let classes: Vec<String> = host
        .class_list(node)
        .into_iter()
        .take(MAX_COMBINATION_CLASSES)
        .map(|class| format!(".{}", escape_ident(&class)))
        .collect();
    let tag = escape_ident(tag);
    let tiers = [
        first_unique(host, node, root, classes.iter().cloned()),
        first_unique(host, node, root, classes.iter().map(|class| format!("{tag}{class}"))),
        first_unique(host, node, root, pairs(&classes)),
        first_unique(host, node, root, triples(&classes)),
    ];
    tiers.into_iter().flatten().collect()
}

fn first_unique<H: DocumentHost + ?Sized>(
    host: &H,
    node: NodeId,
    root: NodeId,
    candidates: impl IntoIterator<Item = String>,
) -> Option<String> {
    candidates
        .into_iter()
        .find(|selector| is_unique(host, root, selector, node))
}

fn pairs(classes: &[String]) -> impl Iterator<Item = String> + '_ {
    (0..classes.len()).flat_map(move |i| {
        (i + 1..classes.len()).map(move |j| format!("{}{}", classes[i], classes[j]))
    })
}

fn triples(classes: &[String]) -> impl Iterator<Item = String> + '_ {
    (0..classes.len()).flat_map(move |i| {
        (i + 1..classes.len()).flat_map(move |j| {
            (j + 1..classes.len())
                .map(move |k| format!("{}{}{}", classes[i], classes[j], classes[k]))
        })
    })
}

/// One path step: `tag`, with `:nth-of-type(n)` when siblings share the tag
fn path_step<H: DocumentHost + ?Sized>(host: &H, node: NodeId) -> String {
    let tag = host.tag_name(node).unwrap_or_default();
    let siblings: Vec<NodeId> = host
        .parent(node)
        .map(|parent| host.children(parent))
        .unwrap_or_default()
        .into_iter()
        .filter(|sibling| host.tag_name(*sibling).as_deref() == Some(tag.as_str()))
        .collect();
    let escaped = escape_ident(&tag);
    if siblings.len() > 1 {
        let nth = siblings.iter().position(|s| *s == node).map_or(1, |i| i + 1);
        format!("{escaped}:nth-of-type({nth})")
    } else {
        escaped
    }
}

/// Path steps from the child of `stop` down to `node`
fn steps_below<H: DocumentHost + ?Sized>(host: &H, node: NodeId, stop: NodeId) -> Vec<String> {
    let mut steps = Vec::new();
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        if current == stop {
            break;
        }
        steps.push(path_step(host, current));
        cursor = parent_element(host, current);
    }
    steps.reverse();
    steps
}

/// Structural path from the containment root, `tag:nth-of-type(n) > …`
pub fn structural_path<H: DocumentHost + ?Sized>(host: &H, node: NodeId, root: NodeId) -> String {
    steps_below(host, node, root).join(" > ")
}

fn anchored_candidate<H: DocumentHost + ?Sized>(
    host: &H,
    node: NodeId,
    root: NodeId,
) -> Option<String> {
    let mut cursor = parent_element(host, node);
    while let Some(ancestor) = cursor {
        if let Some(anchor) = anchor_selector(host, ancestor, root) {
            let relative = steps_below(host, node, ancestor).join(" > ");
            let selector = format!("{anchor} > {relative}");
            return is_unique(host, root, &selector, node).then_some(selector);
        }
        cursor = parent_element(host, ancestor);
    }
    None
}

fn anchor_selector<H: DocumentHost + ?Sized>(
    host: &H,
    node: NodeId,
    root: NodeId,
) -> Option<String> {
    if let Some(id) = element_id(host, node) {
        let selector = format!("#{}", escape_ident(&id));
        if is_unique(host, root, &selector, node) {
            return Some(selector);
        }
    }
    TEST_ATTRIBUTES.iter().find_map(|attr| {
        let value = host.attribute(node, attr).filter(|v| !v.is_empty())?;
        let selector = attribute_selector(attr, &value);
        is_unique(host, root, &selector, node).then_some(selector)
    })
}

/// Containment root of a node, or the node's document when detached
pub(crate) fn scope_of<H: DocumentHost + ?Sized>(host: &H, node: NodeId) -> NodeId {
    root_scope(host, node).unwrap_or_else(|| host.document())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDocument;

    fn candidates(html: &str, target: &str) -> Vec<String> {
        let doc = MemoryDocument::parse(html).unwrap();
        let node = doc.select_first(target).unwrap().unwrap();
        generate_selector_candidates(&doc, node, doc.document(), 5)
    }

    #[test]
    fn test_id_comes_first() {
        let out = candidates(r#"<main><p id="x" class="lead">a</p><p>b</p></main>"#, "#x");
        assert_eq!(out[0], "#x");
        assert!(out.contains(&".lead".to_string()));
        assert!(out.contains(&"main > p:nth-of-type(1)".to_string()));
    }

    #[test]
    fn test_duplicate_id_is_skipped() {
        let out = candidates(
            r#"<main><p id="x" data-testid="first">a</p><p id="x">b</p></main>"#,
            "p",
        );
        assert_eq!(out[0], r#"[data-testid="first"]"#);
    }

    #[test]
    fn test_attribute_tag_prefix_when_ambiguous() {
        let out = candidates(
            r#"<form><input name="q"><label name="q">x</label></form>"#,
            "input",
        );
        assert_eq!(out[0], r#"input[name="q"]"#);
    }

    #[test]
    fn test_class_tiers_stop_at_first_unique() {
        let out = candidates(
            r#"<ul><li class="item a">1</li><li class="item b">2</li><span class="item a"></span></ul>"#,
            "li",
        );
        assert!(out.contains(&"li.a".to_string()));
        assert!(!out.contains(&".item.a".to_string()));
        assert!(!out.contains(&".item".to_string()));
    }

    #[test]
    fn test_structural_path_always_included() {
        let out = candidates("<div><div><span>x</span></div></div>", "span");
        assert_eq!(out, vec!["div > div > span".to_string()]);
    }

    #[test]
    fn test_anchor_relative_path() {
        let out = candidates(
            r#"<section><div data-testid="card"><b>1</b><b>2</b></div><div><b>1</b><b>2</b></div></section>"#,
            r#"[data-testid="card"] > b:nth-of-type(2)"#,
        );
        assert_eq!(
            out.last().map(String::as_str),
            Some(r#"[data-testid="card"] > b:nth-of-type(2)"#)
        );
        assert!(out.contains(&"section > div:nth-of-type(1) > b:nth-of-type(2)".to_string()));
    }

    #[test]
    fn test_identifiers_are_escaped() {
        let out = candidates(r#"<main><p id="1st">a</p></main>"#, r"#\31 st");
        assert_eq!(out[0], r"#\31 st");
    }

    #[test]
    fn test_every_non_structural_candidate_is_unique() {
        let html = r#"<main><a class="x y" title="t">1</a><a class="x">2</a><a class="y z">3</a></main>"#;
        let doc = MemoryDocument::parse(html).unwrap();
        let root = doc.document();
        for node in doc.query_all(root, "a").unwrap() {
            for selector in generate_selector_candidates(&doc, node, root, 5) {
                assert_eq!(doc.query_all(root, &selector).unwrap(), vec![node], "{selector}");
            }
        }
    }
}
