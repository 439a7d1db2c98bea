//! Tiered re-resolution after regeneration.
//!
//! current handle → strict locator → relaxed scan → geometric hit test.
//! The scored tiers share [`score_candidate`]; each has its own threshold.

use tracing::trace;

use super::outcome::{Resolution, ResolutionTier};
use crate::config::{ScoreWeights, VerifierConfig};
use crate::dom::{center_of, element_id, normalize_text, DocumentHost, NodeId, Point};
use crate::locator::{child_index_path, locate_scope, Locator};

/// Score a candidate against a locator. `None` when the tag differs or a
/// stored id is not carried by the candidate.
pub fn score_candidate<H: DocumentHost + ?Sized>(
    host: &H,
    node: NodeId,
    locator: &Locator,
    anchor: Option<Point>,
    weights: &ScoreWeights,
) -> Option<f64> {
    let fingerprint = &locator.fingerprint;
    if host.tag_name(node).as_deref() != Some(fingerprint.tag.as_str()) {
        return None;
    }
    let mut score = weights.tag;
    if let Some(id) = &fingerprint.id {
        if element_id(host, node).as_ref() != Some(id) {
            return None;
        }
        score += weights.id;
    }

    let classes = host.class_list(node);
    let shared = fingerprint
        .classes
        .iter()
        .filter(|class| classes.contains(class))
        .count();
    score += (shared as f64 * weights.class).min(weights.class_cap);

    if let Some(hint) = fingerprint.text.as_deref().filter(|hint| !hint.is_empty()) {
        if normalize_text(&host.text_content(node)).contains(hint) {
            score += weights.text;
        }
    }

    if !locator.path.is_empty() {
        let path = child_index_path(host, node);
        let prefix = locator
            .path
            .iter()
            .zip(&path)
            .take_while(|(a, b)| a == b)
            .count();
        score += weights.path * prefix as f64 / locator.path.len() as f64;
    }

    if let (Some(anchor), Some(center)) = (anchor, center_of(host, node)) {
        let falloff = weights.proximity_falloff_px;
        score += weights.proximity * falloff / (falloff + anchor.distance(center));
    }
    Some(score)
}

/// Highest-scoring candidate at or above `threshold`; ties keep the first
fn best<H: DocumentHost + ?Sized>(
    host: &H,
    candidates: impl IntoIterator<Item = NodeId>,
    locator: &Locator,
    anchor: Option<Point>,
    weights: &ScoreWeights,
    threshold: f64,
) -> Option<(NodeId, f64)> {
    let mut best: Option<(NodeId, f64)> = None;
    for node in candidates {
        if !host.is_connected(node) {
            continue;
        }
        let Some(score) = score_candidate(host, node, locator, anchor, weights) else {
            continue;
        };
        if score >= threshold && best.map_or(true, |(_, top)| score > top) {
            best = Some((node, score));
        }
    }
    best
}

/// Every element any stored selector matches in `scope`, first match first.
///
/// Uniqueness is not required; selectors the evaluator rejects are skipped.
fn selector_matches<H: DocumentHost + ?Sized>(
    host: &H,
    scope: NodeId,
    locator: &Locator,
) -> Vec<NodeId> {
    let mut matches = Vec::new();
    for selector in &locator.selectors {
        for node in host.query_all(scope, selector).unwrap_or_default() {
            if !matches.contains(&node) {
                matches.push(node);
            }
        }
    }
    matches
}

/// Re-find the element through the four tiers
pub fn resolve_tiered<H: DocumentHost + ?Sized>(
    host: &H,
    locator: &Locator,
    current: Option<NodeId>,
    anchor: Option<Point>,
    config: &VerifierConfig,
) -> Option<Resolution> {
    if let Some(node) = current
        .filter(|node| host.is_connected(*node) && locator.fingerprint.agrees_with(host, *node))
    {
        return Some(Resolution {
            node,
            tier: ResolutionTier::Current,
            score: None,
        });
    }

    if let Some(node) = locator.locate(host) {
        return Some(Resolution {
            node,
            tier: ResolutionTier::Strict,
            score: None,
        });
    }

    let weights = &config.weights;
    if let Some(scope) = locate_scope(host, locator, host.document()) {
        let candidates = selector_matches(host, scope, locator);
        if let Some((node, score)) = best(
            host,
            candidates,
            locator,
            anchor,
            weights,
            config.relaxed_threshold,
        ) {
            trace!(node = %node, score, "relaxed resolution");
            return Some(Resolution {
                node,
                tier: ResolutionTier::Relaxed,
                score: Some(score),
            });
        }
    }

    let point = anchor?;
    let candidates = host
        .ranked_candidates_at(point)
        .unwrap_or_else(|| host.elements_from_point(point));
    let (node, score) = best(
        host,
        candidates,
        locator,
        anchor,
        weights,
        config.geometric_threshold,
    )?;
    trace!(node = %node, score, "geometric resolution");
    Some(Resolution {
        node,
        tier: ResolutionTier::Geometric,
        score: Some(score),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocatorConfig;
    use crate::dom::MemoryDocument;
    use crate::locator::build_locator;

    fn find(doc: &MemoryDocument, selector: &str) -> NodeId {
        doc.select_first(selector).unwrap().unwrap()
    }

    fn locator_for(html: &str, selector: &str) -> Locator {
        let doc = MemoryDocument::parse(html).unwrap();
        build_locator(&doc, find(&doc, selector), &LocatorConfig::default()).unwrap()
    }

    #[test]
    fn test_current_handle_wins() {
        let doc = MemoryDocument::parse(r#"<main><p id="p">x</p></main>"#).unwrap();
        let p = find(&doc, "#p");
        let locator = build_locator(&doc, p, &LocatorConfig::default()).unwrap();
        let found = resolve_tiered(&doc, &locator, Some(p), None, &VerifierConfig::default());
        assert_eq!(found.map(|r| r.tier), Some(ResolutionTier::Current));
    }

    #[test]
    fn test_strict_after_recreation() {
        let mut doc = MemoryDocument::parse(r#"<main><p id="p">x</p></main>"#).unwrap();
        let p = find(&doc, "#p");
        let locator = build_locator(&doc, p, &LocatorConfig::default()).unwrap();
        let fresh = doc.replace_with_markup(p, r#"<p id="p">y</p>"#).unwrap();
        let found = resolve_tiered(&doc, &locator, Some(p), None, &VerifierConfig::default())
            .unwrap();
        assert_eq!(found.tier, ResolutionTier::Strict);
        assert_eq!(found.node, fresh);
    }

    const PRICING: &str = r#"<main><section><div class="card primary">Pricing plans</div><div class="card">Other</div></section></main>"#;

    #[test]
    fn test_relaxed_scan_ranks_ambiguous_selector_matches() {
        let locator = locator_for(PRICING, ".primary");
        // `.primary` now matches twice and no other candidate matches
        let doc = MemoryDocument::parse(
            r#"<main><div class="wrap"><section><div class="primary card-v2">Pricing plans</div><div class="primary">Other</div></section></div></main>"#,
        )
        .unwrap();
        assert_eq!(locator.locate(&doc), None);
        let found =
            resolve_tiered(&doc, &locator, None, None, &VerifierConfig::default()).unwrap();
        assert_eq!(found.tier, ResolutionTier::Relaxed);
        assert_eq!(doc.text_content(found.node), "Pricing plans");
        assert!(found.score.unwrap() >= 8.0);
    }

    #[test]
    fn test_relaxed_scan_ignores_elements_no_selector_matches() {
        let locator = locator_for(PRICING, ".primary");
        let doc = MemoryDocument::parse(
            r#"<main><div class="wrap"><section><div class="card primary-v2">Pricing plans</div><div class="card">Other</div></section></div></main>"#,
        )
        .unwrap();
        assert_eq!(
            resolve_tiered(&doc, &locator, None, None, &VerifierConfig::default()),
            None
        );
    }

    #[test]
    fn test_relaxed_requires_stored_id() {
        let locator = locator_for(r#"<main><p id="a" class="x">Hi</p></main>"#, "#a");
        let doc = MemoryDocument::parse(r#"<main><p id="b" class="x">Hi</p></main>"#).unwrap();
        assert_eq!(
            resolve_tiered(&doc, &locator, None, None, &VerifierConfig::default()),
            None
        );
    }

    #[test]
    fn test_geometric_tier_uses_anchor_point() {
        let locator = locator_for(
            r#"<main><span class="a">One</span><span class="a">Two</span></main>"#,
            "span:nth-of-type(2)",
        );
        let doc = MemoryDocument::parse(
            r#"<main><div><span class="z" data-rect="0 0 100 20">New</span><span class="z" data-rect="0 40 100 20">Newer</span></div></main>"#,
        )
        .unwrap();
        let config = VerifierConfig::default().with_thresholds(100.0, 6.0);
        let found = resolve_tiered(&doc, &locator, None, Some(Point::new(50.0, 50.0)), &config)
            .unwrap();
        assert_eq!(found.tier, ResolutionTier::Geometric);
        assert_eq!(doc.text_content(found.node), "Newer");
    }

    #[test]
    fn test_score_rejects_other_tags() {
        let doc = MemoryDocument::parse(r#"<main><p id="p">x</p><div>x</div></main>"#).unwrap();
        let locator = build_locator(&doc, find(&doc, "#p"), &LocatorConfig::default()).unwrap();
        let div = find(&doc, "div");
        assert_eq!(
            score_candidate(&doc, div, &locator, None, &ScoreWeights::default()),
            None
        );
    }
}
