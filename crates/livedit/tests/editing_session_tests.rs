//! End-to-end editing sessions
//!
//! These tests drive the locator, the transaction manager and the verifier
//! together against an in-memory document that is regenerated between
//! steps, the way a hot reload re-renders a page under the editor.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use livedit::dom::element_index;
use livedit::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

const PAGE: &str = r#"<html><head></head><body><main id="app">
<section class="cards">
<div class="card" data-testid="one"><h2>One</h2></div>
<div class="card featured"><h2>Two</h2></div>
<div class="card" data-testid="three"><h2>Three</h2></div>
</section>
<x-panel id="panel"><template shadowrootmode="open"><button class="inner">Go</button></template></x-panel>
</main></body></html>"#;

fn find(doc: &MemoryDocument, selector: &str) -> NodeId {
    doc.select_first(selector).unwrap().unwrap()
}

/// Re-render `node` from its own current markup, producing fresh handles
fn reload(doc: &mut MemoryDocument, node: NodeId) -> NodeId {
    let html = doc.outer_html(node).unwrap();
    let fresh = doc.replace_with_markup(node, &html).unwrap();
    doc.take_records();
    fresh
}

fn session() -> (MemoryDocument, Arc<FakeClock>, TransactionManager<Arc<FakeClock>>) {
    let clock = FakeClock::shared(50_000);
    let doc = MemoryDocument::parse(PAGE).unwrap();
    let manager = TransactionManager::with_clock(Arc::clone(&clock));
    (doc, clock, manager)
}

// ============================================================================
// Locator
// ============================================================================

#[test]
fn test_unique_id_is_primary_selector() {
    let doc = MemoryDocument::parse(r#"<main><p id="x" class="a">Hi</p></main>"#).unwrap();
    let locator = build_locator(&doc, find(&doc, "#x"), &LocatorConfig::default()).unwrap();
    assert_eq!(locator.primary_selector(), Some("#x"));
}

#[test]
fn test_locator_json_round_trip_still_resolves() {
    let (doc, _, _) = session();
    let card = find(&doc, ".featured");
    let locator = build_locator(&doc, card, &LocatorConfig::default()).unwrap();
    let json = serde_json::to_string(&locator).unwrap();
    let back: Locator = serde_json::from_str(&json).unwrap();
    assert_eq!(back, locator);
    assert_eq!(back.locate(&doc), Some(card));
}

#[test]
fn test_shadow_locator_survives_host_reload() {
    let (mut doc, _, _) = session();
    let panel = find(&doc, "#panel");
    let shadow = doc.shadow_root(panel).unwrap();
    let button = doc.query_all(shadow, "button").unwrap()[0];
    let locator = build_locator(&doc, button, &LocatorConfig::default()).unwrap();
    assert_eq!(locator.shadow_host_chain, Some(vec!["#panel".to_string()]));

    let fresh_panel = reload(&mut doc, panel);
    let fresh_shadow = doc.shadow_root(fresh_panel).unwrap();
    let fresh_button = doc.query_all(fresh_shadow, "button").unwrap()[0];
    assert_ne!(fresh_button, button);
    assert_eq!(locator.locate(&doc), Some(fresh_button));
}

// ============================================================================
// History across reloads
// ============================================================================

#[test]
fn test_structural_undo_after_reload_restores_slot() {
    let (mut doc, _, mut manager) = session();
    let two = find(&doc, ".featured");
    let attrs = doc.attributes(two);
    manager
        .apply_structure(&mut doc, two, &StructureRequest::new(StructureAction::Delete))
        .unwrap();
    let section = find(&doc, "section.cards");
    reload(&mut doc, section);

    manager.undo(&mut doc).unwrap();
    let restored = find(&doc, ".featured");
    assert!(doc.is_connected(restored));
    assert_eq!(doc.tag_name(restored).as_deref(), Some("div"));
    assert_eq!(doc.attributes(restored), attrs);
    assert_eq!(element_index(&doc, restored), Some(1));
}

#[test]
fn test_wrap_then_reload_then_undo() {
    let (mut doc, _, mut manager) = session();
    let one = find(&doc, "[data-testid=\"one\"]");
    manager
        .apply_structure(
            &mut doc,
            one,
            &StructureRequest::wrap("article").with_wrapper_style("padding", "8px"),
        )
        .unwrap();
    assert_eq!(doc.query_all(doc.document(), "article").unwrap().len(), 1);
    let section = find(&doc, "section.cards");
    reload(&mut doc, section);

    manager.undo(&mut doc).unwrap();
    assert!(doc.query_all(doc.document(), "article").unwrap().is_empty());
    let restored = find(&doc, "[data-testid=\"one\"]");
    assert_eq!(element_index(&doc, restored), Some(0));

    manager.redo(&mut doc).unwrap();
    let wrapper = find(&doc, "article");
    assert_eq!(doc.inline_style(wrapper, "padding").as_deref(), Some("8px"));
}

#[test]
fn test_move_round_trip_across_reloads() {
    let (mut doc, _, mut manager) = session();
    let three = find(&doc, "[data-testid=\"three\"]");
    let one = find(&doc, "[data-testid=\"one\"]");
    let section = find(&doc, "section.cards");
    manager
        .move_element(&mut doc, three, section, Some(one))
        .unwrap();
    assert_eq!(element_index(&doc, three), Some(0));

    let section = reload(&mut doc, section);
    manager.undo(&mut doc).unwrap();
    assert_eq!(element_index(&doc, find(&doc, "[data-testid=\"three\"]")), Some(2));

    reload(&mut doc, section);
    manager.redo(&mut doc).unwrap();
    assert_eq!(element_index(&doc, find(&doc, "[data-testid=\"three\"]")), Some(0));
}

#[test]
fn test_rollback_keeps_history_consistent() {
    let (mut doc, _, mut manager) = session();
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&errors);
    manager.on_error(move |error| sink.borrow_mut().push(error.is_rollback()));

    let one = find(&doc, "[data-testid=\"one\"]");
    manager.record_text(&mut doc, one, "Replaced").unwrap();
    let section = find(&doc, "section.cards");
    doc.remove(section).unwrap();

    let err = manager.undo(&mut doc).unwrap_err();
    assert!(err.is_rollback());
    assert_eq!(manager.undo_stack().len(), 1);
    assert!(manager.redo_stack().is_empty());
    assert_eq!(*errors.borrow(), vec![true]);
}

// ============================================================================
// Verification
// ============================================================================

#[test]
fn test_text_edit_verified_after_reload() {
    let (mut doc, clock, mut manager) = session();
    let mut verifier = ConsistencyVerifier::with_clock(Arc::clone(&clock));
    let heading = find(&doc, ".featured > h2");
    manager.record_text(&mut doc, heading, "Second").unwrap();
    doc.take_records();

    let tx = manager.last_transaction().cloned().unwrap();
    verifier.start(&doc, &tx, Some("apply-7"), Some(heading));
    verifier.on_apply_status(&doc, "apply-7", ApplyPhase::Completed);

    let section = find(&doc, "section.cards");
    let html = doc.outer_html(section).unwrap();
    doc.replace_with_markup(section, &html).unwrap();
    let records = doc.take_records();
    verifier.on_mutations(&doc, &records);

    clock.advance_ms(300);
    let context = VerifyContext::new().with_manager(&manager);
    let result = verifier.tick(&doc, &context).unwrap();
    assert_eq!(result.outcome, VerifyOutcome::Verified);
    assert_eq!(result.text_diff.unwrap().actual, "Second");
    assert!(result.signals.had_element_disconnect);
}

#[test]
fn test_silent_apply_is_never_verified() {
    let (mut doc, clock, mut manager) = session();
    let mut verifier = ConsistencyVerifier::with_clock(Arc::clone(&clock));
    let one = find(&doc, "[data-testid=\"one\"]");
    manager.apply_style(&mut doc, one, "color", Some("red")).unwrap();
    doc.take_records();
    let tx = manager.last_transaction().cloned().unwrap();
    verifier.start(&doc, &tx, None, Some(one));

    clock.advance_ms(2_000);
    let result = verifier
        .tick(&doc, &VerifyContext::new().with_manager(&manager))
        .unwrap();
    assert_eq!(result.outcome, VerifyOutcome::Uncertain);
    assert_eq!(result.reason, "no_signal");
}

#[test]
fn test_undo_during_settling_skips_verification() {
    let (mut doc, clock, mut manager) = session();
    let mut verifier = ConsistencyVerifier::with_clock(Arc::clone(&clock));
    let one = find(&doc, "[data-testid=\"one\"]");
    manager.apply_style(&mut doc, one, "color", Some("red")).unwrap();
    doc.take_records();
    let tx = manager.last_transaction().cloned().unwrap();
    verifier.start(&doc, &tx, None, Some(one));

    manager.undo(&mut doc).unwrap();
    let records = doc.take_records();
    verifier.on_mutations(&doc, &records);
    clock.advance_ms(300);
    let result = verifier
        .tick(&doc, &VerifyContext::new().with_manager(&manager))
        .unwrap();
    assert_eq!(result.outcome, VerifyOutcome::Skipped);
    assert_eq!(result.reason, "stale_transaction");
}

#[test]
fn test_geometric_match_is_only_uncertain() {
    let mut doc = MemoryDocument::parse(
        r#"<main><span class="pill" data-rect="0 0 100 20">A</span><span class="pill" data-rect="0 40 100 20">B</span></main>"#,
    )
    .unwrap();
    let clock = FakeClock::shared(0);
    let mut manager = TransactionManager::with_clock(Arc::clone(&clock));
    let config = VerifierConfig::default().with_thresholds(100.0, 6.0);
    let mut verifier = ConsistencyVerifier::with_clock(Arc::clone(&clock)).with_config(config);

    let second = find(&doc, "span:nth-of-type(2)");
    manager.apply_style(&mut doc, second, "color", Some("red")).unwrap();
    doc.take_records();
    let tx = manager.last_transaction().cloned().unwrap();
    verifier.start(&doc, &tx, None, Some(second));

    let main = find(&doc, "main");
    doc.replace_with_markup(
        main,
        r#"<main><div><span class="chip" data-rect="0 0 100 20">A</span><span class="chip" style="color: red;" data-rect="0 40 100 20">B</span></div></main>"#,
    )
    .unwrap();
    let records = doc.take_records();
    verifier.on_mutations(&doc, &records);
    clock.advance_ms(300);

    let result = verifier
        .tick(&doc, &VerifyContext::new().with_manager(&manager))
        .unwrap();
    assert_eq!(result.resolved.unwrap().tier, ResolutionTier::Geometric);
    assert_eq!(result.outcome, VerifyOutcome::Uncertain);
    assert_eq!(result.reason, "low_confidence");
}
