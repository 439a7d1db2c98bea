//! Property-based tests for the transaction history.
//!
//! Uses proptest to check that arbitrary edit sequences survive undo/redo,
//! that structural edits restore markup exactly, and that the history
//! bounds and merge rules always hold.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use livedit::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;

const PAGE: &str = r#"<html><head></head><body><main id="app">
<h1 id="title" class="hero">Welcome</h1>
<p class="lead">First</p>
<p class="lead muted">Second</p>
<button data-testid="cta">Go</button>
</main></body></html>"#;

const TARGETS: [&str; 4] = ["#title", "p.lead:nth-of-type(1)", "p.muted", "[data-testid=\"cta\"]"];

/// One edit against one of the page's leaf elements
#[derive(Debug, Clone)]
enum Edit {
    Style(usize, &'static str, Option<&'static str>),
    Text(usize, String),
    Class(usize, Vec<String>),
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    let target = 0..TARGETS.len();
    prop_oneof![
        (
            target.clone(),
            prop::sample::select(vec!["color", "margin", "font-weight"]),
            prop::option::of(prop::sample::select(vec!["red", "4px", "bold", "blue"])),
        )
            .prop_map(|(t, p, v)| Edit::Style(t, p, v)),
        (target.clone(), text_strategy()).prop_map(|(t, s)| Edit::Text(t, s)),
        (target, prop::collection::vec(class_strategy(), 0..3)).prop_map(|(t, c)| Edit::Class(t, c)),
    ]
}

/// Text with accented and CJK letters plus markup-significant characters
fn text_strategy() -> impl Strategy<Value = String> {
    r#"[A-Za-zÀ-ÿ日本語&<>"]{1,8}"#
}

/// Class tokens including characters that need CSS escaping
fn class_strategy() -> impl Strategy<Value = String> {
    "[a-zéü日.|_-]{1,5}"
}

/// Observable state of every target
fn state(doc: &MemoryDocument, nodes: &[NodeId]) -> Vec<(Vec<Option<String>>, String, Vec<String>)> {
    nodes
        .iter()
        .map(|node| {
            let styles = ["color", "margin", "font-weight"]
                .iter()
                .map(|property| doc.inline_style(*node, property))
                .collect();
            (styles, doc.text_content(*node), doc.class_list(*node))
        })
        .collect()
}

fn setup(
    max_history: usize,
    merge_window_ms: u64,
) -> (
    MemoryDocument,
    Vec<NodeId>,
    Arc<FakeClock>,
    TransactionManager<Arc<FakeClock>>,
) {
    let doc = MemoryDocument::parse(PAGE).unwrap();
    let nodes = TARGETS
        .iter()
        .map(|selector| doc.select_first(selector).unwrap().unwrap())
        .collect();
    let clock = FakeClock::shared(1_000);
    let manager = TransactionManager::with_clock(Arc::clone(&clock)).with_history(
        HistoryConfig::default()
            .with_max_history(max_history)
            .with_merge_window_ms(merge_window_ms),
    );
    (doc, nodes, clock, manager)
}

fn apply(
    manager: &mut TransactionManager<Arc<FakeClock>>,
    doc: &mut MemoryDocument,
    nodes: &[NodeId],
    edit: &Edit,
) -> Option<TxId> {
    match edit {
        Edit::Style(t, property, value) => manager.apply_style(doc, nodes[*t], property, *value),
        Edit::Text(t, text) => manager.record_text(doc, nodes[*t], text),
        Edit::Class(t, classes) => manager.record_class(doc, nodes[*t], classes),
    }
    .unwrap()
}

/// One list item: its text, `title` and classes
type Item = (String, String, Vec<String>);

fn item_strategy() -> impl Strategy<Value = Item> {
    (
        text_strategy(),
        r#"[a-zà-ÿ日 "'&]{0,6}"#,
        prop::collection::vec(class_strategy(), 0..3),
    )
}

fn structure_strategy() -> impl Strategy<Value = StructureRequest> {
    prop_oneof![
        Just(StructureRequest::new(StructureAction::Delete)),
        Just(StructureRequest::new(StructureAction::Duplicate)),
        Just(StructureRequest::wrap("section").with_wrapper_style("padding", "4px")),
    ]
}

/// A compact list page; every item carries a unique test id
fn list_page(items: &[Item]) -> MemoryDocument {
    let mut doc = MemoryDocument::parse(r#"<html><head></head><body><ul id="list"></ul></body></html>"#)
        .unwrap();
    let list = doc.select_first("#list").unwrap().unwrap();
    for (i, (text, title, classes)) in items.iter().enumerate() {
        let li = doc.create_element(doc.document(), "li").unwrap();
        doc.set_attribute(li, "data-testid", Some(&format!("item-{i}"))).unwrap();
        doc.set_attribute(li, "title", Some(title)).unwrap();
        if !classes.is_empty() {
            doc.set_attribute(li, "class", Some(&classes.join(" "))).unwrap();
        }
        doc.set_text_content(li, text).unwrap();
        doc.insert_before(list, li, None).unwrap();
    }
    doc.take_records();
    doc
}

// === Structure Property Tests ===

proptest! {
    /// Undo restores the exact markup from before a structural edit and
    /// redo restores the exact markup after it, for non-ASCII content too.
    #[test]
    fn prop_structure_undo_redo_restores_markup(
        items in prop::collection::vec(item_strategy(), 1..5),
        pick in any::<prop::sample::Index>(),
        request in structure_strategy(),
    ) {
        let mut doc = list_page(&items);
        let list = doc.select_first("#list").unwrap().unwrap();
        let target = doc.children(list)[pick.index(items.len())];
        let mut manager = TransactionManager::with_clock(FakeClock::shared(0));

        let original = doc.outer_html(list).unwrap();
        manager.apply_structure(&mut doc, target, &request).unwrap();
        let edited = doc.outer_html(list).unwrap();
        prop_assert_ne!(&edited, &original);

        manager.undo(&mut doc).unwrap();
        prop_assert_eq!(doc.outer_html(list).unwrap(), original);
        manager.redo(&mut doc).unwrap();
        prop_assert_eq!(doc.outer_html(list).unwrap(), edited);
    }

    /// Serialized markup parses back to the same markup
    #[test]
    fn prop_markup_reparses_identically(items in prop::collection::vec(item_strategy(), 1..5)) {
        let doc = list_page(&items);
        let list = doc.select_first("#list").unwrap().unwrap();
        let html = doc.outer_html(list).unwrap();
        let reparsed = MemoryDocument::parse(&html).unwrap();
        let again = reparsed.select_first("#list").unwrap().unwrap();
        prop_assert_eq!(reparsed.outer_html(again).unwrap(), html);
    }
}

// === History Property Tests ===

proptest! {
    /// Undoing everything restores the original state; redoing everything
    /// restores the edited state.
    #[test]
    fn prop_undo_redo_round_trip(edits in prop::collection::vec(edit_strategy(), 1..20)) {
        let (mut doc, nodes, clock, mut manager) = setup(100, 800);
        let original = state(&doc, &nodes);
        for edit in &edits {
            apply(&mut manager, &mut doc, &nodes, edit);
            clock.advance_ms(100);
        }
        let edited = state(&doc, &nodes);

        while manager.can_undo() {
            manager.undo(&mut doc).unwrap();
        }
        prop_assert_eq!(state(&doc, &nodes), original);

        while manager.can_redo() {
            manager.redo(&mut doc).unwrap();
        }
        prop_assert_eq!(state(&doc, &nodes), edited);
    }

    /// Redo after undo lands on the same state no matter how often the
    /// pair is repeated.
    #[test]
    fn prop_redo_is_idempotent(
        edits in prop::collection::vec(edit_strategy(), 1..10),
        repeats in 1usize..4,
    ) {
        let (mut doc, nodes, clock, mut manager) = setup(100, 0);
        for edit in &edits {
            apply(&mut manager, &mut doc, &nodes, edit);
            clock.advance_ms(10);
        }
        let edited = state(&doc, &nodes);
        for _ in 0..repeats {
            manager.undo(&mut doc).unwrap();
            manager.redo(&mut doc).unwrap();
        }
        prop_assert_eq!(state(&doc, &nodes), edited);
    }

    /// The undo stack never exceeds `max_history` and holds the newest
    /// transactions in id order.
    #[test]
    fn prop_stack_is_bounded(
        max_history in 1usize..8,
        edits in prop::collection::vec(edit_strategy(), 1..30),
    ) {
        let (mut doc, nodes, clock, mut manager) = setup(max_history, 0);
        let mut recorded = Vec::new();
        for edit in &edits {
            if let Some(id) = apply(&mut manager, &mut doc, &nodes, edit) {
                if recorded.last() != Some(&id) {
                    recorded.push(id);
                }
            }
            clock.advance_ms(10);
            prop_assert!(manager.undo_stack().len() <= max_history);
        }
        let kept: Vec<TxId> = manager.undo_stack().iter().map(|tx| tx.id).collect();
        let newest = &recorded[recorded.len().saturating_sub(max_history)..];
        prop_assert_eq!(kept.as_slice(), newest);
    }

    /// Edits to one property of one element inside the merge window fold
    /// into a single transaction whose before-state is the first edit's.
    #[test]
    fn prop_rapid_edits_merge(
        mut values in prop::collection::vec(prop::sample::select(vec!["1px", "2px", "3px", "4px"]), 2..10),
        gap_ms in 0u64..=800,
    ) {
        values.dedup();
        let (mut doc, nodes, clock, mut manager) = setup(100, 800);
        for value in &values {
            manager.apply_style(&mut doc, nodes[0], "margin", Some(value)).unwrap();
            clock.advance_ms(gap_ms);
        }
        prop_assert_eq!(manager.undo_stack().len(), 1);
        let tx = &manager.undo_stack()[0];
        prop_assert_eq!(
            tx.before.styles.as_ref().unwrap().get("margin").cloned().flatten(),
            None
        );
        let last = values.last().copied().map(str::to_string);
        prop_assert_eq!(tx.after.styles.as_ref().unwrap().get("margin").cloned().flatten(), last);

        manager.undo(&mut doc).unwrap();
        prop_assert_eq!(doc.inline_style(nodes[0], "margin"), None);
    }

    /// Edits spaced wider than the merge window never merge.
    #[test]
    fn prop_slow_edits_do_not_merge(count in 2usize..8) {
        let (mut doc, nodes, clock, mut manager) = setup(100, 800);
        for i in 0..count {
            let value = format!("{}px", i + 1);
            manager.apply_style(&mut doc, nodes[1], "margin", Some(&value)).unwrap();
            clock.advance_ms(801);
        }
        prop_assert_eq!(manager.undo_stack().len(), count);
        prop_assert!(manager.undo_stack().iter().all(|tx| !tx.merged));
    }
}
