//! Bounded undo/redo history.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use super::structure::{check_container, check_subject, insertion_point_of};
use super::{MoveData, Snapshot, StyleMap, Transaction, TxAction, TxChange, TxId, TxKind, TxType};
use crate::clock::{Clock, SystemClock};
use crate::config::{EditorConfig, HistoryConfig, LocatorConfig};
use crate::dom::{is_element, DocumentHost, NodeId};
use crate::events::{EventBus, ListenerId};
use crate::locator::{build_locator, Locator};
use crate::result::{LiveditError, LiveditResult, ReplayDirection};

/// Live-preview session over one element's inline styles.
///
/// Values written through [`StyleHandle::set`] reach the document at once;
/// the edit becomes a transaction only on
/// [`TransactionManager::commit_style`].
#[derive(Debug, Clone)]
pub struct StyleHandle {
    node: NodeId,
    target: Locator,
    element_key: String,
    before: StyleMap,
}

impl StyleHandle {
    /// Element being previewed
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Locator captured when the handle was opened
    #[must_use]
    pub const fn target(&self) -> &Locator {
        &self.target
    }

    /// Properties tracked so far
    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.before.keys().map(String::as_str)
    }

    /// Preview a value. The first write to a property captures its
    /// pre-edit value.
    pub fn set<H: DocumentHost + ?Sized>(
        &mut self,
        host: &mut H,
        property: &str,
        value: Option<&str>,
    ) -> LiveditResult<()> {
        let property = property.trim().to_ascii_lowercase();
        if !self.before.contains_key(&property) {
            self.before
                .insert(property.clone(), host.inline_style(self.node, &property));
        }
        host.set_inline_style(self.node, &property, value)
    }

    fn track<H: DocumentHost + ?Sized>(&mut self, host: &H, property: &str) {
        let property = property.trim().to_ascii_lowercase();
        let value = host.inline_style(self.node, &property);
        self.before.entry(property).or_insert(value);
    }
}

/// Drag session over one element
#[derive(Debug, Clone)]
pub struct MoveHandle {
    node: NodeId,
    target: Locator,
    element_key: String,
    from: super::InsertionPoint,
}

impl MoveHandle {
    /// Element being moved
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Where the element started
    #[must_use]
    pub const fn origin(&self) -> &super::InsertionPoint {
        &self.from
    }
}

/// Typed undo/redo history for a live document.
///
/// The manager never holds the document. Every operation that mutates or
/// reads the tree takes the host as a parameter, and every recorded
/// transaction refers to elements only through [`Locator`]s.
pub struct TransactionManager<C: Clock = SystemClock> {
    history: HistoryConfig,
    locator: LocatorConfig,
    clock: C,
    undo_stack: Vec<Transaction>,
    redo_stack: Vec<Transaction>,
    next_tx_id: u64,
    element_keys: HashMap<NodeId, String>,
    next_element_key: u64,
    changes: EventBus<TxChange>,
    errors: EventBus<LiveditError>,
}

impl TransactionManager<SystemClock> {
    /// Manager on the system clock with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for TransactionManager<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> std::fmt::Debug for TransactionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("history", &self.history)
            .field("undo", &self.undo_stack.len())
            .field("redo", &self.redo_stack.len())
            .field("next_tx_id", &self.next_tx_id)
            .finish_non_exhaustive()
    }
}

impl<C: Clock> TransactionManager<C> {
    /// Manager with default settings on the given clock
    pub fn with_clock(clock: C) -> Self {
        Self {
            history: HistoryConfig::default(),
            locator: LocatorConfig::default(),
            clock,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            next_tx_id: 1,
            element_keys: HashMap::new(),
            next_element_key: 1,
            changes: EventBus::new(),
            errors: EventBus::new(),
        }
    }

    /// Apply history and locator settings
    #[must_use]
    pub fn with_config(mut self, config: &EditorConfig) -> Self {
        self.history = config.history.clone();
        self.locator = config.locator.clone();
        self
    }

    /// Replace the history settings
    #[must_use]
    pub fn with_history(mut self, history: HistoryConfig) -> Self {
        self.history = history;
        self
    }

    /// History settings
    #[must_use]
    pub const fn history_config(&self) -> &HistoryConfig {
        &self.history
    }

    /// Locator settings used for every snapshot
    #[must_use]
    pub const fn locator_config(&self) -> &LocatorConfig {
        &self.locator
    }

    /// Injected clock
    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    // =========================================================================
    // Views and listeners
    // =========================================================================

    /// Undo entries, oldest first
    #[must_use]
    pub fn undo_stack(&self) -> &[Transaction] {
        &self.undo_stack
    }

    /// Redo entries, oldest first
    #[must_use]
    pub fn redo_stack(&self) -> &[Transaction] {
        &self.redo_stack
    }

    /// Whether an undo is available
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Whether a redo is available
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Top of the undo stack
    #[must_use]
    pub fn last_transaction(&self) -> Option<&Transaction> {
        self.undo_stack.last()
    }

    /// Id of the top of the undo stack
    #[must_use]
    pub fn last_transaction_id(&self) -> Option<TxId> {
        self.undo_stack.last().map(|tx| tx.id)
    }

    /// Subscribe to history changes
    pub fn on_change(&mut self, listener: impl FnMut(&TxChange) + 'static) -> ListenerId {
        self.changes.subscribe(listener)
    }

    /// Remove a change listener
    pub fn off_change(&mut self, id: ListenerId) -> bool {
        self.changes.unsubscribe(id)
    }

    /// Subscribe to rollback and rejection errors
    pub fn on_error(&mut self, listener: impl FnMut(&LiveditError) + 'static) -> ListenerId {
        self.errors.subscribe(listener)
    }

    /// Remove an error listener
    pub fn off_error(&mut self, id: ListenerId) -> bool {
        self.errors.unsubscribe(id)
    }

    /// Stable key for a node, issued on first request
    pub fn element_key(&mut self, node: NodeId) -> String {
        if let Some(key) = self.element_keys.get(&node) {
            return key.clone();
        }
        let key = format!("el-{}", self.next_element_key);
        self.next_element_key += 1;
        self.element_keys.insert(node, key.clone());
        key
    }

    pub(super) fn assign_element_key(&mut self, node: NodeId, key: String) {
        self.element_keys.insert(node, key);
    }

    /// Empty both stacks and forget issued element keys
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.element_keys.clear();
        debug!("history cleared");
        self.emit(TxAction::Clear, None);
    }

    // =========================================================================
    // Recording
    // =========================================================================

    fn emit(&mut self, action: TxAction, transaction: Option<Transaction>) {
        let change = TxChange {
            action,
            transaction,
            undo_count: self.undo_stack.len(),
            redo_count: self.redo_stack.len(),
        };
        self.changes.emit(&change);
    }

    /// Deliver an error to error listeners and hand it back
    pub(super) fn report(&mut self, error: LiveditError) -> LiveditError {
        warn!(error = %error, "edit rejected");
        self.errors.emit(&error);
        error
    }

    /// Merge into the top entry when allowed, otherwise push
    pub(super) fn commit<H: DocumentHost + ?Sized>(&mut self, host: &H, tx: Transaction) -> TxId {
        if let Some(id) = self.try_merge(&tx) {
            return id;
        }
        self.push(host, tx)
    }

    fn push<H: DocumentHost + ?Sized>(&mut self, host: &H, mut tx: Transaction) -> TxId {
        tx.id = TxId(self.next_tx_id);
        self.next_tx_id += 1;
        let id = tx.id;
        debug!(tx_id = %id, tx_type = %tx.tx_type(), "push");
        self.undo_stack.push(tx);
        let mut evicted_any = false;
        while self.undo_stack.len() > self.history.max_history.max(1) {
            let evicted = self.undo_stack.remove(0);
            trace!(tx_id = %evicted.id, "evicted oldest transaction");
            evicted_any = true;
        }
        if evicted_any {
            self.prune_element_keys(host);
        }
        self.redo_stack.clear();
        let top = self.undo_stack.last().cloned();
        self.emit(TxAction::Push, top);
        id
    }

    /// Drop keys of nodes that left the document. Deleted elements come
    /// back as fresh nodes and get their key from the transaction.
    fn prune_element_keys<H: DocumentHost + ?Sized>(&mut self, host: &H) {
        let before = self.element_keys.len();
        self.element_keys.retain(|node, _| host.is_connected(*node));
        let pruned = before - self.element_keys.len();
        if pruned > 0 {
            trace!(pruned, "pruned element keys");
        }
    }

    fn try_merge(&mut self, tx: &Transaction) -> Option<TxId> {
        if !self.redo_stack.is_empty() || tx.tx_type() != TxType::Style {
            return None;
        }
        let window = self.history.merge_window_ms;
        let top = self.undo_stack.last_mut()?;
        let mergeable = top.tx_type() == TxType::Style
            && tx.timestamp_ms.saturating_sub(top.timestamp_ms) <= window
            && top.identity() == tx.identity()
            && top.single_style_property().is_some()
            && top.single_style_property() == tx.single_style_property();
        if !mergeable {
            return None;
        }
        top.after = tx.after.clone();
        top.timestamp_ms = tx.timestamp_ms;
        top.merged = true;
        let id = top.id;
        trace!(tx_id = %id, property = tx.single_style_property().unwrap_or(""), "merged style edit");
        let merged = self.undo_stack.last().cloned();
        self.emit(TxAction::Merge, merged);
        Some(id)
    }

    fn editable<H: DocumentHost + ?Sized>(&self, host: &H, node: NodeId) -> LiveditResult<()> {
        if !is_element(host, node) {
            return Err(LiveditError::invalid_target(format!("{node} is not an element")));
        }
        if !host.is_connected(node) {
            return Err(LiveditError::invalid_target(format!("{node} is detached")));
        }
        Ok(())
    }

    fn transaction(
        &self,
        target: Locator,
        element_key: String,
        before: Snapshot,
        after: Snapshot,
        kind: TxKind,
    ) -> Transaction {
        Transaction {
            id: TxId(0),
            target,
            element_key: Some(element_key),
            before,
            after,
            timestamp_ms: self.clock.now_ms(),
            merged: false,
            kind,
        }
    }

    // =========================================================================
    // Style
    // =========================================================================

    /// Open a preview session tracking one property
    pub fn begin_style<H: DocumentHost + ?Sized>(
        &mut self,
        host: &H,
        node: NodeId,
        property: &str,
    ) -> LiveditResult<StyleHandle> {
        self.begin_multi_style(host, node, &[property])
    }

    /// Open a preview session tracking several properties
    pub fn begin_multi_style<H: DocumentHost + ?Sized>(
        &mut self,
        host: &H,
        node: NodeId,
        properties: &[&str],
    ) -> LiveditResult<StyleHandle> {
        self.editable(host, node)?;
        let element_key = self.element_key(node);
        let mut handle = StyleHandle {
            node,
            target: build_locator(host, node, &self.locator)?,
            element_key,
            before: StyleMap::new(),
        };
        for property in properties {
            handle.track(host, property);
        }
        Ok(handle)
    }

    /// Record the previewed values. Returns `None` when nothing changed.
    pub fn commit_style<H: DocumentHost + ?Sized>(
        &mut self,
        host: &H,
        handle: StyleHandle,
    ) -> LiveditResult<Option<TxId>> {
        let after: StyleMap = handle
            .before
            .keys()
            .map(|property| (property.clone(), host.inline_style(handle.node, property)))
            .collect();
        if after == handle.before {
            trace!(node = %handle.node, "style commit without change");
            return Ok(None);
        }
        let after_locator = build_locator(host, handle.node, &self.locator)?;
        let tx = self.transaction(
            handle.target.clone(),
            handle.element_key,
            Snapshot {
                styles: Some(handle.before),
                ..Snapshot::located(handle.target)
            },
            Snapshot {
                styles: Some(after),
                ..Snapshot::located(after_locator)
            },
            TxKind::Style,
        );
        Ok(Some(self.commit(host, tx)))
    }

    /// Restore the pre-preview values without recording anything
    pub fn cancel_style<H: DocumentHost + ?Sized>(
        &mut self,
        host: &mut H,
        handle: StyleHandle,
    ) -> LiveditResult<()> {
        for (property, value) in &handle.before {
            host.set_inline_style(handle.node, property, value.as_deref())?;
        }
        Ok(())
    }

    /// Set one property and record it
    pub fn apply_style<H: DocumentHost + ?Sized>(
        &mut self,
        host: &mut H,
        node: NodeId,
        property: &str,
        value: Option<&str>,
    ) -> LiveditResult<Option<TxId>> {
        self.apply_styles(host, node, &[(property, value)])
    }

    /// Set several properties and record them as one transaction
    pub fn apply_styles<H: DocumentHost + ?Sized>(
        &mut self,
        host: &mut H,
        node: NodeId,
        values: &[(&str, Option<&str>)],
    ) -> LiveditResult<Option<TxId>> {
        let properties: Vec<&str> = values.iter().map(|(property, _)| *property).collect();
        let mut handle = self.begin_multi_style(&*host, node, &properties)?;
        for (property, value) in values {
            if let Err(error) = handle.set(host, property, *value) {
                self.cancel_style(host, handle)?;
                return Err(error);
            }
        }
        self.commit_style(&*host, handle)
    }

    // =========================================================================
    // Text and classes
    // =========================================================================

    /// Replace an element's text and record it
    pub fn record_text<H: DocumentHost + ?Sized>(
        &mut self,
        host: &mut H,
        node: NodeId,
        text: &str,
    ) -> LiveditResult<Option<TxId>> {
        self.editable(&*host, node)?;
        let before_text = host.text_content(node);
        if before_text == text {
            return Ok(None);
        }
        let element_key = self.element_key(node);
        let target = build_locator(&*host, node, &self.locator)?;
        host.set_text_content(node, text)?;
        let after_locator = build_locator(&*host, node, &self.locator)?;
        let tx = self.transaction(
            target.clone(),
            element_key,
            Snapshot {
                text: Some(before_text),
                ..Snapshot::located(target)
            },
            Snapshot {
                text: Some(host.text_content(node)),
                ..Snapshot::located(after_locator)
            },
            TxKind::Text,
        );
        Ok(Some(self.commit(&*host, tx)))
    }

    /// Replace an element's class list and record it
    pub fn record_class<H: DocumentHost + ?Sized>(
        &mut self,
        host: &mut H,
        node: NodeId,
        classes: &[String],
    ) -> LiveditResult<Option<TxId>> {
        self.editable(&*host, node)?;
        let before_classes = host.class_list(node);
        if before_classes == classes {
            return Ok(None);
        }
        let element_key = self.element_key(node);
        let target = build_locator(&*host, node, &self.locator)?;
        host.set_class_list(node, classes)?;
        let after_locator = build_locator(&*host, node, &self.locator)?;
        let tx = self.transaction(
            target.clone(),
            element_key,
            Snapshot {
                classes: Some(before_classes),
                ..Snapshot::located(target)
            },
            Snapshot {
                classes: Some(host.class_list(node)),
                ..Snapshot::located(after_locator)
            },
            TxKind::Class,
        );
        Ok(Some(self.commit(&*host, tx)))
    }

    // =========================================================================
    // Moves
    // =========================================================================

    /// Capture the element's position before a drag
    pub fn begin_move<H: DocumentHost + ?Sized>(
        &mut self,
        host: &H,
        node: NodeId,
    ) -> LiveditResult<MoveHandle> {
        self.editable(host, node)?;
        if let Err(error) = check_subject(host, node, "move") {
            return Err(self.report(error));
        }
        Ok(MoveHandle {
            node,
            target: build_locator(host, node, &self.locator)?,
            element_key: self.element_key(node),
            from: insertion_point_of(host, node, &self.locator)?,
        })
    }

    /// Record wherever the element ended up.
    ///
    /// A drop into a protected container is put back and rejected. A drop
    /// at the original position records nothing.
    pub fn commit_move<H: DocumentHost + ?Sized>(
        &mut self,
        host: &mut H,
        handle: MoveHandle,
    ) -> LiveditResult<Option<TxId>> {
        let landed = host
            .parent(handle.node)
            .ok_or_else(|| LiveditError::invalid_target("moved element is detached"))
            .and_then(|parent| check_container(&*host, parent, "move"));
        if let Err(error) = landed {
            let reverted =
                super::structure::resolve_insertion(&*host, &handle.from, Some(handle.node))
                    .and_then(|(parent, reference)| {
                        host.insert_before(parent, handle.node, reference)
                    });
            if let Err(revert) = reverted {
                warn!(node = %handle.node, error = %revert, "could not put rejected drop back");
                self.report(revert);
            }
            return Err(self.report(error));
        }

        let to = insertion_point_of(&*host, handle.node, &self.locator)?;
        let same_parent = host.parent(handle.node)
            == handle.from.parent_locator.locate(&*host);
        if same_parent && to.insert_index == handle.from.insert_index {
            trace!(node = %handle.node, "move ended where it started");
            return Ok(None);
        }
        let after_locator = build_locator(&*host, handle.node, &self.locator)?;
        let tx = self.transaction(
            handle.target.clone(),
            handle.element_key,
            Snapshot::located(handle.target),
            Snapshot::located(after_locator),
            TxKind::Move(MoveData {
                from: handle.from,
                to,
            }),
        );
        Ok(Some(self.commit(&*host, tx)))
    }

    /// Move an element under `parent` before `reference` (or append) and
    /// record it
    pub fn move_element<H: DocumentHost + ?Sized>(
        &mut self,
        host: &mut H,
        node: NodeId,
        parent: NodeId,
        reference: Option<NodeId>,
    ) -> LiveditResult<Option<TxId>> {
        let handle = self.begin_move(&*host, node)?;
        if let Err(error) = check_container(&*host, parent, "move") {
            return Err(self.report(error));
        }
        host.insert_before(parent, node, reference)?;
        self.commit_move(host, handle)
    }

    // =========================================================================
    // Replay
    // =========================================================================

    /// Revert the newest transaction.
    ///
    /// Returns `Ok(None)` on an empty stack. A failed replay restores the
    /// stacks and returns [`LiveditError::ApplyRollback`].
    pub fn undo<H: DocumentHost + ?Sized>(&mut self, host: &mut H) -> LiveditResult<Option<TxId>> {
        let Some(mut tx) = self.undo_stack.pop() else {
            trace!("nothing to undo");
            return Ok(None);
        };
        match self.replay(host, &mut tx, ReplayDirection::Undo) {
            Ok(()) => {
                let id = tx.id;
                debug!(tx_id = %id, tx_type = %tx.tx_type(), "undo");
                self.redo_stack.push(tx.clone());
                self.emit(TxAction::Undo, Some(tx));
                Ok(Some(id))
            }
            Err(cause) => Err(self.rollback(tx, ReplayDirection::Undo, &cause)),
        }
    }

    /// Re-apply the newest undone transaction
    pub fn redo<H: DocumentHost + ?Sized>(&mut self, host: &mut H) -> LiveditResult<Option<TxId>> {
        let Some(mut tx) = self.redo_stack.pop() else {
            trace!("nothing to redo");
            return Ok(None);
        };
        match self.replay(host, &mut tx, ReplayDirection::Redo) {
            Ok(()) => {
                let id = tx.id;
                debug!(tx_id = %id, tx_type = %tx.tx_type(), "redo");
                self.undo_stack.push(tx.clone());
                self.emit(TxAction::Redo, Some(tx));
                Ok(Some(id))
            }
            Err(cause) => Err(self.rollback(tx, ReplayDirection::Redo, &cause)),
        }
    }

    fn rollback(
        &mut self,
        tx: Transaction,
        direction: ReplayDirection,
        cause: &LiveditError,
    ) -> LiveditError {
        let error = LiveditError::ApplyRollback {
            tx_id: tx.id,
            tx_type: tx.tx_type(),
            direction,
            message: cause.to_string(),
        };
        warn!(tx_id = %tx.id, direction = %direction, cause = %cause, "replay rolled back");
        match direction {
            ReplayDirection::Undo => self.undo_stack.push(tx.clone()),
            ReplayDirection::Redo => self.redo_stack.push(tx.clone()),
        }
        self.emit(TxAction::Rollback, Some(tx));
        self.errors.emit(&error);
        error
    }
}
