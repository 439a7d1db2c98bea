//! Post-regeneration consistency verification.
//!
//! After an edit is applied to source by an external process, the live tree
//! is regenerated asynchronously. A [`ConsistencyVerifier`] session tracks
//! that apply operation, waits for change notifications to go quiet, then
//! re-resolves the edited element and checks that the edit survived.
//!
//! ```text
//! idle ──start──▶ executing ──completed──▶ settling ──quiet/no-signal──▶ verifying ──▶ outcome
//!                    │                        │
//!                    └─failed/watchdog        └─settle deadline
//! ```
//!
//! Nothing runs on its own: timers fire from [`ConsistencyVerifier::tick`]
//! against the injected clock, and notifications arrive through
//! [`ConsistencyVerifier::on_mutations`].

mod outcome;
mod resolve;
mod session;

pub use outcome::{
    Baseline, Resolution, ResolutionTier, Signals, StyleDiff, TextDiff, Timing,
    VerificationResult, VerifyOutcome,
};
pub use resolve::{resolve_tiered, score_candidate};
pub use session::VerifierPhase;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::VerifierConfig;
use crate::disposer::Disposer;
use crate::dom::{contains, normalize_text, root_scope, DocumentHost, MutationKind, MutationRecord, NodeId};
use crate::events::{EventBus, ListenerId};
use crate::locator::locate_scope;
use crate::timer::TimerId;
use crate::transaction::{Transaction, TransactionManager, TxId, TxKind};
use outcome::{classify, Classification};
use session::{Session, SessionResources, SessionTimer, Subscriptions};

/// Status of the external apply operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPhase {
    /// Accepted, not started
    Queued,
    /// In progress
    Running,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully
    Failed,
    /// Crashed; handled like `Failed`
    Error,
    /// Gave up on its own deadline
    TimedOut,
    /// Cancelled by the user or the host
    Cancelled,
}

impl ApplyPhase {
    /// Whether the operation will not change phase again
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }

    /// Whether it terminated without success
    #[must_use]
    pub const fn is_failure(self) -> bool {
        self.is_terminal() && !matches!(self, Self::Completed)
    }
}

impl fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Pull-style source of apply status
pub trait ApplyStatusChannel {
    /// Latest phase of a request, `None` when unknown
    fn poll_status(&self, request_id: &str) -> Option<ApplyPhase>;
}

impl<F: Fn(&str) -> Option<ApplyPhase>> ApplyStatusChannel for F {
    fn poll_status(&self, request_id: &str) -> Option<ApplyPhase> {
        self(request_id)
    }
}

/// Newest entry of the undo history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistoryHead {
    /// Id of the top undo entry
    pub tx_id: Option<TxId>,
    /// Its (latest merged) timestamp
    pub timestamp_ms: Option<u64>,
}

impl HistoryHead {
    /// Read the head of a manager's history
    #[must_use]
    pub fn of<C: Clock>(manager: &TransactionManager<C>) -> Self {
        let top = manager.last_transaction();
        Self {
            tx_id: top.map(|tx| tx.id),
            timestamp_ms: top.map(|tx| tx.timestamp_ms),
        }
    }
}

/// Editor state consulted when a session fires
#[derive(Clone, Copy, Default)]
pub struct VerifyContext<'a> {
    /// Current history head; `None` skips the staleness check
    pub history: Option<HistoryHead>,
    /// Currently selected element
    pub selection: Option<NodeId>,
    /// Status channel polled while executing
    pub status: Option<&'a dyn ApplyStatusChannel>,
}

impl<'a> VerifyContext<'a> {
    /// Context with no editor state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check staleness against a manager's history
    #[must_use]
    pub fn with_manager<C: Clock>(mut self, manager: &TransactionManager<C>) -> Self {
        self.history = Some(HistoryHead::of(manager));
        self
    }

    /// Set the current selection
    #[must_use]
    pub const fn with_selection(mut self, selection: Option<NodeId>) -> Self {
        self.selection = selection;
        self
    }

    /// Poll this channel while executing
    #[must_use]
    pub fn with_status(mut self, status: &'a dyn ApplyStatusChannel) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Debug for VerifyContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyContext")
            .field("history", &self.history)
            .field("selection", &self.selection)
            .field("status", &self.status.is_some())
            .finish()
    }
}

const fn timer_label(kind: SessionTimer) -> &'static str {
    match kind {
        SessionTimer::StatusPoll => "status poll",
        SessionTimer::ExecuteWatchdog => "execute watchdog",
        SessionTimer::QuietWindow => "quiet window",
        SessionTimer::SettleDeadline => "settle deadline",
        SessionTimer::NoSignal => "no-signal deadline",
    }
}

/// Whether a notification is a stylesheet being injected or rewritten
fn is_style_injection<H: DocumentHost + ?Sized>(host: &H, record: &MutationRecord) -> bool {
    let is_sheet = |node: NodeId| {
        host.tag_name(node)
            .is_some_and(|tag| tag == "style" || tag == "link")
    };
    match record.kind {
        MutationKind::ChildList => {
            record.added.iter().any(|node| is_sheet(*node)) || is_sheet(record.target)
        }
        MutationKind::CharacterData => host.parent(record.target).is_some_and(is_sheet),
        MutationKind::Attributes { .. } => false,
    }
}

fn baseline_for<H: DocumentHost + ?Sized>(
    host: &H,
    tx: &Transaction,
    node: Option<NodeId>,
) -> Baseline {
    match tx.kind {
        TxKind::Style => {
            let expected: BTreeMap<String, Option<String>> = tx
                .after
                .styles
                .iter()
                .flatten()
                .map(|(property, value)| {
                    let live = match node {
                        Some(node) => host.computed_style(node, property),
                        None => value.clone(),
                    };
                    (property.clone(), live)
                })
                .collect();
            if expected.is_empty() {
                Baseline::None
            } else {
                Baseline::Style(expected)
            }
        }
        TxKind::Text => node
            .map(|node| host.text_content(node))
            .or_else(|| tx.after.text.clone())
            .map_or(Baseline::None, |text| Baseline::Text(normalize_text(&text))),
        TxKind::Class | TxKind::Move(_) | TxKind::Structure(_) => Baseline::None,
    }
}

/// Debounced re-resolution of one committed edit at a time
pub struct ConsistencyVerifier<C: Clock = SystemClock> {
    config: VerifierConfig,
    clock: C,
    session: Option<Session>,
    resources: SessionResources,
    disposer: Disposer<SessionResources>,
    results: EventBus<VerificationResult>,
}

impl ConsistencyVerifier<SystemClock> {
    /// Verifier on the system clock with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for ConsistencyVerifier<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> fmt::Debug for ConsistencyVerifier<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsistencyVerifier")
            .field("phase", &self.phase())
            .field("timers", &self.resources.timers.len())
            .field("disposer", &self.disposer)
            .finish_non_exhaustive()
    }
}

impl<C: Clock> ConsistencyVerifier<C> {
    /// Verifier with default settings on the given clock
    pub fn with_clock(clock: C) -> Self {
        Self {
            config: VerifierConfig::default(),
            clock,
            session: None,
            resources: SessionResources::default(),
            disposer: Disposer::new(),
            results: EventBus::new(),
        }
    }

    /// Replace the settings
    #[must_use]
    pub fn with_config(mut self, config: VerifierConfig) -> Self {
        self.config = config;
        self
    }

    /// Settings
    #[must_use]
    pub const fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> VerifierPhase {
        self.session
            .as_ref()
            .map_or(VerifierPhase::Idle, |session| session.phase)
    }

    /// Whether a session is active
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Transaction of the active session
    #[must_use]
    pub fn active_tx_id(&self) -> Option<TxId> {
        self.session.as_ref().map(|session| session.tx_id)
    }

    /// Earliest armed timer, for hosts scheduling their next `tick`
    #[must_use]
    pub fn next_due_ms(&self) -> Option<u64> {
        self.resources.timers.next_due_ms()
    }

    /// Containment root currently observed
    #[must_use]
    pub const fn observed_tree(&self) -> Option<NodeId> {
        self.resources.subscriptions.tree
    }

    /// Subscribe to terminal results
    pub fn subscribe(&mut self, listener: impl FnMut(&VerificationResult) + 'static) -> ListenerId {
        self.results.subscribe(listener)
    }

    /// Remove a result listener
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.results.unsubscribe(id)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Begin verifying `tx`.
    ///
    /// With a request id the session waits for the apply to complete;
    /// without one it settles immediately. Returns the result of a
    /// superseded session, finalized as skipped.
    pub fn start<H: DocumentHost + ?Sized>(
        &mut self,
        host: &H,
        tx: &Transaction,
        request_id: Option<&str>,
        element: Option<NodeId>,
    ) -> Option<VerificationResult> {
        let superseded = self.finalize(Classification::bare(VerifyOutcome::Skipped, "superseded"), None);

        let now = self.clock.now_ms();
        let node = element
            .filter(|node| host.is_connected(*node))
            .or_else(|| tx.after.locator.locate(host));
        let anchor_rect = node.and_then(|node| host.bounding_rect(node));
        self.session = Some(Session {
            phase: VerifierPhase::Executing,
            request_id: request_id.map(str::to_string),
            tx_id: tx.id,
            tx_timestamp_ms: tx.timestamp_ms,
            tx_type: tx.tx_type(),
            locator: tx.after.locator.clone(),
            node,
            baseline: baseline_for(host, tx, node),
            anchor_rect,
            anchor_center: anchor_rect.map(|rect| rect.center()),
            signals: Signals::default(),
            started_ms: now,
            settling_ms: None,
            quiet_timer: None,
            no_signal_timer: None,
            poll_timer: None,
            watchdog_timer: None,
        });
        debug!(tx_id = %tx.id, request_id = request_id.unwrap_or(""), "verification started");

        if request_id.is_some() {
            let poll = self.arm(SessionTimer::StatusPoll, now + self.config.status_poll_ms);
            let watchdog =
                self.arm(SessionTimer::ExecuteWatchdog, now + self.config.execute_timeout_ms);
            if let Some(session) = self.session.as_mut() {
                session.poll_timer = Some(poll);
                session.watchdog_timer = Some(watchdog);
            }
        } else {
            self.enter_settling(host, now);
        }
        superseded
    }

    /// Push a status update for the tracked request
    pub fn on_apply_status<H: DocumentHost + ?Sized>(
        &mut self,
        host: &H,
        request_id: &str,
        phase: ApplyPhase,
    ) -> Option<VerificationResult> {
        let session = self.session.as_ref()?;
        if session.phase != VerifierPhase::Executing
            || session.request_id.as_deref() != Some(request_id)
        {
            trace!(request_id, phase = %phase, "status ignored");
            return None;
        }
        self.handle_status(host, phase)
    }

    /// Feed a batch of change notifications
    pub fn on_mutations<H: DocumentHost + ?Sized>(&mut self, host: &H, records: &[MutationRecord]) {
        let subscriptions = self.resources.subscriptions;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.phase != VerifierPhase::Settling {
            return;
        }
        let mut relevant = 0;
        let mut injections = 0;
        for record in records {
            if subscriptions.style_injection && is_style_injection(host, record) {
                injections += 1;
                relevant += 1;
            } else if subscriptions
                .tree
                .is_some_and(|tree| contains(host, tree, record.target))
            {
                relevant += 1;
            }
        }
        if session.node.is_some_and(|node| !host.is_connected(node)) {
            session.signals.had_element_disconnect = true;
        }
        if relevant == 0 {
            return;
        }
        session.signals.had_relevant_mutation = true;
        session.signals.mutation_count += relevant;
        session.signals.style_injections += injections;
        trace!(relevant, injections, "relevant change notifications");

        let due = self.clock.now_ms() + self.config.quiet_window_ms;
        if let Some(id) = session.no_signal_timer.take() {
            self.resources.timers.cancel(id);
        }
        match session.quiet_timer {
            Some(id) => {
                self.resources.timers.reschedule(id, due);
            }
            None => {
                let id = self.arm(SessionTimer::QuietWindow, due);
                if let Some(session) = self.session.as_mut() {
                    session.quiet_timer = Some(id);
                }
            }
        }
    }

    /// Fire due timers. Returns the terminal result if one was reached.
    pub fn tick<H: DocumentHost + ?Sized>(
        &mut self,
        host: &H,
        context: &VerifyContext<'_>,
    ) -> Option<VerificationResult> {
        let now = self.clock.now_ms();
        while let Some((_, kind)) = self.resources.timers.pop_due(now) {
            trace!(timer = timer_label(kind), "timer fired");
            let result = match kind {
                SessionTimer::StatusPoll => self.poll_status(host, context, now),
                SessionTimer::ExecuteWatchdog => self.finalize(
                    Classification::bare(VerifyOutcome::Uncertain, "apply_timeout"),
                    None,
                ),
                SessionTimer::QuietWindow | SessionTimer::NoSignal => {
                    self.run_verify(host, context)
                }
                SessionTimer::SettleDeadline => self.finalize(
                    Classification::bare(VerifyOutcome::Uncertain, "timeout"),
                    None,
                ),
            };
            if result.is_some() {
                return result;
            }
        }
        None
    }

    /// Re-resolve and classify now
    pub fn run_verify<H: DocumentHost + ?Sized>(
        &mut self,
        host: &H,
        context: &VerifyContext<'_>,
    ) -> Option<VerificationResult> {
        let session = self.session.as_mut()?;
        session.phase = VerifierPhase::Verifying;

        if let Some(head) = context.history {
            let newer = head.tx_id != Some(session.tx_id)
                || head
                    .timestamp_ms
                    .is_some_and(|timestamp| timestamp > session.tx_timestamp_ms);
            if newer {
                return self.finalize(
                    Classification::bare(VerifyOutcome::Skipped, "stale_transaction"),
                    None,
                );
            }
        }
        if let Some(selected) = context.selection {
            if Some(selected) != session.node && Some(selected) != session.locator.locate(host) {
                return self.finalize(
                    Classification::bare(VerifyOutcome::Skipped, "selection_changed"),
                    None,
                );
            }
        }

        let resolved = resolve_tiered(
            host,
            &session.locator,
            session.node,
            session.anchor_center,
            &self.config,
        );
        let classification = classify(
            host,
            session.tx_type,
            &session.baseline,
            resolved.as_ref(),
            &session.signals,
        );
        self.finalize(classification, resolved)
    }

    /// Tear down the active session as skipped
    pub fn dispose(&mut self) -> Option<VerificationResult> {
        self.finalize(Classification::bare(VerifyOutcome::Skipped, "disposed"), None)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn arm(&mut self, kind: SessionTimer, due_ms: u64) -> TimerId {
        let id = self.resources.timers.arm(kind, due_ms);
        self.disposer.add(timer_label(kind), move |resources| {
            resources.timers.cancel(id);
        });
        id
    }

    fn enter_settling<H: DocumentHost + ?Sized>(&mut self, host: &H, now: u64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.phase = VerifierPhase::Settling;
        session.settling_ms = Some(now);
        let tree = session
            .node
            .and_then(|node| root_scope(host, node))
            .or_else(|| locate_scope(host, &session.locator, host.document()))
            .unwrap_or_else(|| host.document());

        self.resources.subscriptions = Subscriptions {
            tree: Some(tree),
            style_injection: true,
        };
        let mut observers = Disposer::new();
        observers.add("tree observer", |resources: &mut SessionResources| {
            resources.subscriptions.tree = None;
        });
        observers.add("style observer", |resources: &mut SessionResources| {
            resources.subscriptions.style_injection = false;
        });
        self.disposer.adopt(observers);

        self.arm(SessionTimer::SettleDeadline, now + self.config.settle_deadline_ms);
        let no_signal = self.arm(SessionTimer::NoSignal, now + self.config.no_signal_deadline_ms);
        if let Some(session) = self.session.as_mut() {
            session.no_signal_timer = Some(no_signal);
        }
        debug!(tree = %tree, "settling");
    }

    fn handle_status<H: DocumentHost + ?Sized>(
        &mut self,
        host: &H,
        phase: ApplyPhase,
    ) -> Option<VerificationResult> {
        if phase.is_failure() {
            return self.finalize(
                Classification::bare(VerifyOutcome::Skipped, format!("apply_{phase}")),
                None,
            );
        }
        if phase != ApplyPhase::Completed {
            return None;
        }
        if let Some(session) = self.session.as_mut() {
            for id in [session.poll_timer.take(), session.watchdog_timer.take()]
                .into_iter()
                .flatten()
            {
                self.resources.timers.cancel(id);
            }
        }
        let now = self.clock.now_ms();
        self.enter_settling(host, now);
        None
    }

    fn poll_status<H: DocumentHost + ?Sized>(
        &mut self,
        host: &H,
        context: &VerifyContext<'_>,
        now: u64,
    ) -> Option<VerificationResult> {
        let session = self.session.as_mut()?;
        session.poll_timer = None;
        if session.phase != VerifierPhase::Executing {
            return None;
        }
        let Some(channel) = context.status else {
            trace!("no status channel; waiting for pushed status");
            return None;
        };
        let request_id = session.request_id.clone()?;
        match channel.poll_status(&request_id) {
            Some(phase) if phase.is_terminal() => self.handle_status(host, phase),
            _ => {
                let poll = self.arm(SessionTimer::StatusPoll, now + self.config.status_poll_ms);
                if let Some(session) = self.session.as_mut() {
                    session.poll_timer = Some(poll);
                }
                None
            }
        }
    }

    fn finalize(
        &mut self,
        classification: Classification,
        resolved: Option<Resolution>,
    ) -> Option<VerificationResult> {
        let session = self.session.take()?;
        let panics = self.disposer.dispose(&mut self.resources);
        if panics > 0 {
            warn!(panics, "session teardown had failing release actions");
        }
        self.resources.timers.clear();
        self.resources.subscriptions = Subscriptions::default();

        let result = VerificationResult {
            outcome: classification.outcome,
            reason: classification.reason,
            tx_id: session.tx_id,
            tx_type: session.tx_type,
            request_id: session.request_id,
            resolved,
            style_diff: classification.style_diff,
            text_diff: classification.text_diff,
            signals: session.signals,
            timing: Timing {
                started_ms: session.started_ms,
                settling_ms: session.settling_ms,
                finished_ms: self.clock.now_ms(),
            },
        };
        debug!(
            tx_id = %result.tx_id,
            outcome = %result.outcome,
            reason = %result.reason,
            "verification finished"
        );
        self.results.emit(&result);
        Some(result)
    }
}
