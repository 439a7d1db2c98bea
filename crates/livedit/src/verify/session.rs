//! Verification session state.

use serde::{Deserialize, Serialize};

use super::outcome::{Baseline, Signals};
use crate::dom::{NodeId, Point, Rect};
use crate::locator::Locator;
use crate::timer::{TimerId, TimerQueue};
use crate::transaction::{TxId, TxType};

/// Verifier lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifierPhase {
    /// No session
    #[default]
    Idle,
    /// Waiting for the external apply to finish
    Executing,
    /// Watching change notifications for quiescence
    Settling,
    /// Re-resolving and comparing
    Verifying,
}

/// Timer continuations owned by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionTimer {
    StatusPoll,
    ExecuteWatchdog,
    QuietWindow,
    SettleDeadline,
    NoSignal,
}

/// What the session is listening to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Subscriptions {
    /// Containment root whose subtree is observed
    pub tree: Option<NodeId>,
    /// Whether stylesheet injections count as signals
    pub style_injection: bool,
}

/// Resources released by the session disposer
#[derive(Debug, Default)]
pub(crate) struct SessionResources {
    pub timers: TimerQueue<SessionTimer>,
    pub subscriptions: Subscriptions,
}

/// One active verification
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub phase: VerifierPhase,
    pub request_id: Option<String>,
    pub tx_id: TxId,
    pub tx_timestamp_ms: u64,
    pub tx_type: TxType,
    pub locator: Locator,
    /// Handle captured at start; may go stale
    pub node: Option<NodeId>,
    pub baseline: Baseline,
    pub anchor_rect: Option<Rect>,
    pub anchor_center: Option<Point>,
    pub signals: Signals,
    pub started_ms: u64,
    pub settling_ms: Option<u64>,
    pub quiet_timer: Option<TimerId>,
    pub no_signal_timer: Option<TimerId>,
    pub poll_timer: Option<TimerId>,
    pub watchdog_timer: Option<TimerId>,
}
