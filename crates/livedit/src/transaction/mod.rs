//! Typed undo/redo transactions.
//!
//! Every edit is recorded as a [`Transaction`] anchored by [`Locator`]s, never
//! by node handles, so replay works after the edited node has been removed
//! and recreated. [`TransactionManager`] owns the bounded undo and redo
//! stacks; replay re-resolves every anchor before touching the tree.

mod manager;
mod replay;
pub mod shortcut;
mod structure;

pub use manager::{MoveHandle, StyleHandle, TransactionManager};
pub use structure::StructureRequest;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::locator::Locator;

/// Inline style values by property; `None` means the declaration is absent
pub type StyleMap = BTreeMap<String, Option<String>>;

/// Monotonic transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    /// Inline style edit
    Style,
    /// Text content edit
    Text,
    /// Class list edit
    Class,
    /// Reorder or reparent
    Move,
    /// Wrap, unwrap, delete or duplicate
    Structure,
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Style => "style",
            Self::Text => "text",
            Self::Class => "class",
            Self::Move => "move",
            Self::Structure => "structure",
        };
        f.write_str(name)
    }
}

/// Element state on one side of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Where the element was found in this state
    pub locator: Locator,
    /// Tracked inline styles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<StyleMap>,
    /// Text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Class tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<String>>,
}

impl Snapshot {
    /// Snapshot carrying only a locator
    #[must_use]
    pub const fn located(locator: Locator) -> Self {
        Self {
            locator,
            styles: None,
            text: None,
            classes: None,
        }
    }
}

/// Side of the anchor sibling an insertion happens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPosition {
    /// Insert before the anchor
    #[default]
    Before,
    /// Insert after the anchor
    After,
}

/// A position among a parent's element children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertionPoint {
    /// Parent container
    pub parent_locator: Locator,
    /// Element-child index, used when the anchor cannot be resolved
    pub insert_index: usize,
    /// Neighbouring sibling, preferred over the index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_locator: Option<Locator>,
    /// Which side of the anchor
    #[serde(default)]
    pub anchor_position: AnchorPosition,
}

/// Endpoints of a move
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveData {
    /// Position before the move
    pub from: InsertionPoint,
    /// Position after the move
    pub to: InsertionPoint,
}

/// Structural edit kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureAction {
    /// Wrap the element in a new container
    Wrap,
    /// Remove the element's container, keeping the element
    Unwrap,
    /// Remove the element
    Delete,
    /// Insert a copy after the element
    Duplicate,
}

impl fmt::Display for StructureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Wrap => "wrap",
            Self::Unwrap => "unwrap",
            Self::Delete => "delete",
            Self::Duplicate => "duplicate",
        };
        f.write_str(name)
    }
}

/// Payload of a structural transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureData {
    /// What was done
    pub action: StructureAction,
    /// Container tag for wrap/unwrap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper_tag: Option<String>,
    /// Inline styles given to a created wrapper
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper_styles: Option<BTreeMap<String, String>>,
    /// Attributes of a removed wrapper, restored on undo-unwrap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper_attributes: Option<Vec<(String, String)>>,
    /// Where a deleted or duplicated element lives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<InsertionPoint>,
    /// Serialized outer markup of a deleted or duplicated element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

/// Per-type payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TxKind {
    /// Inline style edit
    Style,
    /// Text content edit
    Text,
    /// Class list edit
    Class,
    /// Reorder or reparent
    Move(MoveData),
    /// Structural edit
    Structure(StructureData),
}

/// One recorded edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Identifier, unique within a manager
    pub id: TxId,
    /// The edited element as it was found when the edit began
    pub target: Locator,
    /// Stable key assigned to the element before it was first mutated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_key: Option<String>,
    /// State before the edit
    pub before: Snapshot,
    /// State after the edit
    pub after: Snapshot,
    /// Clock time of the (latest merged) edit
    pub timestamp_ms: u64,
    /// Whether later edits were folded into this one
    #[serde(default)]
    pub merged: bool,
    /// Type-specific payload
    #[serde(flatten)]
    pub kind: TxKind,
}

impl Transaction {
    /// Discriminant
    #[must_use]
    pub const fn tx_type(&self) -> TxType {
        match self.kind {
            TxKind::Style => TxType::Style,
            TxKind::Text => TxType::Text,
            TxKind::Class => TxType::Class,
            TxKind::Move(_) => TxType::Move,
            TxKind::Structure(_) => TxType::Structure,
        }
    }

    /// Identity used for merge decisions
    #[must_use]
    pub fn identity(&self) -> String {
        self.element_key
            .clone()
            .unwrap_or_else(|| self.target.identity_key())
    }

    /// The single style property touched, when exactly one
    #[must_use]
    pub fn single_style_property(&self) -> Option<&str> {
        let styles = self.after.styles.as_ref()?;
        match (styles.len(), styles.keys().next()) {
            (1, Some(property)) => Some(property),
            _ => None,
        }
    }
}

/// What happened to the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxAction {
    /// New transaction on the undo stack
    Push,
    /// Edit folded into the top transaction
    Merge,
    /// Transaction moved to the redo stack
    Undo,
    /// Transaction moved back to the undo stack
    Redo,
    /// Both stacks emptied
    Clear,
    /// Replay failed; the transaction was restored to its stack
    Rollback,
}

/// History change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxChange {
    /// What happened
    pub action: TxAction,
    /// Transaction involved (absent for clear)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
    /// Undo stack length afterwards
    pub undo_count: usize,
    /// Redo stack length afterwards
    pub redo_count: usize,
}
