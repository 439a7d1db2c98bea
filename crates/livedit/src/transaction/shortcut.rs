//! History keyboard shortcuts.
//!
//! Maps key chords to history commands. Typing inside an editable control
//! never triggers history, so the control keeps its own undo.

use serde::{Deserialize, Serialize};

/// A key press with its modifiers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyChord {
    /// Key value, as reported by the host (`"z"`, `"Z"`, `"y"`)
    pub key: String,
    /// Control held
    pub ctrl: bool,
    /// Command/meta held
    pub meta: bool,
    /// Shift held
    pub shift: bool,
    /// Alt/option held
    pub alt: bool,
}

impl KeyChord {
    /// Chord without modifiers
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// With control held
    #[must_use]
    pub const fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    /// With command/meta held
    #[must_use]
    pub const fn meta(mut self) -> Self {
        self.meta = true;
        self
    }

    /// With shift held
    #[must_use]
    pub const fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    /// With alt held
    #[must_use]
    pub const fn alt(mut self) -> Self {
        self.alt = true;
        self
    }
}

/// Where keyboard focus is when the chord arrives
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusContext {
    /// Tag of the focused element, if any
    pub tag: Option<String>,
    /// Whether the focused element (or an ancestor) is contenteditable
    pub content_editable: bool,
}

impl FocusContext {
    /// Focus on an element with the given tag
    #[must_use]
    pub fn on(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            content_editable: false,
        }
    }

    /// Focus inside editable content
    #[must_use]
    pub const fn editable() -> Self {
        Self {
            tag: None,
            content_editable: true,
        }
    }

    /// Whether typing goes into a control with its own editing
    #[must_use]
    pub fn is_editable(&self) -> bool {
        self.content_editable
            || self.tag.as_deref().is_some_and(|tag| {
                matches!(
                    tag.to_ascii_lowercase().as_str(),
                    "input" | "textarea" | "select"
                )
            })
    }
}

/// History command bound to a chord
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryCommand {
    /// Revert the newest transaction
    Undo,
    /// Re-apply the newest undone transaction
    Redo,
}

/// Map a chord to a history command
#[must_use]
pub fn history_command(chord: &KeyChord, focus: &FocusContext) -> Option<HistoryCommand> {
    if focus.is_editable() || chord.alt {
        return None;
    }
    let key = chord.key.to_ascii_lowercase();
    match (key.as_str(), chord.ctrl || chord.meta, chord.shift) {
        ("z", true, false) => Some(HistoryCommand::Undo),
        ("z", true, true) => Some(HistoryCommand::Redo),
        ("y", true, false) if chord.ctrl => Some(HistoryCommand::Redo),
        _ => None,
    }
}
