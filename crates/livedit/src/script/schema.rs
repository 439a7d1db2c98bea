//! Edit script YAML schema.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::EditorConfig;
use crate::result::{LiveditError, LiveditResult};
use crate::transaction::StructureAction;
use crate::verify::{ApplyPhase, VerifyOutcome};

/// Root of an edit script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditScript {
    /// Script name
    #[serde(default)]
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Initial document markup
    pub document: String,
    /// Settings overriding the defaults
    #[serde(default)]
    pub config: Option<EditorConfig>,
    /// Clock start, in milliseconds
    #[serde(default)]
    pub start_ms: u64,
    /// Steps in order
    pub steps: Vec<Step>,
}

impl EditScript {
    /// Parse a YAML script
    pub fn from_yaml_str(yaml: &str) -> LiveditResult<Self> {
        let script: Self = serde_yaml_ng::from_str(yaml)?;
        script.validate()?;
        Ok(script)
    }

    /// Load a YAML script from disk
    pub fn load(path: &Path) -> LiveditResult<Self> {
        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }

    /// Check the script before running it
    pub fn validate(&self) -> LiveditResult<()> {
        if self.steps.is_empty() {
            return Err(LiveditError::script("script has no steps"));
        }
        if let Some(config) = &self.config {
            config.validate()?;
        }
        for (index, step) in self.steps.iter().enumerate() {
            if let Step::Expect(expect) = step {
                if expect.is_empty() {
                    return Err(LiveditError::script(format!(
                        "step {}: expect checks nothing",
                        index + 1
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One scripted action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Set one inline style property (`null` removes it)
    Style {
        /// Element selector
        target: String,
        /// Property name
        property: String,
        /// New value
        value: Option<String>,
    },
    /// Set several inline style properties as one edit
    MultiStyle {
        /// Element selector
        target: String,
        /// Values by property
        values: BTreeMap<String, Option<String>>,
    },
    /// Replace text content
    Text {
        /// Element selector
        target: String,
        /// New text
        text: String,
    },
    /// Replace the class list
    Class {
        /// Element selector
        target: String,
        /// New class tokens
        classes: Vec<String>,
    },
    /// Move an element
    Move {
        /// Element selector
        target: String,
        /// New parent selector
        parent: String,
        /// Sibling to insert before; appends when absent
        #[serde(default)]
        before: Option<String>,
    },
    /// Wrap, unwrap, delete or duplicate
    Structure {
        /// Element selector
        target: String,
        /// Edit kind
        action: StructureAction,
        /// Wrapper tag for wrap
        #[serde(default)]
        wrapper_tag: Option<String>,
        /// Wrapper inline styles for wrap
        #[serde(default)]
        wrapper_styles: Option<BTreeMap<String, String>>,
    },
    /// Undo the newest transaction
    Undo {
        /// Whether a rollback error is expected
        #[serde(default)]
        expect_error: bool,
    },
    /// Redo the newest undone transaction
    Redo {
        /// Whether a rollback error is expected
        #[serde(default)]
        expect_error: bool,
    },
    /// Empty the history
    Clear,
    /// Move the clock forward and fire due verifier timers
    Advance {
        /// Milliseconds to advance
        ms: u64,
    },
    /// Start verifying the newest transaction
    VerifyStart {
        /// Element captured at start
        #[serde(default)]
        target: Option<String>,
        /// External apply request id
        #[serde(default)]
        request_id: Option<String>,
    },
    /// Push an apply status
    ApplyStatus {
        /// Request id
        request_id: String,
        /// New phase
        phase: ApplyPhase,
    },
    /// Simulate a regeneration of the live tree
    Regenerate {
        /// Element to replace
        #[serde(default)]
        target: Option<String>,
        /// Replacement markup
        #[serde(default)]
        html: Option<String>,
        /// Stylesheet to inject
        #[serde(default)]
        css: Option<String>,
    },
    /// Check document and history state
    Expect(Expectation),
}

impl Step {
    /// Step kind, as written in the script
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Style { .. } => "style",
            Self::MultiStyle { .. } => "multi_style",
            Self::Text { .. } => "text",
            Self::Class { .. } => "class",
            Self::Move { .. } => "move",
            Self::Structure { .. } => "structure",
            Self::Undo { .. } => "undo",
            Self::Redo { .. } => "redo",
            Self::Clear => "clear",
            Self::Advance { .. } => "advance",
            Self::VerifyStart { .. } => "verify_start",
            Self::ApplyStatus { .. } => "apply_status",
            Self::Regenerate { .. } => "regenerate",
            Self::Expect(_) => "expect",
        }
    }
}

/// Assertions of an `expect` step; every given field must hold
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Expectation {
    /// Element the element checks apply to
    pub selector: Option<String>,
    /// Whether the selector matches an element
    pub exists: Option<bool>,
    /// Number of elements matching the selector
    pub count: Option<usize>,
    /// Computed style values
    pub style: Option<BTreeMap<String, Option<String>>>,
    /// Normalized text
    pub text: Option<String>,
    /// Class tokens in order
    pub classes: Option<Vec<String>>,
    /// Element-child index within the parent
    pub index: Option<usize>,
    /// Undo stack length
    pub undo_count: Option<usize>,
    /// Redo stack length
    pub redo_count: Option<usize>,
    /// Outcome of the newest verification result
    pub outcome: Option<VerifyOutcome>,
    /// Reason of the newest verification result
    pub reason: Option<String>,
}

impl Expectation {
    /// Whether no check is given
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exists.is_none()
            && self.count.is_none()
            && self.style.is_none()
            && self.text.is_none()
            && self.classes.is_none()
            && self.index.is_none()
            && self.undo_count.is_none()
            && self.redo_count.is_none()
            && self.outcome.is_none()
            && self.reason.is_none()
    }
}
