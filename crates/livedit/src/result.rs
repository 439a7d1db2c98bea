//! Result and error types for livedit.

use thiserror::Error;

use crate::transaction::{TxId, TxType};

/// Result type for livedit operations
pub type LiveditResult<T> = Result<T, LiveditError>;

/// Which way a replay step was travelling when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayDirection {
    /// Undo step
    Undo,
    /// Redo step
    Redo,
}

impl std::fmt::Display for ReplayDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undo => write!(f, "undo"),
            Self::Redo => write!(f, "redo"),
        }
    }
}

/// Errors that can occur in livedit
#[derive(Debug, Error)]
pub enum LiveditError {
    /// An undo/redo step could not re-resolve its anchors; history was restored
    #[error("{direction} of transaction {tx_id} ({tx_type}) rolled back: {message}")]
    ApplyRollback {
        /// Transaction that failed to replay
        tx_id: TxId,
        /// Transaction type
        tx_type: TxType,
        /// Replay direction
        direction: ReplayDirection,
        /// Error message
        message: String,
    },

    /// A structural or move operation targeted a disallowed node
    #[error("Structure operation rejected: {message}")]
    StructureRejected {
        /// Error message
        message: String,
    },

    /// The node handed in cannot be edited (detached, not an element, unknown)
    #[error("Invalid target: {message}")]
    InvalidTarget {
        /// Error message
        message: String,
    },

    /// Selector could not be parsed by the query evaluator
    #[error("Invalid selector `{selector}`: {message}")]
    InvalidSelector {
        /// Offending selector
        selector: String,
        /// Error message
        message: String,
    },

    /// Markup could not be parsed into a single root element
    #[error("Markup error: {message}")]
    Markup {
        /// Error message
        message: String,
    },

    /// Configuration rejected by validation
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Edit script failed to load or run
    #[error("Script error: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LiveditError {
    /// Create a structure rejection error
    #[must_use]
    pub fn structure_rejected(message: impl Into<String>) -> Self {
        Self::StructureRejected {
            message: message.into(),
        }
    }

    /// Create an invalid target error
    #[must_use]
    pub fn invalid_target(message: impl Into<String>) -> Self {
        Self::InvalidTarget {
            message: message.into(),
        }
    }

    /// Create an invalid selector error
    #[must_use]
    pub fn invalid_selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            message: message.into(),
        }
    }

    /// Create a markup error
    #[must_use]
    pub fn markup(message: impl Into<String>) -> Self {
        Self::Markup {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a script error
    #[must_use]
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Whether this error left history untouched after a failed replay
    #[must_use]
    pub const fn is_rollback(&self) -> bool {
        matches!(self, Self::ApplyRollback { .. })
    }
}
