//! Livedit: editing core for in-page visual editors
//!
//! An in-page editor lets a user restyle, retype, reorder and restructure a
//! running UI, while an external process writes each edit back to source and
//! the page regenerates underneath the editor. This crate holds the parts
//! that must survive that regeneration:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                         LIVEDIT Architecture                        │
//! ├────────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌──────────────┐    ┌──────────────────────┐   │
//! │   │  Locator   │◄───│ Transaction  │───►│ Consistency          │   │
//! │   │ (selectors,│    │ Manager      │    │ Verifier             │   │
//! │   │ fingerprint│    │ (undo/redo)  │    │ (settle → re-resolve)│   │
//! │   └─────┬──────┘    └──────┬───────┘    └──────────┬───────────┘   │
//! │         └──────────────────┼───────────────────────┘               │
//! │                     ┌──────▼───────┐                               │
//! │                     │ DocumentHost │  (MemoryDocument in tests)    │
//! │                     └──────────────┘                               │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use livedit::{MemoryDocument, TransactionManager};
//!
//! let mut doc = MemoryDocument::parse(r#"<main><p id="title">Hi</p></main>"#)?;
//! let title = doc.select_first("#title")?.ok_or_else(|| livedit::LiveditError::invalid_target("missing"))?;
//! let mut manager = TransactionManager::new();
//! manager.apply_style(&mut doc, title, "color", Some("red"))?;
//! manager.undo(&mut doc)?;
//! assert!(manager.can_redo());
//! # Ok::<(), livedit::LiveditError>(())
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod clock;
mod result;

/// Editor settings
pub mod config;

/// Scoped teardown of listeners and timers
pub mod disposer;

/// Document capabilities and the in-memory document
pub mod dom;

/// Listener registries
pub mod events;

/// Stable element references
pub mod locator;

/// Deterministic YAML edit scripts
#[allow(clippy::missing_errors_doc)]
pub mod script;

/// Clock-driven one-shot timers
pub mod timer;

/// Typed undo/redo history
pub mod transaction;

/// Post-regeneration verification
pub mod verify;

pub use clock::{Clock, ClockReading, FakeClock, SystemClock};
pub use config::{EditorConfig, HistoryConfig, LocatorConfig, ScoreWeights, VerifierConfig};
pub use dom::{DocumentHost, MemoryDocument, MutationKind, MutationRecord, NodeId, NodeKind, Point, Rect};
pub use locator::{build_locator, Fingerprint, Locator};
pub use result::{LiveditError, LiveditResult, ReplayDirection};
pub use script::{EditScript, ScriptReport, ScriptRunner, Step};
pub use transaction::shortcut::{history_command, FocusContext, HistoryCommand, KeyChord};
pub use transaction::{
    StructureAction, StructureRequest, Transaction, TransactionManager, TxAction, TxChange, TxId,
    TxKind, TxType,
};
pub use verify::{
    ApplyPhase, ApplyStatusChannel, ConsistencyVerifier, VerificationResult, VerifierPhase,
    VerifyContext, VerifyOutcome,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::clock::*;
    pub use super::config::*;
    pub use super::dom::{DocumentHost, MemoryDocument, NodeId, Point, Rect};
    pub use super::locator::*;
    pub use super::result::*;
    pub use super::transaction::*;
    pub use super::verify::*;
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::prelude::*;

    mod prelude_tests {
        use super::*;

        #[test]
        fn test_prelude_covers_the_editing_loop() {
            let mut doc = MemoryDocument::parse(r#"<main><p id="p">x</p></main>"#).unwrap();
            let p = doc.select_first("#p").unwrap().unwrap();
            let mut manager = TransactionManager::new();
            let id = manager.apply_style(&mut doc, p, "color", Some("red")).unwrap();
            assert_eq!(id, Some(TxId(1)));
            assert_eq!(manager.undo(&mut doc).unwrap(), Some(TxId(1)));
            assert_eq!(doc.inline_style(p, "color"), None);
        }

        #[test]
        fn test_version_is_set() {
            assert!(!super::super::VERSION.is_empty());
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn test_rollback_display_names_direction() {
            let err = LiveditError::ApplyRollback {
                tx_id: TxId(4),
                tx_type: TxType::Move,
                direction: ReplayDirection::Undo,
                message: "anchor not found".to_string(),
            };
            let msg = err.to_string();
            assert!(msg.contains("transaction 4"));
            assert!(msg.contains("anchor not found"));
            assert!(err.is_rollback());
        }
    }
}
