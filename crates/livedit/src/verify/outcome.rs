//! Verification results and classification.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::dom::{normalize_text, DocumentHost, NodeId};
use crate::transaction::{TxId, TxType};

/// Terminal verdict of a verification session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyOutcome {
    /// The regenerated element carries the committed edit
    Verified,
    /// The element was found but differs from the committed edit
    Mismatch,
    /// No confident verdict (no baseline, no signal, timeout, low confidence)
    Uncertain,
    /// The element could not be re-resolved
    Lost,
    /// Verification did not apply (superseded, disposed, failed apply, ...)
    Skipped,
}

impl fmt::Display for VerifyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Verified => "verified",
            Self::Mismatch => "mismatch",
            Self::Uncertain => "uncertain",
            Self::Lost => "lost",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Which resolution tier found the element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    /// The handle captured at start is still connected
    Current,
    /// Strict locator resolution
    Strict,
    /// Weighted scan of same-tag elements
    Relaxed,
    /// Hit test at the anchor center
    Geometric,
}

/// Where the element was re-found
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Resolved node
    pub node: NodeId,
    /// Tier that produced it
    pub tier: ResolutionTier,
    /// Score, for the scored tiers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Expected versus live value of one style property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleDiff {
    /// Property name
    pub property: String,
    /// Baseline value
    pub expected: Option<String>,
    /// Live computed value
    pub actual: Option<String>,
    /// Whether they agree
    pub matches: bool,
}

/// Expected versus live normalized text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDiff {
    /// Baseline text
    pub expected: String,
    /// Live text
    pub actual: String,
    /// Whether they agree
    pub matches: bool,
}

/// What the session observed while settling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signals {
    /// At least one relevant change notification arrived
    pub had_relevant_mutation: bool,
    /// The element captured at start became disconnected
    pub had_element_disconnect: bool,
    /// Relevant notifications counted
    pub mutation_count: usize,
    /// Style-injection notifications counted
    pub style_injections: usize,
}

/// Session timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timing {
    /// Session start
    pub started_ms: u64,
    /// Entry into settling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settling_ms: Option<u64>,
    /// Terminal outcome
    pub finished_ms: u64,
}

impl Timing {
    /// Milliseconds from start to outcome
    #[must_use]
    pub const fn elapsed_ms(&self) -> u64 {
        self.finished_ms.saturating_sub(self.started_ms)
    }
}

/// Terminal result of one verification session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Verdict
    pub outcome: VerifyOutcome,
    /// Short machine-friendly reason
    pub reason: String,
    /// Transaction verified
    pub tx_id: TxId,
    /// Its type
    pub tx_type: TxType,
    /// External apply request, when tracked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Where the element was re-found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<Resolution>,
    /// Per-property comparison for style transactions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub style_diff: Vec<StyleDiff>,
    /// Comparison for text transactions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_diff: Option<TextDiff>,
    /// Observed signals
    pub signals: Signals,
    /// Timestamps
    pub timing: Timing,
}

/// What a session expects to find after regeneration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "expected", rename_all = "snake_case")]
pub enum Baseline {
    /// Computed values by property
    Style(BTreeMap<String, Option<String>>),
    /// Normalized text
    Text(String),
    /// Nothing to compare against
    #[default]
    None,
}

impl Baseline {
    /// Whether there is anything to compare
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Style(values) => values.is_empty(),
            Self::Text(_) => false,
            Self::None => true,
        }
    }
}

/// Verdict with its supporting diffs
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Classification {
    pub outcome: VerifyOutcome,
    pub reason: String,
    pub style_diff: Vec<StyleDiff>,
    pub text_diff: Option<TextDiff>,
}

impl Classification {
    pub(crate) fn bare(outcome: VerifyOutcome, reason: impl Into<String>) -> Self {
        Self {
            outcome,
            reason: reason.into(),
            style_diff: Vec::new(),
            text_diff: None,
        }
    }
}

fn same_value(expected: Option<&str>, actual: Option<&str>) -> bool {
    match (expected, actual) {
        (Some(expected), Some(actual)) => normalize_text(expected) == normalize_text(actual),
        (None, None) => true,
        _ => false,
    }
}

/// Compare the baseline against the resolved element.
///
/// Order of checks: unsupported type, unresolved, empty baseline, value
/// differences, geometric-only resolution, absence of any signal.
pub(crate) fn classify<H: DocumentHost + ?Sized>(
    host: &H,
    tx_type: TxType,
    baseline: &Baseline,
    resolved: Option<&Resolution>,
    signals: &Signals,
) -> Classification {
    if !matches!(tx_type, TxType::Style | TxType::Text) {
        return Classification::bare(VerifyOutcome::Skipped, "unsupported_type");
    }
    let Some(resolved) = resolved else {
        return Classification::bare(VerifyOutcome::Lost, "unresolved");
    };
    if baseline.is_empty() {
        return Classification::bare(VerifyOutcome::Uncertain, "no_baseline");
    }

    let mut classification = Classification::bare(VerifyOutcome::Verified, "verified");
    let mismatched = match baseline {
        Baseline::Style(expected) => {
            classification.style_diff = expected
                .iter()
                .map(|(property, expected)| {
                    let actual = host.computed_style(resolved.node, property);
                    StyleDiff {
                        property: property.clone(),
                        matches: same_value(expected.as_deref(), actual.as_deref()),
                        expected: expected.clone(),
                        actual,
                    }
                })
                .collect();
            classification.style_diff.iter().any(|diff| !diff.matches)
        }
        Baseline::Text(expected) => {
            let actual = normalize_text(&host.text_content(resolved.node));
            let matches = actual == *expected;
            classification.text_diff = Some(TextDiff {
                expected: expected.clone(),
                actual,
                matches,
            });
            !matches
        }
        Baseline::None => false,
    };

    let (outcome, reason) = if resolved.tier == ResolutionTier::Geometric {
        (VerifyOutcome::Uncertain, "low_confidence")
    } else if mismatched {
        (VerifyOutcome::Mismatch, "mismatch")
    } else if !signals.had_relevant_mutation {
        (VerifyOutcome::Uncertain, "no_signal")
    } else {
        (VerifyOutcome::Verified, "verified")
    };
    classification.outcome = outcome;
    classification.reason = reason.to_string();
    classification
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDocument;

    fn doc() -> (MemoryDocument, NodeId) {
        let doc = MemoryDocument::parse(
            r#"<main><p id="p" style="color: red; margin: 4px;">  Hello   world </p></main>"#,
        )
        .unwrap();
        let p = doc.select_first("#p").unwrap().unwrap();
        (doc, p)
    }

    fn strict(node: NodeId) -> Resolution {
        Resolution {
            node,
            tier: ResolutionTier::Strict,
            score: None,
        }
    }

    fn signalled() -> Signals {
        Signals {
            had_relevant_mutation: true,
            mutation_count: 1,
            ..Signals::default()
        }
    }

    fn style(values: &[(&str, &str)]) -> Baseline {
        Baseline::Style(
            values
                .iter()
                .map(|(k, v)| ((*k).to_string(), Some((*v).to_string())))
                .collect(),
        )
    }

    #[test]
    fn test_verified_when_values_match_after_signal() {
        let (doc, p) = doc();
        let result = classify(
            &doc,
            TxType::Style,
            &style(&[("color", "red")]),
            Some(&strict(p)),
            &signalled(),
        );
        assert_eq!(result.outcome, VerifyOutcome::Verified);
        assert!(result.style_diff[0].matches);
    }

    #[test]
    fn test_mismatch_lists_every_property() {
        let (doc, p) = doc();
        let result = classify(
            &doc,
            TxType::Style,
            &style(&[("color", "blue"), ("margin", "4px")]),
            Some(&strict(p)),
            &signalled(),
        );
        assert_eq!(result.outcome, VerifyOutcome::Mismatch);
        assert_eq!(result.style_diff.len(), 2);
        assert_eq!(result.style_diff[0].actual.as_deref(), Some("red"));
        assert!(result.style_diff[1].matches);
    }

    #[test]
    fn test_match_without_signal_is_uncertain() {
        let (doc, p) = doc();
        let result = classify(
            &doc,
            TxType::Style,
            &style(&[("color", "red")]),
            Some(&strict(p)),
            &Signals::default(),
        );
        assert_eq!(result.outcome, VerifyOutcome::Uncertain);
        assert_eq!(result.reason, "no_signal");
    }

    #[test]
    fn test_text_uses_normalized_text() {
        let (doc, p) = doc();
        let result = classify(
            &doc,
            TxType::Text,
            &Baseline::Text("Hello world".to_string()),
            Some(&strict(p)),
            &signalled(),
        );
        assert_eq!(result.outcome, VerifyOutcome::Verified);
    }

    #[test]
    fn test_precedence_of_early_exits() {
        let (doc, p) = doc();
        let signals = signalled();
        let baseline = style(&[("color", "red")]);
        assert_eq!(
            classify(&doc, TxType::Move, &Baseline::None, None, &signals).outcome,
            VerifyOutcome::Skipped
        );
        assert_eq!(
            classify(&doc, TxType::Style, &baseline, None, &signals).outcome,
            VerifyOutcome::Lost
        );
        assert_eq!(
            classify(&doc, TxType::Style, &Baseline::None, Some(&strict(p)), &signals).outcome,
            VerifyOutcome::Uncertain
        );
    }

    #[test]
    fn test_geometric_resolution_is_never_verified() {
        let (doc, p) = doc();
        let geometric = Resolution {
            node: p,
            tier: ResolutionTier::Geometric,
            score: Some(12.0),
        };
        let result = classify(
            &doc,
            TxType::Style,
            &style(&[("color", "red")]),
            Some(&geometric),
            &signalled(),
        );
        assert_eq!(result.outcome, VerifyOutcome::Uncertain);
        assert_eq!(result.reason, "low_confidence");
    }
}
