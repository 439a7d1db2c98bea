//! Editor configuration
//!
//! Configuration types for history, locator generation and verification.
//! Every struct deserializes with defaults for missing fields, so a config
//! file only needs to name what it overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::result::{LiveditError, LiveditResult};

/// Default undo stack bound
pub const DEFAULT_MAX_HISTORY: usize = 100;

/// Default merge window for same-property style edits
pub const DEFAULT_MERGE_WINDOW_MS: u64 = 800;

/// Default number of selector candidates kept per locator
pub const DEFAULT_MAX_CANDIDATES: usize = 5;

/// Default quiet window before verification runs
pub const DEFAULT_QUIET_WINDOW_MS: u64 = 300;

/// Default absolute settle deadline
pub const DEFAULT_SETTLE_DEADLINE_MS: u64 = 8_000;

/// Default deadline for a verification attempt with zero observed mutations
pub const DEFAULT_NO_SIGNAL_DEADLINE_MS: u64 = 2_000;

/// Undo/redo history settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum undo entries kept; the oldest is evicted first
    pub max_history: usize,
    /// Window in which consecutive same-property style edits merge
    pub merge_window_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            merge_window_ms: DEFAULT_MERGE_WINDOW_MS,
        }
    }
}

impl HistoryConfig {
    /// Set the history bound
    #[must_use]
    pub const fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Set the merge window
    #[must_use]
    pub const fn with_merge_window_ms(mut self, ms: u64) -> Self {
        self.merge_window_ms = ms;
        self
    }
}

/// Locator generation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Maximum selector candidates per locator
    pub max_candidates: usize,
    /// Maximum class tokens recorded in a fingerprint
    pub max_fingerprint_classes: usize,
    /// Maximum characters of text hint in a fingerprint
    pub text_hint_len: usize,
    /// Attribute carrying opaque source information, copied into `debug_source`
    pub debug_source_attribute: String,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            max_candidates: DEFAULT_MAX_CANDIDATES,
            max_fingerprint_classes: 8,
            text_hint_len: 32,
            debug_source_attribute: "data-source".to_string(),
        }
    }
}

/// Weights of the relaxed/geometric scoring function
///
/// The absolute values only matter relative to the two thresholds in
/// [`VerifierConfig`]; tune them together against real fixtures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Awarded for an exact tag match (required)
    pub tag: f64,
    /// Awarded for an id match (required when the fingerprint has an id)
    pub id: f64,
    /// Awarded per shared class token
    pub class: f64,
    /// Cap on the class contribution
    pub class_cap: f64,
    /// Awarded when the candidate text contains the fingerprint text hint
    pub text: f64,
    /// Scaled by the shared prefix fraction of the structural path
    pub path: f64,
    /// Scaled by the inverse distance to the anchor center
    pub proximity: f64,
    /// Distance in pixels at which the proximity contribution halves
    pub proximity_falloff_px: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            tag: 2.0,
            id: 6.0,
            class: 2.0,
            class_cap: 6.0,
            text: 3.0,
            path: 4.0,
            proximity: 4.0,
            proximity_falloff_px: 50.0,
        }
    }
}

/// Consistency verifier timing and confidence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Quiet window restarted by every relevant change notification
    pub quiet_window_ms: u64,
    /// Absolute deadline after entering settling
    pub settle_deadline_ms: u64,
    /// Verification attempt after settling with no notification at all
    pub no_signal_deadline_ms: u64,
    /// Interval for polling an attached apply status channel
    pub status_poll_ms: u64,
    /// Deadline for the external apply operation to reach a terminal phase
    pub execute_timeout_ms: u64,
    /// Minimum score accepted from the relaxed tier
    pub relaxed_threshold: f64,
    /// Minimum score accepted from the geometric tier
    pub geometric_threshold: f64,
    /// Scoring weights shared by the relaxed and geometric tiers
    pub weights: ScoreWeights,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            quiet_window_ms: DEFAULT_QUIET_WINDOW_MS,
            settle_deadline_ms: DEFAULT_SETTLE_DEADLINE_MS,
            no_signal_deadline_ms: DEFAULT_NO_SIGNAL_DEADLINE_MS,
            status_poll_ms: 250,
            execute_timeout_ms: 60_000,
            relaxed_threshold: 8.0,
            geometric_threshold: 6.0,
            weights: ScoreWeights::default(),
        }
    }
}

impl VerifierConfig {
    /// Set the quiet window
    #[must_use]
    pub const fn with_quiet_window_ms(mut self, ms: u64) -> Self {
        self.quiet_window_ms = ms;
        self
    }

    /// Set the settle deadline
    #[must_use]
    pub const fn with_settle_deadline_ms(mut self, ms: u64) -> Self {
        self.settle_deadline_ms = ms;
        self
    }

    /// Set the no-signal deadline
    #[must_use]
    pub const fn with_no_signal_deadline_ms(mut self, ms: u64) -> Self {
        self.no_signal_deadline_ms = ms;
        self
    }

    /// Set both confidence thresholds
    #[must_use]
    pub const fn with_thresholds(mut self, relaxed: f64, geometric: f64) -> Self {
        self.relaxed_threshold = relaxed;
        self.geometric_threshold = geometric;
        self
    }
}

/// Complete editor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// History settings
    pub history: HistoryConfig,
    /// Locator settings
    pub locator: LocatorConfig,
    /// Verifier settings
    pub verifier: VerifierConfig,
}

impl EditorConfig {
    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the history settings
    #[must_use]
    pub fn with_history(mut self, history: HistoryConfig) -> Self {
        self.history = history;
        self
    }

    /// Replace the locator settings
    #[must_use]
    pub fn with_locator(mut self, locator: LocatorConfig) -> Self {
        self.locator = locator;
        self
    }

    /// Replace the verifier settings
    #[must_use]
    pub fn with_verifier(mut self, verifier: VerifierConfig) -> Self {
        self.verifier = verifier;
        self
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> LiveditResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> LiveditResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, choosing the format by extension (`.json` or YAML)
    pub fn load(path: &Path) -> LiveditResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> LiveditResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> LiveditResult<()> {
        if self.history.max_history == 0 {
            return Err(LiveditError::config("history.max_history must be at least 1"));
        }
        if self.locator.max_candidates == 0 {
            return Err(LiveditError::config(
                "locator.max_candidates must be at least 1",
            ));
        }
        let v = &self.verifier;
        if v.quiet_window_ms == 0 {
            return Err(LiveditError::config("verifier.quiet_window_ms must be positive"));
        }
        if v.quiet_window_ms >= v.settle_deadline_ms {
            return Err(LiveditError::config(format!(
                "verifier.quiet_window_ms ({}) must be shorter than settle_deadline_ms ({})",
                v.quiet_window_ms, v.settle_deadline_ms
            )));
        }
        if v.no_signal_deadline_ms > v.settle_deadline_ms {
            return Err(LiveditError::config(
                "verifier.no_signal_deadline_ms must not exceed settle_deadline_ms",
            ));
        }
        if v.status_poll_ms == 0 {
            return Err(LiveditError::config("verifier.status_poll_ms must be positive"));
        }
        if !v.relaxed_threshold.is_finite() || !v.geometric_threshold.is_finite() {
            return Err(LiveditError::config("verifier thresholds must be finite"));
        }
        if v.weights.proximity_falloff_px <= 0.0 {
            return Err(LiveditError::config(
                "verifier.weights.proximity_falloff_px must be positive",
            ));
        }
        Ok(())
    }
}
