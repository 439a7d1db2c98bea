//! Structural fingerprints.
//!
//! A fingerprint is a coarse signature used to sanity-check a selector
//! match. It never identifies a node on its own. It serializes field by
//! field; the `tag|id=…|class=a.b|text=…` form is for display only, since
//! ids and class tokens may contain `|` and `.`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dom::{element_id, normalize_text, DocumentHost, NodeId};
use crate::result::{LiveditError, LiveditResult};

/// Coarse node signature
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Lower-case tag name
    pub tag: String,
    /// `id` attribute, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Leading class tokens
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    /// Truncated normalized text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Fingerprint {
    /// Fingerprint of a live element
    #[must_use]
    pub fn compute<H: DocumentHost + ?Sized>(
        host: &H,
        node: NodeId,
        max_classes: usize,
        text_len: usize,
    ) -> Self {
        let text = normalize_text(&host.text_content(node));
        Self {
            tag: host.tag_name(node).unwrap_or_default(),
            id: element_id(host, node),
            classes: host.class_list(node).into_iter().take(max_classes).collect(),
            text: if text.is_empty() {
                None
            } else {
                Some(text.chars().take(text_len).collect())
            },
        }
    }

    /// Parse the `|`-joined display form.
    ///
    /// Lossy for ids holding `|` and classes holding `.`; serde does not
    /// go through this.
    pub fn parse(value: &str) -> LiveditResult<Self> {
        let (tag, mut rest) = value.split_once('|').unwrap_or((value, ""));
        if tag.is_empty() {
            return Err(LiveditError::invalid_target(format!(
                "fingerprint `{value}` has no tag"
            )));
        }
        let mut fingerprint = Self {
            tag: tag.to_string(),
            ..Self::default()
        };
        while !rest.is_empty() {
            // Text is last and may itself contain `|`.
            if let Some(text) = rest.strip_prefix("text=") {
                fingerprint.text = Some(text.to_string());
                break;
            }
            let (part, tail) = rest.split_once('|').unwrap_or((rest, ""));
            if let Some(id) = part.strip_prefix("id=") {
                fingerprint.id = Some(id.to_string());
            } else if let Some(classes) = part.strip_prefix("class=") {
                fingerprint.classes = classes.split('.').map(str::to_string).collect();
            } else {
                return Err(LiveditError::invalid_target(format!(
                    "unknown fingerprint part `{part}`"
                )));
            }
            rest = tail;
        }
        Ok(fingerprint)
    }

    /// Whether a live element agrees on tag and, when one was stored, id
    #[must_use]
    pub fn agrees_with<H: DocumentHost + ?Sized>(&self, host: &H, node: NodeId) -> bool {
        host.tag_name(node).as_deref() == Some(self.tag.as_str())
            && self
                .id
                .as_ref()
                .map_or(true, |id| element_id(host, node).as_ref() == Some(id))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)?;
        if let Some(id) = &self.id {
            write!(f, "|id={id}")?;
        }
        if !self.classes.is_empty() {
            write!(f, "|class={}", self.classes.join("."))?;
        }
        if let Some(text) = &self.text {
            write!(f, "|text={text}")?;
        }
        Ok(())
    }
}
