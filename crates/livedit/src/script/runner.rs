//! Edit script execution.
//!
//! A [`ScriptRunner`] drives one [`MemoryDocument`], a [`TransactionManager`]
//! and a [`ConsistencyVerifier`] off a shared [`FakeClock`], so every run of
//! a script is deterministic.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::schema::{EditScript, Expectation, Step};
use crate::clock::{Clock, ClockReading, FakeClock};
use crate::config::EditorConfig;
use crate::dom::{element_index, normalize_text, DocumentHost, MemoryDocument, NodeId};
use crate::result::{LiveditError, LiveditResult};
use crate::transaction::{StructureRequest, TransactionManager, TxChange};
use crate::verify::{ConsistencyVerifier, VerificationResult, VerifyContext};

/// Result of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    /// 1-based position in the script
    pub index: usize,
    /// Step kind
    pub kind: String,
    /// Whether the step succeeded
    pub passed: bool,
    /// Clock time when the step finished
    pub clock_ms: u64,
    /// Failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a whole script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptReport {
    /// Editing session id
    pub session_id: Uuid,
    /// Script name
    pub name: String,
    /// Whether every executed step passed
    pub passed: bool,
    /// Per-step results, in order
    pub steps: Vec<StepReport>,
    /// Steps not executed after a failure
    pub skipped_steps: usize,
    /// History change events
    pub events: Vec<TxChange>,
    /// Terminal verification results
    pub verifications: Vec<VerificationResult>,
    /// Messages delivered to the error listener
    pub errors: Vec<String>,
    /// Final clock reading
    pub clock: ClockReading,
    /// Final document markup
    pub document: String,
}

impl ScriptReport {
    /// Steps that failed
    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|step| !step.passed)
    }

    /// Pretty JSON rendering
    pub fn to_json(&self) -> LiveditResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Executes edit scripts
#[derive(Debug, Clone, Default)]
pub struct ScriptRunner {
    config: Option<EditorConfig>,
    continue_on_failure: bool,
}

impl ScriptRunner {
    /// Runner using each script's own configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this configuration instead of the script's
    #[must_use]
    pub fn with_config(mut self, config: EditorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Keep executing after a failed step
    #[must_use]
    pub const fn with_continue_on_failure(mut self, enabled: bool) -> Self {
        self.continue_on_failure = enabled;
        self
    }

    /// Run a script.
    ///
    /// Step failures are reported in the [`ScriptReport`]; only an invalid
    /// script or document is an `Err`.
    pub fn run(&self, script: &EditScript) -> LiveditResult<ScriptReport> {
        script.validate()?;
        let config = self
            .config
            .clone()
            .or_else(|| script.config.clone())
            .unwrap_or_default();
        config.validate()?;

        let mut session = Session::open(script, &config)?;
        let session_id = Uuid::new_v4();
        info!(%session_id, name = %script.name, steps = script.steps.len(), "running script");

        let mut steps = Vec::with_capacity(script.steps.len());
        let mut skipped_steps = 0;
        for (offset, step) in script.steps.iter().enumerate() {
            let index = offset + 1;
            let outcome = session.execute(step);
            session.pump();
            let error = outcome.err().map(|error| error.to_string());
            if let Some(message) = &error {
                warn!(index, kind = step.kind(), error = %message, "step failed");
            } else {
                debug!(index, kind = step.kind(), "step passed");
            }
            let failed = error.is_some();
            steps.push(StepReport {
                index,
                kind: step.kind().to_string(),
                passed: !failed,
                clock_ms: session.clock.reading().time_ms,
                error,
            });
            if failed && !self.continue_on_failure {
                skipped_steps = script.steps.len() - index;
                break;
            }
        }

        let passed = steps.iter().all(|step| step.passed);
        Ok(ScriptReport {
            session_id,
            name: script.name.clone(),
            passed,
            steps,
            skipped_steps,
            events: session.events.take(),
            verifications: session.verifications.take(),
            errors: session.errors.take(),
            clock: session.clock.reading(),
            document: session.markup(),
        })
    }
}

type Sink<T> = Rc<RefCell<Vec<T>>>;

/// Live state of one script run
struct Session {
    doc: MemoryDocument,
    clock: Arc<FakeClock>,
    manager: TransactionManager<Arc<FakeClock>>,
    verifier: ConsistencyVerifier<Arc<FakeClock>>,
    events: Sink<TxChange>,
    verifications: Sink<VerificationResult>,
    errors: Sink<String>,
}

impl Session {
    fn open(script: &EditScript, config: &EditorConfig) -> LiveditResult<Self> {
        let doc = MemoryDocument::parse(&script.document)?;
        let clock = FakeClock::shared(script.start_ms);
        let mut manager = TransactionManager::with_clock(Arc::clone(&clock)).with_config(config);
        let mut verifier =
            ConsistencyVerifier::with_clock(Arc::clone(&clock)).with_config(config.verifier.clone());

        let events: Sink<TxChange> = Rc::default();
        let verifications: Sink<VerificationResult> = Rc::default();
        let errors: Sink<String> = Rc::default();
        let sink = Rc::clone(&events);
        manager.on_change(move |change| sink.borrow_mut().push(change.clone()));
        let sink = Rc::clone(&errors);
        manager.on_error(move |error| sink.borrow_mut().push(error.to_string()));
        let sink = Rc::clone(&verifications);
        verifier.subscribe(move |result| sink.borrow_mut().push(result.clone()));

        Ok(Self {
            doc,
            clock,
            manager,
            verifier,
            events,
            verifications,
            errors,
        })
    }

    /// Deliver pending change notifications to the verifier
    fn pump(&mut self) {
        let records = self.doc.take_records();
        if !records.is_empty() {
            self.verifier.on_mutations(&self.doc, &records);
        }
    }

    fn element(&self, selector: &str) -> LiveditResult<NodeId> {
        self.doc
            .select_first(selector)?
            .ok_or_else(|| LiveditError::invalid_target(format!("no element matches {selector}")))
    }

    fn markup(&self) -> String {
        let doc = &self.doc;
        doc.children(doc.document())
            .into_iter()
            .filter_map(|node| doc.outer_html(node))
            .collect()
    }

    fn execute(&mut self, step: &Step) -> LiveditResult<()> {
        match step {
            Step::Style {
                target,
                property,
                value,
            } => {
                let node = self.element(target)?;
                self.manager
                    .apply_style(&mut self.doc, node, property, value.as_deref())?;
            }
            Step::MultiStyle { target, values } => {
                let node = self.element(target)?;
                let values: Vec<(&str, Option<&str>)> = values
                    .iter()
                    .map(|(property, value)| (property.as_str(), value.as_deref()))
                    .collect();
                self.manager.apply_styles(&mut self.doc, node, &values)?;
            }
            Step::Text { target, text } => {
                let node = self.element(target)?;
                self.manager.record_text(&mut self.doc, node, text)?;
            }
            Step::Class { target, classes } => {
                let node = self.element(target)?;
                self.manager.record_class(&mut self.doc, node, classes)?;
            }
            Step::Move {
                target,
                parent,
                before,
            } => {
                let node = self.element(target)?;
                let parent = self.element(parent)?;
                let reference = before
                    .as_deref()
                    .map(|selector| self.element(selector))
                    .transpose()?;
                self.manager
                    .move_element(&mut self.doc, node, parent, reference)?;
            }
            Step::Structure {
                target,
                action,
                wrapper_tag,
                wrapper_styles,
            } => {
                let node = self.element(target)?;
                let request = StructureRequest {
                    wrapper_tag: wrapper_tag.clone(),
                    wrapper_styles: wrapper_styles.clone(),
                    ..StructureRequest::new(*action)
                };
                self.manager.apply_structure(&mut self.doc, node, &request)?;
            }
            Step::Undo { expect_error } => {
                let outcome = self.manager.undo(&mut self.doc);
                expect_rollback(outcome.map(|_| ()), *expect_error)?;
            }
            Step::Redo { expect_error } => {
                let outcome = self.manager.redo(&mut self.doc);
                expect_rollback(outcome.map(|_| ()), *expect_error)?;
            }
            Step::Clear => self.manager.clear(),
            Step::Advance { ms } => self.advance(*ms),
            Step::VerifyStart { target, request_id } => {
                let tx = self
                    .manager
                    .last_transaction()
                    .cloned()
                    .ok_or_else(|| LiveditError::script("no transaction to verify"))?;
                let element = target
                    .as_deref()
                    .map(|selector| self.element(selector))
                    .transpose()?;
                self.verifier
                    .start(&self.doc, &tx, request_id.as_deref(), element);
            }
            Step::ApplyStatus { request_id, phase } => {
                self.verifier.on_apply_status(&self.doc, request_id, *phase);
            }
            Step::Regenerate { target, html, css } => {
                if target.is_none() && html.is_none() && css.is_none() {
                    return Err(LiveditError::script("regenerate needs html or css"));
                }
                match (target, html) {
                    (Some(target), Some(html)) => {
                        let node = self.element(target)?;
                        self.doc.replace_with_markup(node, html)?;
                    }
                    (None, None) => {}
                    _ => {
                        return Err(LiveditError::script(
                            "regenerate needs both target and html",
                        ))
                    }
                }
                if let Some(css) = css {
                    self.doc.inject_stylesheet(css)?;
                }
            }
            Step::Expect(expect) => self.check(expect)?,
        }
        Ok(())
    }

    /// Move the clock forward one due timer at a time
    fn advance(&mut self, ms: u64) {
        let target = self.clock.now_ms() + ms;
        while let Some(due) = self.verifier.next_due_ms().filter(|due| *due <= target) {
            self.clock.set_ms(due);
            let context = VerifyContext::new().with_manager(&self.manager);
            self.verifier.tick(&self.doc, &context);
        }
        self.clock.set_ms(target);
    }

    fn check(&self, expect: &Expectation) -> LiveditResult<()> {
        let mut failures = Vec::new();

        if let Some(selector) = &expect.selector {
            let matches = self.doc.query_all(self.doc.document(), selector)?;
            if let Some(exists) = expect.exists {
                if exists == matches.is_empty() {
                    failures.push(format!("{selector}: exists is {}", !exists));
                }
            }
            if let Some(count) = expect.count {
                if matches.len() != count {
                    failures.push(format!("{selector}: count is {}, expected {count}", matches.len()));
                }
            }
            let wants_element = expect.style.is_some()
                || expect.text.is_some()
                || expect.classes.is_some()
                || expect.index.is_some();
            match matches.first() {
                Some(node) => self.check_element(*node, selector, expect, &mut failures),
                None if wants_element => failures.push(format!("{selector}: no element")),
                None => {}
            }
        } else if expect.exists.is_some()
            || expect.count.is_some()
            || expect.style.is_some()
            || expect.text.is_some()
            || expect.classes.is_some()
            || expect.index.is_some()
        {
            return Err(LiveditError::script("element checks need a selector"));
        }

        if let Some(expected) = expect.undo_count {
            let actual = self.manager.undo_stack().len();
            if actual != expected {
                failures.push(format!("undo_count is {actual}, expected {expected}"));
            }
        }
        if let Some(expected) = expect.redo_count {
            let actual = self.manager.redo_stack().len();
            if actual != expected {
                failures.push(format!("redo_count is {actual}, expected {expected}"));
            }
        }
        if expect.outcome.is_some() || expect.reason.is_some() {
            let verifications = self.verifications.borrow();
            match verifications.last() {
                None => failures.push("no verification result".to_string()),
                Some(result) => {
                    if let Some(expected) = expect.outcome {
                        if result.outcome != expected {
                            failures.push(format!(
                                "outcome is {}, expected {expected}",
                                result.outcome
                            ));
                        }
                    }
                    if let Some(expected) = &expect.reason {
                        if &result.reason != expected {
                            failures.push(format!(
                                "reason is {}, expected {expected}",
                                result.reason
                            ));
                        }
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LiveditError::script(failures.join("; ")))
        }
    }

    fn check_element(
        &self,
        node: NodeId,
        selector: &str,
        expect: &Expectation,
        failures: &mut Vec<String>,
    ) {
        let doc = &self.doc;
        for (property, expected) in expect.style.iter().flatten() {
            let actual = doc.computed_style(node, property);
            let same = match (expected, &actual) {
                (Some(expected), Some(actual)) => normalize_text(expected) == normalize_text(actual),
                (None, None) => true,
                _ => false,
            };
            if !same {
                failures.push(format!(
                    "{selector}: {property} is {}, expected {}",
                    actual.as_deref().unwrap_or("unset"),
                    expected.as_deref().unwrap_or("unset")
                ));
            }
        }
        if let Some(expected) = &expect.text {
            let actual = normalize_text(&doc.text_content(node));
            if actual != normalize_text(expected) {
                failures.push(format!("{selector}: text is {actual:?}, expected {expected:?}"));
            }
        }
        if let Some(expected) = &expect.classes {
            let actual = doc.class_list(node);
            if &actual != expected {
                failures.push(format!(
                    "{selector}: classes are {actual:?}, expected {expected:?}"
                ));
            }
        }
        if let Some(expected) = expect.index {
            let actual = element_index(doc, node);
            if actual != Some(expected) {
                failures.push(format!(
                    "{selector}: index is {actual:?}, expected {expected}"
                ));
            }
        }
    }
}

fn expect_rollback(outcome: LiveditResult<()>, expect_error: bool) -> LiveditResult<()> {
    match outcome {
        Ok(()) if expect_error => Err(LiveditError::script("expected a rollback, replay succeeded")),
        Err(error) if expect_error && error.is_rollback() => Ok(()),
        other => other,
    }
}
