//! Structured teardown.
//!
//! A [`Disposer`] collects release actions (unsubscribe, cancel a timer) and
//! runs them in reverse registration order. Disposers nest: an adopted
//! child is released at the point it was adopted. A panicking
//! release is caught and logged, and the remaining actions still run.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

type Release<C> = Box<dyn FnOnce(&mut C)>;

enum Entry<C> {
    Release(&'static str, Release<C>),
    Child(Disposer<C>),
}

/// LIFO collection of release actions over a context `C`
pub struct Disposer<C> {
    entries: Vec<Entry<C>>,
}

impl<C> Disposer<C> {
    /// Create an empty disposer
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a release action
    pub fn add(&mut self, label: &'static str, release: impl FnOnce(&mut C) + 'static) {
        self.entries.push(Entry::Release(label, Box::new(release)));
    }

    /// Register an existing disposer as a child
    pub fn adopt(&mut self, child: Self) {
        self.entries.push(Entry::Child(child));
    }

    /// Number of registered actions, children included
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                Entry::Release(..) => 1,
                Entry::Child(child) => child.len(),
            })
            .sum()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every action, newest first. Returns how many panicked.
    pub fn dispose(&mut self, context: &mut C) -> usize {
        let mut panics = 0;
        while let Some(entry) = self.entries.pop() {
            match entry {
                Entry::Release(label, release) => {
                    if catch_unwind(AssertUnwindSafe(|| release(context))).is_err() {
                        warn!(action = label, "release action panicked");
                        panics += 1;
                    }
                }
                Entry::Child(mut child) => panics += child.dispose(context),
            }
        }
        panics
    }
}

impl<C> Default for Disposer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for Disposer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer").field("actions", &self.len()).finish()
    }
}
