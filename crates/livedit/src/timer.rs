//! Clock-driven timer queue.
//!
//! Timers are continuations keyed by a kind `K`. Nothing fires on its own:
//! the owner polls [`TimerQueue::pop_due`] with the current time from its
//! [`crate::Clock`], which returns due timers earliest first.

use std::fmt;

/// Handle to an armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Timer<K> {
    id: TimerId,
    kind: K,
    due_ms: u64,
}

/// Pending timers ordered by due time, then arm order
#[derive(Debug, Clone)]
pub struct TimerQueue<K> {
    timers: Vec<Timer<K>>,
    next_id: u64,
}

impl<K: Copy> TimerQueue<K> {
    /// Empty queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            timers: Vec::new(),
            next_id: 1,
        }
    }

    /// Arm a timer due at `due_ms`
    pub fn arm(&mut self, kind: K, due_ms: u64) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer { id, kind, due_ms });
        id
    }

    /// Move an armed timer to a new due time; returns whether it was armed
    pub fn reschedule(&mut self, id: TimerId, due_ms: u64) -> bool {
        match self.timers.iter_mut().find(|timer| timer.id == id) {
            Some(timer) => {
                timer.due_ms = due_ms;
                true
            }
            None => false,
        }
    }

    /// Disarm a timer; returns whether it was armed
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|timer| timer.id != id);
        self.timers.len() != before
    }

    /// Earliest due time among armed timers
    #[must_use]
    pub fn next_due_ms(&self) -> Option<u64> {
        self.timers.iter().map(|timer| timer.due_ms).min()
    }

    /// Remove and return the earliest timer due at or before `now_ms`
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(TimerId, K)> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, timer)| timer.due_ms <= now_ms)
            .min_by_key(|(_, timer)| (timer.due_ms, timer.id.0))
            .map(|(index, _)| index)?;
        let timer = self.timers.remove(index);
        Some((timer.id, timer.kind))
    }

    /// Disarm everything
    pub fn clear(&mut self) {
        self.timers.clear();
    }

    /// Number of armed timers
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether no timer is armed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl<K: Copy> Default for TimerQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}
