//! Quiet-period timers.
//!
//! A [`Debouncer`] holds at most one pending value per key. Scheduling a key
//! again replaces its value and restarts its timer; a value fires once the
//! key has been left alone for the whole quiet period. Time is passed in by
//! the caller so the event loop owns the clock.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Default quiet period for note text edits.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
struct Pending<V> {
    value: V,
    deadline: Instant,
}

/// Per-key cancellable timers.
#[derive(Debug, Clone)]
pub struct Debouncer<K, V> {
    quiet_period: Duration,
    pending: HashMap<K, Pending<V>>,
}

impl<K: Eq + Hash + Clone, V> Debouncer<K, V> {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            pending: HashMap::new(),
        }
    }

    /// Schedule `value` for `key`, cancelling any earlier pending value.
    pub fn schedule(&mut self, key: K, value: V, now: Instant) {
        let deadline = now + self.quiet_period;
        self.pending.insert(key, Pending { value, deadline });
    }

    /// Cancel the pending value for `key`, returning it.
    pub fn cancel(&mut self, key: &K) -> Option<V> {
        self.pending.remove(key).map(|p| p.value)
    }

    /// Cancel everything.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    /// The value waiting for `key`, if any.
    pub fn pending(&self, key: &K) -> Option<&V> {
        self.pending.get(key).map(|p| &p.value)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Earliest deadline among pending values, for scheduling the next wake-up.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Take every value whose quiet period has elapsed at `now`.
    pub fn fire_due(&mut self, now: Instant) -> Vec<(K, V)> {
        let due: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();

        due.into_iter()
            .filter_map(|key| self.pending.remove(&key).map(|p| (key, p.value)))
            .collect()
    }
}

impl<K: Eq + Hash + Clone, V> Default for Debouncer<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}
