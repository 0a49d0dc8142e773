use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Consecutive-failure counts keyed by handle.
#[derive(Debug)]
pub struct FailureTracker<K> {
    counts: Mutex<HashMap<K, usize>>,
}

impl<K: Eq + Hash> FailureTracker<K> {
    pub fn new() -> Self {
        Self { counts: Mutex::new(HashMap::new()) }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, usize>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a failure (increment) or a success (reset to 0) and return the new count.
    pub fn record(&self, key: &K, failed: bool) -> usize
    where
        K: Clone,
    {
        let mut counts = self.lock();
        if !failed {
            counts.remove(key);
            return 0;
        }
        let count = counts.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn failures(&self, key: &K) -> usize {
        self.lock().get(key).copied().unwrap_or(0)
    }

    pub fn reset(&self, key: &K) {
        self.lock().remove(key);
    }

    /// Number of keys with at least one outstanding failure.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash> Default for FailureTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}
