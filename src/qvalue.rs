//! Learned action-value store.
//!
//! The router reads through the [`ActionValueStore`] trait; the learner
//! behind it is external. [`MemoryActionValueStore`] is the reference
//! in-memory implementation used by embedders and tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tuning::{MAX_CONFIDENCE, QVALUE_CONSOLIDATION_VISITS};

/// Read-only view of learned state-action values.
pub trait ActionValueStore {
    /// How consolidated the learning for this state is, in
    /// `[0, MAX_CONFIDENCE]`.
    fn confidence(&self, state_key: &str) -> f64;

    /// The best-known action for this state, if any.
    fn exploit(&self, state_key: &str) -> Option<String>;

    /// Visit count for one state-action pair.
    fn visits(&self, state_key: &str, action: &str) -> u64;
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QEntry {
    pub value: f64,
    pub visits: u64,
}

/// In-memory store with incremental-mean updates.
#[derive(Debug, Default)]
pub struct MemoryActionValueStore {
    table: HashMap<String, HashMap<String, QEntry>>,
}

impl MemoryActionValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed back one observed reward for a state-action pair.
    pub fn record(&mut self, state_key: &str, action: &str, reward: f64) {
        let entry = self
            .table
            .entry(state_key.to_string())
            .or_default()
            .entry(action.to_string())
            .or_default();
        entry.visits += 1;
        entry.value += (reward - entry.value) / entry.visits as f64;
    }

    pub fn state_count(&self) -> usize {
        self.table.len()
    }
}

impl ActionValueStore for MemoryActionValueStore {
    fn confidence(&self, state_key: &str) -> f64 {
        let Some(actions) = self.table.get(state_key) else {
            return 0.0;
        };
        let total: u64 = actions.values().map(|e| e.visits).sum();
        (total as f64 / QVALUE_CONSOLIDATION_VISITS as f64).min(1.0) * MAX_CONFIDENCE
    }

    fn exploit(&self, state_key: &str) -> Option<String> {
        let actions = self.table.get(state_key)?;
        actions
            .iter()
            .max_by(|a, b| {
                a.1.value
                    .partial_cmp(&b.1.value)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(action, _)| action.clone())
    }

    fn visits(&self, state_key: &str, action: &str) -> u64 {
        self.table
            .get(state_key)
            .and_then(|a| a.get(action))
            .map(|e| e.visits)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_state_has_zero_confidence() {
        let store = MemoryActionValueStore::new();
        assert_eq!(store.confidence("CODE:JUDGE:PRESENT:2"), 0.0);
        assert!(store.exploit("CODE:JUDGE:PRESENT:2").is_none());
    }

    #[test]
    fn test_confidence_ramps_to_ceiling() {
        let mut store = MemoryActionValueStore::new();
        let key = "CODE:JUDGE:PRESENT:2";
        for _ in 0..QVALUE_CONSOLIDATION_VISITS {
            store.record(key, "economy", 1.0);
        }
        assert!((store.confidence(key) - MAX_CONFIDENCE).abs() < 1e-9);

        // More visits never push past the ceiling.
        for _ in 0..10 {
            store.record(key, "economy", 1.0);
        }
        assert!(store.confidence(key) <= MAX_CONFIDENCE);
    }

    #[test]
    fn test_exploit_picks_best_mean_reward() {
        let mut store = MemoryActionValueStore::new();
        let key = "CODE:JUDGE:PRESENT:2";
        store.record(key, "standard", 0.2);
        store.record(key, "economy", 0.9);
        store.record(key, "economy", 0.8);
        assert_eq!(store.exploit(key).as_deref(), Some("economy"));
    }

    #[test]
    fn test_visits_per_action() {
        let mut store = MemoryActionValueStore::new();
        let key = "k";
        store.record(key, "a", 0.5);
        store.record(key, "a", 0.5);
        assert_eq!(store.visits(key, "a"), 2);
        assert_eq!(store.visits(key, "b"), 0);
    }

    #[test]
    fn test_incremental_mean() {
        let mut store = MemoryActionValueStore::new();
        store.record("k", "a", 1.0);
        store.record("k", "a", 0.0);
        let entry = store.table["k"]["a"];
        assert!((entry.value - 0.5).abs() < 1e-9);
    }
}
