//! Confidence-gated execution routing.
//!
//! Routes a task to the cheap economy tier only when four gates pass in
//! order: learned confidence, task category, complexity, and visit
//! count for the best-known action. Any gate failure falls back to the
//! standard tier with a reason on the decision.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::qvalue::ActionValueStore;
use crate::tuning::{
    ROUTE_CHEAP_COMPLEXITIES, ROUTE_CONFIDENCE_FLOOR, ROUTE_MIN_VISITS, ROUTE_SAFE_CATEGORIES,
};

/// Which execution path a task takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecTier {
    /// The default, expensive path.
    Standard,
    /// The cheap path, used only when all gates pass.
    Economy,
}

/// Route outcome with an audit-ready reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub tier: ExecTier,
    pub downgraded: bool,
    pub confidence: f64,
    pub reason: String,
    pub task_category: String,
    pub complexity: String,
}

/// Routing counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RouterStats {
    pub total: u64,
    pub downgraded: u64,
}

#[derive(Debug, Default)]
pub struct ConfidenceRouter {
    stats: RouterStats,
}

impl ConfidenceRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide the tier for one task against the learned store.
    pub fn route(
        &mut self,
        store: &dyn ActionValueStore,
        state_key: &str,
        task_category: &str,
        complexity: &str,
    ) -> RoutingDecision {
        self.stats.total += 1;
        let confidence = store.confidence(state_key);

        let decision = |tier, downgraded, reason: String| RoutingDecision {
            tier,
            downgraded,
            confidence,
            reason,
            task_category: task_category.to_string(),
            complexity: complexity.to_string(),
        };

        if confidence < ROUTE_CONFIDENCE_FLOOR {
            return decision(
                ExecTier::Standard,
                false,
                format!(
                    "confidence {:.3} below floor {:.3}",
                    confidence, ROUTE_CONFIDENCE_FLOOR
                ),
            );
        }

        if !ROUTE_SAFE_CATEGORIES.contains(&task_category) {
            return decision(
                ExecTier::Standard,
                false,
                format!("category '{}' not in the safe list", task_category),
            );
        }

        if !ROUTE_CHEAP_COMPLEXITIES.contains(&complexity) {
            return decision(
                ExecTier::Standard,
                false,
                format!("complexity '{}' too high for the cheap tier", complexity),
            );
        }

        let best = store.exploit(state_key);
        let visits = best
            .as_deref()
            .map(|action| store.visits(state_key, action))
            .unwrap_or(0);
        if visits < ROUTE_MIN_VISITS {
            return decision(
                ExecTier::Standard,
                false,
                format!(
                    "best action has {} visits, need {}",
                    visits, ROUTE_MIN_VISITS
                ),
            );
        }

        self.stats.downgraded += 1;
        debug!(state_key, task_category, complexity, "routed to economy tier");
        decision(
            ExecTier::Economy,
            true,
            format!(
                "all gates passed: confidence {:.3}, {} visits",
                confidence, visits
            ),
        )
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qvalue::MemoryActionValueStore;
    use crate::tuning::QVALUE_CONSOLIDATION_VISITS;

    fn consolidated_store(key: &str) -> MemoryActionValueStore {
        let mut store = MemoryActionValueStore::new();
        for _ in 0..QVALUE_CONSOLIDATION_VISITS {
            store.record(key, "apply", 0.9);
        }
        store
    }

    #[test]
    fn test_all_gates_pass_routes_economy() {
        let key = "CODE:JUDGE:PRESENT:1";
        let store = consolidated_store(key);
        let mut router = ConfidenceRouter::new();
        let decision = router.route(&store, key, "refactor", "simple");
        assert_eq!(decision.tier, ExecTier::Economy);
        assert!(decision.downgraded);
        assert!(decision.reason.contains("all gates passed"));
    }

    #[test]
    fn test_low_confidence_stays_standard() {
        let store = MemoryActionValueStore::new();
        let mut router = ConfidenceRouter::new();
        let decision = router.route(&store, "unknown", "refactor", "simple");
        assert_eq!(decision.tier, ExecTier::Standard);
        assert!(decision.reason.contains("confidence"));
    }

    #[test]
    fn test_unsafe_category_stays_standard() {
        let key = "k";
        let store = consolidated_store(key);
        let mut router = ConfidenceRouter::new();
        let decision = router.route(&store, key, "deploy", "simple");
        assert_eq!(decision.tier, ExecTier::Standard);
        assert!(decision.reason.contains("category"));
    }

    #[test]
    fn test_high_complexity_stays_standard() {
        let key = "k";
        let store = consolidated_store(key);
        let mut router = ConfidenceRouter::new();
        let decision = router.route(&store, key, "debug", "intricate");
        assert_eq!(decision.tier, ExecTier::Standard);
        assert!(decision.reason.contains("complexity"));
    }

    #[test]
    fn test_few_visits_stays_standard() {
        let key = "k";
        let mut store = MemoryActionValueStore::new();
        // Enough total visits for confidence, spread thin per action.
        for i in 0..QVALUE_CONSOLIDATION_VISITS {
            store.record(key, &format!("action-{}", i), 0.5);
        }
        let mut router = ConfidenceRouter::new();
        let decision = router.route(&store, key, "test", "trivial");
        assert_eq!(decision.tier, ExecTier::Standard);
        assert!(decision.reason.contains("visits"));
    }

    #[test]
    fn test_stats_count_downgrades() {
        let key = "k";
        let store = consolidated_store(key);
        let mut router = ConfidenceRouter::new();
        router.route(&store, key, "debug", "trivial");
        router.route(&store, key, "deploy", "trivial");
        let stats = router.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.downgraded, 1);
    }
}
