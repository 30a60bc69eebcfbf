//! Evaluator boundary — the trait the engine fans out to, plus the
//! capability registry used to build the eligible set for each cell.
//!
//! Evaluators are opaque behind [`Evaluator`]; the engine only sees the
//! votes they return. Malfunction (errors, timeouts) is the engine's
//! problem, never the evaluator's.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cell::{Cell, Domain, Phase};
use crate::level::DepthTier;
use crate::tuning::{MAX_CONFIDENCE, MAX_SCORE};

/// Error type returned by a failing evaluator.
#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("evaluator unavailable: {0}")]
    Unavailable(String),

    #[error("evaluation failed: {0}")]
    Failed(String),
}

/// What an evaluator can judge and how much it costs to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorCapabilities {
    /// Domains this evaluator understands.
    pub domains: HashSet<Domain>,
    /// Phases this evaluator participates in.
    pub phases: HashSet<Phase>,
    /// Minimum analysis depth this evaluator needs to be worth running.
    pub min_depth: DepthTier,
    /// Whether evaluation reaches outside the process (network, disk).
    pub uses_external_resource: bool,
    /// Aggregation weight relative to the rest of the roster.
    pub weight: f64,
}

impl Default for EvaluatorCapabilities {
    fn default() -> Self {
        Self {
            domains: HashSet::new(),
            phases: HashSet::new(),
            min_depth: DepthTier::Shallow,
            uses_external_resource: false,
            weight: 1.0,
        }
    }
}

impl EvaluatorCapabilities {
    /// Whether this evaluator can judge the given cell at all.
    /// Empty domain/phase sets mean "any".
    pub fn matches(&self, cell: &Cell) -> bool {
        let domain_ok = self.domains.is_empty() || self.domains.contains(&cell.domain);
        let phase_ok = self.phases.is_empty() || self.phases.contains(&cell.phase);
        domain_ok && phase_ok
    }

    /// Whether this evaluator is worth dispatching at the given tier.
    pub fn available_at(&self, tier: DepthTier) -> bool {
        tier >= self.min_depth
    }
}

/// A single evaluator's verdict on one cell. Immutable once built;
/// score and confidence are clamped at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorVote {
    pub evaluator_id: String,
    /// Score on the [0, 100] scale.
    pub score: f64,
    /// Self-reported confidence, capped at the global ceiling.
    pub confidence: f64,
    pub reasoning: String,
    pub evidence: HashMap<String, serde_json::Value>,
    pub elapsed_ms: u64,
    pub cost_usd: f64,
    /// A veto pins the judgment to the lowest band regardless of the mean.
    pub veto: bool,
}

impl EvaluatorVote {
    pub fn new(evaluator_id: impl Into<String>, score: f64, confidence: f64) -> Self {
        Self {
            evaluator_id: evaluator_id.into(),
            score: score.clamp(0.0, MAX_SCORE),
            confidence: confidence.clamp(0.0, MAX_CONFIDENCE),
            reasoning: String::new(),
            evidence: HashMap::new(),
            elapsed_ms: 0,
            cost_usd: 0.0,
            veto: false,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_evidence(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.evidence.insert(key.into(), value);
        self
    }

    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = cost_usd.max(0.0);
        self
    }

    pub fn with_elapsed(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn with_veto(mut self) -> Self {
        self.veto = true;
        self
    }
}

/// An independent judge the engine can fan out to.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Stable id used to key votes and registry entries.
    fn id(&self) -> &str;

    fn capabilities(&self) -> EvaluatorCapabilities;

    /// Judge one cell. Failures are dropped by the engine, never propagated.
    async fn evaluate(&self, cell: &Cell) -> Result<EvaluatorVote, EvaluatorError>;
}

/// Registry of evaluators keyed by id.
#[derive(Default)]
pub struct EvaluatorRegistry {
    entries: HashMap<String, Arc<dyn Evaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an evaluator, replacing any previous entry with the same id.
    pub fn register(&mut self, evaluator: Arc<dyn Evaluator>) {
        self.entries.insert(evaluator.id().to_string(), evaluator);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Evaluator>> {
        self.entries.get(id).cloned()
    }

    /// Total roster size (eligible or not).
    pub fn roster_size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluators whose capabilities match the cell and whose minimum
    /// depth is satisfied by the selected tier.
    pub fn eligible(&self, cell: &Cell, tier: DepthTier) -> Vec<Arc<dyn Evaluator>> {
        let mut out: Vec<Arc<dyn Evaluator>> = self
            .entries
            .values()
            .filter(|e| {
                let caps = e.capabilities();
                caps.matches(cell) && caps.available_at(tier)
            })
            .cloned()
            .collect();
        // Deterministic dispatch order.
        out.sort_by(|a, b| a.id().cmp(b.id()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::TimeDim;

    struct FixedEvaluator {
        id: String,
        caps: EvaluatorCapabilities,
        score: f64,
    }

    #[async_trait]
    impl Evaluator for FixedEvaluator {
        fn id(&self) -> &str {
            &self.id
        }

        fn capabilities(&self) -> EvaluatorCapabilities {
            self.caps.clone()
        }

        async fn evaluate(&self, _cell: &Cell) -> Result<EvaluatorVote, EvaluatorError> {
            Ok(EvaluatorVote::new(self.id.clone(), self.score, 0.5))
        }
    }

    fn cell() -> Cell {
        Cell::builder(Domain::Code, Phase::Judge)
            .time_dim(TimeDim::Present)
            .build()
            .unwrap()
    }

    #[test]
    fn test_vote_clamps_score_and_confidence() {
        let vote = EvaluatorVote::new("e1", 150.0, 0.9);
        assert_eq!(vote.score, MAX_SCORE);
        assert_eq!(vote.confidence, MAX_CONFIDENCE);

        let vote = EvaluatorVote::new("e1", -5.0, -0.1);
        assert_eq!(vote.score, 0.0);
        assert_eq!(vote.confidence, 0.0);
    }

    #[test]
    fn test_empty_capability_sets_match_anything() {
        let caps = EvaluatorCapabilities::default();
        assert!(caps.matches(&cell()));
    }

    #[test]
    fn test_domain_mismatch_excludes() {
        let caps = EvaluatorCapabilities {
            domains: [Domain::Market].into_iter().collect(),
            ..Default::default()
        };
        assert!(!caps.matches(&cell()));
    }

    #[test]
    fn test_min_depth_gates_availability() {
        let caps = EvaluatorCapabilities {
            min_depth: DepthTier::Deep,
            ..Default::default()
        };
        assert!(!caps.available_at(DepthTier::Shallow));
        assert!(!caps.available_at(DepthTier::Medium));
        assert!(caps.available_at(DepthTier::Deep));
    }

    #[test]
    fn test_registry_eligible_is_sorted_and_filtered() {
        let mut registry = EvaluatorRegistry::new();
        registry.register(Arc::new(FixedEvaluator {
            id: "zeta".into(),
            caps: EvaluatorCapabilities::default(),
            score: 70.0,
        }));
        registry.register(Arc::new(FixedEvaluator {
            id: "alpha".into(),
            caps: EvaluatorCapabilities::default(),
            score: 60.0,
        }));
        registry.register(Arc::new(FixedEvaluator {
            id: "deep-only".into(),
            caps: EvaluatorCapabilities {
                min_depth: DepthTier::Deep,
                ..Default::default()
            },
            score: 50.0,
        }));

        let eligible = registry.eligible(&cell(), DepthTier::Medium);
        let ids: Vec<&str> = eligible.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);

        let eligible = registry.eligible(&cell(), DepthTier::Deep);
        assert_eq!(eligible.len(), 3);
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut registry = EvaluatorRegistry::new();
        registry.register(Arc::new(FixedEvaluator {
            id: "e".into(),
            caps: EvaluatorCapabilities::default(),
            score: 10.0,
        }));
        registry.register(Arc::new(FixedEvaluator {
            id: "e".into(),
            caps: EvaluatorCapabilities::default(),
            score: 20.0,
        }));
        assert_eq!(registry.roster_size(), 1);
    }
}
