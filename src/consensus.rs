//! Concurrent evaluator voting with Byzantine quorum arithmetic.
//!
//! One judge cycle: gate on the circuit breaker, fan out to every
//! eligible evaluator under per-evaluator timeouts and a whole-cycle
//! deadline, drop failures, then aggregate the surviving votes into a
//! single immutable [`Judgment`]. Evaluator failures never propagate;
//! only a cycle with zero surviving votes fails.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::breaker::CircuitBreaker;
use crate::cell::Cell;
use crate::evaluator::{EvaluatorRegistry, EvaluatorVote};
use crate::level::DepthTier;
use crate::tuning::{
    AGREEMENT_VARIANCE_SCALE, BYZANTINE_F, CYCLE_DEADLINE, DOUBT_MAX, ENDORSE_MAX,
    EVALUATOR_TIMEOUT, MAX_CONFIDENCE, MAX_SCORE, NO_QUORUM_CONFIDENCE_CAP, REJECT_MAX,
};

/// Ordered verdict bands over the [0, 100] score scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Reject,
    Doubt,
    Endorse,
    Acclaim,
}

impl Verdict {
    pub fn from_score(score: f64) -> Self {
        if score < REJECT_MAX {
            Self::Reject
        } else if score < DOUBT_MAX {
            Self::Doubt
        } else if score < ENDORSE_MAX {
            Self::Endorse
        } else {
            Self::Acclaim
        }
    }

    pub fn is_lowest(&self) -> bool {
        matches!(self, Self::Reject)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Reject => "REJECT",
            Self::Doubt => "DOUBT",
            Self::Endorse => "ENDORSE",
            Self::Acclaim => "ACCLAIM",
        };
        write!(f, "{}", s)
    }
}

/// Immutable output of one judge cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    pub judgment_id: String,
    pub cell: Cell,
    /// Weighted geometric mean of surviving scores (0 if any vote is 0).
    pub score: f64,
    pub verdict: Verdict,
    /// Agreement-scaled confidence, always <= the global ceiling.
    pub confidence: f64,
    /// Surviving votes keyed by evaluator id.
    pub votes: BTreeMap<String, EvaluatorVote>,
    /// Evaluators that were dispatched but produced no vote.
    pub dropped: Vec<String>,
    /// Whether at least `2f+1` votes survived.
    pub consensus_reached: bool,
    pub participants: usize,
    pub quorum: usize,
    pub cost_usd: f64,
    pub correlation_id: String,
    pub duration_ms: u64,
}

/// Judge-cycle failure. Anything here is also a breaker failure except
/// `CircuitOpen`, which is a refusal rather than an outcome.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("circuit breaker is open, judging suspended")]
    CircuitOpen,

    #[error("no eligible evaluators for cell {cell_id} at {tier:?}")]
    NoEligibleEvaluators { cell_id: String, tier: DepthTier },

    #[error("all {dispatched} dispatched evaluators failed for cell {cell_id}")]
    NoSurvivingVotes { cell_id: String, dispatched: usize },
}

/// Knobs for one engine instance. Defaults come from the central table.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    pub byzantine_f: usize,
    pub evaluator_timeout: Duration,
    pub cycle_deadline: Duration,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            byzantine_f: BYZANTINE_F,
            evaluator_timeout: EVALUATOR_TIMEOUT,
            cycle_deadline: CYCLE_DEADLINE,
        }
    }
}

/// The judge-cycle driver. Owns the breaker; single writer.
pub struct ConsensusEngine {
    registry: Arc<EvaluatorRegistry>,
    breaker: CircuitBreaker,
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(registry: Arc<EvaluatorRegistry>) -> Self {
        Self::with_config(registry, ConsensusConfig::default())
    }

    pub fn with_config(registry: Arc<EvaluatorRegistry>, config: ConsensusConfig) -> Self {
        Self {
            registry,
            breaker: CircuitBreaker::default(),
            config,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn breaker_mut(&mut self) -> &mut CircuitBreaker {
        &mut self.breaker
    }

    /// Votes needed for consensus: `2f + 1`.
    pub fn quorum(&self) -> usize {
        2 * self.config.byzantine_f + 1
    }

    /// Run one judge cycle for the cell at the given tier.
    pub async fn judge(&mut self, cell: Cell, tier: DepthTier) -> Result<Judgment, JudgeError> {
        if !self.breaker.allow() {
            return Err(JudgeError::CircuitOpen);
        }

        let started = Instant::now();
        let eligible = self.registry.eligible(&cell, tier);
        if eligible.is_empty() {
            self.breaker.record_failure();
            return Err(JudgeError::NoEligibleEvaluators {
                cell_id: cell.cell_id.clone(),
                tier,
            });
        }

        debug!(
            cell_id = %cell.cell_id,
            ?tier,
            dispatched = eligible.len(),
            "dispatching judge cycle"
        );

        let dispatched = eligible.len();
        let mut weights: BTreeMap<String, f64> = BTreeMap::new();
        let mut pending: FuturesUnordered<_> = eligible
            .iter()
            .map(|evaluator| {
                weights.insert(
                    evaluator.id().to_string(),
                    evaluator.capabilities().weight.max(0.0),
                );
                let evaluator = Arc::clone(evaluator);
                let cell = cell.clone();
                let timeout = self.config.evaluator_timeout;
                async move {
                    let id = evaluator.id().to_string();
                    let result =
                        tokio::time::timeout(timeout, evaluator.evaluate(&cell)).await;
                    (id, result)
                }
            })
            .collect();

        let mut votes: BTreeMap<String, EvaluatorVote> = BTreeMap::new();
        let mut dropped: Vec<String> = Vec::new();
        let deadline = tokio::time::sleep(self.config.cycle_deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                next = pending.next() => {
                    let Some((id, result)) = next else { break };
                    match result {
                        Ok(Ok(vote)) => {
                            votes.insert(id, vote);
                        }
                        Ok(Err(err)) => {
                            warn!(evaluator = %id, error = %err, "evaluator failed, vote dropped");
                            dropped.push(id);
                        }
                        Err(_) => {
                            warn!(evaluator = %id, "evaluator timed out, vote dropped");
                            dropped.push(id);
                        }
                    }
                }
                _ = &mut deadline => {
                    // Evaluators still in flight are dropped; the futures
                    // are joined by dropping the set here.
                    warn!(
                        cell_id = %cell.cell_id,
                        collected = votes.len(),
                        outstanding = dispatched - votes.len() - dropped.len(),
                        "cycle deadline reached"
                    );
                    for evaluator in &eligible {
                        let id = evaluator.id();
                        if !votes.contains_key(id) && !dropped.iter().any(|d| d == id) {
                            dropped.push(id.to_string());
                        }
                    }
                    break;
                }
            }
        }
        drop(pending);

        if votes.is_empty() {
            self.breaker.record_failure();
            return Err(JudgeError::NoSurvivingVotes {
                cell_id: cell.cell_id.clone(),
                dispatched,
            });
        }
        self.breaker.record_success();

        let quorum = self.quorum();
        let judgment = build_judgment(cell, votes, dropped, weights, quorum, started.elapsed());
        info!(
            judgment_id = %judgment.judgment_id,
            score = judgment.score,
            verdict = %judgment.verdict,
            confidence = judgment.confidence,
            consensus = judgment.consensus_reached,
            participants = judgment.participants,
            "judge cycle complete"
        );
        Ok(judgment)
    }
}

/// Assemble the judgment from surviving votes.
fn build_judgment(
    cell: Cell,
    votes: BTreeMap<String, EvaluatorVote>,
    dropped: Vec<String>,
    weights: BTreeMap<String, f64>,
    quorum: usize,
    elapsed: Duration,
) -> Judgment {
    let weight_refs: BTreeMap<&str, f64> = weights
        .iter()
        .map(|(id, w)| (id.as_str(), *w))
        .collect();
    let vetoed = votes.values().any(|v| v.veto);
    let mut score = aggregate_score(&votes, &weight_refs);
    let verdict = if vetoed {
        // A veto pins the judgment to the lowest band.
        score = score.min(REJECT_MAX);
        Verdict::Reject
    } else {
        Verdict::from_score(score)
    };

    let participants = votes.len();
    let consensus_reached = participants >= quorum;
    let confidence = aggregate_confidence(&votes, consensus_reached);
    let cost_usd = votes.values().map(|v| v.cost_usd).sum();

    let correlation_id = cell.cell_id.clone();
    Judgment {
        judgment_id: Uuid::new_v4().to_string(),
        cell,
        score,
        verdict,
        confidence,
        votes,
        dropped,
        consensus_reached,
        participants,
        quorum,
        cost_usd,
        correlation_id,
        duration_ms: elapsed.as_millis() as u64,
    }
}

/// Weighted geometric mean in the log domain. Any zero score collapses
/// the aggregate to zero: one total rejection outweighs any praise.
pub fn aggregate_score(
    votes: &BTreeMap<String, EvaluatorVote>,
    weights: &BTreeMap<&str, f64>,
) -> f64 {
    if votes.is_empty() {
        return 0.0;
    }
    if votes.values().any(|v| v.score == 0.0) {
        return 0.0;
    }

    let mut weighted_log_sum = 0.0;
    let mut weight_sum = 0.0;
    for (id, vote) in votes {
        let w = weights.get(id.as_str()).copied().unwrap_or(1.0).max(0.0);
        if w == 0.0 {
            continue;
        }
        weighted_log_sum += w * vote.score.ln();
        weight_sum += w;
    }
    if weight_sum == 0.0 {
        return 0.0;
    }
    (weighted_log_sum / weight_sum).exp().clamp(0.0, MAX_SCORE)
}

/// Mean vote confidence, penalized by disagreement and capped at the
/// global ceiling; further capped when quorum was not reached.
pub fn aggregate_confidence(votes: &BTreeMap<String, EvaluatorVote>, consensus_reached: bool) -> f64 {
    if votes.is_empty() {
        return 0.0;
    }
    let n = votes.len() as f64;
    let mean = votes.values().map(|v| v.confidence).sum::<f64>() / n;
    let variance = votes
        .values()
        .map(|v| (v.confidence - mean).powi(2))
        .sum::<f64>()
        / n;
    let agreement = 1.0 - (variance / AGREEMENT_VARIANCE_SCALE).min(1.0);

    let mut confidence = (mean * agreement).min(MAX_CONFIDENCE);
    if !consensus_reached {
        confidence = confidence.min(NO_QUORUM_CONFIDENCE_CAP);
    }
    confidence
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes(entries: &[(&str, f64, f64)]) -> BTreeMap<String, EvaluatorVote> {
        entries
            .iter()
            .map(|(id, score, conf)| ((*id).to_string(), EvaluatorVote::new(*id, *score, *conf)))
            .collect()
    }

    fn unit_weights(votes: &BTreeMap<String, EvaluatorVote>) -> BTreeMap<&str, f64> {
        votes.keys().map(|id| (id.as_str(), 1.0)).collect()
    }

    #[test]
    fn test_verdict_bands() {
        assert_eq!(Verdict::from_score(0.0), Verdict::Reject);
        assert_eq!(Verdict::from_score(38.1), Verdict::Reject);
        assert_eq!(Verdict::from_score(38.2), Verdict::Doubt);
        assert_eq!(Verdict::from_score(61.7), Verdict::Doubt);
        assert_eq!(Verdict::from_score(61.8), Verdict::Endorse);
        assert_eq!(Verdict::from_score(81.9), Verdict::Endorse);
        assert_eq!(Verdict::from_score(82.0), Verdict::Acclaim);
        assert_eq!(Verdict::from_score(100.0), Verdict::Acclaim);
    }

    #[test]
    fn test_verdict_ordering() {
        assert!(Verdict::Reject < Verdict::Doubt);
        assert!(Verdict::Doubt < Verdict::Endorse);
        assert!(Verdict::Endorse < Verdict::Acclaim);
    }

    #[test]
    fn test_geometric_mean_between_min_and_max() {
        let v = votes(&[("a", 40.0, 0.5), ("b", 60.0, 0.5), ("c", 90.0, 0.5)]);
        let w = unit_weights(&v);
        let score = aggregate_score(&v, &w);
        assert!(score > 40.0 && score < 90.0);
        // Geometric mean sits below the arithmetic mean.
        assert!(score < (40.0 + 60.0 + 90.0) / 3.0);
    }

    #[test]
    fn test_zero_score_collapses_aggregate() {
        let v = votes(&[("a", 0.0, 0.5), ("b", 100.0, 0.6), ("c", 100.0, 0.6)]);
        let w = unit_weights(&v);
        assert_eq!(aggregate_score(&v, &w), 0.0);
    }

    #[test]
    fn test_weighted_mean_pulls_toward_heavy_vote() {
        let v = votes(&[("a", 20.0, 0.5), ("b", 80.0, 0.5)]);
        let unweighted = aggregate_score(&v, &unit_weights(&v));
        let mut heavy: BTreeMap<&str, f64> = BTreeMap::new();
        heavy.insert("a", 1.0);
        heavy.insert("b", 3.0);
        let weighted = aggregate_score(&v, &heavy);
        assert!(weighted > unweighted);
    }

    #[test]
    fn test_confidence_never_exceeds_ceiling() {
        let v = votes(&[("a", 90.0, 0.618), ("b", 90.0, 0.618), ("c", 90.0, 0.618)]);
        let c = aggregate_confidence(&v, true);
        assert!(c <= MAX_CONFIDENCE);
        assert!((c - MAX_CONFIDENCE).abs() < 1e-9);
    }

    #[test]
    fn test_disagreement_reduces_confidence() {
        let agreeing = votes(&[("a", 50.0, 0.5), ("b", 50.0, 0.5), ("c", 50.0, 0.5)]);
        let disagreeing = votes(&[("a", 50.0, 0.1), ("b", 50.0, 0.6), ("c", 50.0, 0.3)]);
        assert!(aggregate_confidence(&disagreeing, true) < aggregate_confidence(&agreeing, true));
    }

    #[test]
    fn test_no_quorum_caps_confidence() {
        let v = votes(&[("a", 70.0, 0.6), ("b", 70.0, 0.6), ("c", 70.0, 0.6)]);
        let with_quorum = aggregate_confidence(&v, true);
        let without = aggregate_confidence(&v, false);
        assert!(with_quorum > NO_QUORUM_CONFIDENCE_CAP);
        assert!(without <= NO_QUORUM_CONFIDENCE_CAP);
    }

    #[test]
    fn test_single_vote_aggregate_is_that_vote() {
        let v = votes(&[("solo", 73.0, 0.4)]);
        let w = unit_weights(&v);
        assert!((aggregate_score(&v, &w) - 73.0).abs() < 1e-9);
    }
}
