//! Central table of calibrated thresholds.
//!
//! Every tunable constant in the pipeline lives here. The values are
//! calibration, not semantics — any component reading them must behave
//! correctly for any equivalent calibration.

use std::time::Duration;

/// Upper bound of the evaluator score scale.
pub const MAX_SCORE: f64 = 100.0;

/// Global confidence ceiling. No judgment, vote, or routing decision may
/// ever report confidence above this.
pub const MAX_CONFIDENCE: f64 = 0.618;

// ── Verdict band cut points (ordered, on the [0, MAX_SCORE] scale) ────────

/// Scores below this are `Verdict::Reject`.
pub const REJECT_MAX: f64 = 38.2;
/// Scores in [REJECT_MAX, DOUBT_MAX) are `Verdict::Doubt`.
pub const DOUBT_MAX: f64 = 61.8;
/// Scores in [DOUBT_MAX, ENDORSE_MAX) are `Verdict::Endorse`; at or above,
/// `Verdict::Acclaim`.
pub const ENDORSE_MAX: f64 = 82.0;

// ── Circuit breaker ───────────────────────────────────────────────────────

/// Consecutive failures before the circuit opens.
pub const BREAKER_FAILURE_THRESHOLD: u32 = 5;
/// How long the circuit stays open before a half-open probe is allowed.
pub const BREAKER_COOLDOWN: Duration = Duration::from_millis(22_900);

// ── Consensus ─────────────────────────────────────────────────────────────

/// Byzantine fault tolerance: with a roster of N >= 3f+1 evaluators,
/// quorum is 2f+1 surviving votes.
pub const BYZANTINE_F: usize = 3;
/// Confidence cap applied when quorum was not reached.
pub const NO_QUORUM_CONFIDENCE_CAP: f64 = 0.382;
/// Per-evaluator dispatch timeout.
pub const EVALUATOR_TIMEOUT: Duration = Duration::from_secs(8);
/// Overall deadline for one judge cycle (fan-out + fan-in).
pub const CYCLE_DEADLINE: Duration = Duration::from_secs(30);
/// Scale for the vote-disagreement confidence penalty: at this variance
/// among vote confidences the penalty reaches its maximum.
pub const AGREEMENT_VARIANCE_SCALE: f64 = 0.1;

// ── Confidence router ─────────────────────────────────────────────────────

/// Minimum learned confidence before the cheap tier is considered.
pub const ROUTE_CONFIDENCE_FLOOR: f64 = 0.618;
/// Minimum visit count for the best action before the cheap tier is
/// considered.
pub const ROUTE_MIN_VISITS: u64 = 3;
/// Task categories known to be safe for downgrade.
pub const ROUTE_SAFE_CATEGORIES: &[&str] = &["debug", "refactor", "test", "explain", "write"];
/// Complexity tiers eligible for the cheap execution tier.
pub const ROUTE_CHEAP_COMPLEXITIES: &[&str] = &["trivial", "simple"];

// ── Resource guardrail ────────────────────────────────────────────────────

/// CPU utilization above which new decisions are refused.
pub const RESOURCE_CPU_PCT: f64 = 80.0;
/// Memory utilization above which new decisions are refused.
pub const RESOURCE_MEMORY_PCT: f64 = 85.0;
/// Queue depth beyond which the recommended tier drops to Shallow.
pub const RESOURCE_QUEUE_CRITICAL: usize = 21;
/// Soft CPU threshold: above this the recommended tier drops to Medium.
pub const RESOURCE_CPU_SOFT_PCT: f64 = 70.0;
/// Hard rate limit on judgments per second.
pub const RESOURCE_MAX_JUDGMENTS_PER_SEC: usize = 5;
/// Hard rate limit on actions per minute.
pub const RESOURCE_MAX_ACTIONS_PER_MIN: usize = 13;

// ── System health (depth-tier ceiling) ────────────────────────────────────

/// Error rate at which health degrades to Reduced.
pub const HEALTH_ERR_REDUCED: f64 = 0.382;
/// Error rate at which health degrades to Emergency.
pub const HEALTH_ERR_EMERGENCY: f64 = 0.618;
/// p95 latency (ms) at which health degrades to Reduced.
pub const HEALTH_LATENCY_REDUCED_MS: f64 = 1_000.0;
/// p95 latency (ms) at which health degrades to Emergency.
pub const HEALTH_LATENCY_EMERGENCY_MS: f64 = 2_850.0;
/// Queue depth at which health degrades to Reduced.
pub const HEALTH_QUEUE_REDUCED: usize = 34;
/// Queue depth at which health degrades to Emergency.
pub const HEALTH_QUEUE_EMERGENCY: usize = 89;
/// Memory percent at which health degrades to Reduced.
pub const HEALTH_MEMORY_REDUCED_PCT: f64 = 61.8;
/// Memory percent at which health degrades to Emergency.
pub const HEALTH_MEMORY_EMERGENCY_PCT: f64 = 76.4;
/// Consecutive clean assessments required before health improves.
/// Degradation is immediate; recovery is hysteresis-gated.
pub const HEALTH_RECOVERY_STREAK: u32 = 3;

// ── Policy guardrail ──────────────────────────────────────────────────────

/// Minimum confidence for a lowest-band (high-impact) decision.
pub const POLICY_MIN_CONFIDENCE_HIGH_IMPACT: f64 = 0.382;
/// Rolling window of recorded verdicts used for the balance check.
pub const POLICY_BALANCE_WINDOW: usize = 8;
/// Fraction of the window one verdict may occupy before the balance
/// check flags skew.
pub const POLICY_BALANCE_SKEW: f64 = 0.618;
/// Contradictions with the last three judgments that block a decision.
pub const POLICY_CONTRADICTION_THRESHOLD: usize = 2;
/// Action payloads above this size are flagged as unfocused.
pub const POLICY_MAX_ACTION_BYTES: usize = 16_384;

// ── Budget ────────────────────────────────────────────────────────────────

/// Remaining-budget fraction below which the budget is stressed.
pub const BUDGET_STRESSED_FRACTION: f64 = 0.382;

// ── Learned action-value store ────────────────────────────────────────────

/// Visit count at which a state is considered consolidated; learned
/// confidence ramps linearly up to `MAX_CONFIDENCE` at this count.
pub const QVALUE_CONSOLIDATION_VISITS: u64 = 21;
