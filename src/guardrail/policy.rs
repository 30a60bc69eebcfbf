//! Policy checker — consistency and alignment rules over a decision.
//!
//! Produces violations without raising anything itself; the chain in
//! `mod.rs` decides whether blocking violations stop the decision.
//! Maintains its own rolling verdict window, updated only for decisions
//! that pass the full chain.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consensus::{Judgment, Verdict};
use crate::guardrail::Decision;
use crate::tuning::{
    POLICY_BALANCE_SKEW, POLICY_BALANCE_WINDOW, POLICY_CONTRADICTION_THRESHOLD,
    POLICY_MAX_ACTION_BYTES, POLICY_MIN_CONFIDENCE_HIGH_IMPACT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyRule {
    Consistency,
    Confidence,
    Balance,
    Payload,
}

impl std::fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Consistency => "consistency",
            Self::Confidence => "confidence",
            Self::Balance => "balance",
            Self::Payload => "payload",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// One rule violation, blocking or advisory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailViolation {
    pub rule: PolicyRule,
    pub severity: Severity,
    pub reason: String,
    pub blocking: bool,
    pub remediation: String,
}

/// Fixed rule set evaluated against every decision.
#[derive(Debug, Default)]
pub struct PolicyChecker {
    recent_verdicts: VecDeque<Verdict>,
}

impl PolicyChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate all rules. Never short-circuits; every applicable
    /// violation is reported so the audit record is complete.
    pub fn check(
        &self,
        judgment: &Judgment,
        decision: &Decision,
        recent: &[Judgment],
    ) -> Vec<GuardrailViolation> {
        let mut violations = Vec::new();

        let contradictions = recent
            .iter()
            .rev()
            .take(3)
            .filter(|j| j.verdict != decision.verdict)
            .count();
        if contradictions >= POLICY_CONTRADICTION_THRESHOLD {
            violations.push(GuardrailViolation {
                rule: PolicyRule::Consistency,
                severity: Severity::Critical,
                reason: format!(
                    "verdict {} contradicts {} of the last 3 judgments",
                    decision.verdict, contradictions
                ),
                blocking: true,
                remediation: "re-judge the cell at a deeper tier or widen the roster".into(),
            });
        }

        if decision.verdict.is_lowest()
            && judgment.confidence < POLICY_MIN_CONFIDENCE_HIGH_IMPACT
        {
            violations.push(GuardrailViolation {
                rule: PolicyRule::Confidence,
                severity: Severity::Critical,
                reason: format!(
                    "high-impact verdict with confidence {:.3} below {:.3}",
                    judgment.confidence, POLICY_MIN_CONFIDENCE_HIGH_IMPACT
                ),
                blocking: true,
                remediation: "gather more votes before acting on a rejection".into(),
            });
        }

        if self.recent_verdicts.len() >= POLICY_BALANCE_WINDOW {
            let dominant = [
                Verdict::Reject,
                Verdict::Doubt,
                Verdict::Endorse,
                Verdict::Acclaim,
            ]
            .into_iter()
            .map(|v| {
                (
                    v,
                    self.recent_verdicts.iter().filter(|&&r| r == v).count(),
                )
            })
            .max_by_key(|(_, count)| *count);
            if let Some((verdict, count)) = dominant {
                let fraction = count as f64 / self.recent_verdicts.len() as f64;
                if fraction > POLICY_BALANCE_SKEW {
                    violations.push(GuardrailViolation {
                        rule: PolicyRule::Balance,
                        severity: Severity::Warning,
                        reason: format!(
                            "{} of recent verdicts are {} ({:.0}%)",
                            count,
                            verdict,
                            fraction * 100.0
                        ),
                        blocking: false,
                        remediation: "review evaluator calibration for systematic skew".into(),
                    });
                }
            }
        }

        if decision.action.is_empty() {
            violations.push(GuardrailViolation {
                rule: PolicyRule::Payload,
                severity: Severity::Warning,
                reason: "decision carries an empty action".into(),
                blocking: false,
                remediation: "attach the intended action before validation".into(),
            });
        } else if decision.action.len() > POLICY_MAX_ACTION_BYTES {
            violations.push(GuardrailViolation {
                rule: PolicyRule::Payload,
                severity: Severity::Warning,
                reason: format!(
                    "action payload is {} bytes, limit {}",
                    decision.action.len(),
                    POLICY_MAX_ACTION_BYTES
                ),
                blocking: false,
                remediation: "split the action into focused steps".into(),
            });
        }

        if !violations.is_empty() {
            debug!(
                judgment_id = %judgment.judgment_id,
                count = violations.len(),
                "policy violations found"
            );
        }
        violations
    }

    /// Record a verdict that passed the full chain, maintaining the
    /// rolling balance window.
    pub fn record_verdict(&mut self, verdict: Verdict) {
        self.recent_verdicts.push_back(verdict);
        while self.recent_verdicts.len() > POLICY_BALANCE_WINDOW {
            self.recent_verdicts.pop_front();
        }
    }
}
