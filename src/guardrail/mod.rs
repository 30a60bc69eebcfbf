//! Ordered decision-validation chain.
//!
//! Resources → policy → audit → approval, strictly in that order. A
//! block anywhere stops the chain, but the audit step sees every block
//! before it is returned, including resource blocks raised ahead of it.
//! Blocks are values, not panics: the chain returns
//! `Result<ValidatedDecision, DecisionBlocked>`.

pub mod approval;
pub mod audit;
pub mod policy;
pub mod resource;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::consensus::{Judgment, Verdict};
use crate::level::{DepthTier, LiveMetrics};

pub use approval::{ApprovalGate, ApprovalRequest, ApprovalStatus};
pub use audit::{AuditKind, AuditRecord, AuditTrail};
pub use policy::{GuardrailViolation, PolicyChecker, PolicyRule, Severity};
pub use resource::{ResourceLimiter, ResourceRefusal, ResourceStats};

/// Which link of the chain raised a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Guardrail {
    Resource,
    Policy,
    Audit,
    Approval,
}

impl std::fmt::Display for Guardrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Resource => "resource",
            Self::Policy => "policy",
            Self::Audit => "audit",
            Self::Approval => "approval",
        };
        write!(f, "{}", s)
    }
}

/// The proposed decision entering the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub judgment_id: String,
    pub verdict: Verdict,
    pub confidence: f64,
    pub score: f64,
    /// What the embedder intends to do.
    pub action: String,
    /// What the pipeline recommends instead, if anything.
    pub recommended_action: String,
}

impl Decision {
    /// Derive a decision directly from a judgment.
    pub fn from_judgment(judgment: &Judgment, action: impl Into<String>) -> Self {
        Self {
            judgment_id: judgment.judgment_id.clone(),
            verdict: judgment.verdict,
            confidence: judgment.confidence,
            score: judgment.score,
            action: action.into(),
            recommended_action: String::new(),
        }
    }
}

/// A decision that cleared every guardrail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedDecision {
    pub decision_id: String,
    pub judgment_id: String,
    pub verdict: Verdict,
    pub confidence: f64,
    pub action: String,
    pub approved_by_human: bool,
    pub audit_record_id: String,
}

/// A decision stopped by a guardrail. Carries everything a caller needs
/// to remediate and retry.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("decision blocked by {guardrail} guardrail: {reason}")]
pub struct DecisionBlocked {
    pub guardrail: Guardrail,
    pub reason: String,
    pub remediation: String,
    pub violations: Vec<GuardrailViolation>,
    /// Set when the decision is held for a human rather than refused.
    pub approval_request_id: Option<String>,
    /// Set on resource blocks: the tier the limiter considers sustainable.
    pub recommended_tier: Option<DepthTier>,
}

/// The ordered chain. Single writer for every link's state.
#[derive(Debug, Default)]
pub struct DecisionValidator {
    resources: ResourceLimiter,
    policy: PolicyChecker,
    audit: AuditTrail,
    approvals: ApprovalGate,
}

impl DecisionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror the audit trail to a JSON-lines file.
    pub fn with_audit_sink(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            audit: AuditTrail::with_sink(path),
            ..Default::default()
        }
    }

    /// Run the full chain over one decision.
    pub fn validate(
        &mut self,
        judgment: &Judgment,
        decision: &Decision,
        recent: &[Judgment],
        metrics: &LiveMetrics,
    ) -> Result<ValidatedDecision, DecisionBlocked> {
        // 1. Resources. A refusal skips policy/audit/approval for this
        //    decision, but the block itself is still audited.
        if let Err(refusal) = self.resources.check_available(metrics) {
            self.audit
                .record_block(&judgment.judgment_id, "resource", &refusal.reason);
            return Err(DecisionBlocked {
                guardrail: Guardrail::Resource,
                reason: refusal.reason,
                remediation: "retry when load subsides, or re-judge at the recommended tier"
                    .into(),
                violations: vec![],
                approval_request_id: None,
                recommended_tier: Some(refusal.recommended_tier),
            });
        }

        // 2. Policy.
        let violations = self.policy.check(judgment, decision, recent);

        // 3. Audit. Runs unconditionally so blocked decisions leave the
        //    same trail as validated ones.
        let audit_record_id = self.audit.record_decision(
            &judgment.judgment_id,
            serde_json::json!({
                "verdict": decision.verdict,
                "confidence": decision.confidence,
                "score": decision.score,
                "action": decision.action,
            }),
        );
        self.audit
            .record_violations(&judgment.judgment_id, &violations);
        let recommendation = if violations.iter().any(|v| v.blocking) {
            "block"
        } else if ApprovalGate::requires_approval(decision, &violations) {
            "hold for human approval"
        } else {
            "proceed"
        };
        self.audit
            .record_recommendation(&judgment.judgment_id, recommendation);

        if let Some(blocking) = violations.iter().find(|v| v.blocking) {
            let reason = blocking.reason.clone();
            let remediation = blocking.remediation.clone();
            self.audit
                .record_block(&judgment.judgment_id, "policy", &reason);
            warn!(judgment_id = %judgment.judgment_id, %reason, "decision blocked by policy");
            return Err(DecisionBlocked {
                guardrail: Guardrail::Policy,
                reason,
                remediation,
                violations,
                approval_request_id: None,
                recommended_tier: None,
            });
        }

        // 4. Approval. Holding for a human is a block from the caller's
        //    point of view; the request resolves out of band.
        if ApprovalGate::requires_approval(decision, &violations) {
            let reason = if decision.verdict.is_lowest() {
                "lowest-band verdict requires human sign-off".to_string()
            } else {
                "advisory violations require human sign-off".to_string()
            };
            let request_id = self.approvals.create_request(decision, &reason);
            self.audit
                .record_block(&judgment.judgment_id, "approval", &reason);
            return Err(DecisionBlocked {
                guardrail: Guardrail::Approval,
                reason,
                remediation: "resolve the approval request to release the decision".into(),
                violations,
                approval_request_id: Some(request_id),
                recommended_tier: None,
            });
        }

        self.resources.record_action();
        self.policy.record_verdict(decision.verdict);
        info!(
            judgment_id = %judgment.judgment_id,
            verdict = %decision.verdict,
            "decision validated"
        );
        Ok(ValidatedDecision {
            decision_id: Uuid::new_v4().to_string(),
            judgment_id: judgment.judgment_id.clone(),
            verdict: decision.verdict,
            confidence: decision.confidence,
            action: decision.action.clone(),
            approved_by_human: false,
            audit_record_id,
        })
    }

    /// Resolve a held decision. An approval releases it as a validated
    /// decision; a rejection resolves the request and returns `None`.
    pub fn resolve_approval(
        &mut self,
        request_id: &str,
        approve: bool,
    ) -> Option<ValidatedDecision> {
        let request = self.approvals.resolve(request_id, approve)?;
        self.audit
            .record_human_review(&request.judgment_id, request_id, approve);
        if !approve {
            return None;
        }
        self.resources.record_action();
        self.policy.record_verdict(request.verdict);
        let audit_record_id = self.audit.record_decision(
            &request.judgment_id,
            serde_json::json!({
                "released_by": "human approval",
                "request_id": request_id,
                "action": request.action,
            }),
        );
        Some(ValidatedDecision {
            decision_id: Uuid::new_v4().to_string(),
            judgment_id: request.judgment_id.clone(),
            verdict: request.verdict,
            confidence: request.confidence,
            action: request.action,
            approved_by_human: true,
            audit_record_id,
        })
    }

    /// Count a produced judgment against the judgment rate limit.
    /// Called once per judge cycle, not per decision.
    pub fn record_judgment(&mut self) {
        self.resources.record_judgment();
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn approvals(&self) -> &ApprovalGate {
        &self.approvals
    }

    pub fn resource_stats(&mut self) -> ResourceStats {
        self.resources.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Cell, Domain, Phase};
    use std::collections::BTreeMap;

    fn judgment(verdict: Verdict, confidence: f64) -> Judgment {
        let cell = Cell::builder(Domain::Code, Phase::Decide).build().unwrap();
        Judgment {
            judgment_id: Uuid::new_v4().to_string(),
            correlation_id: cell.cell_id.clone(),
            cell,
            score: 70.0,
            verdict,
            confidence,
            votes: BTreeMap::new(),
            dropped: vec![],
            consensus_reached: true,
            participants: 7,
            quorum: 7,
            cost_usd: 0.01,
            duration_ms: 5,
        }
    }

    fn calm() -> LiveMetrics {
        LiveMetrics {
            cpu_pct: 20.0,
            memory_pct: 30.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_decision_validates() {
        let mut validator = DecisionValidator::new();
        let j = judgment(Verdict::Endorse, 0.5);
        let d = Decision::from_judgment(&j, "merge");
        let validated = validator.validate(&j, &d, &[], &calm()).unwrap();
        assert_eq!(validated.judgment_id, j.judgment_id);
        assert!(!validated.approved_by_human);
        // Decision, violations, recommendation records on the trail.
        assert_eq!(validator.audit().records().len(), 3);
    }

    #[test]
    fn test_resource_block_is_audited_and_short_circuits() {
        let mut validator = DecisionValidator::new();
        let j = judgment(Verdict::Endorse, 0.5);
        let d = Decision::from_judgment(&j, "merge");
        let overloaded = LiveMetrics {
            cpu_pct: 95.0,
            ..Default::default()
        };
        let blocked = validator.validate(&j, &d, &[], &overloaded).unwrap_err();
        assert_eq!(blocked.guardrail, Guardrail::Resource);
        assert!(blocked.recommended_tier.is_some());
        // Only the block record: policy/decision-audit/approval never ran.
        assert_eq!(validator.audit().records().len(), 1);
        assert_eq!(validator.audit().blocks().len(), 1);
    }

    #[test]
    fn test_policy_block_carries_violations() {
        let mut validator = DecisionValidator::new();
        let recent = vec![
            judgment(Verdict::Acclaim, 0.6),
            judgment(Verdict::Acclaim, 0.6),
            judgment(Verdict::Acclaim, 0.6),
        ];
        let j = judgment(Verdict::Reject, 0.5);
        let d = Decision::from_judgment(&j, "revert");
        let blocked = validator.validate(&j, &d, &recent, &calm()).unwrap_err();
        assert_eq!(blocked.guardrail, Guardrail::Policy);
        assert!(!blocked.violations.is_empty());
        assert!(!blocked.remediation.is_empty());
        // Decision + violations + recommendation + block all audited.
        assert_eq!(validator.audit().records().len(), 4);
    }

    #[test]
    fn test_reject_verdict_held_for_approval() {
        let mut validator = DecisionValidator::new();
        let j = judgment(Verdict::Reject, 0.5);
        let d = Decision::from_judgment(&j, "revert");
        let blocked = validator.validate(&j, &d, &[], &calm()).unwrap_err();
        assert_eq!(blocked.guardrail, Guardrail::Approval);
        let request_id = blocked.approval_request_id.unwrap();
        assert_eq!(
            validator.approvals().status(&request_id),
            Some(ApprovalStatus::Pending)
        );
    }

    #[test]
    fn test_approval_releases_decision() {
        let mut validator = DecisionValidator::new();
        let j = judgment(Verdict::Reject, 0.5);
        let d = Decision::from_judgment(&j, "revert");
        let blocked = validator.validate(&j, &d, &[], &calm()).unwrap_err();
        let request_id = blocked.approval_request_id.unwrap();

        let released = validator.resolve_approval(&request_id, true).unwrap();
        assert!(released.approved_by_human);
        assert_eq!(released.verdict, Verdict::Reject);
        assert!(validator
            .audit()
            .records()
            .iter()
            .any(|r| r.kind == AuditKind::HumanReview));
    }

    #[test]
    fn test_rejection_resolves_without_release() {
        let mut validator = DecisionValidator::new();
        let j = judgment(Verdict::Reject, 0.5);
        let d = Decision::from_judgment(&j, "revert");
        let blocked = validator.validate(&j, &d, &[], &calm()).unwrap_err();
        let request_id = blocked.approval_request_id.unwrap();

        assert!(validator.resolve_approval(&request_id, false).is_none());
        assert_eq!(
            validator.approvals().status(&request_id),
            Some(ApprovalStatus::Rejected)
        );
    }

    #[test]
    fn test_validated_decision_updates_policy_window() {
        let mut validator = DecisionValidator::new();
        // Saturate the window with endorsements, then expect a balance
        // warning to force approval on the next one.
        for _ in 0..8 {
            let j = judgment(Verdict::Endorse, 0.5);
            let d = Decision::from_judgment(&j, "merge");
            let _ = validator.validate(&j, &d, &[], &calm());
        }
        let j = judgment(Verdict::Endorse, 0.5);
        let d = Decision::from_judgment(&j, "merge");
        let result = validator.validate(&j, &d, &[], &calm());
        let blocked = result.unwrap_err();
        assert_eq!(blocked.guardrail, Guardrail::Approval);
        assert!(blocked
            .violations
            .iter()
            .any(|v| v.rule == PolicyRule::Balance));
    }
}
