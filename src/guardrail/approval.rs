//! Human approval gate — the final link in the validation chain.
//!
//! Decisions that need a human create a durable request and come back
//! as blocked; the event loop never waits. Resolution happens later via
//! `approve` / `reject` called by an external actor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::consensus::Verdict;
use crate::guardrail::policy::{GuardrailViolation, Severity};
use crate::guardrail::Decision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// A decision held for human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: String,
    pub judgment_id: String,
    pub verdict: Verdict,
    pub confidence: f64,
    pub action: String,
    pub reason: String,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Creates and resolves approval requests.
#[derive(Debug, Default)]
pub struct ApprovalGate {
    requests: HashMap<String, ApprovalRequest>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the decision must be held for a human. Lowest-band
    /// verdicts always qualify; so does any advisory violation at
    /// warning severity or above.
    pub fn requires_approval(decision: &Decision, violations: &[GuardrailViolation]) -> bool {
        decision.verdict.is_lowest()
            || violations
                .iter()
                .any(|v| !v.blocking && v.severity >= Severity::Warning)
    }

    /// Create a pending request for the decision. Returns the request id.
    pub fn create_request(&mut self, decision: &Decision, reason: impl Into<String>) -> String {
        let request = ApprovalRequest {
            request_id: Uuid::new_v4().to_string(),
            judgment_id: decision.judgment_id.clone(),
            verdict: decision.verdict,
            confidence: decision.confidence,
            action: decision.action.clone(),
            reason: reason.into(),
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        };
        let id = request.request_id.clone();
        info!(request_id = %id, judgment_id = %request.judgment_id, "approval request created");
        self.requests.insert(id.clone(), request);
        id
    }

    /// Resolve a pending request. Returns the request if it existed and
    /// was still pending.
    pub fn resolve(&mut self, request_id: &str, approve: bool) -> Option<ApprovalRequest> {
        let request = self.requests.get_mut(request_id)?;
        if request.status != ApprovalStatus::Pending {
            return None;
        }
        request.status = if approve {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        request.resolved_at = Some(Utc::now());
        info!(request_id, approved = approve, "approval request resolved");
        Some(request.clone())
    }

    pub fn status(&self, request_id: &str) -> Option<ApprovalStatus> {
        self.requests.get(request_id).map(|r| r.status)
    }

    /// All still-pending requests, oldest first.
    pub fn pending(&self) -> Vec<&ApprovalRequest> {
        let mut out: Vec<&ApprovalRequest> = self
            .requests
            .values()
            .filter(|r| r.status == ApprovalStatus::Pending)
            .collect();
        out.sort_by_key(|r| r.created_at);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::policy::PolicyRule;

    fn decision(verdict: Verdict) -> Decision {
        Decision {
            judgment_id: "j1".into(),
            verdict,
            confidence: 0.5,
            score: 50.0,
            action: "apply patch".into(),
            recommended_action: String::new(),
        }
    }

    fn advisory(severity: Severity) -> GuardrailViolation {
        GuardrailViolation {
            rule: PolicyRule::Balance,
            severity,
            reason: "skew".into(),
            blocking: false,
            remediation: String::new(),
        }
    }

    #[test]
    fn test_lowest_band_requires_approval() {
        assert!(ApprovalGate::requires_approval(
            &decision(Verdict::Reject),
            &[]
        ));
    }

    #[test]
    fn test_clean_endorsement_needs_no_approval() {
        assert!(!ApprovalGate::requires_approval(
            &decision(Verdict::Endorse),
            &[]
        ));
    }

    #[test]
    fn test_warning_violation_requires_approval() {
        assert!(ApprovalGate::requires_approval(
            &decision(Verdict::Endorse),
            &[advisory(Severity::Warning)]
        ));
    }

    #[test]
    fn test_info_violation_needs_no_approval() {
        assert!(!ApprovalGate::requires_approval(
            &decision(Verdict::Endorse),
            &[advisory(Severity::Info)]
        ));
    }

    #[test]
    fn test_create_and_approve() {
        let mut gate = ApprovalGate::new();
        let id = gate.create_request(&decision(Verdict::Reject), "lowest band");
        assert_eq!(gate.status(&id), Some(ApprovalStatus::Pending));

        let resolved = gate.resolve(&id, true).unwrap();
        assert_eq!(resolved.status, ApprovalStatus::Approved);
        assert!(resolved.resolved_at.is_some());
    }

    #[test]
    fn test_double_resolution_is_refused() {
        let mut gate = ApprovalGate::new();
        let id = gate.create_request(&decision(Verdict::Reject), "lowest band");
        assert!(gate.resolve(&id, false).is_some());
        assert!(gate.resolve(&id, true).is_none());
        assert_eq!(gate.status(&id), Some(ApprovalStatus::Rejected));
    }

    #[test]
    fn test_unknown_request_resolution() {
        let mut gate = ApprovalGate::new();
        assert!(gate.resolve("missing", true).is_none());
    }

    #[test]
    fn test_pending_lists_unresolved_only() {
        let mut gate = ApprovalGate::new();
        let a = gate.create_request(&decision(Verdict::Reject), "first");
        let _b = gate.create_request(&decision(Verdict::Reject), "second");
        gate.resolve(&a, true);
        let pending = gate.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].reason, "second");
    }
}
