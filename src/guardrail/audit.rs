//! Append-only audit trail.
//!
//! Every decision, violation set, recommendation, block, and human
//! review is recorded before the chain moves on. Records are immutable
//! once appended. An optional JSON-lines file sink mirrors the trail to
//! disk; sink failures are logged and swallowed so auditing never makes
//! the chain fail.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::guardrail::policy::GuardrailViolation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    Decision,
    Violations,
    Recommendation,
    Block,
    HumanReview,
}

/// One immutable trail entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub record_id: String,
    pub judgment_id: String,
    pub kind: AuditKind,
    pub detail: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// In-memory trail with an optional file mirror.
#[derive(Debug, Default)]
pub struct AuditTrail {
    records: Vec<AuditRecord>,
    sink: Option<PathBuf>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror every record to a JSON-lines file.
    pub fn with_sink(path: impl Into<PathBuf>) -> Self {
        Self {
            records: Vec::new(),
            sink: Some(path.into()),
        }
    }

    fn append(&mut self, judgment_id: &str, kind: AuditKind, detail: serde_json::Value) -> String {
        let record = AuditRecord {
            record_id: Uuid::new_v4().to_string(),
            judgment_id: judgment_id.to_string(),
            kind,
            detail,
            timestamp: Utc::now(),
        };
        let id = record.record_id.clone();
        self.write_sink(&record);
        self.records.push(record);
        id
    }

    fn write_sink(&self, record: &AuditRecord) {
        let Some(path) = &self.sink else { return };
        let line = match serde_json::to_string(record) {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "failed to serialize audit record");
                return;
            }
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| writeln!(f, "{}", line));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to mirror audit record");
        }
    }

    /// Record the decision entering the chain. Returns the record id.
    pub fn record_decision(&mut self, judgment_id: &str, detail: serde_json::Value) -> String {
        self.append(judgment_id, AuditKind::Decision, detail)
    }

    /// Record the full violation set found by the policy checker.
    pub fn record_violations(
        &mut self,
        judgment_id: &str,
        violations: &[GuardrailViolation],
    ) -> String {
        let detail = serde_json::to_value(violations).unwrap_or(serde_json::Value::Null);
        self.append(judgment_id, AuditKind::Violations, detail)
    }

    /// Record the chain's recommendation for this decision.
    pub fn record_recommendation(&mut self, judgment_id: &str, recommendation: &str) -> String {
        self.append(
            judgment_id,
            AuditKind::Recommendation,
            serde_json::json!({ "recommendation": recommendation }),
        )
    }

    /// Record a block. Called before the block is returned, for every
    /// guardrail including the resource check.
    pub fn record_block(&mut self, judgment_id: &str, guardrail: &str, reason: &str) -> String {
        self.append(
            judgment_id,
            AuditKind::Block,
            serde_json::json!({ "guardrail": guardrail, "reason": reason }),
        )
    }

    /// Record a human approving or rejecting a held decision.
    pub fn record_human_review(
        &mut self,
        judgment_id: &str,
        request_id: &str,
        approved: bool,
    ) -> String {
        self.append(
            judgment_id,
            AuditKind::HumanReview,
            serde_json::json!({ "request_id": request_id, "approved": approved }),
        )
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    /// All block records, oldest first.
    pub fn blocks(&self) -> Vec<&AuditRecord> {
        self.records
            .iter()
            .filter(|r| r.kind == AuditKind::Block)
            .collect()
    }
}
