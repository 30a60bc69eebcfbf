//! Judgment consensus and guardrail pipeline.
//!
//! Cells flow through a fixed sequence: depth selection (capped by
//! system health and budget), concurrent evaluator voting with
//! Byzantine quorum arithmetic behind a circuit breaker, then an
//! ordered guardrail chain (resources, policy, audit, human approval)
//! before any decision is released. A confidence router decides when
//! tasks may take the cheap execution path, backed by a learned
//! action-value store.
//!
//! [`pipeline::JudgmentPipeline`] is the entry point and owns all
//! mutable state; everything else is data in, data out.

pub mod breaker;
pub mod budget;
pub mod cell;
pub mod consensus;
pub mod evaluator;
pub mod events;
pub mod guardrail;
pub mod level;
pub mod pipeline;
pub mod qvalue;
pub mod router;
pub mod tuning;

pub use breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use budget::{BudgetPressure, BudgetTracker};
pub use cell::{Cell, CellBuilder, CellError, Domain, Phase, TimeDim};
pub use consensus::{
    ConsensusConfig, ConsensusEngine, JudgeError, Judgment, Verdict,
};
pub use evaluator::{
    Evaluator, EvaluatorCapabilities, EvaluatorError, EvaluatorRegistry, EvaluatorVote,
};
pub use events::{EventBus, PipelineEvent, SharedEventBus};
pub use guardrail::{
    ApprovalGate, ApprovalRequest, ApprovalStatus, AuditRecord, AuditTrail, Decision,
    DecisionBlocked, DecisionValidator, Guardrail, GuardrailViolation, PolicyChecker,
    PolicyRule, ResourceLimiter, Severity, ValidatedDecision,
};
pub use level::{DepthTier, HealthMonitor, LiveMetrics, SystemHealth};
pub use pipeline::{JudgmentPipeline, PipelineConfig};
pub use qvalue::{ActionValueStore, MemoryActionValueStore, QEntry};
pub use router::{ConfidenceRouter, ExecTier, RoutingDecision};
