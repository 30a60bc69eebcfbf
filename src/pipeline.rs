//! The pipeline context object.
//!
//! One [`JudgmentPipeline`] owns every stateful component: registry,
//! engine with its breaker, health monitor, budget ledger, validation
//! chain, router, and the event bus. Pure data in, pure data out; no
//! globals.

use std::sync::Arc;

use tracing::debug;

use crate::budget::{BudgetPressure, BudgetTracker};
use crate::cell::Cell;
use crate::consensus::{ConsensusConfig, ConsensusEngine, JudgeError, Judgment};
use crate::evaluator::EvaluatorRegistry;
use crate::events::{EventBus, PipelineEvent, SharedEventBus};
use crate::guardrail::{Decision, DecisionBlocked, DecisionValidator, ValidatedDecision};
use crate::level::{self, DepthTier, HealthMonitor, LiveMetrics};
use crate::qvalue::ActionValueStore;
use crate::router::{ConfidenceRouter, RoutingDecision};

/// Pipeline-level knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Total spend ceiling for this pipeline instance, in USD.
    pub budget_ceiling_usd: f64,
    pub consensus: ConsensusConfig,
    /// Optional JSON-lines mirror for the audit trail.
    pub audit_sink: Option<std::path::PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            budget_ceiling_usd: 100.0,
            consensus: ConsensusConfig::default(),
            audit_sink: None,
        }
    }
}

/// Owns the full judge → validate → route flow.
pub struct JudgmentPipeline {
    registry: Arc<EvaluatorRegistry>,
    engine: ConsensusEngine,
    health: HealthMonitor,
    budget: BudgetTracker,
    validator: DecisionValidator,
    router: ConfidenceRouter,
    bus: SharedEventBus,
}

impl JudgmentPipeline {
    pub fn new(registry: EvaluatorRegistry, config: PipelineConfig) -> Self {
        let registry = Arc::new(registry);
        let bus = EventBus::shared();
        let engine = ConsensusEngine::with_config(Arc::clone(&registry), config.consensus);
        let validator = match &config.audit_sink {
            Some(path) => DecisionValidator::with_audit_sink(path),
            None => DecisionValidator::new(),
        };
        Self {
            engine,
            health: HealthMonitor::new(),
            budget: BudgetTracker::new(config.budget_ceiling_usd, bus.clone()),
            validator,
            router: ConfidenceRouter::new(),
            bus,
            registry,
        }
    }

    pub fn bus(&self) -> SharedEventBus {
        self.bus.clone()
    }

    pub fn registry(&self) -> &EvaluatorRegistry {
        &self.registry
    }

    pub fn budget(&self) -> &BudgetTracker {
        &self.budget
    }

    pub fn validator(&self) -> &DecisionValidator {
        &self.validator
    }

    /// Judge one cell: assess health, select the depth tier, run the
    /// consensus cycle, account the cost, announce the judgment.
    pub async fn judge(
        &mut self,
        cell: Cell,
        metrics: &LiveMetrics,
        hint: Option<DepthTier>,
    ) -> Result<Judgment, JudgeError> {
        let health = self.health.assess(metrics);
        let pressure = self.budget.pressure();
        let tier = level::select(&cell, health, pressure, hint);
        debug!(cell_id = %cell.cell_id, ?tier, ?health, ?pressure, "judging cell");

        let judgment = self.engine.judge(cell, tier).await?;

        self.validator.record_judgment();
        self.budget.record_spend(judgment.cost_usd);
        self.bus.publish(PipelineEvent::JudgmentCreated {
            judgment_id: judgment.judgment_id.clone(),
            cell_id: judgment.cell.cell_id.clone(),
            verdict: judgment.verdict,
            score: judgment.score,
            confidence: judgment.confidence,
            consensus_reached: judgment.consensus_reached,
            timestamp: chrono::Utc::now(),
        });
        Ok(judgment)
    }

    /// Validate a proposed decision through the guardrail chain and
    /// announce it if it clears.
    pub fn validate_and_decide(
        &mut self,
        judgment: &Judgment,
        decision: &Decision,
        recent: &[Judgment],
        metrics: &LiveMetrics,
    ) -> Result<ValidatedDecision, DecisionBlocked> {
        let validated = self
            .validator
            .validate(judgment, decision, recent, metrics)?;
        self.bus.publish(PipelineEvent::DecisionMade {
            decision_id: validated.decision_id.clone(),
            judgment_id: validated.judgment_id.clone(),
            verdict: validated.verdict,
            approved_by_human: validated.approved_by_human,
            timestamp: chrono::Utc::now(),
        });
        Ok(validated)
    }

    /// Resolve a held decision; an approval releases and announces it.
    pub fn resolve_approval(
        &mut self,
        request_id: &str,
        approve: bool,
    ) -> Option<ValidatedDecision> {
        let validated = self.validator.resolve_approval(request_id, approve)?;
        self.bus.publish(PipelineEvent::DecisionMade {
            decision_id: validated.decision_id.clone(),
            judgment_id: validated.judgment_id.clone(),
            verdict: validated.verdict,
            approved_by_human: true,
            timestamp: chrono::Utc::now(),
        });
        Some(validated)
    }

    /// Route a task against a learned store.
    pub fn route(
        &mut self,
        store: &dyn ActionValueStore,
        state_key: &str,
        task_category: &str,
        complexity: &str,
    ) -> RoutingDecision {
        self.router.route(store, state_key, task_category, complexity)
    }

    /// Current budget pressure, for embedders planning ahead.
    pub fn budget_pressure(&self) -> BudgetPressure {
        self.budget.pressure()
    }
}
