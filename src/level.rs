//! Analysis-depth selection and the system-health ceiling.
//!
//! The selected [`DepthTier`] controls how much of the evaluator roster a
//! cell reaches. Health caps win over everything else: budget and cell
//! gradient may lower the tier, but only health can force it down after
//! the fact, and the cap is idempotent.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::budget::BudgetPressure;
use crate::cell::Cell;
use crate::tuning::{
    HEALTH_ERR_EMERGENCY, HEALTH_ERR_REDUCED, HEALTH_LATENCY_EMERGENCY_MS,
    HEALTH_LATENCY_REDUCED_MS, HEALTH_MEMORY_EMERGENCY_PCT, HEALTH_MEMORY_REDUCED_PCT,
    HEALTH_QUEUE_EMERGENCY, HEALTH_QUEUE_REDUCED, HEALTH_RECOVERY_STREAK,
};

/// How deeply a cell is analyzed. Ordered: Shallow < Medium < Deep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepthTier {
    Shallow,
    Medium,
    Deep,
}

impl DepthTier {
    /// Map a cell's intrinsic depth gradient onto a tier.
    pub fn from_gradient(gradient: u8) -> Self {
        match gradient {
            0..=1 => Self::Shallow,
            2..=3 => Self::Medium,
            _ => Self::Deep,
        }
    }
}

/// Overall pipeline health, assessed from live metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemHealth {
    Full,
    Reduced,
    Emergency,
}

/// Live operating metrics sampled by the embedder each cycle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LiveMetrics {
    pub cpu_pct: f64,
    pub memory_pct: f64,
    pub queue_depth: usize,
    /// Fraction of recent cycles that failed, in [0, 1].
    pub error_rate: f64,
    pub p95_latency_ms: f64,
}

/// Cap a tier by system health. Idempotent: applying the same health
/// twice never lowers the tier further.
pub fn apply_health_cap(health: SystemHealth, tier: DepthTier) -> DepthTier {
    match health {
        SystemHealth::Full => tier,
        SystemHealth::Reduced => tier.min(DepthTier::Medium),
        SystemHealth::Emergency => DepthTier::Shallow,
    }
}

/// Tracks health with immediate degradation and hysteresis-gated recovery.
#[derive(Debug)]
pub struct HealthMonitor {
    current: SystemHealth,
    clean_streak: u32,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            current: SystemHealth::Full,
            clean_streak: 0,
        }
    }

    pub fn current(&self) -> SystemHealth {
        self.current
    }

    /// Assess one metrics sample. Degradation applies immediately;
    /// recovery requires `HEALTH_RECOVERY_STREAK` consecutive clean
    /// samples and improves one level at a time.
    pub fn assess(&mut self, metrics: &LiveMetrics) -> SystemHealth {
        let observed = Self::classify(metrics);

        if severity(observed) > severity(self.current) {
            warn!(
                from = ?self.current,
                to = ?observed,
                cpu = metrics.cpu_pct,
                memory = metrics.memory_pct,
                queue = metrics.queue_depth,
                error_rate = metrics.error_rate,
                "system health degraded"
            );
            self.current = observed;
            self.clean_streak = 0;
        } else if severity(observed) < severity(self.current) {
            self.clean_streak += 1;
            if self.clean_streak >= HEALTH_RECOVERY_STREAK {
                let improved = match self.current {
                    SystemHealth::Emergency => SystemHealth::Reduced,
                    _ => SystemHealth::Full,
                };
                info!(from = ?self.current, to = ?improved, "system health recovering");
                self.current = improved;
                self.clean_streak = 0;
            }
        } else {
            self.clean_streak = 0;
        }

        self.current
    }

    fn classify(m: &LiveMetrics) -> SystemHealth {
        if m.error_rate >= HEALTH_ERR_EMERGENCY
            || m.p95_latency_ms >= HEALTH_LATENCY_EMERGENCY_MS
            || m.queue_depth >= HEALTH_QUEUE_EMERGENCY
            || m.memory_pct >= HEALTH_MEMORY_EMERGENCY_PCT
        {
            SystemHealth::Emergency
        } else if m.error_rate >= HEALTH_ERR_REDUCED
            || m.p95_latency_ms >= HEALTH_LATENCY_REDUCED_MS
            || m.queue_depth >= HEALTH_QUEUE_REDUCED
            || m.memory_pct >= HEALTH_MEMORY_REDUCED_PCT
        {
            SystemHealth::Reduced
        } else {
            SystemHealth::Full
        }
    }
}

fn severity(h: SystemHealth) -> u8 {
    match h {
        SystemHealth::Full => 0,
        SystemHealth::Reduced => 1,
        SystemHealth::Emergency => 2,
    }
}

/// Select the tier for one cell. Precedence, lowest wins at each step:
/// scheduler hint (or the cell's gradient), then budget pressure, then
/// the health cap, applied last so it can never be overridden.
pub fn select(
    cell: &Cell,
    health: SystemHealth,
    budget: BudgetPressure,
    hint: Option<DepthTier>,
) -> DepthTier {
    let candidate = hint.unwrap_or_else(|| DepthTier::from_gradient(cell.depth_gradient));

    let budget_capped = match budget {
        BudgetPressure::Normal => candidate,
        BudgetPressure::Stressed => candidate.min(DepthTier::Medium),
        BudgetPressure::Exhausted => DepthTier::Shallow,
    };

    let selected = apply_health_cap(health, budget_capped);
    if selected < candidate {
        debug!(
            cell_id = %cell.cell_id,
            requested = ?candidate,
            selected = ?selected,
            ?health,
            ?budget,
            "depth tier capped"
        );
    }
    selected
}
