//! Spend ledger and budget pressure.
//!
//! Tracks cumulative judging cost against a ceiling. Crossing into
//! stressed or exhausted territory announces an event exactly once per
//! crossing; recording spend itself never fails a judgment.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::events::{PipelineEvent, SharedEventBus};
use crate::tuning::BUDGET_STRESSED_FRACTION;

/// How close the ledger is to its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BudgetPressure {
    Normal,
    Stressed,
    Exhausted,
}

/// Cumulative spend tracker for one pipeline.
pub struct BudgetTracker {
    ceiling_usd: f64,
    spent_usd: f64,
    warned: bool,
    exhausted_announced: bool,
    bus: SharedEventBus,
}

impl BudgetTracker {
    pub fn new(ceiling_usd: f64, bus: SharedEventBus) -> Self {
        Self {
            ceiling_usd: ceiling_usd.max(0.0),
            spent_usd: 0.0,
            warned: false,
            exhausted_announced: false,
            bus,
        }
    }

    pub fn spent_usd(&self) -> f64 {
        self.spent_usd
    }

    pub fn ceiling_usd(&self) -> f64 {
        self.ceiling_usd
    }

    /// Record spend from one judge cycle. Announces threshold crossings
    /// once each; re-entering a state after `reset` re-arms them.
    pub fn record_spend(&mut self, cost_usd: f64) {
        if cost_usd <= 0.0 {
            return;
        }
        self.spent_usd += cost_usd;

        match self.pressure() {
            BudgetPressure::Normal => {}
            BudgetPressure::Stressed => {
                if !self.warned {
                    self.warned = true;
                    warn!(
                        spent = self.spent_usd,
                        ceiling = self.ceiling_usd,
                        "budget stressed"
                    );
                    self.bus.publish(PipelineEvent::BudgetWarning {
                        spent_usd: self.spent_usd,
                        ceiling_usd: self.ceiling_usd,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
            BudgetPressure::Exhausted => {
                if !self.exhausted_announced {
                    self.exhausted_announced = true;
                    warn!(
                        spent = self.spent_usd,
                        ceiling = self.ceiling_usd,
                        "budget exhausted"
                    );
                    self.bus.publish(PipelineEvent::BudgetExhausted {
                        spent_usd: self.spent_usd,
                        ceiling_usd: self.ceiling_usd,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
        }
    }

    pub fn pressure(&self) -> BudgetPressure {
        let remaining = self.ceiling_usd - self.spent_usd;
        if remaining <= 0.0 {
            BudgetPressure::Exhausted
        } else if remaining / self.ceiling_usd < BUDGET_STRESSED_FRACTION {
            BudgetPressure::Stressed
        } else {
            BudgetPressure::Normal
        }
    }

    /// Start a fresh accounting period.
    pub fn reset(&mut self) {
        info!(spent = self.spent_usd, "budget ledger reset");
        self.spent_usd = 0.0;
        self.warned = false;
        self.exhausted_announced = false;
    }
}
