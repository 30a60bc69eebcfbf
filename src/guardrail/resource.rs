//! Resource limiter — the first link in the validation chain.
//!
//! Refuses new decisions when the host is saturated or the pipeline is
//! producing judgments/actions faster than its hard rate limits, and
//! recommends a lower depth tier under pressure.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::warn;

use crate::level::{DepthTier, LiveMetrics};
use crate::tuning::{
    RESOURCE_CPU_PCT, RESOURCE_CPU_SOFT_PCT, RESOURCE_MAX_ACTIONS_PER_MIN,
    RESOURCE_MAX_JUDGMENTS_PER_SEC, RESOURCE_MEMORY_PCT, RESOURCE_QUEUE_CRITICAL,
};

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ResourceStats {
    pub judgments_last_sec: usize,
    pub actions_last_min: usize,
    pub refusals: u64,
}

/// Why the limiter refused.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceRefusal {
    pub reason: String,
    pub recommended_tier: DepthTier,
}

/// Sliding-window rate limiter plus live-metrics thresholds.
#[derive(Debug, Default)]
pub struct ResourceLimiter {
    judgment_times: VecDeque<Instant>,
    action_times: VecDeque<Instant>,
    refusals: u64,
}

impl ResourceLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a new decision may proceed right now. Does not
    /// consume rate-limit budget; call `record_judgment` /
    /// `record_action` when the decision actually lands.
    pub fn check_available(&mut self, metrics: &LiveMetrics) -> Result<(), ResourceRefusal> {
        self.prune();

        let refusal = if metrics.cpu_pct > RESOURCE_CPU_PCT {
            Some(format!(
                "cpu at {:.1}% exceeds {:.0}% limit",
                metrics.cpu_pct, RESOURCE_CPU_PCT
            ))
        } else if metrics.memory_pct > RESOURCE_MEMORY_PCT {
            Some(format!(
                "memory at {:.1}% exceeds {:.0}% limit",
                metrics.memory_pct, RESOURCE_MEMORY_PCT
            ))
        } else if self.judgment_times.len() >= RESOURCE_MAX_JUDGMENTS_PER_SEC {
            Some(format!(
                "judgment rate limit reached ({}/s)",
                RESOURCE_MAX_JUDGMENTS_PER_SEC
            ))
        } else if self.action_times.len() >= RESOURCE_MAX_ACTIONS_PER_MIN {
            Some(format!(
                "action rate limit reached ({}/min)",
                RESOURCE_MAX_ACTIONS_PER_MIN
            ))
        } else {
            None
        };

        match refusal {
            Some(reason) => {
                self.refusals += 1;
                warn!(%reason, "resource limiter refused decision");
                Err(ResourceRefusal {
                    reason,
                    recommended_tier: self.recommended_tier(metrics),
                })
            }
            None => Ok(()),
        }
    }

    /// Tier the limiter considers sustainable under the current load.
    pub fn recommended_tier(&self, metrics: &LiveMetrics) -> DepthTier {
        if metrics.queue_depth > RESOURCE_QUEUE_CRITICAL
            || metrics.memory_pct > RESOURCE_MEMORY_PCT
        {
            DepthTier::Shallow
        } else if metrics.cpu_pct > RESOURCE_CPU_SOFT_PCT {
            DepthTier::Medium
        } else {
            DepthTier::Deep
        }
    }

    pub fn record_judgment(&mut self) {
        self.judgment_times.push_back(Instant::now());
        self.prune();
    }

    pub fn record_action(&mut self) {
        self.action_times.push_back(Instant::now());
        self.prune();
    }

    pub fn stats(&mut self) -> ResourceStats {
        self.prune();
        ResourceStats {
            judgments_last_sec: self.judgment_times.len(),
            actions_last_min: self.action_times.len(),
            refusals: self.refusals,
        }
    }

    fn prune(&mut self) {
        let now = Instant::now();
        while let Some(t) = self.judgment_times.front() {
            if now.duration_since(*t) > Duration::from_secs(1) {
                self.judgment_times.pop_front();
            } else {
                break;
            }
        }
        while let Some(t) = self.action_times.front() {
            if now.duration_since(*t) > Duration::from_secs(60) {
                self.action_times.pop_front();
            } else {
                break;
            }
        }
    }
}
