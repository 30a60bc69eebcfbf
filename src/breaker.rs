//! Circuit breaker guarding the consensus engine.
//!
//! Three states: Closed (normal), Open (judging suspended), HalfOpen
//! (exactly one probe allowed after the cooldown). A probe failure
//! re-opens the circuit and restarts the cooldown; a probe success
//! closes it and clears the failure counter.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::tuning::{BREAKER_COOLDOWN, BREAKER_FAILURE_THRESHOLD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of the breaker, for diagnostics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_opens: u64,
}

/// Single-writer circuit breaker. One `allow()` check per cycle, then
/// exactly one `record_success()` or `record_failure()`.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    failure_threshold: u32,
    cooldown: Duration,
    total_opens: u64,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BREAKER_FAILURE_THRESHOLD, BREAKER_COOLDOWN)
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            failure_threshold,
            cooldown,
            total_opens: 0,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Whether a cycle may proceed right now. The Open → HalfOpen
    /// transition itself admits the single probe; while that probe's
    /// result is pending the breaker stays HalfOpen and refuses.
    pub fn allow(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.cooldown {
                    info!("circuit cooldown elapsed, admitting probe");
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => false,
        }
    }

    /// A cycle produced a judgment. Closes the circuit from any state.
    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            info!(from = ?self.state, "circuit closed after successful cycle");
        }
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    /// A cycle failed outright. Opens the circuit at the threshold, and
    /// immediately on a failed probe.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        match self.state {
            CircuitState::HalfOpen => {
                warn!("probe failed, circuit re-opened");
                self.open();
            }
            CircuitState::Closed => {
                if self.consecutive_failures >= self.failure_threshold {
                    warn!(
                        failures = self.consecutive_failures,
                        "failure threshold reached, circuit opened"
                    );
                    self.open();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.total_opens += 1;
    }

    /// Force the breaker back to Closed. Test and operator use only.
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            total_opens: self.total_opens,
        }
    }
}
