//! The unit of work routed through the pipeline.
//!
//! A [`Cell`] carries the payload being judged plus the coordinates the
//! pipeline uses for routing and learning: a domain, a phase, a time
//! dimension, three scalar signals, a budget ceiling, and a depth
//! gradient. Cells are validated at construction and immutable afterwards.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error type for cell construction.
#[derive(Debug, thiserror::Error)]
pub enum CellError {
    #[error("signal '{name}' must be a finite value in [0, 1], got {value}")]
    SignalOutOfRange { name: &'static str, value: f64 },

    #[error("budget must be a finite non-negative value, got {0}")]
    InvalidBudget(f64),

    #[error("depth gradient must be in 0..=6, got {0}")]
    DepthGradientOutOfRange(u8),
}

/// The domain a cell belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Domain {
    Code,
    Market,
    Social,
    Human,
    System,
    External,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Code => "CODE",
            Self::Market => "MARKET",
            Self::Social => "SOCIAL",
            Self::Human => "HUMAN",
            Self::System => "SYSTEM",
            Self::External => "EXTERNAL",
        };
        write!(f, "{}", s)
    }
}

/// The pipeline phase this cell is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Perceive,
    Judge,
    Decide,
    Act,
    Learn,
    Account,
    Emerge,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Perceive => "PERCEIVE",
            Self::Judge => "JUDGE",
            Self::Decide => "DECIDE",
            Self::Act => "ACT",
            Self::Learn => "LEARN",
            Self::Account => "ACCOUNT",
            Self::Emerge => "EMERGE",
        };
        write!(f, "{}", s)
    }
}

/// The time dimension of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeDim {
    Past,
    Present,
    Future,
    Cycle,
    Trend,
}

impl fmt::Display for TimeDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Past => "PAST",
            Self::Present => "PRESENT",
            Self::Future => "FUTURE",
            Self::Cycle => "CYCLE",
            Self::Trend => "TREND",
        };
        write!(f, "{}", s)
    }
}

/// A validated, immutable unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub cell_id: String,
    pub domain: Domain,
    pub phase: Phase,
    pub time_dim: TimeDim,
    /// The data being judged (code, transaction, message, ...).
    pub payload: serde_json::Value,
    /// Human-readable context for evaluators.
    pub context: String,
    /// Operational risk signal in [0, 1].
    pub risk: f64,
    /// Intrinsic complexity signal in [0, 1].
    pub complexity: f64,
    /// Novelty signal in [0, 1].
    pub novelty: f64,
    /// Budget ceiling for judging this cell, in USD.
    pub budget_usd: f64,
    /// Intrinsic analysis-depth gradient, 0 (reflexive) to 6 (deepest).
    pub depth_gradient: u8,
    pub metadata: HashMap<String, String>,
}

impl Cell {
    /// Start building a cell for the given domain and phase.
    pub fn builder(domain: Domain, phase: Phase) -> CellBuilder {
        CellBuilder {
            domain,
            phase,
            time_dim: TimeDim::Present,
            payload: serde_json::Value::Null,
            context: String::new(),
            risk: 0.0,
            complexity: 0.5,
            novelty: 0.5,
            budget_usd: 1.0,
            depth_gradient: 2,
            metadata: HashMap::new(),
        }
    }

    /// Composite key used for routing and learning:
    /// `domain:phase:time_dim:depth_gradient`.
    pub fn state_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.domain, self.phase, self.time_dim, self.depth_gradient
        )
    }
}

/// Validating builder for [`Cell`]. Malformed cells never reach dispatch.
#[derive(Debug, Clone)]
pub struct CellBuilder {
    domain: Domain,
    phase: Phase,
    time_dim: TimeDim,
    payload: serde_json::Value,
    context: String,
    risk: f64,
    complexity: f64,
    novelty: f64,
    budget_usd: f64,
    depth_gradient: u8,
    metadata: HashMap<String, String>,
}

impl CellBuilder {
    pub fn time_dim(mut self, time_dim: TimeDim) -> Self {
        self.time_dim = time_dim;
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn risk(mut self, risk: f64) -> Self {
        self.risk = risk;
        self
    }

    pub fn complexity(mut self, complexity: f64) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn novelty(mut self, novelty: f64) -> Self {
        self.novelty = novelty;
        self
    }

    pub fn budget_usd(mut self, budget_usd: f64) -> Self {
        self.budget_usd = budget_usd;
        self
    }

    pub fn depth_gradient(mut self, depth_gradient: u8) -> Self {
        self.depth_gradient = depth_gradient;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Validate and construct the cell.
    pub fn build(self) -> Result<Cell, CellError> {
        check_signal("risk", self.risk)?;
        check_signal("complexity", self.complexity)?;
        check_signal("novelty", self.novelty)?;
        if !self.budget_usd.is_finite() || self.budget_usd < 0.0 {
            return Err(CellError::InvalidBudget(self.budget_usd));
        }
        if self.depth_gradient > 6 {
            return Err(CellError::DepthGradientOutOfRange(self.depth_gradient));
        }

        Ok(Cell {
            cell_id: Uuid::new_v4().to_string(),
            domain: self.domain,
            phase: self.phase,
            time_dim: self.time_dim,
            payload: self.payload,
            context: self.context,
            risk: self.risk,
            complexity: self.complexity,
            novelty: self.novelty,
            budget_usd: self.budget_usd,
            depth_gradient: self.depth_gradient,
            metadata: self.metadata,
        })
    }
}

fn check_signal(name: &'static str, value: f64) -> Result<(), CellError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(CellError::SignalOutOfRange { name, value });
    }
    Ok(())
}
