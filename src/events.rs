//! Pipeline event bus.
//!
//! A tokio broadcast channel carrying lifecycle events for observers
//! (dashboards, learners, loggers). Publishing is fire-and-forget: a
//! bus with no subscribers drops events silently.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::consensus::Verdict;

const BUS_CAPACITY: usize = 256;

/// Everything the pipeline announces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum PipelineEvent {
    JudgmentCreated {
        judgment_id: String,
        cell_id: String,
        verdict: Verdict,
        score: f64,
        confidence: f64,
        consensus_reached: bool,
        timestamp: DateTime<Utc>,
    },
    DecisionMade {
        decision_id: String,
        judgment_id: String,
        verdict: Verdict,
        approved_by_human: bool,
        timestamp: DateTime<Utc>,
    },
    BudgetWarning {
        spent_usd: f64,
        ceiling_usd: f64,
        timestamp: DateTime<Utc>,
    },
    BudgetExhausted {
        spent_usd: f64,
        ceiling_usd: f64,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::JudgmentCreated { .. } => "judgment-created",
            Self::DecisionMade { .. } => "decision-made",
            Self::BudgetWarning { .. } => "budget-warning",
            Self::BudgetExhausted { .. } => "budget-exhausted",
        }
    }
}

/// Broadcast bus for pipeline events.
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

pub type SharedEventBus = Arc<EventBus>;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn shared() -> SharedEventBus {
        Arc::new(Self::new())
    }

    /// Publish an event. Never errors; with no subscribers the event is
    /// simply dropped.
    pub fn publish(&self, event: PipelineEvent) {
        debug!(event_type = event.event_type(), "publishing event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(PipelineEvent::BudgetWarning {
            spent_usd: 5.0,
            ceiling_usd: 10.0,
            timestamp: Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(PipelineEvent::JudgmentCreated {
            judgment_id: "j1".into(),
            cell_id: "c1".into(),
            verdict: Verdict::Endorse,
            score: 70.0,
            confidence: 0.5,
            consensus_reached: true,
            timestamp: Utc::now(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "judgment-created");
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let bus = EventBus::shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(PipelineEvent::BudgetExhausted {
            spent_usd: 12.0,
            ceiling_usd: 10.0,
            timestamp: Utc::now(),
        });
        assert_eq!(rx1.recv().await.unwrap().event_type(), "budget-exhausted");
        assert_eq!(rx2.recv().await.unwrap().event_type(), "budget-exhausted");
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = PipelineEvent::BudgetWarning {
            spent_usd: 1.0,
            ceiling_usd: 2.0,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"budget-warning\""));
    }
}
