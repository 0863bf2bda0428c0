use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::sync::Arc;
use tokio::sync::broadcast;

/// What an [`AgentEvent`] describes: a whole plan run or a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventScope {
    Plan,
    Step,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Start,
    Finish,
    Drop,
    Error,
    Cancel,
}

/// Lifecycle notification emitted by agent runners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub scope: EventScope,
    pub agent: String,
    pub plan: String,
    /// Zero-based step index for step events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub time: DateTime<Utc>,
}

impl AgentEvent {
    pub fn plan(agent: &str, plan: &str, status: EventStatus) -> Self {
        Self {
            scope: EventScope::Plan,
            agent: agent.to_string(),
            plan: plan.to_string(),
            step: None,
            status,
            error: None,
            time: Utc::now(),
        }
    }

    pub fn step(agent: &str, plan: &str, step: usize, status: EventStatus) -> Self {
        Self {
            step: Some(step),
            scope: EventScope::Step,
            ..Self::plan(agent, plan, status)
        }
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Broadcast bus for agent events. Subscribers that fall behind lose the
/// oldest events; publishers never block.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<AgentEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: AgentEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
