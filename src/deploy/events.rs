// ABOUTME: Deployment status stream: one event per state transition.
// ABOUTME: Broadcast to any number of subscribers for observability and alerting.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{DeploymentId, ServiceName};

use super::DeploymentState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentEvent {
    pub deployment_id: DeploymentId,
    pub service: ServiceName,
    pub from: DeploymentState,
    pub to: DeploymentState,
    pub timestamp: DateTime<Utc>,
}

/// Fan-out of transition events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DeploymentEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeploymentEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: DeploymentEvent) {
        // No subscribers is fine; events are also kept in the deployment history.
        let _ = self.sender.send(event);
    }
}
