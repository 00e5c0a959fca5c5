// ABOUTME: Collaborators a deployment needs while it moves between states.
// ABOUTME: Shared by every deployment the orchestrator runs.

use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditLog;
use crate::config::{Config, HealthPolicy};
use crate::health::HealthMonitor;
use crate::hooks::LifecycleHooks;
use crate::policy::{RollbackCoordinator, RollbackPolicy};
use crate::provision::Provisioner;
use crate::routing::{ListenerRouter, TargetPoolRegistry};

use super::events::EventBus;

/// Timing knobs fixed at construction.
#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub health: HealthPolicy,
    pub provision_timeout: Duration,
    pub hook_timeout: Duration,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            health: HealthPolicy::default(),
            provision_timeout: Duration::from_secs(300),
            hook_timeout: Duration::from_secs(120),
        }
    }
}

impl From<&Config> for DeploySettings {
    fn from(config: &Config) -> Self {
        Self {
            health: config.health.clone(),
            provision_timeout: config.provision_timeout,
            hook_timeout: config.hook_timeout,
        }
    }
}

pub struct DeployContext {
    pub pools: Arc<TargetPoolRegistry>,
    pub router: Arc<ListenerRouter>,
    pub monitor: HealthMonitor,
    pub provisioner: Arc<dyn Provisioner>,
    pub policy: Arc<dyn RollbackPolicy>,
    pub rollbacks: Arc<RollbackCoordinator>,
    pub hooks: Arc<dyn LifecycleHooks>,
    pub audit: Arc<dyn AuditLog>,
    pub events: EventBus,
    pub settings: DeploySettings,
}

impl std::fmt::Debug for DeployContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployContext")
            .field("policy", &self.policy.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
