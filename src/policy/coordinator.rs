// ABOUTME: Idempotent, non-overlapping rollback of listener bindings per deployment.
// ABOUTME: A second rollback of the same deployment is a no-op.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::deploy::DeployError;
use crate::routing::ListenerRouter;
use crate::types::{Color, DeploymentId, ListenerKind, ServiceName};

/// Bindings to restore when a deployment is rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackTarget {
    pub service: ServiceName,
    pub production: Option<Color>,
    pub test: Option<Color>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    Performed,
    AlreadyRolledBack,
}

/// Ledger of finished rollbacks keyed by deployment id.
#[derive(Debug, Default)]
pub struct RollbackCoordinator {
    completed: DashMap<DeploymentId, DateTime<Utc>>,
}

impl RollbackCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-point listeners to the target bindings once per deployment.
    ///
    /// The ledger entry stays locked while listeners are re-pointed, so two
    /// callers racing on one deployment never overlap.
    pub fn rollback(
        &self,
        router: &ListenerRouter,
        deployment_id: &DeploymentId,
        target: &RollbackTarget,
    ) -> Result<RollbackOutcome, DeployError> {
        let slot = match self.completed.entry(deployment_id.clone()) {
            Entry::Occupied(done) => {
                tracing::debug!(
                    %deployment_id,
                    at = %done.get(),
                    "rollback already performed"
                );
                return Ok(RollbackOutcome::AlreadyRolledBack);
            }
            Entry::Vacant(slot) => slot,
        };

        router
            .restore(
                &target.service,
                ListenerKind::Production,
                target.production,
                deployment_id,
            )
            .map_err(|e| DeployError::RollbackFailed(e.to_string()))?;

        if let Err(e) = router.restore(&target.service, ListenerKind::Test, target.test, deployment_id)
        {
            // Production is safe; a stale test binding only affects pre-release traffic.
            tracing::warn!(service = %target.service, %deployment_id, "could not restore test listener: {e}");
            router.unbind(&target.service, ListenerKind::Test, deployment_id);
        }

        slot.insert(Utc::now());
        Ok(RollbackOutcome::Performed)
    }

    pub fn has_rolled_back(&self, deployment_id: &DeploymentId) -> bool {
        self.completed.contains_key(deployment_id)
    }

    /// Drop the ledger entry of a deployment that reached a terminal state.
    pub fn forget(&self, deployment_id: &DeploymentId) {
        self.completed.remove(deployment_id);
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }
}
