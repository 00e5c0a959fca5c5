// ABOUTME: Rollback policies deciding whether a monitored deployment must be reverted.
// ABOUTME: Default, strict and majority flavours, selected from configuration.

mod coordinator;

pub use coordinator::{RollbackCoordinator, RollbackOutcome, RollbackTarget};

use std::sync::Arc;
use std::time::Duration;

use crate::config::PolicyKind;
use crate::health::{HealthVerdict, VerdictStatus};
use crate::types::{Color, DeploymentId, ServiceName};

/// What a policy knows about the deployment it judges.
#[derive(Debug, Clone)]
pub struct DeploymentInfo {
    pub deployment_id: DeploymentId,
    pub service: ServiceName,
    pub source: Color,
    pub destination: Color,
    pub bakeout: Duration,
    pub abort_requested: bool,
}

/// Decides from a health snapshot and time since cutover whether to roll back.
pub trait RollbackPolicy: Send + Sync + std::fmt::Debug {
    fn should_rollback(
        &self,
        deployment: &DeploymentInfo,
        verdict: &HealthVerdict,
        elapsed: Duration,
    ) -> bool;

    fn name(&self) -> &'static str;
}

/// Roll back on an unhealthy pool, on a timeout once the bake-out window has
/// passed, or on operator abort.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPolicy;

impl RollbackPolicy for DefaultPolicy {
    fn should_rollback(
        &self,
        deployment: &DeploymentInfo,
        verdict: &HealthVerdict,
        elapsed: Duration,
    ) -> bool {
        deployment.abort_requested
            || match verdict.status {
                VerdictStatus::Unhealthy => true,
                VerdictStatus::Timeout => elapsed >= deployment.bakeout,
                VerdictStatus::Healthy | VerdictStatus::Pending => false,
            }
    }

    fn name(&self) -> &'static str {
        "default"
    }
}

/// Roll back on the first failing endpoint or any timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictPolicy;

impl RollbackPolicy for StrictPolicy {
    fn should_rollback(
        &self,
        deployment: &DeploymentInfo,
        verdict: &HealthVerdict,
        _elapsed: Duration,
    ) -> bool {
        deployment.abort_requested
            || verdict.failing > 0
            || matches!(
                verdict.status,
                VerdictStatus::Unhealthy | VerdictStatus::Timeout
            )
    }

    fn name(&self) -> &'static str {
        "strict"
    }
}

/// Tolerate a failing minority; roll back once more than half fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct MajorityPolicy;

impl RollbackPolicy for MajorityPolicy {
    fn should_rollback(
        &self,
        deployment: &DeploymentInfo,
        verdict: &HealthVerdict,
        elapsed: Duration,
    ) -> bool {
        deployment.abort_requested
            || verdict.total == 0
            || verdict.failing_fraction() > 0.5
            || (verdict.status == VerdictStatus::Timeout && elapsed >= deployment.bakeout)
    }

    fn name(&self) -> &'static str {
        "majority"
    }
}

pub fn from_kind(kind: PolicyKind) -> Arc<dyn RollbackPolicy> {
    match kind {
        PolicyKind::Default => Arc::new(DefaultPolicy),
        PolicyKind::Strict => Arc::new(StrictPolicy),
        PolicyKind::Majority => Arc::new(MajorityPolicy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(abort_requested: bool) -> DeploymentInfo {
        DeploymentInfo {
            deployment_id: DeploymentId::new("d-1"),
            service: ServiceName::new("feed").unwrap(),
            source: Color::Blue,
            destination: Color::Green,
            bakeout: Duration::from_secs(300),
            abort_requested,
        }
    }

    fn verdict(status: VerdictStatus, passing: usize, failing: usize, total: usize) -> HealthVerdict {
        HealthVerdict {
            status,
            passing,
            failing,
            total,
        }
    }

    const EARLY: Duration = Duration::from_secs(10);
    const LATE: Duration = Duration::from_secs(300);

    #[test]
    fn default_policy() {
        let p = DefaultPolicy;
        assert!(p.should_rollback(&info(false), &verdict(VerdictStatus::Unhealthy, 1, 1, 2), EARLY));
        assert!(!p.should_rollback(&info(false), &verdict(VerdictStatus::Pending, 1, 1, 4), EARLY));
        assert!(!p.should_rollback(&info(false), &verdict(VerdictStatus::Timeout, 1, 0, 2), EARLY));
        assert!(p.should_rollback(&info(false), &verdict(VerdictStatus::Timeout, 1, 0, 2), LATE));
        assert!(p.should_rollback(&info(true), &verdict(VerdictStatus::Healthy, 2, 0, 2), EARLY));
    }

    #[test]
    fn strict_policy_reacts_to_any_failure() {
        let p = StrictPolicy;
        assert!(p.should_rollback(&info(false), &verdict(VerdictStatus::Pending, 3, 1, 4), EARLY));
        assert!(p.should_rollback(&info(false), &verdict(VerdictStatus::Timeout, 1, 0, 2), EARLY));
        assert!(!p.should_rollback(&info(false), &verdict(VerdictStatus::Healthy, 2, 0, 2), EARLY));
    }

    #[test]
    fn majority_policy_tolerates_minority() {
        let p = MajorityPolicy;
        assert!(!p.should_rollback(&info(false), &verdict(VerdictStatus::Unhealthy, 3, 1, 4), EARLY));
        assert!(!p.should_rollback(&info(false), &verdict(VerdictStatus::Unhealthy, 2, 2, 4), EARLY));
        assert!(p.should_rollback(&info(false), &verdict(VerdictStatus::Unhealthy, 1, 3, 4), EARLY));
        assert!(p.should_rollback(&info(false), &verdict(VerdictStatus::Timeout, 2, 0, 4), LATE));
        assert!(p.should_rollback(&info(true), &verdict(VerdictStatus::Healthy, 4, 0, 4), EARLY));
    }

    #[test]
    fn kinds_map_to_policies() {
        assert_eq!(from_kind(PolicyKind::Default).name(), "default");
        assert_eq!(from_kind(PolicyKind::Strict).name(), "strict");
        assert_eq!(from_kind(PolicyKind::Majority).name(), "majority");
    }
}
