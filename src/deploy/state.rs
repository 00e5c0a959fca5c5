// ABOUTME: Deployment states: runtime enum for the status stream plus typestate markers.
// ABOUTME: Markers make each transition callable only from the state that allows it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Endpoint;

/// Lifecycle state as reported on the status stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    Requested,
    Provisioning,
    Validating,
    Shifting,
    Monitoring,
    RollingBack,
    Committed,
    RolledBack,
    Failed,
}

impl DeploymentState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentState::Committed | DeploymentState::RolledBack | DeploymentState::Failed
        )
    }

    /// Whether production traffic may have been touched by this point.
    pub fn touched_production(self) -> bool {
        matches!(
            self,
            DeploymentState::Shifting
                | DeploymentState::Monitoring
                | DeploymentState::RollingBack
                | DeploymentState::Committed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentState::Requested => "REQUESTED",
            DeploymentState::Provisioning => "PROVISIONING",
            DeploymentState::Validating => "VALIDATING",
            DeploymentState::Shifting => "SHIFTING",
            DeploymentState::Monitoring => "MONITORING",
            DeploymentState::RollingBack => "ROLLING_BACK",
            DeploymentState::Committed => "COMMITTED",
            DeploymentState::RolledBack => "ROLLED_BACK",
            DeploymentState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted, lock held, nothing touched yet.
/// Available actions: `provision()`, `fail()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Requested;

/// Idle pool filled with the new artifact's endpoints.
/// Available actions: `validate()`, `abandon()`
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub(crate) endpoints: Vec<Endpoint>,
}

impl Provisioned {
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

/// New pool passed validation through the test listener.
/// Available actions: `shift()`, `roll_back()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Validated;

/// Production traffic moved to the new pool.
/// Available actions: `monitor()`, `roll_back()`
#[derive(Debug, Clone, Copy)]
pub struct Shifted {
    pub(crate) cutover_at: tokio::time::Instant,
}

/// New pool stayed healthy through the bake-out window.
/// Available actions: `commit()`
#[derive(Debug, Clone, Copy, Default)]
pub struct BakedOut;

/// Terminal: traffic on the new pool, old pool drained.
#[derive(Debug, Clone, Copy, Default)]
pub struct Committed;

/// Terminal: traffic on the original pool, new pool drained.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolledBack;

/// Terminal: provisioning never completed; traffic untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Failed;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Committed {}
    impl Sealed for super::RolledBack {}
    impl Sealed for super::Failed {}
}

/// Marker for states a deployment can finish in.
pub trait Terminal: sealed::Sealed {}

impl Terminal for Committed {}
impl Terminal for RolledBack {}
impl Terminal for Failed {}
