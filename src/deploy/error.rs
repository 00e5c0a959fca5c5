// ABOUTME: Error types for deployment operations.
// ABOUTME: Each error has a kind for programmatic handling and a severity for alerting.

use chrono::{DateTime, Utc};

use crate::provision::ProvisionError;
use crate::routing::RoutingError;
use crate::types::{DeploymentId, ServiceName};

/// Who holds a service's deploy lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolderInfo {
    pub deployment_id: DeploymentId,
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    /// Set when a failed rollback left the service for operator attention.
    pub stuck: bool,
}

/// Errors that end or reject a deployment.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeployError {
    #[error("deployment {} already in progress for {service} (started {})", holder.deployment_id, holder.started_at)]
    ConcurrentDeployment {
        service: ServiceName,
        holder: LockHolderInfo,
    },

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("request {0} was already processed")]
    DuplicateRequest(String),

    #[error("{version} is already live on {service}")]
    AlreadyDeployed {
        service: ServiceName,
        version: String,
    },

    #[error("provisioning failed: {0}")]
    ProvisioningFailed(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("monitoring failed: {0}")]
    MonitoringFailed(String),

    #[error("pool in use: {0}")]
    PoolInUse(String),

    #[error("deployment aborted by operator during {0}")]
    Aborted(String),

    #[error("{point} hook failed: {reason}")]
    HookFailed { point: String, reason: String },

    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    #[error("deployment task ended abnormally: {0}")]
    Interrupted(String),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployErrorKind {
    ConcurrentDeployment,
    UnknownService,
    DuplicateRequest,
    AlreadyDeployed,
    ProvisioningFailed,
    ValidationFailed,
    MonitoringFailed,
    PoolInUse,
    Aborted,
    HookFailed,
    RollbackFailed,
    Interrupted,
}

/// How loudly an error should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Expected outcome, nothing was disrupted.
    Info,
    /// Production was disrupted but recovered.
    Warning,
    /// Logic fault that must be investigated.
    Error,
    /// Production may be unserved; page a human.
    Critical,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::ConcurrentDeployment { .. } => DeployErrorKind::ConcurrentDeployment,
            DeployError::UnknownService(_) => DeployErrorKind::UnknownService,
            DeployError::DuplicateRequest(_) => DeployErrorKind::DuplicateRequest,
            DeployError::AlreadyDeployed { .. } => DeployErrorKind::AlreadyDeployed,
            DeployError::ProvisioningFailed(_) => DeployErrorKind::ProvisioningFailed,
            DeployError::ValidationFailed(_) => DeployErrorKind::ValidationFailed,
            DeployError::MonitoringFailed(_) => DeployErrorKind::MonitoringFailed,
            DeployError::PoolInUse(_) => DeployErrorKind::PoolInUse,
            DeployError::Aborted(_) => DeployErrorKind::Aborted,
            DeployError::HookFailed { .. } => DeployErrorKind::HookFailed,
            DeployError::RollbackFailed(_) => DeployErrorKind::RollbackFailed,
            DeployError::Interrupted(_) => DeployErrorKind::Interrupted,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            DeployError::MonitoringFailed(_) => Severity::Warning,
            DeployError::PoolInUse(_) => Severity::Error,
            DeployError::RollbackFailed(_) | DeployError::Interrupted(_) => Severity::Critical,
            _ => Severity::Info,
        }
    }

    /// Lock holder details if this is a concurrency rejection.
    pub fn lock_holder(&self) -> Option<&LockHolderInfo> {
        match self {
            DeployError::ConcurrentDeployment { holder, .. } => Some(holder),
            _ => None,
        }
    }

    /// Whether the request was turned away before any work started.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.kind(),
            DeployErrorKind::ConcurrentDeployment
                | DeployErrorKind::UnknownService
                | DeployErrorKind::DuplicateRequest
                | DeployErrorKind::AlreadyDeployed
        )
    }
}

impl From<ProvisionError> for DeployError {
    fn from(err: ProvisionError) -> Self {
        DeployError::ProvisioningFailed(err.to_string())
    }
}

impl From<RoutingError> for DeployError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::PoolInUse { .. } => DeployError::PoolInUse(err.to_string()),
            RoutingError::UnknownService(service) => {
                DeployError::UnknownService(service.to_string())
            }
            RoutingError::EmptyPool { .. } => DeployError::ValidationFailed(err.to_string()),
        }
    }
}
