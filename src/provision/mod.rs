// ABOUTME: Provisioning backends that fill an idle pool with a new artifact's instances.
// ABOUTME: Provisioner trait plus a static backend handing out pre-registered fleets.

mod static_pools;

pub use static_pools::StaticProvisioner;

use async_trait::async_trait;

use crate::deploy::TaskDescriptor;
use crate::types::{Color, Endpoint, ServiceName};

/// The pool a provisioner is asked to fill or tear down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRef {
    pub service: ServiceName,
    pub color: Color,
}

impl std::fmt::Display for PoolRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.service, self.color)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    /// The artifact cannot be run (bad descriptor, unknown image).
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    /// The task asks for more than the service may use.
    #[error("resource limits exceeded: {0}")]
    LimitsExceeded(String),

    /// Not enough capacity for the requested replica count.
    #[error("insufficient capacity for {pool}: wanted {wanted}, have {available}")]
    InsufficientCapacity {
        pool: String,
        wanted: u32,
        available: usize,
    },

    #[error("provisioning backend error: {0}")]
    Backend(String),
}

/// Starts and stops the task instances behind a pool.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Start `replicas` instances of the task and return their endpoints.
    async fn provision(
        &self,
        pool: &PoolRef,
        task: &TaskDescriptor,
        replicas: u32,
    ) -> Result<Vec<Endpoint>, ProvisionError>;

    /// Stop whatever runs behind the pool.
    async fn teardown(&self, pool: &PoolRef) -> Result<(), ProvisionError>;
}
