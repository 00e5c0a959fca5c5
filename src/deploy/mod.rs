// ABOUTME: Deployment orchestration using the type state pattern.
// ABOUTME: Exports state markers, transitions, locks, events and the orchestrator.

mod abort;
mod artifact;
mod context;
mod deployment;
mod error;
mod events;
mod lock;
mod orchestrator;
mod state;
mod transitions;

pub use abort::{AbortHandle, AbortSignal, abort_pair};
pub use artifact::{DeploymentArtifact, DeploymentRequest, PortMapping, Protocol, TaskDescriptor};
pub use context::{DeployContext, DeploySettings};
pub use deployment::{Deployment, DeploymentPlan, DeploymentReport};
pub use error::{DeployError, DeployErrorKind, LockHolderInfo, Severity};
pub use events::{DeploymentEvent, EventBus};
pub use lock::{DeployLock, DeployLocks, LockInfo};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, Service, ServiceSpec};
pub use state::{
    BakedOut, Committed, DeploymentState, Failed, Provisioned, Requested, RolledBack, Shifted,
    Terminal, Validated,
};
pub use transitions::TransitionResult;
