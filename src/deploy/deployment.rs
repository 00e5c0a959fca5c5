// ABOUTME: Generic deployment struct parameterized by state marker.
// ABOUTME: Carries the deployment record, its transition history, and the final report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::policy::{DeploymentInfo, RollbackTarget};
use crate::types::{Color, DeploymentId, RequestId, ServiceName};

use super::artifact::{DeploymentArtifact, DeploymentRequest};
use super::error::DeployError;
use super::events::DeploymentEvent;
use super::state::{DeploymentState, Requested, Terminal};

/// Where a deployment starts from: the service's current layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    pub replicas: u32,
    /// The active pool; the other color receives the new artifact.
    pub source: Color,
    pub prior_production: Option<Color>,
    pub prior_test: Option<Color>,
}

/// A deployment in progress, parameterized by its current state.
///
/// Transitions consume the deployment and return it in the next state, so a
/// step can only run from the state that permits it. The runtime state used
/// on the status stream is kept alongside.
#[derive(Debug)]
pub struct Deployment<S> {
    pub(crate) id: DeploymentId,
    pub(crate) request_id: RequestId,
    pub(crate) service: ServiceName,
    pub(crate) artifact: DeploymentArtifact,
    pub(crate) plan: DeploymentPlan,
    pub(crate) current: DeploymentState,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) history: Vec<DeploymentEvent>,
    pub(crate) failure: Option<DeployError>,
    pub(crate) cleanup_errors: Vec<DeployError>,
    pub(crate) state: S,
}

impl Deployment<Requested> {
    pub fn new(id: DeploymentId, request: DeploymentRequest, plan: DeploymentPlan) -> Self {
        Deployment {
            id,
            request_id: request.request_id,
            service: request.service,
            artifact: request.artifact,
            plan,
            current: DeploymentState::Requested,
            started_at: Utc::now(),
            history: Vec::new(),
            failure: None,
            cleanup_errors: Vec::new(),
            state: Requested,
        }
    }
}

impl<S> Deployment<S> {
    pub fn id(&self) -> &DeploymentId {
        &self.id
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    pub fn artifact(&self) -> &DeploymentArtifact {
        &self.artifact
    }

    pub fn source(&self) -> Color {
        self.plan.source
    }

    pub fn destination(&self) -> Color {
        self.plan.source.other()
    }

    pub fn plan(&self) -> &DeploymentPlan {
        &self.plan
    }

    pub fn current_state(&self) -> DeploymentState {
        self.current
    }

    pub fn history(&self) -> &[DeploymentEvent] {
        &self.history
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub(crate) fn rollback_target(&self) -> RollbackTarget {
        RollbackTarget {
            service: self.service.clone(),
            production: self.plan.prior_production,
            test: self.plan.prior_test,
        }
    }

    pub(crate) fn info(&self, bakeout: std::time::Duration) -> DeploymentInfo {
        DeploymentInfo {
            deployment_id: self.id.clone(),
            service: self.service.clone(),
            source: self.source(),
            destination: self.destination(),
            bakeout,
            abort_requested: false,
        }
    }
}

impl<S: Terminal> Deployment<S> {
    /// Summarize a finished deployment.
    pub fn into_report(self) -> DeploymentReport {
        DeploymentReport {
            deployment_id: self.id,
            request_id: self.request_id,
            service: self.service,
            version: self.artifact.version(),
            image: self.artifact.image.to_string(),
            source: self.plan.source,
            destination: self.plan.source.other(),
            state: self.current,
            history: self.history,
            failure: self.failure,
            cleanup_errors: self.cleanup_errors,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Outcome of a deployment that reached a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub deployment_id: DeploymentId,
    pub request_id: RequestId,
    pub service: ServiceName,
    pub version: String,
    pub image: String,
    pub source: Color,
    pub destination: Color,
    pub state: DeploymentState,
    pub history: Vec<DeploymentEvent>,
    #[serde(serialize_with = "serialize_error")]
    pub failure: Option<DeployError>,
    #[serde(skip)]
    pub cleanup_errors: Vec<DeployError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<DeployError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.collect_str(e),
        None => serializer.serialize_none(),
    }
}

impl DeploymentReport {
    pub fn is_committed(&self) -> bool {
        self.state == DeploymentState::Committed
    }

    /// States visited, starting with REQUESTED.
    pub fn states(&self) -> Vec<DeploymentState> {
        let mut states = vec![DeploymentState::Requested];
        states.extend(self.history.iter().map(|event| event.to));
        states
    }
}
