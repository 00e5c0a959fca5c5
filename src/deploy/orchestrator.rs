// ABOUTME: Entry point that accepts deployment requests and drives them to a terminal state.
// ABOUTME: Owns the service records, per-service locks, duplicate detection and the status stream.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::audit::{AuditLog, TracingAuditLog};
use crate::health::{HealthMonitor, Probe};
use crate::hooks::{LifecycleHooks, NoHooks};
use crate::policy::{DefaultPolicy, RollbackCoordinator, RollbackPolicy};
use crate::provision::Provisioner;
use crate::routing::{ListenerRouter, TargetPoolRegistry};
use crate::types::{Color, DeploymentId, Endpoint, ListenerKind, RequestId, ServiceName};

use super::abort::{AbortSignal, abort_pair};
use super::artifact::DeploymentRequest;
use super::context::{DeployContext, DeploySettings};
use super::deployment::{Deployment, DeploymentPlan, DeploymentReport};
use super::error::DeployError;
use super::events::{DeploymentEvent, EventBus};
use super::lock::{DeployLocks, LockInfo};
use super::state::Requested;

/// Request ids remembered per service for duplicate detection.
const REQUEST_HISTORY: usize = 64;

/// A service as the orchestrator tracks it between deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub name: ServiceName,
    pub replicas: u32,
    pub active: Color,
    pub live_version: Option<String>,
}

/// How to bring a service under management.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: ServiceName,
    pub replicas: u32,
    /// Pool currently serving production.
    pub active: Color,
    /// Endpoints already running in the active pool.
    pub endpoints: Vec<Endpoint>,
    pub live_version: Option<String>,
}

impl ServiceSpec {
    pub fn new(name: ServiceName, replicas: u32) -> Self {
        Self {
            name,
            replicas,
            active: Color::Blue,
            endpoints: Vec::new(),
            live_version: None,
        }
    }

    pub fn active(mut self, color: Color, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        self.active = color;
        self.endpoints = endpoints.into_iter().collect();
        self
    }

    pub fn live_version(mut self, version: impl Into<String>) -> Self {
        self.live_version = Some(version.into());
        self
    }
}

pub struct OrchestratorBuilder {
    provisioner: Arc<dyn Provisioner>,
    probe: Arc<dyn Probe>,
    policy: Arc<dyn RollbackPolicy>,
    hooks: Arc<dyn LifecycleHooks>,
    audit: Arc<dyn AuditLog>,
    settings: DeploySettings,
    event_capacity: usize,
}

impl OrchestratorBuilder {
    pub fn policy(mut self, policy: Arc<dyn RollbackPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn settings(mut self, settings: DeploySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn build(self) -> Orchestrator {
        let pools = Arc::new(TargetPoolRegistry::new());
        let router = Arc::new(ListenerRouter::new(
            Arc::clone(&pools),
            Arc::clone(&self.audit),
        ));
        Orchestrator {
            ctx: Arc::new(DeployContext {
                pools,
                router,
                monitor: HealthMonitor::new(self.probe),
                provisioner: self.provisioner,
                policy: self.policy,
                rollbacks: Arc::new(RollbackCoordinator::new()),
                hooks: self.hooks,
                audit: self.audit,
                events: EventBus::new(self.event_capacity),
                settings: self.settings,
            }),
            services: Arc::new(DashMap::new()),
            locks: Arc::new(DeployLocks::new()),
            requests: DashMap::new(),
        }
    }
}

/// Runs blue/green deployments for any number of services, one at a time
/// per service.
pub struct Orchestrator {
    ctx: Arc<DeployContext>,
    services: Arc<DashMap<ServiceName, Service>>,
    locks: Arc<DeployLocks>,
    requests: DashMap<ServiceName, VecDeque<RequestId>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("ctx", &self.ctx)
            .field("services", &self.services.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn builder(provisioner: Arc<dyn Provisioner>, probe: Arc<dyn Probe>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            provisioner,
            probe,
            policy: Arc::new(DefaultPolicy),
            hooks: Arc::new(NoHooks),
            audit: Arc::new(TracingAuditLog),
            settings: DeploySettings::default(),
            event_capacity: 256,
        }
    }

    /// Bring a service under management, binding both listeners to its
    /// active pool when that pool has endpoints.
    pub fn register_service(&self, spec: ServiceSpec) -> Result<(), DeployError> {
        let name = &spec.name;
        let bootstrap = DeploymentId::new(format!("register-{name}"));
        let _lock = self
            .locks
            .try_acquire(name, &bootstrap, abort_pair().0)
            .map_err(|e| match e.lock_holder() {
                Some(holder) => DeployError::PoolInUse(format!(
                    "cannot re-register {name} during deployment {}",
                    holder.deployment_id
                )),
                None => e,
            })?;

        let pools = &self.ctx.pools;
        let router = &self.ctx.router;

        pools.register(name);
        if spec.endpoints.is_empty() {
            for kind in ListenerKind::ALL {
                router.unbind(name, kind, &bootstrap);
            }
            pools.set_endpoints(name, spec.active, Vec::new())?;
        } else {
            pools.set_endpoints(name, spec.active, spec.endpoints.iter().cloned())?;
            for kind in ListenerKind::ALL {
                router.bind(name, kind, spec.active, &bootstrap)?;
            }
        }
        pools.set_endpoints(name, spec.active.other(), Vec::new())?;

        tracing::info!(
            service = %name,
            active = %spec.active,
            endpoints = spec.endpoints.len(),
            "service registered"
        );
        self.services.insert(
            name.clone(),
            Service {
                name: name.clone(),
                replicas: spec.replicas,
                active: spec.active,
                live_version: spec.live_version,
            },
        );
        Ok(())
    }

    pub fn service(&self, name: &ServiceName) -> Option<Service> {
        self.services.get(name).map(|s| s.clone())
    }

    pub fn services(&self) -> Vec<Service> {
        let mut all: Vec<Service> = self.services.iter().map(|s| s.clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeploymentEvent> {
        self.ctx.events.subscribe()
    }

    pub fn router(&self) -> &Arc<ListenerRouter> {
        &self.ctx.router
    }

    pub fn pools(&self) -> &Arc<TargetPoolRegistry> {
        &self.ctx.pools
    }

    pub fn rollbacks(&self) -> &Arc<RollbackCoordinator> {
        &self.ctx.rollbacks
    }

    pub fn context(&self) -> &DeployContext {
        &self.ctx
    }

    /// The deployment currently holding the service, if any.
    pub fn active_deployment(&self, service: &ServiceName) -> Option<LockInfo> {
        self.locks.holder(service)
    }

    pub fn is_stuck(&self, service: &ServiceName) -> bool {
        self.locks.is_stuck(service)
    }

    /// Ask the service's in-flight deployment to stop. Returns false when
    /// nothing is running.
    pub fn abort(&self, service: &ServiceName) -> bool {
        let signalled = self.locks.abort(service);
        if signalled {
            tracing::warn!(%service, "operator abort requested");
        }
        signalled
    }

    /// Release a lock left behind by a failed rollback. A running
    /// deployment is reported as `ConcurrentDeployment` and keeps its lock.
    pub fn force_release(&self, service: &ServiceName) -> Result<Option<LockInfo>, DeployError> {
        self.locks.force_release(service)
    }

    /// Run one deployment to a terminal state.
    ///
    /// Every started deployment yields a report, including failed and
    /// rolled-back ones. Errors are rejections before work began, or
    /// `RollbackFailed` and `Interrupted`, which leave the service locked.
    ///
    /// The deployment runs on its own task; dropping the returned future
    /// does not stop it, and the service stays locked until it finishes.
    pub async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentReport, DeployError> {
        let service = self.lookup(&request.service)?;
        self.check_request(&service.name, &request.request_id)?;
        Self::check_version(&service, &request)?;

        let id = DeploymentId::generate();
        let (abort_handle, abort) = abort_pair();
        let lock = self.locks.try_acquire(&service.name, &id, abort_handle)?;

        // The previous holder may have committed between the checks above
        // and taking the lock.
        let service = self.lookup(&request.service)?;
        self.check_request(&service.name, &request.request_id)?;
        Self::check_version(&service, &request)?;

        let plan = self.plan(&service, &id)?;
        self.remember_request(&service.name, &request.request_id);
        tracing::info!(
            service = %service.name,
            deployment_id = %id,
            request_id = %request.request_id,
            version = %request.artifact.version(),
            source = %plan.source,
            destination = %plan.source.other(),
            "deployment accepted"
        );

        let deployment = Deployment::new(id.clone(), request, plan);
        let ctx = Arc::clone(&self.ctx);
        let services = Arc::clone(&self.services);
        let run = tokio::spawn(async move {
            let result = drive(&ctx, deployment, &abort).await;
            ctx.rollbacks.forget(&id);
            match result {
                Ok(report) => {
                    if report.is_committed()
                        && let Some(mut record) = services.get_mut(&report.service)
                    {
                        record.active = report.destination;
                        record.live_version = Some(report.version.clone());
                    }
                    drop(lock);
                    Ok(report)
                }
                Err(e) => {
                    lock.pin();
                    Err(e)
                }
            }
        });

        match run.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(service = %service.name, "deployment task ended abnormally: {e}");
                Err(DeployError::Interrupted(e.to_string()))
            }
        }
    }

    fn lookup(&self, name: &ServiceName) -> Result<Service, DeployError> {
        self.service(name)
            .ok_or_else(|| DeployError::UnknownService(name.to_string()))
    }

    fn check_request(&self, service: &ServiceName, request_id: &RequestId) -> Result<(), DeployError> {
        let seen = self
            .requests
            .get(service)
            .is_some_and(|history| history.contains(request_id));
        if seen {
            return Err(DeployError::DuplicateRequest(request_id.to_string()));
        }
        Ok(())
    }

    fn remember_request(&self, service: &ServiceName, request_id: &RequestId) {
        let mut history = self.requests.entry(service.clone()).or_default();
        if history.len() == REQUEST_HISTORY {
            history.pop_front();
        }
        history.push_back(request_id.clone());
    }

    fn check_version(service: &Service, request: &DeploymentRequest) -> Result<(), DeployError> {
        let version = request.artifact.version();
        if service.live_version.as_deref() == Some(version.as_str()) {
            return Err(DeployError::AlreadyDeployed {
                service: service.name.clone(),
                version,
            });
        }
        Ok(())
    }

    /// Snapshot the bindings to restore on rollback. A test listener parked
    /// on the idle pool is moved to the active pool first.
    fn plan(&self, service: &Service, id: &DeploymentId) -> Result<DeploymentPlan, DeployError> {
        let router = &self.ctx.router;
        let destination = service.active.other();

        let prior_production = router.current_pool(&service.name, ListenerKind::Production);
        if prior_production == Some(destination) {
            let error = DeployError::PoolInUse(format!(
                "production listener of {} is bound to the idle {destination} pool",
                service.name
            ));
            tracing::error!(service = %service.name, deployment_id = %id, "{error}");
            return Err(error);
        }

        let mut prior_test = router.current_pool(&service.name, ListenerKind::Test);
        if prior_test == Some(destination) {
            prior_test = match router.bind(&service.name, ListenerKind::Test, service.active, id) {
                Ok(_) => Some(service.active),
                Err(_) => {
                    router.unbind(&service.name, ListenerKind::Test, id);
                    None
                }
            };
        }

        Ok(DeploymentPlan {
            replicas: service.replicas,
            source: service.active,
            prior_production,
            prior_test,
        })
    }
}

async fn drive(
    ctx: &DeployContext,
    deployment: Deployment<Requested>,
    abort: &AbortSignal,
) -> Result<DeploymentReport, DeployError> {
    let provisioned = match deployment.provision(ctx, abort).await {
        Ok(d) => d,
        Err((d, e)) => return Ok(d.fail(ctx, e).await.into_report()),
    };

    let validated = match provisioned.validate(ctx, abort).await {
        Ok(d) => d,
        Err((d, e)) => return Ok(d.abandon(ctx, e).await.into_report()),
    };

    let shifted = match validated.shift(ctx) {
        Ok(d) => d,
        Err((d, e)) => return d.roll_back(ctx, e).await.map(Deployment::into_report),
    };

    let baked = match shifted.monitor(ctx, abort).await {
        Ok(d) => d,
        Err((d, e)) => return d.roll_back(ctx, e).await.map(Deployment::into_report),
    };

    Ok(baked.commit(ctx).await.into_report())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::TcpProbe;
    use crate::provision::StaticProvisioner;

    fn orchestrator() -> Orchestrator {
        Orchestrator::builder(Arc::new(StaticProvisioner::new()), Arc::new(TcpProbe)).build()
    }

    fn service(name: &str) -> ServiceName {
        ServiceName::new(name).unwrap()
    }

    #[test]
    fn request_history_is_bounded_per_service() {
        let orchestrator = orchestrator();
        let feed = service("feed");
        let first = RequestId::new("r-first");

        orchestrator.remember_request(&feed, &first);
        assert!(orchestrator.check_request(&feed, &first).is_err());
        assert!(orchestrator.check_request(&service("search"), &first).is_ok());

        for n in 0..REQUEST_HISTORY {
            orchestrator.remember_request(&feed, &RequestId::new(format!("r-{n}")));
        }
        assert!(orchestrator.check_request(&feed, &first).is_ok());
        assert_eq!(orchestrator.requests.get(&feed).unwrap().len(), REQUEST_HISTORY);
    }

    #[test]
    fn registration_releases_its_lock() {
        let orchestrator = orchestrator();
        orchestrator
            .register_service(ServiceSpec::new(service("feed"), 1))
            .unwrap();
        assert!(orchestrator.active_deployment(&service("feed")).is_none());
    }
}
