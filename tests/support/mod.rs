// ABOUTME: Test support utilities.
// ABOUTME: Scripted probes, an in-memory provisioner, and an orchestrator harness.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use cutover::audit::MemoryAuditLog;
use cutover::config::HealthPolicy;
use cutover::deploy::{
    DeploySettings, DeploymentArtifact, DeploymentRequest, Orchestrator, ServiceSpec,
    TaskDescriptor,
};
use cutover::health::{Probe, ProbeError};
use cutover::hooks::{HookContext, HookError, HookPoint, LifecycleHooks, NoHooks};
use cutover::policy::{DefaultPolicy, RollbackPolicy};
use cutover::provision::{PoolRef, ProvisionError, Provisioner};
use cutover::types::{Color, Endpoint, ImageRef, ServiceName};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("cutover=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn service(name: &str) -> ServiceName {
    ServiceName::new(name).unwrap()
}

pub fn endpoints(color: Color) -> Vec<Endpoint> {
    let subnet = match color {
        Color::Blue => 1,
        Color::Green => 2,
    };
    vec![
        Endpoint::new(format!("10.0.{subnet}.10"), 8080),
        Endpoint::new(format!("10.0.{subnet}.11"), 8080),
    ]
}

pub fn request(service_name: &str, tag: &str) -> DeploymentRequest {
    let image = ImageRef::parse(&format!("ghcr.io/acme/{service_name}:{tag}")).unwrap();
    DeploymentRequest::new(
        service(service_name),
        DeploymentArtifact::new(image, TaskDescriptor::default()),
    )
}

/// Fast probe cadence: one success or failure decides an endpoint.
pub fn settings() -> DeploySettings {
    DeploySettings {
        health: HealthPolicy {
            interval: Duration::from_secs(1),
            probe_timeout: Duration::from_millis(500),
            success_threshold: 1,
            failure_threshold: 1,
            timeout: Duration::from_secs(10),
            bakeout: Duration::from_secs(30),
            quorum: 1.0,
        },
        provision_timeout: Duration::from_secs(30),
        hook_timeout: Duration::from_secs(60),
    }
}

#[derive(Debug, Clone, Copy)]
enum Script {
    Healthy,
    Unhealthy,
    HealthyFor(u32),
    Hang,
}

/// Probe whose answer per endpoint is set by the test. Unknown endpoints pass.
#[derive(Default)]
pub struct ScriptedProbe {
    scripts: Mutex<HashMap<Endpoint, Script>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn set(&self, endpoints: &[Endpoint], script: Script) {
        let mut scripts = self.scripts.lock();
        for endpoint in endpoints {
            scripts.insert(endpoint.clone(), script);
        }
    }

    pub fn healthy(&self, endpoints: &[Endpoint]) {
        self.set(endpoints, Script::Healthy);
    }

    pub fn unhealthy(&self, endpoints: &[Endpoint]) {
        self.set(endpoints, Script::Unhealthy);
    }

    /// Pass the next `checks` probes of each endpoint, then fail.
    pub fn healthy_for(&self, endpoints: &[Endpoint], checks: u32) {
        self.set(endpoints, Script::HealthyFor(checks));
    }

    /// Never answer; only the per-probe timeout ends the check.
    pub fn hang(&self, endpoints: &[Endpoint]) {
        self.set(endpoints, Script::Hang);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = {
            let mut scripts = self.scripts.lock();
            match scripts.get_mut(endpoint) {
                None | Some(Script::Healthy) => Some(true),
                Some(Script::Unhealthy) => Some(false),
                Some(Script::HealthyFor(0)) => Some(false),
                Some(Script::HealthyFor(n)) => {
                    *n -= 1;
                    Some(true)
                }
                Some(Script::Hang) => None,
            }
        };

        match outcome {
            Some(true) => Ok(()),
            Some(false) => Err(ProbeError::new(endpoint, "connection refused")),
            None => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

/// Hands out fixed endpoints per color and records what it was asked to do.
#[derive(Default)]
pub struct FakeProvisioner {
    failure: Mutex<Option<ProvisionError>>,
    delay: Mutex<Option<Duration>>,
    empty: Mutex<bool>,
    provisioned: Mutex<Vec<PoolRef>>,
    torn_down: Mutex<Vec<PoolRef>>,
}

impl FakeProvisioner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, error: ProvisionError) {
        *self.failure.lock() = Some(error);
    }

    pub fn succeed(&self) {
        *self.failure.lock() = None;
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn return_no_endpoints(&self) {
        *self.empty.lock() = true;
    }

    pub fn provisioned(&self) -> Vec<PoolRef> {
        self.provisioned.lock().clone()
    }

    pub fn torn_down(&self) -> Vec<PoolRef> {
        self.torn_down.lock().clone()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn provision(
        &self,
        pool: &PoolRef,
        _task: &TaskDescriptor,
        replicas: u32,
    ) -> Result<Vec<Endpoint>, ProvisionError> {
        self.provisioned.lock().push(pool.clone());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        if *self.empty.lock() {
            return Ok(Vec::new());
        }

        Ok(endpoints(pool.color)
            .into_iter()
            .take(replicas as usize)
            .collect())
    }

    async fn teardown(&self, pool: &PoolRef) -> Result<(), ProvisionError> {
        self.torn_down.lock().push(pool.clone());
        Ok(())
    }
}

/// Hooks that never return at one lifecycle point and pass everywhere else.
pub struct StallingHooks(pub HookPoint);

#[async_trait]
impl LifecycleHooks for StallingHooks {
    async fn run(&self, point: HookPoint, _context: &HookContext) -> Result<(), HookError> {
        if point == self.0 {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub probe: Arc<ScriptedProbe>,
    pub provisioner: Arc<FakeProvisioner>,
    pub audit: Arc<MemoryAuditLog>,
}

pub fn harness() -> Harness {
    harness_with_policy(Arc::new(DefaultPolicy))
}

pub fn harness_with_policy(policy: Arc<dyn RollbackPolicy>) -> Harness {
    harness_with(policy, Arc::new(NoHooks))
}

pub fn harness_with_hooks(hooks: Arc<dyn LifecycleHooks>) -> Harness {
    harness_with(Arc::new(DefaultPolicy), hooks)
}

fn harness_with(policy: Arc<dyn RollbackPolicy>, hooks: Arc<dyn LifecycleHooks>) -> Harness {
    init_tracing();
    let probe = ScriptedProbe::new();
    let provisioner = FakeProvisioner::new();
    let audit = Arc::new(MemoryAuditLog::new());

    let orchestrator = Orchestrator::builder(provisioner.clone(), probe.clone())
        .policy(policy)
        .hooks(hooks)
        .audit(audit.clone())
        .settings(settings())
        .build();

    Harness {
        orchestrator: Arc::new(orchestrator),
        probe,
        provisioner,
        audit,
    }
}

impl Harness {
    /// Register a two-replica service serving from blue.
    pub fn on_blue(&self, name: &str) -> ServiceName {
        let name = service(name);
        self.orchestrator
            .register_service(
                ServiceSpec::new(name.clone(), 2)
                    .active(Color::Blue, endpoints(Color::Blue))
                    .live_version("ghcr.io/acme/v1"),
            )
            .unwrap();
        name
    }
}
