// ABOUTME: Integration tests for rollback paths.
// ABOUTME: Coordinator idempotence, operator aborts per phase, and failed rollbacks.

mod support;

use std::sync::Arc;

use tokio::sync::broadcast;

use cutover::deploy::{
    DeployErrorKind, DeploymentEvent, DeploymentReport, DeploymentState, ServiceSpec,
};
use cutover::hooks::HookPoint;
use cutover::policy::{MajorityPolicy, RollbackOutcome, RollbackTarget};
use cutover::types::{Color, DeploymentId, ListenerKind, ServiceName};
use support::{
    Harness, StallingHooks, endpoints, harness, harness_with_hooks, harness_with_policy, request,
};

async fn wait_for(events: &mut broadcast::Receiver<DeploymentEvent>, state: DeploymentState) {
    loop {
        let event = events.recv().await.unwrap();
        if event.to == state {
            return;
        }
    }
}

fn spawn_deploy(
    h: &Harness,
    tag: &str,
) -> tokio::task::JoinHandle<Result<DeploymentReport, cutover::deploy::DeployError>> {
    let orchestrator = Arc::clone(&h.orchestrator);
    let request = request("svc1", tag);
    tokio::spawn(async move { orchestrator.deploy(request).await })
}

fn production(h: &Harness, service: &ServiceName) -> Option<Color> {
    h.orchestrator
        .router()
        .current_pool(service, ListenerKind::Production)
}

mod coordinator {
    use super::*;

    /// Test: A second rollback of the same deployment does not re-point again.
    #[tokio::test]
    async fn rollback_is_idempotent() {
        let h = harness();
        let svc = h.on_blue("svc1");
        let router = h.orchestrator.router();
        let id = DeploymentId::generate();

        h.orchestrator
            .pools()
            .set_endpoints(&svc, Color::Green, endpoints(Color::Green))
            .unwrap();
        router
            .bind(&svc, ListenerKind::Production, Color::Green, &id)
            .unwrap();

        let target = RollbackTarget {
            service: svc.clone(),
            production: Some(Color::Blue),
            test: Some(Color::Blue),
        };

        let first = h.orchestrator.rollbacks().rollback(router, &id, &target);
        assert_eq!(first.unwrap(), RollbackOutcome::Performed);
        assert_eq!(production(&h, &svc), Some(Color::Blue));
        let entries_after_first = h.audit.entries().len();

        let second = h.orchestrator.rollbacks().rollback(router, &id, &target);
        assert_eq!(second.unwrap(), RollbackOutcome::AlreadyRolledBack);
        assert_eq!(h.audit.entries().len(), entries_after_first);
        assert!(h.orchestrator.rollbacks().has_rolled_back(&id));
    }

    /// Test: Restoring onto an empty pool fails and is not recorded.
    #[tokio::test]
    async fn failed_restore_is_not_recorded() {
        let h = harness();
        let svc = h.on_blue("svc1");
        let router = h.orchestrator.router();
        let id = DeploymentId::generate();

        let target = RollbackTarget {
            service: svc.clone(),
            production: Some(Color::Green),
            test: None,
        };

        let err = h
            .orchestrator
            .rollbacks()
            .rollback(router, &id, &target)
            .unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::RollbackFailed);
        assert!(!h.orchestrator.rollbacks().has_rolled_back(&id));
        assert_eq!(production(&h, &svc), Some(Color::Blue));
    }
}

mod abort {
    use super::*;

    /// Test: Abort while provisioning ends FAILED with traffic untouched.
    #[tokio::test(start_paused = true)]
    async fn during_provisioning() {
        let h = harness();
        let svc = h.on_blue("svc1");
        h.provisioner.delay(std::time::Duration::from_secs(20));
        let mut events = h.orchestrator.subscribe();

        let deploy = spawn_deploy(&h, "v2");
        wait_for(&mut events, DeploymentState::Provisioning).await;
        assert!(h.orchestrator.abort(&svc));

        let report = deploy.await.unwrap().unwrap();
        assert_eq!(report.state, DeploymentState::Failed);
        assert_eq!(
            report.failure.as_ref().map(|e| e.kind()),
            Some(DeployErrorKind::Aborted)
        );
        assert_eq!(production(&h, &svc), Some(Color::Blue));
        assert_eq!(h.audit.production_history(&svc), vec![Some(Color::Blue)]);
    }

    /// Test: Abort while validating rolls back without touching production.
    #[tokio::test(start_paused = true)]
    async fn during_validation() {
        let h = harness();
        let svc = h.on_blue("svc1");
        h.probe.hang(&endpoints(Color::Green));
        let mut events = h.orchestrator.subscribe();

        let deploy = spawn_deploy(&h, "v2");
        wait_for(&mut events, DeploymentState::Validating).await;
        assert!(h.orchestrator.abort(&svc));

        let report = deploy.await.unwrap().unwrap();
        assert_eq!(report.state, DeploymentState::RolledBack);
        assert!(!report.states().contains(&DeploymentState::RollingBack));
        assert_eq!(production(&h, &svc), Some(Color::Blue));
        assert_eq!(
            h.orchestrator
                .router()
                .current_pool(&svc, ListenerKind::Test),
            Some(Color::Blue)
        );
    }

    /// Test: Abort while monitoring re-points production at the old pool.
    #[tokio::test(start_paused = true)]
    async fn during_monitoring() {
        let h = harness();
        let svc = h.on_blue("svc1");
        let mut events = h.orchestrator.subscribe();

        let deploy = spawn_deploy(&h, "v2");
        wait_for(&mut events, DeploymentState::Monitoring).await;
        assert_eq!(production(&h, &svc), Some(Color::Green));
        assert!(h.orchestrator.abort(&svc));

        let report = deploy.await.unwrap().unwrap();
        assert_eq!(report.state, DeploymentState::RolledBack);
        assert!(report.states().contains(&DeploymentState::RollingBack));
        assert_eq!(production(&h, &svc), Some(Color::Blue));
        assert_eq!(
            h.audit.production_history(&svc),
            vec![Some(Color::Blue), Some(Color::Green), Some(Color::Blue)]
        );
    }

    /// Test: The ledger entry is dropped once the deployment finishes.
    #[tokio::test(start_paused = true)]
    async fn finished_deployment_leaves_no_ledger_entry() {
        let h = harness();
        h.on_blue("svc1");
        let mut events = h.orchestrator.subscribe();

        let deploy = spawn_deploy(&h, "v2");
        wait_for(&mut events, DeploymentState::Monitoring).await;
        h.probe.unhealthy(&endpoints(Color::Green));

        let report = deploy.await.unwrap().unwrap();
        assert_eq!(report.state, DeploymentState::RolledBack);
        assert!(!h.orchestrator.rollbacks().has_rolled_back(&report.deployment_id));
        assert!(h.orchestrator.rollbacks().is_empty());
    }

    /// Test: Abort with nothing running is refused.
    #[tokio::test]
    async fn with_nothing_running() {
        let h = harness();
        let svc = h.on_blue("svc1");
        assert!(!h.orchestrator.abort(&svc));
    }
}

mod policy {
    use super::*;

    /// Test: One failing endpoint of two rolls back under the default policy.
    #[tokio::test(start_paused = true)]
    async fn default_policy_rolls_back_partial_failure() {
        let h = harness();
        let svc = h.on_blue("svc1");
        h.probe.healthy_for(&endpoints(Color::Green)[..1], 1);

        let report = h.orchestrator.deploy(request("svc1", "v2")).await.unwrap();
        assert_eq!(report.state, DeploymentState::RolledBack);
        assert_eq!(production(&h, &svc), Some(Color::Blue));
    }

    /// Test: The majority policy tolerates a minority of failing endpoints.
    #[tokio::test(start_paused = true)]
    async fn majority_policy_tolerates_minority_failure() {
        let h = harness_with_policy(Arc::new(MajorityPolicy));
        let svc = h.on_blue("svc1");
        h.probe.healthy_for(&endpoints(Color::Green)[..1], 1);

        let report = h.orchestrator.deploy(request("svc1", "v2")).await.unwrap();
        assert_eq!(report.state, DeploymentState::Committed);
        assert_eq!(production(&h, &svc), Some(Color::Green));
    }
}

mod failed_rollback {
    use super::*;

    /// Test: A rollback that cannot restore production leaves the service stuck
    /// until an operator releases it.
    #[tokio::test(start_paused = true)]
    async fn leaves_service_stuck_until_released() {
        let h = harness();
        let svc = h.on_blue("svc1");
        let mut events = h.orchestrator.subscribe();

        let deploy = spawn_deploy(&h, "v2");
        wait_for(&mut events, DeploymentState::Monitoring).await;

        // Lose the old fleet while the new one goes bad.
        h.orchestrator
            .pools()
            .drain(&svc, Color::Blue, h.orchestrator.router())
            .unwrap();
        h.probe.unhealthy(&endpoints(Color::Green));

        let err = deploy.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::RollbackFailed);
        assert_eq!(h.audit.incidents().len(), 1);
        assert!(h.orchestrator.is_stuck(&svc));
        assert!(!h.orchestrator.abort(&svc));

        let rejected = h
            .orchestrator
            .deploy(request("svc1", "v3"))
            .await
            .unwrap_err();
        assert_eq!(rejected.kind(), DeployErrorKind::ConcurrentDeployment);
        assert!(rejected.lock_holder().unwrap().stuck);

        assert!(h.orchestrator.force_release(&svc).unwrap().is_some());
        assert!(!h.orchestrator.is_stuck(&svc));

        // Operator repairs the fleet, then deployments resume.
        h.probe.healthy(&endpoints(Color::Green));
        h.orchestrator
            .register_service(
                ServiceSpec::new(svc.clone(), 2)
                    .active(Color::Blue, endpoints(Color::Blue))
                    .live_version("ghcr.io/acme/v1"),
            )
            .unwrap();
        let report = h.orchestrator.deploy(request("svc1", "v3")).await.unwrap();
        assert_eq!(report.state, DeploymentState::Committed);
    }
}

mod stalled_hook {
    use super::*;

    /// Test: A hook that never returns after cutover times out and rolls back.
    #[tokio::test(start_paused = true)]
    async fn after_cutover_times_out_and_rolls_back() {
        let h = harness_with_hooks(Arc::new(StallingHooks(HookPoint::AfterAllowTraffic)));
        let svc = h.on_blue("svc1");

        let report = h.orchestrator.deploy(request("svc1", "v2")).await.unwrap();
        assert_eq!(report.state, DeploymentState::RolledBack);
        assert_eq!(
            report.failure.as_ref().map(|e| e.kind()),
            Some(DeployErrorKind::HookFailed)
        );
        assert_eq!(production(&h, &svc), Some(Color::Blue));
        assert_eq!(
            h.audit.production_history(&svc),
            vec![Some(Color::Blue), Some(Color::Green), Some(Color::Blue)]
        );
    }

    /// Test: Operator abort interrupts a hook that is still running after cutover.
    #[tokio::test(start_paused = true)]
    async fn abort_interrupts_hook_after_cutover() {
        let h = harness_with_hooks(Arc::new(StallingHooks(HookPoint::AfterAllowTraffic)));
        let svc = h.on_blue("svc1");
        let mut events = h.orchestrator.subscribe();

        let started = tokio::time::Instant::now();
        let deploy = spawn_deploy(&h, "v2");
        wait_for(&mut events, DeploymentState::Monitoring).await;
        assert!(h.orchestrator.abort(&svc));

        let report = deploy.await.unwrap().unwrap();
        assert_eq!(report.state, DeploymentState::RolledBack);
        assert!(report.states().contains(&DeploymentState::RollingBack));
        assert_eq!(
            report.failure.as_ref().map(|e| e.kind()),
            Some(DeployErrorKind::Aborted)
        );
        assert!(started.elapsed() < support::settings().hook_timeout);
        assert_eq!(production(&h, &svc), Some(Color::Blue));
        assert!(h.orchestrator.active_deployment(&svc).is_none());
    }

    /// Test: A hook that never returns before install ends the deployment as failed.
    #[tokio::test(start_paused = true)]
    async fn before_install_times_out_as_failure() {
        let h = harness_with_hooks(Arc::new(StallingHooks(HookPoint::BeforeInstall)));
        let svc = h.on_blue("svc1");

        let report = h.orchestrator.deploy(request("svc1", "v2")).await.unwrap();
        assert_eq!(report.state, DeploymentState::Failed);
        assert_eq!(
            report.failure.as_ref().map(|e| e.kind()),
            Some(DeployErrorKind::HookFailed)
        );
        assert_eq!(production(&h, &svc), Some(Color::Blue));
        assert!(h.provisioner.provisioned().is_empty());
    }

    /// Test: A hook that never returns while validating rolls back before cutover.
    #[tokio::test(start_paused = true)]
    async fn during_validation_times_out_without_cutover() {
        let h = harness_with_hooks(Arc::new(StallingHooks(HookPoint::AfterAllowTestTraffic)));
        let svc = h.on_blue("svc1");

        let report = h.orchestrator.deploy(request("svc1", "v2")).await.unwrap();
        assert_eq!(report.state, DeploymentState::RolledBack);
        assert!(!report.states().contains(&DeploymentState::Shifting));
        assert_eq!(h.audit.production_history(&svc), vec![Some(Color::Blue)]);
    }
}
