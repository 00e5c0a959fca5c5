// ABOUTME: Deploy command implementation.
// ABOUTME: Restores the service layout from the state store, runs one deployment, persists the outcome.

use std::path::Path;
use std::sync::Arc;

use cutover::audit::TracingAuditLog;
use cutover::config::Config;
use cutover::deploy::{
    DeployError, DeployErrorKind, DeploySettings, DeploymentArtifact, DeploymentEvent,
    DeploymentReport, DeploymentRequest, Orchestrator, ServiceSpec,
};
use cutover::diagnostics::{Diagnostics, Warning};
use cutover::error::{Error, Result};
use cutover::health::TcpProbe;
use cutover::hooks::HookRunner;
use cutover::output::Output;
use cutover::policy;
use cutover::provision::StaticProvisioner;
use cutover::store::{ServiceRecord, StateStore};
use cutover::types::{Color, DeploymentId, ImageRef, RequestId, ServiceName};
use tokio::sync::broadcast;

pub struct DeployArgs {
    pub service: ServiceName,
    pub image: ImageRef,
    pub request_id: Option<RequestId>,
    pub force: bool,
}

/// Run one deployment of the configured service.
pub async fn deploy(config: &Config, project_dir: &Path, args: DeployArgs, mut output: Output) -> Result<()> {
    let service_config = config.service(&args.service)?;
    let store = StateStore::new(config.state_dir());
    let mut diag = Diagnostics::default();

    output.start_timer();

    let lock = store.lock(&args.service, &DeploymentId::generate(), args.force)?;
    let record = store.load(&args.service)?;

    if let (Some(requested), Some(record)) = (&args.request_id, &record)
        && record.last_request.as_ref() == Some(requested)
    {
        return Err(Error::Deploy(
            DeployError::DuplicateRequest(requested.to_string()).to_string(),
        ));
    }

    let orchestrator = Arc::new(
        Orchestrator::builder(
            Arc::new(StaticProvisioner::from_config(config)),
            Arc::new(TcpProbe),
        )
        .policy(policy::from_kind(config.policy))
        .hooks(Arc::new(HookRunner::new(&config.hooks_dir(project_dir))))
        .audit(Arc::new(TracingAuditLog))
        .settings(DeploySettings::from(config))
        .build(),
    );

    let mut spec = ServiceSpec::new(args.service.clone(), service_config.replicas);
    if let Some(record) = &record {
        spec = spec.active(record.active, record.endpoints.clone());
        if let Some(version) = &record.live_version {
            spec = spec.live_version(version.clone());
        }
    }
    orchestrator
        .register_service(spec)
        .map_err(|e| Error::Deploy(e.to_string()))?;

    output.progress(&format!(
        "Deploying {} ({}) to {}",
        args.service,
        args.image,
        record
            .as_ref()
            .map_or(Color::Blue, |r| r.active)
            .other()
    ));

    let printer = tokio::spawn(print_transitions(orchestrator.subscribe(), output.clone()));
    let interrupt = {
        let orchestrator = Arc::clone(&orchestrator);
        let service = args.service.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                orchestrator.abort(&service);
            }
        })
    };

    let artifact = DeploymentArtifact::new(args.image, service_config.task.clone());
    let mut request = DeploymentRequest::new(args.service.clone(), artifact);
    if let Some(request_id) = args.request_id {
        request = request.with_request_id(request_id);
    }

    let result = orchestrator.deploy(request).await;
    interrupt.abort();
    let _ = interrupt.await;

    let outcome = match result {
        Ok(report) => {
            if report.is_committed() {
                let endpoints = orchestrator
                    .pools()
                    .get_pool(&report.service, report.destination)
                    .map(|pool| pool.endpoints().to_vec())
                    .map_err(|e| Error::State(e.to_string()))?;
                let mut next = ServiceRecord::new(report.service.clone(), report.destination, endpoints);
                next.live_version = Some(report.version.clone());
                next.last_deployment = Some(report.deployment_id.clone());
                next.last_request = Some(report.request_id.clone());
                store.save(&next)?;
            }
            Ok(report)
        }
        Err(e) => Err(e),
    };

    drop(orchestrator);
    let _ = printer.await;

    let result = match outcome {
        Ok(report) => finish(report, &output, &mut diag),
        Err(e) if e.kind() == DeployErrorKind::AlreadyDeployed => {
            diag.warn(Warning::already_live(e.to_string()));
            output.success(&format!("{}: nothing to deploy", args.service));
            Ok(())
        }
        Err(e)
            if matches!(
                e.kind(),
                DeployErrorKind::RollbackFailed | DeployErrorKind::Interrupted
            ) =>
        {
            lock.keep();
            Err(Error::Deploy(format!(
                "{e}; {} stays locked until `cutover deploy --force`",
                args.service
            )))
        }
        Err(e) => Err(Error::Deploy(e.to_string())),
    };

    for warning in diag.warnings() {
        output.warning(&warning.message);
    }
    result
}

fn finish(report: DeploymentReport, output: &Output, diag: &mut Diagnostics) -> Result<()> {
    output.report(&report);
    for error in &report.cleanup_errors {
        diag.warn(Warning::cleanup(error));
    }

    if report.is_committed() {
        output.success(&format!(
            "{} now serving {} from {}",
            report.service, report.version, report.destination
        ));
        return Ok(());
    }

    let cause = report
        .failure
        .as_ref()
        .map_or_else(|| "no cause recorded".to_string(), ToString::to_string);
    Err(Error::Deploy(format!(
        "{} {}: {cause}",
        report.service, report.state
    )))
}

async fn print_transitions(mut events: broadcast::Receiver<DeploymentEvent>, output: Output) {
    loop {
        match events.recv().await {
            Ok(event) => output.transition(&event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::debug!(missed, "transition printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
