// ABOUTME: State transition methods for deployment orchestration.
// ABOUTME: Each method consumes self and returns the next state on success.

use chrono::Utc;
use tokio::time::Instant;

use crate::audit::Incident;
use crate::health::VerdictStatus;
use crate::hooks::{HookContext, HookPoint};
use crate::provision::PoolRef;
use crate::routing::PoolHealth;
use crate::types::{Color, Endpoint, ListenerKind};

use super::Deployment;
use super::abort::AbortSignal;
use super::context::DeployContext;
use super::error::{DeployError, Severity};
use super::events::DeploymentEvent;
use super::state::{
    BakedOut, Committed, DeploymentState, Failed, Provisioned, Requested, RolledBack, Shifted,
    Validated,
};

/// Result type for transitions that may need cleanup on failure.
pub type TransitionResult<T, S> = Result<Deployment<T>, (Deployment<S>, DeployError)>;

// =============================================================================
// Internal Helpers
// =============================================================================

impl<S> Deployment<S> {
    fn transition<T>(self, state: T) -> Deployment<T> {
        Deployment {
            id: self.id,
            request_id: self.request_id,
            service: self.service,
            artifact: self.artifact,
            plan: self.plan,
            current: self.current,
            started_at: self.started_at,
            history: self.history,
            failure: self.failure,
            cleanup_errors: self.cleanup_errors,
            state,
        }
    }

    /// Record a runtime state change and publish it on the status stream.
    fn emit(&mut self, ctx: &DeployContext, to: DeploymentState) {
        let event = DeploymentEvent {
            deployment_id: self.id.clone(),
            service: self.service.clone(),
            from: self.current,
            to,
            timestamp: Utc::now(),
        };
        tracing::info!(
            service = %self.service,
            deployment_id = %self.id,
            from = %self.current,
            %to,
            "deployment transition"
        );
        self.current = to;
        self.history.push(event.clone());
        ctx.events.publish(event);
    }

    fn pool_ref(&self, color: Color) -> PoolRef {
        PoolRef {
            service: self.service.clone(),
            color,
        }
    }

    fn log_failure(&self, error: &DeployError) {
        match error.severity() {
            Severity::Info => {
                tracing::info!(service = %self.service, deployment_id = %self.id, "{error}")
            }
            Severity::Warning => {
                tracing::warn!(service = %self.service, deployment_id = %self.id, "{error}")
            }
            Severity::Error | Severity::Critical => {
                tracing::error!(service = %self.service, deployment_id = %self.id, "{error}")
            }
        }
    }

    /// Run one lifecycle hook, bounded by the hook timeout.
    async fn run_hook(
        &self,
        ctx: &DeployContext,
        point: HookPoint,
        endpoints: &[Endpoint],
    ) -> Result<(), DeployError> {
        let context = HookContext {
            service: self.service.clone(),
            deployment_id: self.id.clone(),
            image: self.artifact.image.to_string(),
            source: self.source(),
            destination: self.destination(),
            endpoints: endpoints.to_vec(),
        };
        let limit = ctx.settings.hook_timeout;
        match tokio::time::timeout(limit, ctx.hooks.run(point, &context)).await {
            Ok(result) => result.map_err(|e| DeployError::HookFailed {
                point: e.point.to_string(),
                reason: e.reason,
            }),
            Err(_elapsed) => Err(DeployError::HookFailed {
                point: point.to_string(),
                reason: format!("no result after {limit:?}"),
            }),
        }
    }

    /// Drain and tear down the new pool. Instances stay up if a listener
    /// still references the pool.
    async fn discard_destination(&mut self, ctx: &DeployContext) {
        let destination = self.destination();
        self.discard_pool(ctx, destination).await;
    }

    async fn discard_pool(&mut self, ctx: &DeployContext, color: Color) {
        if let Err(e) = ctx.pools.drain(&self.service, color, &ctx.router) {
            let error = DeployError::from(e);
            self.log_failure(&error);
            self.cleanup_errors.push(error);
            return;
        }

        if let Err(e) = ctx.provisioner.teardown(&self.pool_ref(color)).await {
            tracing::warn!(
                service = %self.service,
                deployment_id = %self.id,
                %color,
                "teardown failed: {e}"
            );
            self.cleanup_errors.push(e.into());
        }
    }

    /// Put listeners back where they were before this deployment and discard
    /// the new pool.
    async fn revert(
        mut self,
        ctx: &DeployContext,
        cause: DeployError,
    ) -> Result<Deployment<RolledBack>, DeployError> {
        self.log_failure(&cause);
        self.emit(ctx, DeploymentState::RollingBack);

        let target = self.rollback_target();
        match ctx.rollbacks.rollback(&ctx.router, &self.id, &target) {
            Ok(outcome) => {
                tracing::debug!(service = %self.service, deployment_id = %self.id, ?outcome, "listeners restored");
            }
            Err(e) => {
                self.log_failure(&e);
                ctx.audit.escalate(&Incident {
                    service: self.service.clone(),
                    deployment_id: self.id.clone(),
                    reason: format!("{e} while recovering from: {cause}"),
                    timestamp: Utc::now(),
                });
                return Err(e);
            }
        }

        self.discard_destination(ctx).await;
        self.failure = Some(cause);
        self.emit(ctx, DeploymentState::RolledBack);
        Ok(self.transition(RolledBack))
    }
}

// =============================================================================
// Requested -> Provisioned
// =============================================================================

impl Deployment<Requested> {
    /// Run the before-install hook and fill the idle pool with new instances.
    ///
    /// Bounded by the provision timeout; races the abort signal. Traffic is
    /// not touched.
    pub async fn provision(
        mut self,
        ctx: &DeployContext,
        abort: &AbortSignal,
    ) -> TransitionResult<Provisioned, Requested> {
        self.emit(ctx, DeploymentState::Provisioning);

        let destination = self.destination();
        let pool = self.pool_ref(destination);
        let timeout = ctx.settings.provision_timeout;

        let work = async {
            self.run_hook(ctx, HookPoint::BeforeInstall, &[]).await?;
            match tokio::time::timeout(
                timeout,
                ctx.provisioner
                    .provision(&pool, &self.artifact.task, self.plan.replicas),
            )
            .await
            {
                Ok(result) => result.map_err(DeployError::from),
                Err(_elapsed) => Err(DeployError::ProvisioningFailed(format!(
                    "{pool} not ready after {timeout:?}"
                ))),
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = abort.aborted() => Err(DeployError::Aborted(DeploymentState::Provisioning.to_string())),
            result = work => result,
        };

        let endpoints = match outcome {
            Ok(endpoints) if endpoints.is_empty() => {
                let error =
                    DeployError::ProvisioningFailed(format!("{pool} came up with no endpoints"));
                return Err((self, error));
            }
            Ok(endpoints) => endpoints,
            Err(e) => return Err((self, e)),
        };

        if let Err(e) = ctx
            .pools
            .set_endpoints(&self.service, destination, endpoints)
        {
            return Err((self, e.into()));
        }

        let endpoints = match ctx.pools.get_pool(&self.service, destination) {
            Ok(pool) => pool.endpoints().to_vec(),
            Err(e) => return Err((self, e.into())),
        };

        self.emit(ctx, DeploymentState::Validating);
        Ok(self.transition(Provisioned { endpoints }))
    }

    /// Clean up partial provisioning and finish as failed.
    pub async fn fail(mut self, ctx: &DeployContext, cause: DeployError) -> Deployment<Failed> {
        self.log_failure(&cause);
        self.discard_destination(ctx).await;
        self.failure = Some(cause);
        self.emit(ctx, DeploymentState::Failed);
        self.transition(Failed)
    }
}

// =============================================================================
// Provisioned -> Validated
// =============================================================================

impl Deployment<Provisioned> {
    /// Point the test listener at the new pool and wait for a health verdict.
    pub async fn validate(
        mut self,
        ctx: &DeployContext,
        abort: &AbortSignal,
    ) -> TransitionResult<Validated, Provisioned> {
        let destination = self.destination();

        if let Err(e) = ctx
            .router
            .bind(&self.service, ListenerKind::Test, destination, &self.id)
        {
            return Err((self, e.into()));
        }

        let outcome = tokio::select! {
            biased;
            _ = abort.aborted() => Err(DeployError::Aborted(DeploymentState::Validating.to_string())),
            result = self.check_new_pool(ctx) => result,
        };

        let health = if outcome.is_ok() {
            PoolHealth::Healthy
        } else {
            PoolHealth::Unhealthy
        };
        if let Err(e) = ctx.pools.set_health(&self.service, destination, health) {
            return Err((self, e.into()));
        }

        match outcome {
            Ok(()) => {
                self.emit(ctx, DeploymentState::Shifting);
                Ok(self.transition(Validated))
            }
            Err(e) => Err((self, e)),
        }
    }

    async fn check_new_pool(&self, ctx: &DeployContext) -> Result<(), DeployError> {
        self.run_hook(ctx, HookPoint::AfterAllowTestTraffic, &self.state.endpoints)
            .await?;

        let pool = ctx.pools.get_pool(&self.service, self.destination())?;
        let verdict = ctx.monitor.evaluate(&pool, &ctx.settings.health).await;
        if verdict.is_healthy() {
            Ok(())
        } else {
            Err(DeployError::ValidationFailed(format!(
                "{} pool {verdict}",
                self.destination()
            )))
        }
    }

    /// Give up before production moved: restore the test listener, discard
    /// the new pool, finish as rolled back.
    pub async fn abandon(
        mut self,
        ctx: &DeployContext,
        cause: DeployError,
    ) -> Deployment<RolledBack> {
        self.log_failure(&cause);

        if let Err(e) = ctx.router.restore(
            &self.service,
            ListenerKind::Test,
            self.plan.prior_test,
            &self.id,
        ) {
            tracing::warn!(service = %self.service, deployment_id = %self.id, "could not restore test listener: {e}");
            ctx.router
                .unbind(&self.service, ListenerKind::Test, &self.id);
        }

        self.discard_destination(ctx).await;
        self.failure = Some(cause);
        self.emit(ctx, DeploymentState::RolledBack);
        self.transition(RolledBack)
    }
}

// =============================================================================
// Validated -> Shifted
// =============================================================================

impl Deployment<Validated> {
    /// Re-point production at the new pool.
    pub fn shift(mut self, ctx: &DeployContext) -> TransitionResult<Shifted, Validated> {
        let destination = self.destination();
        match ctx
            .router
            .bind(&self.service, ListenerKind::Production, destination, &self.id)
        {
            Ok(_) => {
                self.emit(ctx, DeploymentState::Monitoring);
                Ok(self.transition(Shifted {
                    cutover_at: Instant::now(),
                }))
            }
            Err(e) => Err((self, e.into())),
        }
    }

    /// Production never moved; restore bindings and discard the new pool.
    pub async fn roll_back(
        self,
        ctx: &DeployContext,
        cause: DeployError,
    ) -> Result<Deployment<RolledBack>, DeployError> {
        self.revert(ctx, cause).await
    }
}

// =============================================================================
// Shifted -> BakedOut
// =============================================================================

impl Deployment<Shifted> {
    /// Watch the now-live pool through the bake-out window, asking the
    /// rollback policy about every snapshot.
    pub async fn monitor(
        self,
        ctx: &DeployContext,
        abort: &AbortSignal,
    ) -> TransitionResult<BakedOut, Shifted> {
        let pool = match ctx.pools.get_pool(&self.service, self.destination()) {
            Ok(pool) => pool,
            Err(e) => return Err((self, e.into())),
        };

        let hook = tokio::select! {
            biased;
            _ = abort.aborted() => Err(DeployError::Aborted(DeploymentState::Monitoring.to_string())),
            result = self.run_hook(ctx, HookPoint::AfterAllowTraffic, pool.endpoints()) => result,
        };
        if let Err(e) = hook {
            return Err((self, e));
        }

        let health = &ctx.settings.health;
        let cutover_at = self.state.cutover_at;
        let deadline = cutover_at + health.bakeout;
        let mut info = self.info(health.bakeout);
        let mut watch = ctx.monitor.watch(&pool, health);
        let mut abort_seen = false;

        let outcome = loop {
            tokio::select! {
                biased;
                _ = abort.aborted(), if !abort_seen => {
                    abort_seen = true;
                    info.abort_requested = true;
                    if ctx.policy.should_rollback(&info, &watch.snapshot(), cutover_at.elapsed()) {
                        break Err(DeployError::Aborted(DeploymentState::Monitoring.to_string()));
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    let snapshot = watch.snapshot();
                    let verdict = if snapshot.status == VerdictStatus::Pending {
                        snapshot.timed_out()
                    } else {
                        snapshot
                    };
                    if ctx.policy.should_rollback(&info, &verdict, health.bakeout) {
                        break Err(DeployError::MonitoringFailed(format!(
                            "{} pool {verdict} at end of bake-out",
                            self.destination()
                        )));
                    }
                    break Ok(verdict);
                }
                next = watch.next() => match next {
                    Some(verdict) => {
                        let elapsed = cutover_at.elapsed();
                        if ctx.policy.should_rollback(&info, &verdict, elapsed) {
                            break Err(DeployError::MonitoringFailed(format!(
                                "{} pool {verdict} after {elapsed:?}",
                                self.destination()
                            )));
                        }
                    }
                    None => {
                        break Err(DeployError::MonitoringFailed(format!(
                            "{} pool has no endpoints",
                            self.destination()
                        )));
                    }
                },
            }
        };
        drop(watch);

        match outcome {
            Ok(verdict) => {
                tracing::info!(
                    service = %self.service,
                    deployment_id = %self.id,
                    %verdict,
                    "bake-out complete"
                );
                Ok(self.transition(BakedOut))
            }
            Err(e) => Err((self, e)),
        }
    }

    /// Re-point production at the original pool and discard the new one.
    ///
    /// Fails only if production cannot be restored; the failure is escalated
    /// as an incident.
    pub async fn roll_back(
        self,
        ctx: &DeployContext,
        cause: DeployError,
    ) -> Result<Deployment<RolledBack>, DeployError> {
        self.revert(ctx, cause).await
    }
}

// =============================================================================
// BakedOut -> Committed
// =============================================================================

impl Deployment<BakedOut> {
    /// Keep the new pool and drain the old one.
    pub async fn commit(mut self, ctx: &DeployContext) -> Deployment<Committed> {
        if let Err(e) = ctx
            .pools
            .set_health(&self.service, self.destination(), PoolHealth::Healthy)
        {
            tracing::warn!(service = %self.service, "could not mark pool healthy: {e}");
        }

        let source = self.source();
        self.discard_pool(ctx, source).await;
        self.emit(ctx, DeploymentState::Committed);
        self.transition(Committed)
    }
}
