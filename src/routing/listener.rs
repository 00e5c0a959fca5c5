// ABOUTME: Listener router binding the production and test listeners to a target pool.
// ABOUTME: Re-points are atomic per listener, and production re-points are audited.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::audit::{AuditEntry, AuditLog};
use crate::types::{Color, DeploymentId, ListenerKind, ServiceName};

use super::{RoutingError, TargetPoolRegistry};

pub struct ListenerRouter {
    bindings: DashMap<(ServiceName, ListenerKind), Color>,
    pools: Arc<TargetPoolRegistry>,
    audit: Arc<dyn AuditLog>,
}

impl std::fmt::Debug for ListenerRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRouter")
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

impl ListenerRouter {
    pub fn new(pools: Arc<TargetPoolRegistry>, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            bindings: DashMap::new(),
            pools,
            audit,
        }
    }

    pub fn pools(&self) -> &Arc<TargetPoolRegistry> {
        &self.pools
    }

    /// Point a listener at a pool, returning the previous binding.
    ///
    /// The listener's map entry stays locked from the empty-pool check through
    /// the write, so concurrent readers see either the old or the new color.
    pub fn bind(
        &self,
        service: &ServiceName,
        kind: ListenerKind,
        color: Color,
        deployment: &DeploymentId,
    ) -> Result<Option<Color>, RoutingError> {
        if !self.pools.contains(service) {
            return Err(RoutingError::UnknownService(service.clone()));
        }

        let entry = self.bindings.entry((service.clone(), kind));

        if self.pools.get_pool(service, color)?.is_empty() {
            return Err(RoutingError::EmptyPool {
                service: service.clone(),
                color,
                listener: kind,
            });
        }

        let previous = match entry {
            Entry::Occupied(mut occupied) => Some(occupied.insert(color)),
            Entry::Vacant(vacant) => {
                vacant.insert(color);
                None
            }
        };

        self.after_change(service, kind, previous, Some(color), deployment);
        Ok(previous)
    }

    /// Clear a listener, returning the previous binding.
    pub fn unbind(
        &self,
        service: &ServiceName,
        kind: ListenerKind,
        deployment: &DeploymentId,
    ) -> Option<Color> {
        let previous = self
            .bindings
            .remove(&(service.clone(), kind))
            .map(|(_, color)| color);
        self.after_change(service, kind, previous, None, deployment);
        previous
    }

    /// Put a listener back to a remembered binding (or clear it).
    pub fn restore(
        &self,
        service: &ServiceName,
        kind: ListenerKind,
        binding: Option<Color>,
        deployment: &DeploymentId,
    ) -> Result<Option<Color>, RoutingError> {
        match binding {
            Some(color) => self.bind(service, kind, color, deployment),
            None => Ok(self.unbind(service, kind, deployment)),
        }
    }

    pub fn current_pool(&self, service: &ServiceName, kind: ListenerKind) -> Option<Color> {
        self.bindings
            .get(&(service.clone(), kind))
            .map(|color| *color)
    }

    /// Listeners currently pointing at the given pool.
    pub fn bound_listeners(&self, service: &ServiceName, color: Color) -> Vec<ListenerKind> {
        ListenerKind::ALL
            .into_iter()
            .filter(|kind| self.current_pool(service, *kind) == Some(color))
            .collect()
    }

    fn after_change(
        &self,
        service: &ServiceName,
        kind: ListenerKind,
        from: Option<Color>,
        to: Option<Color>,
        deployment: &DeploymentId,
    ) {
        if from == to {
            return;
        }

        match kind {
            ListenerKind::Production => {
                tracing::info!(
                    %service,
                    deployment_id = %deployment,
                    from = from.map(|c| c.as_str()).unwrap_or("none"),
                    to = to.map(|c| c.as_str()).unwrap_or("none"),
                    "shifting production traffic"
                );
                self.audit.record(&AuditEntry {
                    service: service.clone(),
                    deployment_id: deployment.clone(),
                    from,
                    to,
                    timestamp: Utc::now(),
                });
            }
            ListenerKind::Test => {
                tracing::debug!(
                    %service,
                    deployment_id = %deployment,
                    from = from.map(|c| c.as_str()).unwrap_or("none"),
                    to = to.map(|c| c.as_str()).unwrap_or("none"),
                    "test listener re-pointed"
                );
            }
        }
    }
}
