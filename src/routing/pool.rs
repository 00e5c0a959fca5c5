// ABOUTME: Target pool registry tracking the blue and green endpoint sets per service.
// ABOUTME: Endpoint sets are replaced whole; a pool is drained only when no listener uses it.

use dashmap::DashMap;
use serde::Serialize;

use crate::types::{Color, Endpoint, ServiceName};

use super::{ListenerRouter, RoutingError};

/// Last known health of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolHealth {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

/// Snapshot of one color-tagged endpoint set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetPool {
    service: ServiceName,
    color: Color,
    endpoints: Vec<Endpoint>,
    health: PoolHealth,
}

impl TargetPool {
    fn empty(service: ServiceName, color: Color) -> Self {
        Self {
            service,
            color,
            endpoints: Vec::new(),
            health: PoolHealth::Unknown,
        }
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn health(&self) -> PoolHealth {
        self.health
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }
}

/// Registry of both pools for every registered service.
#[derive(Debug, Default)]
pub struct TargetPoolRegistry {
    pools: DashMap<(ServiceName, Color), TargetPool>,
}

impl TargetPoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create both pools empty. Returns false if the service already exists,
    /// in which case its pools are left untouched.
    pub fn register(&self, service: &ServiceName) -> bool {
        if self.contains(service) {
            return false;
        }
        for color in Color::ALL {
            self.pools
                .entry((service.clone(), color))
                .or_insert_with(|| TargetPool::empty(service.clone(), color));
        }
        true
    }

    pub fn contains(&self, service: &ServiceName) -> bool {
        self.pools.contains_key(&(service.clone(), Color::Blue))
    }

    pub fn get_pool(&self, service: &ServiceName, color: Color) -> Result<TargetPool, RoutingError> {
        self.pools
            .get(&(service.clone(), color))
            .map(|pool| pool.clone())
            .ok_or_else(|| RoutingError::UnknownService(service.clone()))
    }

    /// Replace the pool's endpoints in one step. Duplicates are dropped and the
    /// health state resets to unknown.
    pub fn set_endpoints(
        &self,
        service: &ServiceName,
        color: Color,
        endpoints: impl IntoIterator<Item = Endpoint>,
    ) -> Result<(), RoutingError> {
        let mut fresh: Vec<Endpoint> = Vec::new();
        for endpoint in endpoints {
            if !fresh.contains(&endpoint) {
                fresh.push(endpoint);
            }
        }

        let mut pool = self
            .pools
            .get_mut(&(service.clone(), color))
            .ok_or_else(|| RoutingError::UnknownService(service.clone()))?;
        tracing::debug!(%service, %color, count = fresh.len(), "replacing pool endpoints");
        pool.endpoints = fresh;
        pool.health = PoolHealth::Unknown;
        Ok(())
    }

    pub fn set_health(
        &self,
        service: &ServiceName,
        color: Color,
        health: PoolHealth,
    ) -> Result<(), RoutingError> {
        let mut pool = self
            .pools
            .get_mut(&(service.clone(), color))
            .ok_or_else(|| RoutingError::UnknownService(service.clone()))?;
        pool.health = health;
        Ok(())
    }

    /// Empty a pool that no listener references. Returns the removed endpoints.
    ///
    /// Callers serialize pool and listener mutations per service, so the
    /// binding check cannot be invalidated before the pool is emptied.
    pub fn drain(
        &self,
        service: &ServiceName,
        color: Color,
        router: &ListenerRouter,
    ) -> Result<Vec<Endpoint>, RoutingError> {
        if !self.contains(service) {
            return Err(RoutingError::UnknownService(service.clone()));
        }

        if let Some(listener) = router.bound_listeners(service, color).into_iter().next() {
            tracing::error!(%service, %color, %listener, "refusing to drain a bound pool");
            return Err(RoutingError::PoolInUse {
                service: service.clone(),
                color,
                listener,
            });
        }

        let mut pool = self
            .pools
            .get_mut(&(service.clone(), color))
            .ok_or_else(|| RoutingError::UnknownService(service.clone()))?;
        let removed = std::mem::take(&mut pool.endpoints);
        pool.health = PoolHealth::Unknown;
        tracing::debug!(%service, %color, removed = removed.len(), "drained pool");
        Ok(removed)
    }
}
