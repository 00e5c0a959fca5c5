// ABOUTME: Provisioner over fixed, pre-registered endpoint sets per pool color.
// ABOUTME: Matches fleets whose two target groups are created ahead of time.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::{Config, ResourceLimits};
use crate::deploy::TaskDescriptor;
use crate::types::{Color, Endpoint, ServiceName};

use super::{PoolRef, ProvisionError, Provisioner};

#[derive(Debug, Clone, Default)]
struct StaticService {
    limits: Option<ResourceLimits>,
    blue: Vec<Endpoint>,
    green: Vec<Endpoint>,
}

#[derive(Debug, Clone, Default)]
pub struct StaticProvisioner {
    services: HashMap<ServiceName, StaticService>,
}

impl StaticProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        config
            .services
            .iter()
            .fold(Self::new(), |provisioner, service| {
                provisioner.with_service(
                    service.name.clone(),
                    service.limits,
                    service.pools.blue.clone(),
                    service.pools.green.clone(),
                )
            })
    }

    pub fn with_service(
        mut self,
        name: ServiceName,
        limits: Option<ResourceLimits>,
        blue: Vec<Endpoint>,
        green: Vec<Endpoint>,
    ) -> Self {
        self.services.insert(
            name,
            StaticService {
                limits,
                blue,
                green,
            },
        );
        self
    }
}

#[async_trait]
impl Provisioner for StaticProvisioner {
    async fn provision(
        &self,
        pool: &PoolRef,
        task: &TaskDescriptor,
        replicas: u32,
    ) -> Result<Vec<Endpoint>, ProvisionError> {
        let service = self.services.get(&pool.service).ok_or_else(|| {
            ProvisionError::Backend(format!("no static pools registered for {}", pool.service))
        })?;

        task.validate().map_err(ProvisionError::InvalidArtifact)?;
        if let Some(limits) = service.limits {
            task.fits(limits).map_err(ProvisionError::LimitsExceeded)?;
        }

        let endpoints = match pool.color {
            Color::Blue => &service.blue,
            Color::Green => &service.green,
        };

        if endpoints.len() < replicas as usize {
            return Err(ProvisionError::InsufficientCapacity {
                pool: pool.to_string(),
                wanted: replicas,
                available: endpoints.len(),
            });
        }

        tracing::debug!(%pool, replicas, "handing out static endpoints");
        Ok(endpoints[..replicas as usize].to_vec())
    }

    async fn teardown(&self, pool: &PoolRef) -> Result<(), ProvisionError> {
        tracing::debug!(%pool, "static pool released");
        Ok(())
    }
}
