// ABOUTME: Per-service configuration: replicas, resource ceilings, default task, pool endpoints.
// ABOUTME: Pool endpoints describe the pre-registered fleets the static provisioner hands out.

use serde::Deserialize;

use crate::deploy::TaskDescriptor;
use crate::types::{Color, Endpoint, ServiceName};

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: ServiceName,

    #[serde(default = "default_replicas")]
    pub replicas: u32,

    #[serde(default)]
    pub limits: Option<ResourceLimits>,

    #[serde(default)]
    pub task: TaskDescriptor,

    #[serde(default)]
    pub pools: PoolEndpoints,
}

fn default_replicas() -> u32 {
    1
}

/// Ceilings a task descriptor must fit into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ResourceLimits {
    /// CPU units (1024 = one vCPU).
    pub cpu: u32,
    /// Memory in MiB.
    pub memory: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolEndpoints {
    #[serde(default)]
    pub blue: Vec<Endpoint>,
    #[serde(default)]
    pub green: Vec<Endpoint>,
}

impl PoolEndpoints {
    pub fn for_color(&self, color: Color) -> &[Endpoint] {
        match color {
            Color::Blue => &self.blue,
            Color::Green => &self.green,
        }
    }
}
