// ABOUTME: Deployment artifacts and requests handed over by the build pipeline.
// ABOUTME: Task descriptors carry resource needs and port mappings, validated against limits.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::ResourceLimits;
use crate::types::{ImageRef, RequestId, ServiceName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A container port the task exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortMapping {
    pub container_port: u16,
    pub protocol: Protocol,
}

impl PortMapping {
    /// Parse "8080" or "8080/udp".
    pub fn parse(spec: &str) -> Result<Self, String> {
        let (port, protocol) = match spec.trim().split_once('/') {
            Some((port, "tcp")) => (port, Protocol::Tcp),
            Some((port, "udp")) => (port, Protocol::Udp),
            Some((_, other)) => return Err(format!("unknown protocol: {other}")),
            None => (spec.trim(), Protocol::Tcp),
        };

        let container_port = port
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| format!("invalid container port: {port}"))?;

        Ok(Self {
            container_port,
            protocol,
        })
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let protocol = match self.protocol {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        };
        write!(f, "{}/{}", self.container_port, protocol)
    }
}

impl Serialize for PortMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PortMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PortMapping::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// How to run one task instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// CPU units (1024 = one vCPU).
    #[serde(default = "default_cpu")]
    pub cpu: u32,

    /// Memory in MiB.
    #[serde(default = "default_memory")]
    pub memory: u32,

    #[serde(default)]
    pub ports: Vec<PortMapping>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_cpu() -> u32 {
    256
}

fn default_memory() -> u32 {
    512
}

impl Default for TaskDescriptor {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            memory: default_memory(),
            ports: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

impl TaskDescriptor {
    pub fn validate(&self) -> Result<(), String> {
        if self.cpu == 0 {
            return Err("cpu must be greater than zero".to_string());
        }
        if self.memory == 0 {
            return Err("memory must be greater than zero".to_string());
        }
        for (i, port) in self.ports.iter().enumerate() {
            if self.ports[..i].contains(port) {
                return Err(format!("port {port} mapped twice"));
            }
        }
        Ok(())
    }

    /// Check the descriptor against resource ceilings.
    pub fn fits(&self, limits: ResourceLimits) -> Result<(), String> {
        if self.cpu > limits.cpu {
            return Err(format!(
                "requests {} cpu units, limit is {}",
                self.cpu, limits.cpu
            ));
        }
        if self.memory > limits.memory {
            return Err(format!(
                "requests {} MiB memory, limit is {}",
                self.memory, limits.memory
            ));
        }
        Ok(())
    }
}

/// Immutable output of the build pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentArtifact {
    pub image: ImageRef,
    #[serde(default)]
    pub task: TaskDescriptor,
}

impl DeploymentArtifact {
    pub fn new(image: ImageRef, task: TaskDescriptor) -> Self {
        Self { image, task }
    }

    /// Identity used to spot duplicate or stale requests.
    pub fn version(&self) -> String {
        self.image.version()
    }
}

/// A request to roll an artifact into a service.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub service: ServiceName,
    pub artifact: DeploymentArtifact,
    pub request_id: RequestId,
}

impl DeploymentRequest {
    pub fn new(service: ServiceName, artifact: DeploymentArtifact) -> Self {
        Self {
            service,
            artifact,
            request_id: RequestId::generate(),
        }
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }
}
