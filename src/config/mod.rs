// ABOUTME: Configuration types and parsing for cutover.yml.
// ABOUTME: Handles discovery, YAML parsing, validation, and the state directory override.

mod deserialize;
mod health;
mod init;
mod service;

pub use health::HealthPolicy;
pub use init::init_config;
pub use service::{PoolEndpoints, ResourceLimits, ServiceConfig};

use crate::error::{Error, Result};
use crate::types::ServiceName;
use deserialize::deserialize_services;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "cutover.yml";
pub const CONFIG_FILENAME_ALT: &str = "cutover.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".cutover/config.yml";

/// Environment variable that overrides `state_dir`.
pub const STATE_DIR_ENV: &str = "CUTOVER_STATE_DIR";

const DEFAULT_STATE_DIR: &str = ".cutover/state";
const DEFAULT_HOOKS_DIR: &str = ".cutover/hooks";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    #[serde(default = "default_provision_timeout", with = "humantime_serde")]
    pub provision_timeout: Duration,

    /// Upper bound on any single lifecycle hook.
    #[serde(default = "default_hook_timeout", with = "humantime_serde")]
    pub hook_timeout: Duration,

    #[serde(default)]
    pub policy: PolicyKind,

    #[serde(default)]
    pub health: HealthPolicy,

    /// Directory holding lifecycle hook scripts.
    #[serde(default)]
    pub hooks_dir: Option<PathBuf>,

    #[serde(deserialize_with = "deserialize_services")]
    pub services: NonEmpty<ServiceConfig>,
}

/// Which rollback policy the orchestrator runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Default,
    Strict,
    Majority,
}

fn default_provision_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_hook_timeout() -> Duration {
    Duration::from_secs(120)
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        candidates
            .iter()
            .find(|path| path.exists())
            .map(|path| Self::load(path))
            .unwrap_or_else(|| Err(Error::ConfigNotFound(dir.to_path_buf())))
    }

    pub fn validate(&self) -> Result<()> {
        self.health.validate().map_err(Error::InvalidConfig)?;

        if self.provision_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "provision_timeout must be greater than zero".to_string(),
            ));
        }
        if self.hook_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "hook_timeout must be greater than zero".to_string(),
            ));
        }

        for service in &self.services {
            if service.replicas == 0 {
                return Err(Error::InvalidConfig(format!(
                    "service {}: replicas must be at least 1",
                    service.name
                )));
            }
            if let Err(reason) = service.task.validate() {
                return Err(Error::InvalidConfig(format!(
                    "service {}: {}",
                    service.name, reason
                )));
            }
            if let Some(limits) = service.limits
                && let Err(reason) = service.task.fits(limits)
            {
                return Err(Error::InvalidConfig(format!(
                    "service {}: default task {}",
                    service.name, reason
                )));
            }
        }

        Ok(())
    }

    pub fn service(&self, name: &ServiceName) -> Result<&ServiceConfig> {
        self.services
            .iter()
            .find(|s| &s.name == name)
            .ok_or_else(|| Error::UnknownService(name.to_string()))
    }

    /// State directory: `CUTOVER_STATE_DIR`, then `state_dir`, then `.cutover/state`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(dir) = std::env::var_os(STATE_DIR_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(dir);
        }
        self.state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
    }

    /// Hook scripts directory, relative paths resolved against `base`.
    pub fn hooks_dir(&self, base: &Path) -> PathBuf {
        let dir = self
            .hooks_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_HOOKS_DIR));
        base.join(dir)
    }
}
