// ABOUTME: Lifecycle hooks run at fixed points of a deployment.
// ABOUTME: LifecycleHooks trait plus a runner that executes scripts from a hooks directory.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::types::{Color, DeploymentId, Endpoint, ServiceName};

/// Hook execution points in the deployment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Before the idle pool is provisioned. Failure ends the deployment as failed.
    BeforeInstall,
    /// After the test listener points at the new pool. Failure rolls back.
    AfterAllowTestTraffic,
    /// After production points at the new pool. Failure rolls back.
    AfterAllowTraffic,
}

impl HookPoint {
    pub const ALL: [HookPoint; 3] = [
        HookPoint::BeforeInstall,
        HookPoint::AfterAllowTestTraffic,
        HookPoint::AfterAllowTraffic,
    ];

    /// Get the hook filename for this point.
    pub fn filename(&self) -> &'static str {
        match self {
            HookPoint::BeforeInstall => "before-install",
            HookPoint::AfterAllowTestTraffic => "after-allow-test-traffic",
            HookPoint::AfterAllowTraffic => "after-allow-traffic",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.filename())
    }
}

/// Context passed to hooks via environment variables.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub service: ServiceName,
    pub deployment_id: DeploymentId,
    pub image: String,
    pub source: Color,
    pub destination: Color,
    /// Endpoints of the new pool; empty before provisioning.
    pub endpoints: Vec<Endpoint>,
}

impl HookContext {
    /// Convert context to environment variables.
    pub fn to_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("CUTOVER_SERVICE".to_string(), self.service.to_string());
        env.insert(
            "CUTOVER_DEPLOYMENT_ID".to_string(),
            self.deployment_id.to_string(),
        );
        env.insert("CUTOVER_IMAGE".to_string(), self.image.clone());
        env.insert("CUTOVER_SOURCE".to_string(), self.source.to_string());
        env.insert(
            "CUTOVER_DESTINATION".to_string(),
            self.destination.to_string(),
        );
        if !self.endpoints.is_empty() {
            let joined = self
                .endpoints
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            env.insert("CUTOVER_ENDPOINTS".to_string(), joined);
        }
        env
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{point} hook failed: {reason}")]
pub struct HookError {
    pub point: HookPoint,
    pub reason: String,
}

/// Runs deployment lifecycle hooks.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    async fn run(&self, point: HookPoint, context: &HookContext) -> Result<(), HookError>;
}

/// Hooks that always succeed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

#[async_trait]
impl LifecycleHooks for NoHooks {
    async fn run(&self, _point: HookPoint, _context: &HookContext) -> Result<(), HookError> {
        Ok(())
    }
}

/// Result of running a hook.
#[derive(Debug)]
pub struct HookResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Discovers and runs hook scripts from a directory.
#[derive(Debug, Clone)]
pub struct HookRunner {
    hooks_dir: PathBuf,
}

impl HookRunner {
    pub fn new(hooks_dir: &Path) -> Self {
        Self {
            hooks_dir: hooks_dir.to_path_buf(),
        }
    }

    /// Check if a hook exists for the given point.
    pub fn hook_exists(&self, point: HookPoint) -> bool {
        self.hook_path(point).is_file()
    }

    fn hook_path(&self, point: HookPoint) -> PathBuf {
        self.hooks_dir.join(point.filename())
    }

    /// Run a hook script if it exists.
    ///
    /// Returns None if the hook doesn't exist, or Some(HookResult) if it was run.
    pub async fn run_script(&self, point: HookPoint, context: &HookContext) -> Option<HookResult> {
        let hook_path = self.hook_path(point);

        if !hook_path.is_file() {
            return None;
        }

        tracing::info!(
            service = %context.service,
            deployment_id = %context.deployment_id,
            "running {point} hook: {}",
            hook_path.display()
        );

        let output = Command::new(&hook_path)
            .envs(context.to_env())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let result = match output {
            Ok(output) => HookResult {
                success: output.status.success(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            },
            Err(e) => {
                tracing::error!("failed to execute {point} hook: {e}");
                HookResult {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                }
            }
        };

        if result.success {
            tracing::debug!("{point} hook completed");
        } else {
            tracing::warn!("{point} hook failed with exit code {:?}", result.exit_code);
        }
        Some(result)
    }
}

#[async_trait]
impl LifecycleHooks for HookRunner {
    async fn run(&self, point: HookPoint, context: &HookContext) -> Result<(), HookError> {
        match self.run_script(point, context).await {
            None => Ok(()),
            Some(result) if result.success => Ok(()),
            Some(result) => {
                let stderr = result.stderr.trim();
                let reason = match (result.exit_code, stderr.is_empty()) {
                    (Some(code), true) => format!("exit code {code}"),
                    (Some(code), false) => format!("exit code {code}: {stderr}"),
                    (None, _) => stderr.to_string(),
                };
                Err(HookError { point, reason })
            }
        }
    }
}
