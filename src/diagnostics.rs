// ABOUTME: Diagnostics accumulator for non-fatal warnings during deployment.
// ABOUTME: Collects warnings that shouldn't fail a deployment but should be shown to users.

use crate::deploy::DeployError;

/// Collects non-fatal warnings during deployment operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during deployment.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// A pool could not be drained or torn down after the outcome was decided.
    pub fn cleanup(error: &DeployError) -> Self {
        Self {
            kind: WarningKind::Cleanup,
            message: format!("cleanup incomplete: {error}"),
        }
    }

    /// A deployment was rejected because the same artifact is already live.
    pub fn already_live(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::AlreadyLive,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Old or failed pool may still have instances running.
    Cleanup,
    /// Nothing to do; the requested version already serves production.
    AlreadyLive,
}
