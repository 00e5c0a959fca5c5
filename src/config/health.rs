// ABOUTME: Health policy used for pre-cutover validation and post-cutover bake-out.
// ABOUTME: Probe cadence, thresholds, timeouts, and the passing quorum, with defaults.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthPolicy {
    /// Delay between probes of the same endpoint.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Budget for a single probe; exceeding it counts as a failure.
    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub probe_timeout: Duration,

    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Overall budget for reaching a verdict.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Observation window after cutover before committing.
    #[serde(
        default = "default_bakeout",
        alias = "bakeout_window",
        with = "humantime_serde"
    )]
    pub bakeout: Duration,

    /// Fraction of endpoints that must pass, in (0, 1].
    #[serde(default = "default_quorum")]
    pub quorum: f64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            probe_timeout: default_probe_timeout(),
            success_threshold: default_success_threshold(),
            failure_threshold: default_failure_threshold(),
            timeout: default_timeout(),
            bakeout: default_bakeout(),
            quorum: default_quorum(),
        }
    }
}

impl HealthPolicy {
    /// Number of passing endpoints needed out of `total`.
    pub fn required_passing(&self, total: usize) -> usize {
        if total == 0 {
            return 0;
        }
        let required = (self.quorum * total as f64).ceil() as usize;
        required.clamp(1, total)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.success_threshold == 0 {
            return Err("health.success_threshold must be at least 1".to_string());
        }
        if self.failure_threshold == 0 {
            return Err("health.failure_threshold must be at least 1".to_string());
        }
        if !(self.quorum > 0.0 && self.quorum <= 1.0) {
            return Err(format!(
                "health.quorum must be in (0, 1], got {}",
                self.quorum
            ));
        }
        if self.interval.is_zero() {
            return Err("health.interval must be greater than zero".to_string());
        }
        if self.timeout.is_zero() {
            return Err("health.timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_success_threshold() -> u32 {
    3
}

fn default_failure_threshold() -> u32 {
    2
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_bakeout() -> Duration {
    Duration::from_secs(300)
}

fn default_quorum() -> f64 {
    1.0
}
