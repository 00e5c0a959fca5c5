// ABOUTME: Aggregate health verdict for a target pool.
// ABOUTME: Carries the decisive status plus passing/failing endpoint counts.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Healthy,
    Unhealthy,
    Timeout,
    /// Interim watch snapshot before either quorum is reached.
    Pending,
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerdictStatus::Healthy => f.write_str("healthy"),
            VerdictStatus::Unhealthy => f.write_str("unhealthy"),
            VerdictStatus::Timeout => f.write_str("timeout"),
            VerdictStatus::Pending => f.write_str("pending"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthVerdict {
    pub status: VerdictStatus,
    pub passing: usize,
    pub failing: usize,
    pub total: usize,
}

impl HealthVerdict {
    pub fn is_healthy(&self) -> bool {
        self.status == VerdictStatus::Healthy
    }

    /// Healthy or unhealthy; timeout and pending are not decisive.
    pub fn is_decisive(&self) -> bool {
        matches!(
            self.status,
            VerdictStatus::Healthy | VerdictStatus::Unhealthy
        )
    }

    pub fn passing_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passing as f64 / self.total as f64
        }
    }

    pub fn failing_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failing as f64 / self.total as f64
        }
    }

    /// The same counts, marked as having run out of time.
    pub fn timed_out(self) -> Self {
        Self {
            status: VerdictStatus::Timeout,
            ..self
        }
    }
}

impl fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}/{} passing, {} failing)",
            self.status, self.passing, self.total, self.failing
        )
    }
}
