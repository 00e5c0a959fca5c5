// ABOUTME: Health monitor that probes every endpoint of a pool concurrently.
// ABOUTME: Reports healthy, unhealthy, or timeout once the configured quorum is met or lost.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, SelectAll, StreamExt};

use crate::config::HealthPolicy;
use crate::routing::TargetPool;
use crate::types::Endpoint;

use super::{HealthVerdict, Probe, VerdictStatus};

/// Per-endpoint state derived from consecutive probe results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointStatus {
    Unknown,
    Passing,
    Failing,
}

/// Consecutive-result counters for one endpoint.
#[derive(Debug, Clone)]
struct EndpointTracker {
    success_threshold: u32,
    failure_threshold: u32,
    successes: u32,
    failures: u32,
    status: EndpointStatus,
}

impl EndpointTracker {
    fn new(policy: &HealthPolicy) -> Self {
        Self {
            success_threshold: policy.success_threshold,
            failure_threshold: policy.failure_threshold,
            successes: 0,
            failures: 0,
            status: EndpointStatus::Unknown,
        }
    }

    fn record(&mut self, passed: bool) -> EndpointStatus {
        if passed {
            self.successes += 1;
            self.failures = 0;
            if self.successes >= self.success_threshold {
                self.status = EndpointStatus::Passing;
            }
        } else {
            self.failures += 1;
            self.successes = 0;
            if self.failures >= self.failure_threshold {
                self.status = EndpointStatus::Failing;
            }
        }
        self.status
    }
}

#[derive(Debug, Clone, Copy)]
struct ProbeReport {
    index: usize,
    status: EndpointStatus,
}

struct ProbeLoop {
    index: usize,
    endpoint: Endpoint,
    probe: Arc<dyn Probe>,
    tracker: EndpointTracker,
    interval: Duration,
    probe_timeout: Duration,
    first: bool,
}

fn probe_stream(state: ProbeLoop) -> BoxStream<'static, ProbeReport> {
    stream::unfold(state, |mut state| async move {
        if !state.first {
            tokio::time::sleep(state.interval).await;
        }
        state.first = false;

        let passed = match tokio::time::timeout(
            state.probe_timeout,
            state.probe.check(&state.endpoint),
        )
        .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::trace!("{e}");
                false
            }
            Err(_elapsed) => {
                tracing::trace!(endpoint = %state.endpoint, "probe timed out");
                false
            }
        };

        let status = state.tracker.record(passed);
        let report = ProbeReport {
            index: state.index,
            status,
        };
        Some((report, state))
    })
    .boxed()
}

/// Runs probes against pools using a shared probe implementation.
#[derive(Clone)]
pub struct HealthMonitor {
    probe: Arc<dyn Probe>,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor").finish_non_exhaustive()
    }
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn Probe>) -> Self {
        Self { probe }
    }

    /// Start probing every endpoint of the pool. Probing stops when the
    /// returned watch is dropped.
    pub fn watch(&self, pool: &TargetPool, policy: &HealthPolicy) -> HealthWatch {
        let streams = pool
            .endpoints()
            .iter()
            .enumerate()
            .map(|(index, endpoint)| {
                probe_stream(ProbeLoop {
                    index,
                    endpoint: endpoint.clone(),
                    probe: Arc::clone(&self.probe),
                    tracker: EndpointTracker::new(policy),
                    interval: policy.interval,
                    probe_timeout: policy.probe_timeout,
                    first: true,
                })
            });

        HealthWatch {
            reports: stream::select_all(streams),
            statuses: vec![EndpointStatus::Unknown; pool.len()],
            required: policy.required_passing(pool.len()),
        }
    }

    /// Probe until the pool is healthy or unhealthy, or the policy timeout
    /// elapses.
    pub async fn evaluate(&self, pool: &TargetPool, policy: &HealthPolicy) -> HealthVerdict {
        let mut watch = self.watch(pool, policy);
        if pool.is_empty() {
            return watch.snapshot();
        }

        let decided = tokio::time::timeout(policy.timeout, async {
            while let Some(verdict) = watch.next().await {
                if verdict.is_decisive() {
                    return verdict;
                }
            }
            watch.snapshot()
        })
        .await;

        let verdict = match decided {
            Ok(verdict) => verdict,
            Err(_elapsed) => watch.snapshot().timed_out(),
        };

        tracing::debug!(
            service = %pool.service(),
            color = %pool.color(),
            %verdict,
            "pool evaluated"
        );
        verdict
    }
}

/// Live fan-in of every endpoint's probe results.
pub struct HealthWatch {
    reports: SelectAll<BoxStream<'static, ProbeReport>>,
    statuses: Vec<EndpointStatus>,
    required: usize,
}

impl HealthWatch {
    /// Wait for the next probe result and return the updated verdict.
    /// Returns `None` only for a pool without endpoints.
    pub async fn next(&mut self) -> Option<HealthVerdict> {
        let report = self.reports.next().await?;
        self.statuses[report.index] = report.status;
        Some(self.snapshot())
    }

    /// Verdict from the statuses seen so far.
    pub fn snapshot(&self) -> HealthVerdict {
        let total = self.statuses.len();
        let passing = self
            .statuses
            .iter()
            .filter(|s| **s == EndpointStatus::Passing)
            .count();
        let failing = self
            .statuses
            .iter()
            .filter(|s| **s == EndpointStatus::Failing)
            .count();

        let status = if total == 0 || failing > total - self.required {
            VerdictStatus::Unhealthy
        } else if passing >= self.required {
            VerdictStatus::Healthy
        } else {
            VerdictStatus::Pending
        };

        HealthVerdict {
            status,
            passing,
            failing,
            total,
        }
    }

    pub fn statuses(&self) -> &[EndpointStatus] {
        &self.statuses
    }
}
