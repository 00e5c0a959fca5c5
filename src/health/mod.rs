// ABOUTME: Health monitoring of target pools.
// ABOUTME: Concurrent per-endpoint probing fanned in to a single pool verdict.

mod monitor;
mod probe;
mod verdict;

pub use monitor::{EndpointStatus, HealthMonitor, HealthWatch};
pub use probe::{Probe, ProbeError, TcpProbe};
pub use verdict::{HealthVerdict, VerdictStatus};
