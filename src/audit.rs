// ABOUTME: Audit trail for production traffic shifts and page-worthy incidents.
// ABOUTME: AuditLog trait with a tracing-backed sink and an in-memory sink.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::types::{Color, DeploymentId, ServiceName};

/// One production-listener re-point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub service: ServiceName,
    pub deployment_id: DeploymentId,
    /// Pool production pointed at before; `None` for a first-ever binding.
    pub from: Option<Color>,
    /// Pool production points at now; `None` when the listener was cleared.
    pub to: Option<Color>,
    pub timestamp: DateTime<Utc>,
}

/// A failure no automated path can recover from.
#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub service: ServiceName,
    pub deployment_id: DeploymentId,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Receives audit entries and incidents.
pub trait AuditLog: Send + Sync {
    fn record(&self, entry: &AuditEntry);

    fn escalate(&self, incident: &Incident);
}

/// Writes audit entries as structured tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            target: "cutover::audit",
            service = %entry.service,
            deployment_id = %entry.deployment_id,
            from = entry.from.map(|c| c.as_str()).unwrap_or("none"),
            to = entry.to.map(|c| c.as_str()).unwrap_or("none"),
            "production listener re-pointed"
        );
    }

    fn escalate(&self, incident: &Incident) {
        tracing::error!(
            target: "cutover::audit",
            service = %incident.service,
            deployment_id = %incident.deployment_id,
            "INCIDENT: {}",
            incident.reason
        );
    }
}

/// Keeps every entry in memory; used by tests and the CLI summary.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    incidents: Mutex<Vec<Incident>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn incidents(&self) -> Vec<Incident> {
        self.incidents.lock().clone()
    }

    /// Production colors in the order they were bound for a service.
    pub fn production_history(&self, service: &ServiceName) -> Vec<Option<Color>> {
        self.entries
            .lock()
            .iter()
            .filter(|e| &e.service == service)
            .map(|e| e.to)
            .collect()
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, entry: &AuditEntry) {
        self.entries.lock().push(entry.clone());
    }

    fn escalate(&self, incident: &Incident) {
        self.incidents.lock().push(incident.clone());
    }
}
