// ABOUTME: File-backed record of each service's live layout between CLI runs.
// ABOUTME: One JSON file per service, written atomically via a temp file and rename.

mod lock;

pub use lock::StateLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{Color, DeploymentId, Endpoint, RequestId, ServiceName};

/// What is live for a service after its last deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub service: ServiceName,
    pub active: Color,
    #[serde(default)]
    pub live_version: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub last_deployment: Option<DeploymentId>,
    /// Pipeline request that produced the live version.
    #[serde(default)]
    pub last_request: Option<RequestId>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRecord {
    pub fn new(service: ServiceName, active: Color, endpoints: Vec<Endpoint>) -> Self {
        Self {
            service,
            active,
            live_version: None,
            endpoints,
            last_deployment: None,
            last_request: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn services_dir(&self) -> PathBuf {
        self.dir.join("services")
    }

    fn record_path(&self, service: &ServiceName) -> PathBuf {
        self.services_dir().join(format!("{service}.json"))
    }

    pub fn load(&self, service: &ServiceName) -> Result<Option<ServiceRecord>> {
        let path = self.record_path(service);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_str(&content).map_err(|e| {
            Error::State(format!("corrupt record {}: {e}", path.display()))
        })?;
        Ok(Some(record))
    }

    pub fn save(&self, record: &ServiceRecord) -> Result<()> {
        let dir = self.services_dir();
        std::fs::create_dir_all(&dir)?;

        let path = self.record_path(&record.service);
        let tmp = dir.join(format!(".{}.json.tmp", record.service));
        std::fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        std::fs::rename(&tmp, &path)?;

        tracing::debug!(service = %record.service, path = %path.display(), "saved service record");
        Ok(())
    }

    /// Every stored record, sorted by service name.
    pub fn list(&self) -> Result<Vec<ServiceRecord>> {
        let entries = match std::fs::read_dir(self.services_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let Some(stem) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            let Ok(service) = ServiceName::new(stem) else {
                continue;
            };
            if let Some(record) = self.load(&service)? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.service.cmp(&b.service));
        Ok(records)
    }

    /// Take the cross-process lock for a service.
    pub fn lock(
        &self,
        service: &ServiceName,
        deployment_id: &DeploymentId,
        force: bool,
    ) -> Result<StateLock> {
        StateLock::acquire(&self.dir.join("locks"), service, deployment_id, force)
    }
}
