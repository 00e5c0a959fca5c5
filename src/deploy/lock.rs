// ABOUTME: Per-service deploy locks so at most one deployment runs per service.
// ABOUTME: Locks release on drop unless a failed rollback pins them for an operator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

use crate::types::{DeploymentId, ServiceName};

use super::abort::AbortHandle;
use super::error::{DeployError, LockHolderInfo};

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    pub service: ServiceName,
    pub deployment_id: DeploymentId,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(service: &ServiceName, deployment_id: &DeploymentId) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            service: service.clone(),
            deployment_id: deployment_id.clone(),
        }
    }

    /// Check if this lock is stale (older than 1 hour).
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }
}

#[derive(Debug)]
struct LockEntry {
    info: LockInfo,
    abort: AbortHandle,
    stuck: bool,
}

impl LockEntry {
    fn rejection(&self, service: &ServiceName) -> DeployError {
        DeployError::ConcurrentDeployment {
            service: service.clone(),
            holder: LockHolderInfo {
                deployment_id: self.info.deployment_id.clone(),
                holder: self.info.holder.clone(),
                pid: self.info.pid,
                started_at: self.info.started_at,
                stuck: self.stuck,
            },
        }
    }
}

/// Lock table keyed by service; each service locks independently.
#[derive(Debug, Default)]
pub struct DeployLocks {
    held: DashMap<ServiceName, LockEntry>,
}

impl DeployLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the service's lock or report who holds it.
    pub fn try_acquire(
        self: &Arc<Self>,
        service: &ServiceName,
        deployment_id: &DeploymentId,
        abort: AbortHandle,
    ) -> Result<DeployLock, DeployError> {
        match self.held.entry(service.clone()) {
            Entry::Occupied(existing) => Err(existing.get().rejection(service)),
            Entry::Vacant(slot) => {
                slot.insert(LockEntry {
                    info: LockInfo::new(service, deployment_id),
                    abort,
                    stuck: false,
                });
                tracing::debug!(%service, %deployment_id, "deploy lock acquired");
                Ok(DeployLock {
                    locks: Arc::clone(self),
                    service: service.clone(),
                    deployment_id: deployment_id.clone(),
                    pinned: false,
                })
            }
        }
    }

    pub fn holder(&self, service: &ServiceName) -> Option<LockInfo> {
        self.held.get(service).map(|entry| entry.info.clone())
    }

    pub fn is_stuck(&self, service: &ServiceName) -> bool {
        self.held.get(service).is_some_and(|entry| entry.stuck)
    }

    /// Signal abort to the deployment holding the service's lock.
    pub fn abort(&self, service: &ServiceName) -> bool {
        match self.held.get(service) {
            Some(entry) if !entry.stuck => {
                entry.abort.abort();
                true
            }
            _ => false,
        }
    }

    /// Clear a lock pinned by a failed rollback.
    ///
    /// Returns `Ok(None)` when nothing holds the service. A running
    /// deployment's lock is never released; its holder comes back as
    /// `ConcurrentDeployment`.
    pub fn force_release(&self, service: &ServiceName) -> Result<Option<LockInfo>, DeployError> {
        if let Some((_, entry)) = self.held.remove_if(service, |_, entry| entry.stuck) {
            tracing::warn!(
                %service,
                deployment_id = %entry.info.deployment_id,
                holder = %entry.info.holder,
                pid = entry.info.pid,
                "deploy lock force-released"
            );
            return Ok(Some(entry.info));
        }

        match self.held.get(service) {
            Some(entry) => Err(entry.rejection(service)),
            None => Ok(None),
        }
    }

    fn release(&self, service: &ServiceName, deployment_id: &DeploymentId) {
        let removed = self
            .held
            .remove_if(service, |_, entry| entry.info.deployment_id == *deployment_id);
        if removed.is_some() {
            tracing::debug!(%service, %deployment_id, "deploy lock released");
        }
    }

    fn pin(&self, service: &ServiceName, deployment_id: &DeploymentId) {
        if let Some(mut entry) = self.held.get_mut(service)
            && entry.info.deployment_id == *deployment_id
        {
            entry.stuck = true;
        }
    }
}

/// A held deploy lock that releases on drop.
#[derive(Debug)]
pub struct DeployLock {
    locks: Arc<DeployLocks>,
    service: ServiceName,
    deployment_id: DeploymentId,
    pinned: bool,
}

impl DeployLock {
    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    pub fn deployment_id(&self) -> &DeploymentId {
        &self.deployment_id
    }

    /// Keep the lock held past drop and mark the service stuck.
    pub fn pin(mut self) {
        self.locks.pin(&self.service, &self.deployment_id);
        self.pinned = true;
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        if self.pinned {
            return;
        }
        if std::thread::panicking() {
            // Listener state is unknown after a panic mid-deployment.
            self.locks.pin(&self.service, &self.deployment_id);
            return;
        }
        self.locks.release(&self.service, &self.deployment_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::abort::abort_pair;

    fn service(name: &str) -> ServiceName {
        ServiceName::new(name).unwrap()
    }

    #[test]
    fn lock_info_creates_with_current_host_and_pid() {
        let info = LockInfo::new(&service("feed"), &DeploymentId::generate());
        assert_eq!(info.service.as_str(), "feed");
        assert_eq!(info.pid, std::process::id());
        assert!(!info.holder.is_empty());
        assert!(!info.is_stale());
    }

    #[test]
    fn old_lock_is_stale() {
        let mut info = LockInfo::new(&service("feed"), &DeploymentId::generate());
        info.started_at = Utc::now() - chrono::Duration::hours(2);
        assert!(info.is_stale());
    }

    #[test]
    fn second_acquire_reports_holder() {
        let locks = Arc::new(DeployLocks::new());
        let first = DeploymentId::generate();
        let _held = locks
            .try_acquire(&service("feed"), &first, abort_pair().0)
            .unwrap();

        let err = locks
            .try_acquire(&service("feed"), &DeploymentId::generate(), abort_pair().0)
            .unwrap_err();
        assert_eq!(err.lock_holder().unwrap().deployment_id, first);
    }

    #[test]
    fn services_lock_independently() {
        let locks = Arc::new(DeployLocks::new());
        let _a = locks
            .try_acquire(&service("feed"), &DeploymentId::generate(), abort_pair().0)
            .unwrap();
        assert!(
            locks
                .try_acquire(&service("search"), &DeploymentId::generate(), abort_pair().0)
                .is_ok()
        );
    }

    #[test]
    fn drop_releases_but_pin_keeps() {
        let locks = Arc::new(DeployLocks::new());
        let lock = locks
            .try_acquire(&service("feed"), &DeploymentId::generate(), abort_pair().0)
            .unwrap();
        drop(lock);
        assert!(locks.holder(&service("feed")).is_none());

        let lock = locks
            .try_acquire(&service("feed"), &DeploymentId::generate(), abort_pair().0)
            .unwrap();
        lock.pin();
        assert!(locks.is_stuck(&service("feed")));
        assert!(!locks.abort(&service("feed")));

        assert!(locks.force_release(&service("feed")).unwrap().is_some());
        assert!(locks.holder(&service("feed")).is_none());
        assert!(locks.force_release(&service("feed")).unwrap().is_none());
    }

    #[test]
    fn force_release_leaves_running_lock() {
        let locks = Arc::new(DeployLocks::new());
        let id = DeploymentId::generate();
        let _held = locks
            .try_acquire(&service("feed"), &id, abort_pair().0)
            .unwrap();

        let err = locks.force_release(&service("feed")).unwrap_err();
        let holder = err.lock_holder().unwrap();
        assert_eq!(holder.deployment_id, id);
        assert!(!holder.stuck);
        assert_eq!(locks.holder(&service("feed")).unwrap().deployment_id, id);
    }
}
