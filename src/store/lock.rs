// ABOUTME: Cross-process lock serializing CLI deployments of one service.
// ABOUTME: A fully written JSON lock file is hard-linked into place; stale locks (>1 hour) are broken.

use std::path::{Path, PathBuf};

use crate::deploy::LockInfo;
use crate::error::{Error, Result};
use crate::types::{DeploymentId, ServiceName};

/// A held lock file, removed on drop.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
    info: LockInfo,
    kept: bool,
}

impl StateLock {
    /// Acquire the lock for a service.
    ///
    /// Auto-breaks stale and unreadable locks; `force` breaks any lock.
    pub fn acquire(
        dir: &Path,
        service: &ServiceName,
        deployment_id: &DeploymentId,
        force: bool,
    ) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{service}.lock"));
        let info = LockInfo::new(service, deployment_id);

        if Self::try_create(&path, &info)? {
            return Ok(Self {
                path,
                info,
                kept: false,
            });
        }

        if !Self::should_break(&path, service, force)? {
            return Err(Self::held_error(&path, service));
        }

        tracing::debug!("removing stale/forced lock at {}", path.display());
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if Self::try_create(&path, &info)? {
            Ok(Self {
                path,
                info,
                kept: false,
            })
        } else {
            Err(Self::held_error(&path, service))
        }
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Leave the lock file in place; only `--force` clears it afterwards.
    pub fn keep(mut self) {
        self.kept = true;
    }

    /// Stage the lock info in a private file, then link it to `path`.
    /// The link fails if `path` exists, so readers only ever see a complete lock.
    fn try_create(path: &Path, info: &LockInfo) -> Result<bool> {
        let staged = path.with_extension(format!("lock.{}", info.deployment_id));
        std::fs::write(&staged, serde_json::to_string(info)?)?;

        let linked = std::fs::hard_link(&staged, path);
        if let Err(e) = std::fs::remove_file(&staged) {
            tracing::debug!("could not remove staged lock {}: {e}", staged.display());
        }

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn read(path: &Path) -> Option<LockInfo> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn should_break(path: &Path, service: &ServiceName, force: bool) -> Result<bool> {
        let Some(existing) = Self::read(path) else {
            tracing::warn!(%service, "lock info unreadable, breaking lock");
            return Ok(true);
        };

        if force {
            tracing::warn!(
                "breaking lock held by {} (pid {}) since {}",
                existing.holder,
                existing.pid,
                existing.started_at
            );
            Ok(true)
        } else if existing.is_stale() {
            tracing::warn!(
                "auto-breaking stale lock held by {} (pid {}) since {}",
                existing.holder,
                existing.pid,
                existing.started_at
            );
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn held_error(path: &Path, service: &ServiceName) -> Error {
        match Self::read(path) {
            Some(existing) => Error::StateLocked {
                service: service.to_string(),
                holder: existing.holder,
                pid: existing.pid,
                since: existing.started_at.to_rfc3339(),
            },
            None => Error::State(format!("lock for {service} held by another process")),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!("could not remove lock {}: {e}", self.path.display());
        }
    }
}
