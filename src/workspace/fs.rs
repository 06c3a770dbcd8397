//! Filesystem-backed workspace client.
//!
//! Mirrors remote workspace paths under a local base directory. Used for
//! local development and as the concrete client in integration tests; the
//! real transport plugs in behind the same trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::User;
use crate::error::{LakewardError, Result, StateError, WorkspaceError};

use super::lock::LockInfo;
use super::{PipelineRunState, WorkspaceClient};

/// Workspace client over a local directory tree.
#[derive(Debug)]
pub struct FsWorkspace {
    /// Local directory remote paths are mirrored under.
    base_dir: PathBuf,
    /// Identity reported by `current_user`.
    user: User,
    /// Lookup results keyed by `object_type:name`.
    lookups: IndexMap<String, String>,
}

impl FsWorkspace {
    /// Creates a client rooted at `base_dir` authenticating as `user`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, user: User) -> Self {
        Self {
            base_dir: base_dir.into(),
            user,
            lookups: IndexMap::new(),
        }
    }

    /// Registers a lookup result, keyed by object type and name.
    pub fn register_lookup(
        &mut self,
        object_type: impl Into<String>,
        name: impl Into<String>,
        id: impl Into<String>,
    ) {
        self.lookups
            .insert(format!("{}:{}", object_type.into(), name.into()), id.into());
    }

    /// Maps a remote path to its local mirror location.
    fn local_path(&self, remote: &str) -> PathBuf {
        self.base_dir.join(remote.trim_start_matches('/'))
    }

    /// Writes a file atomically: temp file in the target directory, then
    /// rename.
    async fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_lock(&self, state_path: &str) -> Result<Option<LockInfo>> {
        let path = self.local_path(&LockInfo::remote_path(state_path));
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        let lock: LockInfo = serde_json::from_str(&content).map_err(|e| {
            LakewardError::State(StateError::corrupted(format!("lock file: {e}")))
        })?;
        Ok(Some(lock))
    }
}

#[async_trait]
impl WorkspaceClient for FsWorkspace {
    async fn current_user(&self) -> Result<User> {
        Ok(self.user.clone())
    }

    async fn upload_file(&self, path: &str, content: Vec<u8>) -> Result<()> {
        debug!(path, bytes = content.len(), "upload");
        self.write_atomic(&self.local_path(path), &content).await
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.local_path(path)).await?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        match fs::remove_file(self.local_path(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_directory(&self, path: &str, recursive: bool) -> Result<()> {
        let local = self.local_path(path);
        let result = if recursive {
            fs::remove_dir_all(&local).await
        } else {
            fs::remove_dir(&local).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.local_path(path)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, path: &str, content: Vec<u8>) -> Result<()> {
        self.write_atomic(&self.local_path(path), &content).await
    }

    async fn resolve_lookup(&self, object_type: &str, name: &str) -> Result<String> {
        self.lookups
            .get(&format!("{object_type}:{name}"))
            .cloned()
            .ok_or_else(|| {
                LakewardError::Workspace(WorkspaceError::LookupFailed {
                    resource: object_type.to_string(),
                    name: name.to_string(),
                })
            })
    }

    async fn job_has_active_runs(&self, _job_id: &str) -> Result<bool> {
        Ok(false)
    }

    async fn pipeline_state(&self, _pipeline_id: &str) -> Result<PipelineRunState> {
        Ok(PipelineRunState::Idle)
    }

    async fn acquire_lock(&self, state_path: &str, holder: &str, force: bool) -> Result<LockInfo> {
        if let Some(existing) = self.read_lock(state_path).await? {
            if !existing.is_expired() && !force {
                return Err(LakewardError::State(StateError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            debug!(previous = %existing.holder, "replacing stale or forced lock");
        }
        let lock = LockInfo::new(holder);
        let content = serde_json::to_vec_pretty(&lock)
            .map_err(|e| LakewardError::State(StateError::serialization(e.to_string())))?;
        self.write_atomic(&self.local_path(&LockInfo::remote_path(state_path)), &content)
            .await?;
        Ok(lock)
    }

    async fn release_lock(&self, state_path: &str, lock_id: &str) -> Result<()> {
        match self.read_lock(state_path).await? {
            Some(existing) if existing.lock_id == lock_id => {
                self.delete_file(&LockInfo::remote_path(state_path)).await
            }
            // Someone else stole the lock or it is already gone.
            _ => Ok(()),
        }
    }
}
