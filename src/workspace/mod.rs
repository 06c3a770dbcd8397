//! Workspace client capability.
//!
//! Everything that talks to the remote workspace goes through
//! [`WorkspaceClient`], so deployment logic stays testable with a mock and
//! the transport can be swapped. The crate ships a filesystem-backed client
//! ([`fs::FsWorkspace`]) that mirrors remote paths under a local directory.

mod fs;
mod lock;

pub use fs::FsWorkspace;
pub use lock::{holder_id, LockInfo, LOCK_EXPIRY_SECS};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::warn;

use crate::config::User;
use crate::error::Result;

/// Run state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineRunState {
    /// No active update.
    Idle,
    /// The last update failed.
    Failed,
    /// The pipeline was deleted remotely.
    Deleted,
    /// An update is in progress.
    Running,
}

impl PipelineRunState {
    /// Whether deploying over this state is safe.
    #[must_use]
    pub const fn is_safe_to_deploy(self) -> bool {
        matches!(self, Self::Idle | Self::Failed | Self::Deleted)
    }
}

/// Client for the remote workspace.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkspaceClient: Send + Sync {
    /// The authenticated identity.
    async fn current_user(&self) -> Result<User>;

    /// Uploads a file, creating parent directories as needed.
    async fn upload_file(&self, path: &str, content: Vec<u8>) -> Result<()>;

    /// Creates a directory and its parents.
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Deletes a file. Deleting a missing file is not an error.
    async fn delete_file(&self, path: &str) -> Result<()>;

    /// Deletes a directory, recursively when `recursive` is set.
    async fn delete_directory(&self, path: &str, recursive: bool) -> Result<()>;

    /// Reads a state document. Returns `None` when it does not exist.
    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Writes a state document atomically.
    async fn write_file(&self, path: &str, content: Vec<u8>) -> Result<()>;

    /// Resolves a named remote object to its id, e.g. a warehouse by name.
    async fn resolve_lookup(&self, object_type: &str, name: &str) -> Result<String>;

    /// Whether a deployed job currently has active runs.
    async fn job_has_active_runs(&self, job_id: &str) -> Result<bool>;

    /// Run state of a deployed pipeline.
    async fn pipeline_state(&self, pipeline_id: &str) -> Result<PipelineRunState>;

    /// Acquires the deployment lock under `state_path`.
    ///
    /// Fails with [`crate::error::StateError::LockedByOther`] when a live
    /// lock is held elsewhere, unless `force` steals it.
    async fn acquire_lock(&self, state_path: &str, holder: &str, force: bool) -> Result<LockInfo>;

    /// Releases the deployment lock if `lock_id` still holds it.
    async fn release_lock(&self, state_path: &str, lock_id: &str) -> Result<()>;
}

/// Default number of attempts for retryable workspace calls.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Runs an operation with retries for transient failures.
///
/// Only errors reporting [`crate::error::LakewardError::is_retryable`] are
/// retried, waiting the error's suggested delay between attempts.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted or the error is not
/// retryable.
pub async fn with_retries<T, F, Fut>(what: &str, attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                let delay = err.retry_delay_secs().unwrap_or(2);
                warn!(what, attempt = attempt + 1, delay, error = %err, "retrying");
                tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LakewardError, WorkspaceError};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<&str> = with_retries("probe", 3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 1 {
                    Err(LakewardError::Workspace(WorkspaceError::transport(
                        "probe", "reset",
                    )))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.expect("recovered"), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries("probe", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(LakewardError::Workspace(WorkspaceError::PermissionDenied {
                    operation: String::from("put"),
                    message: String::from("forbidden"),
                }))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
