//! IaC state document handling.
//!
//! The engine's native state lives in its working directory and is mirrored
//! to the remote state directory so any machine can deploy. Reconciliation
//! on pull: a lineage mismatch or a higher remote serial discards the local
//! copy; otherwise local wins. Push uploads the raw local document without
//! reserialization.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{IacError, LakewardError, Result};
use crate::workspace::WorkspaceClient;

/// State file name inside the engine working directory.
pub const STATE_FILE_NAME: &str = "engine.tfstate";

/// State document name under the remote state directory.
pub const REMOTE_STATE_FILE: &str = "engine.tfstate";

/// The fields of the engine state document the core reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IacState {
    /// Monotonic write counter.
    #[serde(default)]
    pub serial: u64,
    /// Identity of the state's history; a new lineage means an unrelated
    /// state.
    #[serde(default)]
    pub lineage: String,
}

impl IacState {
    /// Parses the relevant fields out of a raw state document.
    ///
    /// # Errors
    ///
    /// Returns [`IacError::InvalidState`] when the document is not JSON.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| LakewardError::Iac(IacError::InvalidState { message: e.to_string() }))
    }
}

/// Remote path of the engine state under `state_path`.
fn remote_path(state_path: &str) -> String {
    format!("{}/{REMOTE_STATE_FILE}", state_path.trim_end_matches('/'))
}

/// Pulls the engine state into `workdir`, reconciling against any local
/// copy.
///
/// # Errors
///
/// Fails on unreadable documents or workspace errors; an absent remote
/// state is not an error.
pub async fn pull_iac_state(
    workspace: &dyn WorkspaceClient,
    state_path: &str,
    workdir: &Path,
) -> Result<()> {
    let Some(remote_raw) = workspace.read_file(&remote_path(state_path)).await? else {
        debug!("no remote IaC state");
        return Ok(());
    };
    let remote = IacState::parse(&remote_raw)?;

    let local_file = workdir.join(STATE_FILE_NAME);
    let use_remote = match fs::read(&local_file).await {
        Ok(local_raw) => {
            let local = IacState::parse(&local_raw)?;
            if local.lineage != remote.lineage {
                info!(
                    local = %local.lineage,
                    remote = %remote.lineage,
                    "IaC state lineage changed, using remote"
                );
                true
            } else if remote.serial > local.serial {
                info!(
                    local = local.serial,
                    remote = remote.serial,
                    "remote IaC state is newer, using remote"
                );
                true
            } else {
                false
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => return Err(e.into()),
    };

    if use_remote {
        if let Some(parent) = local_file.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&local_file, &remote_raw).await?;
    }
    Ok(())
}

/// Pushes the local engine state from `workdir` to the remote state
/// directory. A missing local state is a no-op.
///
/// # Errors
///
/// Fails on filesystem or workspace errors.
pub async fn push_iac_state(
    workspace: &dyn WorkspaceClient,
    state_path: &str,
    workdir: &Path,
) -> Result<()> {
    let local_file = workdir.join(STATE_FILE_NAME);
    let raw = match fs::read(&local_file).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no local IaC state to push");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    workspace.write_file(&remote_path(state_path), raw).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::User;
    use crate::workspace::FsWorkspace;
    use tempfile::TempDir;

    fn state_doc(serial: u64, lineage: &str) -> Vec<u8> {
        serde_json::json!({"serial": serial, "lineage": lineage, "resources": []})
            .to_string()
            .into_bytes()
    }

    fn workspace(dir: &TempDir) -> FsWorkspace {
        FsWorkspace::new(
            dir.path().join("remote"),
            User {
                user_name: String::from("dev@example.com"),
                display_name: None,
            },
        )
    }

    #[tokio::test]
    async fn test_pull_seeds_missing_local() {
        let dir = TempDir::new().expect("tempdir");
        let ws = workspace(&dir);
        ws.write_file("/state/engine.tfstate", state_doc(3, "aaa"))
            .await
            .expect("seed remote");

        let workdir = dir.path().join("engine");
        pull_iac_state(&ws, "/state", &workdir).await.expect("pull");
        let local = fs::read(workdir.join(STATE_FILE_NAME)).await.expect("local");
        assert_eq!(IacState::parse(&local).expect("parse").serial, 3);
    }

    #[tokio::test]
    async fn test_pull_keeps_newer_local_same_lineage() {
        let dir = TempDir::new().expect("tempdir");
        let ws = workspace(&dir);
        ws.write_file("/state/engine.tfstate", state_doc(3, "aaa"))
            .await
            .expect("seed remote");

        let workdir = dir.path().join("engine");
        fs::create_dir_all(&workdir).await.expect("mkdir");
        fs::write(workdir.join(STATE_FILE_NAME), state_doc(5, "aaa"))
            .await
            .expect("seed local");

        pull_iac_state(&ws, "/state", &workdir).await.expect("pull");
        let local = fs::read(workdir.join(STATE_FILE_NAME)).await.expect("local");
        assert_eq!(IacState::parse(&local).expect("parse").serial, 5);
    }

    #[tokio::test]
    async fn test_pull_discards_local_on_lineage_change() {
        let dir = TempDir::new().expect("tempdir");
        let ws = workspace(&dir);
        ws.write_file("/state/engine.tfstate", state_doc(1, "bbb"))
            .await
            .expect("seed remote");

        let workdir = dir.path().join("engine");
        fs::create_dir_all(&workdir).await.expect("mkdir");
        fs::write(workdir.join(STATE_FILE_NAME), state_doc(9, "aaa"))
            .await
            .expect("seed local");

        pull_iac_state(&ws, "/state", &workdir).await.expect("pull");
        let local = fs::read(workdir.join(STATE_FILE_NAME)).await.expect("local");
        assert_eq!(IacState::parse(&local).expect("parse").lineage, "bbb");
    }

    #[tokio::test]
    async fn test_push_roundtrip_and_absent_local() {
        let dir = TempDir::new().expect("tempdir");
        let ws = workspace(&dir);
        let workdir = dir.path().join("engine");

        // Nothing local yet: push is a no-op.
        push_iac_state(&ws, "/state", &workdir).await.expect("noop push");
        assert!(ws.read_file("/state/engine.tfstate").await.expect("read").is_none());

        fs::create_dir_all(&workdir).await.expect("mkdir");
        fs::write(workdir.join(STATE_FILE_NAME), state_doc(2, "aaa"))
            .await
            .expect("seed local");
        push_iac_state(&ws, "/state", &workdir).await.expect("push");
        let remote = ws
            .read_file("/state/engine.tfstate")
            .await
            .expect("read")
            .expect("present");
        assert_eq!(IacState::parse(&remote).expect("parse").serial, 2);
    }
}
