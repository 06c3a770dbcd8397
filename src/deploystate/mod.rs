//! Deployment state.
//!
//! A small JSON document, kept both in the remote state area and in the
//! local cache, records what the last deployment put where: a sequence
//! number, the CLI version that wrote it and the list of synced files. The
//! remote copy is authoritative; pulling a newer remote state overwrites the
//! local copy and reseeds the sync snapshot so the next sync re-verifies
//! every file.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::bundle::Bundle;
use crate::error::{LakewardError, Result, StateError};
use crate::mutator::{Diagnostics, Mutator};
use crate::sync::Snapshot;
use crate::workspace::{with_retries, DEFAULT_ATTEMPTS};

/// Schema version this CLI writes.
pub const STATE_VERSION: u64 = 1;

/// Name of the state document in the remote state area.
pub const REMOTE_STATE_NAME: &str = "deployment.json";

/// One file the last deployment synced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedFile {
    /// Path relative to the bundle root.
    pub path: String,
    /// Whether it was uploaded as a notebook.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_notebook: bool,
}

/// The deployment state document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Schema version.
    pub version: u64,
    /// Monotonic deployment counter.
    #[serde(default)]
    pub seq: u64,
    /// Version of the CLI that wrote the document.
    #[serde(default)]
    pub cli_version: String,
    /// When the document was written.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Files the deployment synced.
    #[serde(default)]
    pub files: Vec<DeployedFile>,
}

impl Default for DeploymentState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            seq: 0,
            cli_version: String::new(),
            timestamp: Utc::now(),
            files: Vec::new(),
        }
    }
}

impl DeploymentState {
    fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            LakewardError::State(StateError::Corrupted {
                message: format!("deployment state: {e}"),
            })
        })
    }
}

/// Reads the local state copy. A missing file is `None`.
///
/// # Errors
///
/// Fails when the file exists but cannot be read or parsed.
pub async fn read_local(file: &Path) -> Result<Option<DeploymentState>> {
    match fs::read(file).await {
        Ok(bytes) => DeploymentState::parse(&bytes).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes the local state copy atomically.
///
/// # Errors
///
/// Fails when the state cannot be serialized or written.
pub async fn write_local(file: &Path, state: &DeploymentState) -> Result<()> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(state).map_err(|e| {
        LakewardError::State(StateError::SerializationError {
            message: e.to_string(),
        })
    })?;
    let tmp = file.with_extension("json.tmp");
    fs::write(&tmp, &bytes).await?;
    fs::rename(&tmp, file).await?;
    Ok(())
}

fn remote_path(state_path: &str) -> String {
    format!("{}/{REMOTE_STATE_NAME}", state_path.trim_end_matches('/'))
}

/// Pulls the remote deployment state into the local cache.
///
/// When the remote copy is ahead of the local one the local copy is
/// replaced and the sync snapshot is reseeded with zeroed modification
/// times, so the next sync re-uploads and reconciles every remembered file.
pub struct PullDeploymentState;

#[async_trait]
impl Mutator for PullDeploymentState {
    fn name(&self) -> &'static str {
        "PullDeploymentState"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        match pull(bundle).await {
            Ok(()) => Diagnostics::new(),
            Err(err) => Diagnostics::from_error(err),
        }
    }
}

async fn pull(bundle: &Bundle) -> Result<()> {
    let state_path = bundle.state_path()?.to_string();
    let workspace = bundle.workspace()?;
    let remote = remote_path(&state_path);

    let Some(bytes) =
        with_retries("state read", DEFAULT_ATTEMPTS, || workspace.read_file(&remote)).await?
    else {
        debug!("no remote deployment state");
        return Ok(());
    };
    let remote_state = DeploymentState::parse(&bytes)?;
    if remote_state.version > STATE_VERSION {
        return Err(LakewardError::State(StateError::UpgradeRequired {
            version: remote_state.version,
            cli_version: remote_state.cli_version,
        }));
    }

    let local_file = bundle.deployment_state_file();
    let local_state = read_local(&local_file).await?;
    let stale = local_state.is_none_or(|local| local.seq < remote_state.seq);
    if !stale {
        debug!("local deployment state is current");
        return Ok(());
    }

    info!(seq = remote_state.seq, "adopting remote deployment state");
    write_local(&local_file, &remote_state).await?;

    let Some(file_path) = bundle.config.workspace.file_path.as_deref() else {
        return Ok(());
    };
    let host = bundle.config.workspace.host.as_deref().unwrap_or_default();
    let snapshot = Snapshot::reseeded(
        file_path,
        remote_state
            .files
            .iter()
            .map(|f| (f.path.clone(), f.is_notebook)),
    );
    let snapshot_file = Snapshot::file_for(&bundle.snapshot_dir(), host, file_path);
    snapshot.save(&snapshot_file).await
}

/// Records the finished deployment locally and remotely.
///
/// Bumps the sequence number, stamps the CLI version and timestamp, lists
/// the synced files, writes the local copy and then pushes it.
pub struct PushDeploymentState;

#[async_trait]
impl Mutator for PushDeploymentState {
    fn name(&self) -> &'static str {
        "PushDeploymentState"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        match push(bundle).await {
            Ok(()) => Diagnostics::new(),
            Err(err) => Diagnostics::from_error(err),
        }
    }
}

async fn push(bundle: &Bundle) -> Result<()> {
    let state_path = bundle.state_path()?.to_string();
    let workspace = bundle.workspace()?;
    let local_file = bundle.deployment_state_file();

    let mut state = read_local(&local_file).await?.unwrap_or_default();
    state.version = STATE_VERSION;
    state.seq += 1;
    state.cli_version.clone_from(&bundle.cli_version);
    state.timestamp = Utc::now();
    state.files = synced_files(bundle).await;

    write_local(&local_file, &state).await?;
    let bytes = serde_json::to_vec_pretty(&state).map_err(|e| {
        LakewardError::State(StateError::SerializationError {
            message: e.to_string(),
        })
    })?;
    let remote = remote_path(&state_path);
    info!(seq = state.seq, "pushing deployment state");
    with_retries("state write", DEFAULT_ATTEMPTS, || {
        workspace.write_file(&remote, bytes.clone())
    })
    .await
}

/// The file list of the current sync snapshot.
async fn synced_files(bundle: &Bundle) -> Vec<DeployedFile> {
    let Some(file_path) = bundle.config.workspace.file_path.as_deref() else {
        return Vec::new();
    };
    let host = bundle.config.workspace.host.as_deref().unwrap_or_default();
    let snapshot_file = Snapshot::file_for(&bundle.snapshot_dir(), host, file_path);
    let snapshot = Snapshot::load(&snapshot_file, file_path).await;
    snapshot
        .files
        .into_iter()
        .map(|(path, entry)| DeployedFile {
            path,
            is_notebook: entry.is_notebook,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::User;
    use crate::mutator::apply;
    use crate::workspace::FsWorkspace;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_user() -> User {
        User {
            user_name: String::from("dev@example.com"),
            display_name: None,
        }
    }

    async fn bundle_in(dir: &TempDir) -> Bundle {
        let mut bundle = Bundle::for_tests();
        bundle.root = dir.path().join("src-tree");
        tokio::fs::create_dir_all(&bundle.root).await.expect("mkdir");
        bundle.config.workspace.state_path = Some(String::from("/bundles/etl/state"));
        bundle.config.workspace.file_path = Some(String::from("/bundles/etl/files"));
        bundle.set_workspace(Arc::new(FsWorkspace::new(
            dir.path().join("remote"),
            test_user(),
        )));
        bundle
    }

    #[tokio::test]
    async fn test_pull_without_remote_state_is_noop() {
        let dir = TempDir::new().expect("tempdir");
        let mut bundle = bundle_in(&dir).await;
        let diags = apply(&mut bundle, &PullDeploymentState).await;
        assert!(!diags.has_error());
        assert!(read_local(&bundle.deployment_state_file())
            .await
            .expect("read")
            .is_none());
    }

    #[tokio::test]
    async fn test_newer_remote_overwrites_local_and_reseeds_snapshot() {
        let dir = TempDir::new().expect("tempdir");
        let mut bundle = bundle_in(&dir).await;

        write_local(
            &bundle.deployment_state_file(),
            &DeploymentState {
                seq: 1,
                ..DeploymentState::default()
            },
        )
        .await
        .expect("write local");

        let remote = DeploymentState {
            seq: 5,
            files: vec![DeployedFile {
                path: String::from("jobs/run.py"),
                is_notebook: true,
            }],
            ..DeploymentState::default()
        };
        bundle
            .workspace()
            .expect("ws")
            .write_file(
                "/bundles/etl/state/deployment.json",
                serde_json::to_vec(&remote).expect("json"),
            )
            .await
            .expect("push");

        let diags = apply(&mut bundle, &PullDeploymentState).await;
        assert!(!diags.has_error());

        let local = read_local(&bundle.deployment_state_file())
            .await
            .expect("read")
            .expect("state");
        assert_eq!(local.seq, 5);

        let snapshot_file =
            Snapshot::file_for(&bundle.snapshot_dir(), "", "/bundles/etl/files");
        let snapshot = Snapshot::load(&snapshot_file, "/bundles/etl/files").await;
        assert_eq!(snapshot.files["jobs/run.py"].mtime_ms, 0);
        assert!(snapshot.files["jobs/run.py"].is_notebook);
    }

    #[tokio::test]
    async fn test_pull_rejects_newer_schema_version() {
        let dir = TempDir::new().expect("tempdir");
        let mut bundle = bundle_in(&dir).await;
        let remote = DeploymentState {
            version: STATE_VERSION + 1,
            cli_version: String::from("99.0.0"),
            ..DeploymentState::default()
        };
        bundle
            .workspace()
            .expect("ws")
            .write_file(
                "/bundles/etl/state/deployment.json",
                serde_json::to_vec(&remote).expect("json"),
            )
            .await
            .expect("push");

        let diags = apply(&mut bundle, &PullDeploymentState).await;
        assert!(diags.has_error());
        assert!(diags
            .first_error()
            .expect("error")
            .summary
            .contains("upgrade required"));
    }

    #[tokio::test]
    async fn test_push_bumps_seq_and_lists_synced_files() {
        let dir = TempDir::new().expect("tempdir");
        let mut bundle = bundle_in(&dir).await;
        bundle.cli_version = String::from("1.2.3");

        let mut snapshot = Snapshot::new("/bundles/etl/files");
        snapshot.files.insert(
            String::from("query.sql"),
            crate::sync::FileEntry {
                mtime_ms: 42,
                is_notebook: false,
            },
        );
        snapshot
            .save(&Snapshot::file_for(
                &bundle.snapshot_dir(),
                "",
                "/bundles/etl/files",
            ))
            .await
            .expect("save");

        let diags = apply(&mut bundle, &PushDeploymentState).await;
        assert!(!diags.has_error());
        let diags = apply(&mut bundle, &PushDeploymentState).await;
        assert!(!diags.has_error());

        let local = read_local(&bundle.deployment_state_file())
            .await
            .expect("read")
            .expect("state");
        assert_eq!(local.seq, 2);
        assert_eq!(local.cli_version, "1.2.3");
        assert_eq!(local.files[0].path, "query.sql");

        let pushed = bundle
            .workspace()
            .expect("ws")
            .read_file("/bundles/etl/state/deployment.json")
            .await
            .expect("read")
            .expect("remote state");
        let pushed: DeploymentState = serde_json::from_slice(&pushed).expect("json");
        assert_eq!(pushed.seq, 2);
    }
}
