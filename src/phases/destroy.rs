//! Destroy-phase mutators beyond the engine teardown.

use async_trait::async_trait;
use tracing::info;

use crate::bundle::Bundle;
use crate::error::Result;
use crate::mutator::{Diagnostic, Diagnostics, Mutator};
use crate::workspace::{with_retries, DEFAULT_ATTEMPTS};

/// Refuses to destroy without an explicit go-ahead.
///
/// Destruction is not interactive: the confirmation is `--auto-approve` on
/// the command line.
pub struct ConfirmDestroy;

#[async_trait]
impl Mutator for ConfirmDestroy {
    fn name(&self) -> &'static str {
        "ConfirmDestroy"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        if bundle.auto_approve {
            return Diagnostics::new();
        }
        Diagnostics::single(Diagnostic::error(
            "destroy removes all deployed resources and remote files; re-run with --auto-approve to confirm",
        ))
    }
}

/// Removes the bundle's remote root after the engine teardown.
pub struct DeleteRemoteFiles;

#[async_trait]
impl Mutator for DeleteRemoteFiles {
    fn name(&self) -> &'static str {
        "DeleteRemoteFiles"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        match delete_remote_root(bundle).await {
            Ok(Some(root)) => {
                Diagnostics::single(Diagnostic::info(format!("removed remote root {root}")))
            }
            Ok(None) => Diagnostics::new(),
            Err(err) => Diagnostics::from_error(err),
        }
    }
}

async fn delete_remote_root(bundle: &Bundle) -> Result<Option<String>> {
    let Some(root_path) = bundle.config.workspace.root_path.clone() else {
        return Ok(None);
    };
    let workspace = bundle.workspace()?;
    info!(root = %root_path, "removing remote root");
    with_retries("remote delete", DEFAULT_ATTEMPTS, || {
        workspace.delete_directory(&root_path, true)
    })
    .await?;
    Ok(Some(root_path))
}

/// Drops the local per-target cache (engine workdir, snapshots, state copy).
pub struct ClearCaches;

#[async_trait]
impl Mutator for ClearCaches {
    fn name(&self) -> &'static str {
        "ClearCaches"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let dir = bundle.target_cache_dir();
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Diagnostics::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Diagnostics::new(),
            Err(e) => Diagnostics::from_error(e.into()),
        }
    }
}
