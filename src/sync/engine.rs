//! The sync pass.
//!
//! Walks the bundle root, filters it through the configured include and
//! exclude patterns, diffs against the snapshot and replays the plan against
//! the workspace with bounded upload parallelism.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, TryStreamExt};
use indexmap::IndexMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::bundle::{Bundle, CACHE_DIR_NAME};
use crate::config::SyncSpec;
use crate::error::{LakewardError, Result};
use crate::mutator::{Diagnostic, Diagnostics, Mutator};
use crate::sync::diff::{compute_plan, LocalFile, SyncPlan};
use crate::sync::notebook::is_notebook;
use crate::sync::snapshot::{FileEntry, Snapshot};
use crate::workspace::{with_retries, WorkspaceClient, DEFAULT_ATTEMPTS};

/// Uploads running at once.
const MAX_PARALLEL_PUTS: usize = 10;

/// Directories never synced.
const ALWAYS_EXCLUDED: [&str; 2] = [CACHE_DIR_NAME, ".git"];

/// Counts of one sync pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncStats {
    /// Files uploaded.
    pub uploaded: usize,
    /// Remote files deleted.
    pub deleted: usize,
}

/// Runs one sync pass for the bundle.
///
/// # Errors
///
/// Fails when the local tree cannot be walked, a sync pattern is invalid,
/// or a workspace operation exhausts its retries.
pub async fn sync_once(bundle: &Bundle) -> Result<SyncStats> {
    let file_path = bundle
        .config
        .workspace
        .file_path
        .as_deref()
        .ok_or_else(|| LakewardError::internal("workspace.file_path is not set"))?;
    let host = bundle.config.workspace.host.as_deref().unwrap_or_default();
    let workspace = bundle.workspace()?;

    let snapshot_file = Snapshot::file_for(&bundle.snapshot_dir(), host, file_path);
    let snapshot = Snapshot::load(&snapshot_file, file_path).await;
    let local = list_local_files(&bundle.root, &bundle.config.sync).await?;
    let plan = compute_plan(file_path, &local, &snapshot);
    if plan.is_empty() {
        debug!("sync: nothing to do");
        return Ok(SyncStats::default());
    }

    let stats = execute_plan(workspace.as_ref(), &plan).await?;

    let mut updated = Snapshot::new(file_path);
    for (relative, file) in &local {
        updated.files.insert(
            relative.clone(),
            FileEntry {
                mtime_ms: file.mtime_ms,
                is_notebook: file.is_notebook,
            },
        );
    }
    updated.save(&snapshot_file).await?;
    info!(
        uploaded = stats.uploaded,
        deleted = stats.deleted,
        "sync complete"
    );
    Ok(stats)
}

async fn execute_plan(workspace: &dyn WorkspaceClient, plan: &SyncPlan) -> Result<SyncStats> {
    for dir in &plan.mkdirs {
        with_retries("mkdir", DEFAULT_ATTEMPTS, || workspace.mkdir(dir)).await?;
    }

    stream::iter(plan.puts.iter().map(Ok::<_, LakewardError>))
        .try_for_each_concurrent(MAX_PARALLEL_PUTS, |put| async move {
            let content = tokio::fs::read(&put.local).await?;
            debug!(file = %put.relative, remote = %put.remote, "uploading");
            with_retries("upload", DEFAULT_ATTEMPTS, || {
                workspace.upload_file(&put.remote, content.clone())
            })
            .await
        })
        .await?;

    for remote in &plan.deletes {
        debug!(remote = %remote, "deleting");
        with_retries("delete", DEFAULT_ATTEMPTS, || workspace.delete_file(remote)).await?;
    }

    // Tiers go deepest-first; a directory that is not empty remotely (files
    // placed outside the sync) is left alone.
    for tier in &plan.rmdir_tiers {
        for dir in tier {
            if let Err(err) = workspace.delete_directory(dir, false).await {
                warn!(dir = %dir, error = %err, "could not remove remote directory");
            }
        }
    }

    Ok(SyncStats {
        uploaded: plan.puts.len(),
        deleted: plan.deletes.len(),
    })
}

/// Keeps the remote in step with the local tree until `stop` signals.
///
/// A pass that is underway when the signal arrives finishes before the loop
/// exits, so the snapshot on disk always matches what was uploaded.
///
/// # Errors
///
/// Fails when a sync pass fails.
pub async fn watch_loop(
    bundle: &Bundle,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        sync_once(bundle).await?;
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    return Ok(());
                }
            }
        }
    }
}

/// Walks the bundle root applying the sync filters.
async fn list_local_files(root: &Path, spec: &SyncSpec) -> Result<IndexMap<String, LocalFile>> {
    let excludes = compile_patterns(&spec.exclude)?;
    let includes = compile_patterns(&spec.include)?;

    let mut files = IndexMap::new();
    let walker = WalkDir::new(root).sort_by_file_name().into_iter();
    for entry in walker.filter_entry(|e| {
        e.file_name()
            .to_str()
            .is_none_or(|name| !ALWAYS_EXCLUDED.contains(&name))
    }) {
        let entry = entry.map_err(|e| LakewardError::internal(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if matches_any(&excludes, &relative) && !matches_any(&includes, &relative) {
            continue;
        }
        let metadata = entry
            .metadata()
            .map_err(|e| LakewardError::internal(e.to_string()))?;
        let mtime_ms = metadata
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
        let is_notebook = is_notebook(entry.path()).await.unwrap_or(false);
        files.insert(
            relative,
            LocalFile {
                path: entry.path().to_path_buf(),
                mtime_ms,
                is_notebook,
            },
        );
    }
    Ok(files)
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| LakewardError::internal(format!("invalid sync pattern '{p}': {e}")))
        })
        .collect()
}

/// Whether any pattern matches the path or one of its ancestor directories.
fn matches_any(patterns: &[glob::Pattern], relative: &str) -> bool {
    patterns.iter().any(|pattern| {
        if pattern.matches(relative) {
            return true;
        }
        let mut index = 0;
        while let Some(slash) = relative[index..].find('/') {
            index += slash;
            if pattern.matches(&relative[..index]) {
                return true;
            }
            index += 1;
        }
        false
    })
}

/// Mirrors the source tree into the remote file area.
pub struct SyncFiles;

#[async_trait]
impl Mutator for SyncFiles {
    fn name(&self) -> &'static str {
        "SyncFiles"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        match sync_once(bundle).await {
            Ok(stats) if stats.uploaded + stats.deleted > 0 => {
                Diagnostics::single(Diagnostic::info(format!(
                    "synced files: {} uploaded, {} deleted",
                    stats.uploaded, stats.deleted
                )))
            }
            Ok(_) => Diagnostics::new(),
            Err(err) => Diagnostics::from_error(err),
        }
    }
}
