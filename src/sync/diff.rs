//! Sync plan computation.
//!
//! Compares the local tree against the last snapshot and produces the
//! operations that reconcile the remote: directory creations first, then
//! uploads and deletions, then removals of now-empty directories pruned
//! leaves-first so a parent is never removed before its children.

use std::collections::BTreeSet;
use std::path::PathBuf;

use indexmap::IndexMap;

use crate::sync::notebook::remote_name;
use crate::sync::snapshot::Snapshot;

/// One local file as the walker found it.
#[derive(Debug, Clone)]
pub struct LocalFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Modification time, milliseconds since the epoch.
    pub mtime_ms: i64,
    /// Whether the file carries the notebook marker.
    pub is_notebook: bool,
}

/// One upload operation.
#[derive(Debug, Clone)]
pub struct Put {
    /// Local path relative to the bundle root.
    pub relative: String,
    /// Absolute local path.
    pub local: PathBuf,
    /// Full remote destination.
    pub remote: String,
    /// Whether the file uploads as a notebook.
    pub is_notebook: bool,
}

/// The operations of one sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    /// Remote directories to create, deepest only (parents are implied).
    pub mkdirs: Vec<String>,
    /// Files to upload.
    pub puts: Vec<Put>,
    /// Remote files to delete.
    pub deletes: Vec<String>,
    /// Remote directories to remove, grouped deepest-first.
    pub rmdir_tiers: Vec<Vec<String>>,
}

impl SyncPlan {
    /// Whether the plan does nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mkdirs.is_empty()
            && self.puts.is_empty()
            && self.deletes.is_empty()
            && self.rmdir_tiers.is_empty()
    }
}

/// Computes the plan reconciling `local` with what `snapshot` remembers.
#[must_use]
pub fn compute_plan(
    remote_base: &str,
    local: &IndexMap<String, LocalFile>,
    snapshot: &Snapshot,
) -> SyncPlan {
    let base = remote_base.trim_end_matches('/');
    let full = |name: &str| format!("{base}/{name}");

    let mut plan = SyncPlan::default();

    for (relative, file) in local {
        let previous = snapshot.files.get(relative);
        match previous {
            Some(entry) if entry.is_notebook != file.is_notebook => {
                // A plain/notebook conversion changes the remote name, so
                // the old object has to go before the new one lands.
                plan.deletes
                    .push(full(&remote_name(relative, entry.is_notebook)));
            }
            // Only an advanced mtime counts as a change; a restored or
            // touched-backwards file stays as uploaded.
            Some(entry) if entry.mtime_ms >= file.mtime_ms => continue,
            _ => {}
        }
        plan.puts.push(Put {
            relative: relative.clone(),
            local: file.path.clone(),
            remote: full(&remote_name(relative, file.is_notebook)),
            is_notebook: file.is_notebook,
        });
    }

    for (relative, entry) in &snapshot.files {
        if !local.contains_key(relative) {
            plan.deletes
                .push(full(&remote_name(relative, entry.is_notebook)));
        }
    }

    let dirs_before = ancestor_dirs(snapshot.files.keys());
    let dirs_after = ancestor_dirs(local.keys());

    let mut created: Vec<&String> = dirs_after.difference(&dirs_before).collect();
    created.sort();
    // A deeper mkdir creates its parents, so prefixes of other new
    // directories are dropped.
    plan.mkdirs = created
        .iter()
        .filter(|dir| {
            !created
                .iter()
                .any(|other| other.len() > dir.len() && other.starts_with(&format!("{dir}/")))
        })
        .map(|dir| full(dir))
        .collect();

    let removed: BTreeSet<&String> = dirs_before.difference(&dirs_after).collect();
    let mut by_depth: IndexMap<usize, Vec<String>> = IndexMap::new();
    for dir in removed {
        let depth = dir.matches('/').count();
        by_depth.entry(depth).or_default().push(full(dir));
    }
    let mut depths: Vec<usize> = by_depth.keys().copied().collect();
    depths.sort_unstable_by(|a, b| b.cmp(a));
    plan.rmdir_tiers = depths
        .into_iter()
        .filter_map(|depth| by_depth.shift_remove(&depth))
        .collect();

    plan
}

/// All ancestor directories, bundle-relative, of a set of relative paths.
fn ancestor_dirs<'a>(paths: impl Iterator<Item = &'a String>) -> BTreeSet<String> {
    let mut dirs = BTreeSet::new();
    for path in paths {
        let mut index = 0;
        while let Some(slash) = path[index..].find('/') {
            index += slash;
            dirs.insert(path[..index].to_string());
            index += 1;
        }
    }
    dirs
}
