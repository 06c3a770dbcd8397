//! Sync snapshots.
//!
//! A snapshot records, per target, which local files were uploaded and with
//! what modification time. It lives under the bundle cache and is keyed by
//! the remote destination, so the same tree synced to two hosts or targets
//! keeps independent snapshots. A missing or unreadable snapshot degrades to
//! a full re-upload, never to an error.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::Result;

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// One uploaded file as the snapshot remembers it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Local modification time, milliseconds since the epoch. Zero forces a
    /// re-upload on the next sync.
    pub mtime_ms: i64,
    /// Whether the file was uploaded as a notebook.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_notebook: bool,
}

/// The uploaded state of one local tree against one remote destination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot format version.
    #[serde(default)]
    pub version: u32,
    /// Remote directory the snapshot tracks.
    #[serde(default)]
    pub remote_path: String,
    /// Uploaded files keyed by local path relative to the bundle root.
    #[serde(default)]
    pub files: IndexMap<String, FileEntry>,
}

impl Snapshot {
    /// A fresh snapshot for `remote_path`.
    #[must_use]
    pub fn new(remote_path: &str) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            remote_path: remote_path.to_string(),
            files: IndexMap::new(),
        }
    }

    /// The snapshot file for a host and remote directory, under `dir`.
    ///
    /// The name is a digest of both so distinct destinations never share a
    /// snapshot.
    #[must_use]
    pub fn file_for(dir: &Path, host: &str, remote_path: &str) -> PathBuf {
        let digest = Sha256::digest(format!("{host}|{remote_path}"));
        dir.join(format!("{}.json", hex::encode(digest)))
    }

    /// Loads the snapshot at `file`, or a fresh one when it is missing or
    /// unreadable.
    pub async fn load(file: &Path, remote_path: &str) -> Self {
        let bytes = match fs::read(file).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = %file.display(), "no sync snapshot, full sync");
                return Self::new(remote_path);
            }
            Err(e) => {
                warn!(file = %file.display(), error = %e, "cannot read sync snapshot, full sync");
                return Self::new(remote_path);
            }
        };
        match serde_json::from_slice::<Self>(&bytes) {
            Ok(snapshot) if snapshot.version <= SNAPSHOT_VERSION => snapshot,
            Ok(snapshot) => {
                warn!(
                    version = snapshot.version,
                    "sync snapshot from a newer version, full sync"
                );
                Self::new(remote_path)
            }
            Err(e) => {
                warn!(file = %file.display(), error = %e, "corrupt sync snapshot, full sync");
                Self::new(remote_path)
            }
        }
    }

    /// Writes the snapshot to `file` atomically.
    ///
    /// # Errors
    ///
    /// Fails when the snapshot cannot be serialized or written.
    pub async fn save(&self, file: &Path) -> Result<()> {
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| crate::error::LakewardError::internal(e.to_string()))?;
        let tmp = file.with_extension("json.tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, file).await?;
        Ok(())
    }

    /// Rebuilds the snapshot from a list of remotely known files, with all
    /// modification times zeroed so every file is re-uploaded and compared
    /// on the next sync.
    #[must_use]
    pub fn reseeded(remote_path: &str, files: impl IntoIterator<Item = (String, bool)>) -> Self {
        let mut snapshot = Self::new(remote_path);
        for (path, is_notebook) in files {
            snapshot.files.insert(
                path,
                FileEntry {
                    mtime_ms: 0,
                    is_notebook,
                },
            );
        }
        snapshot
    }
}
