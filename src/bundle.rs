//! The bundle aggregate.
//!
//! One [`Bundle`] lives for the duration of a CLI invocation. It owns the
//! dynamic configuration tree, its typed projection, the CLI options that
//! affect deployment, and handles to the workspace and IaC capabilities.
//! Mutators receive it mutably and are the only place the tree changes.

use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::BundleConfig;
use crate::dynvalue::{from_typed, to_typed, Value};
use crate::error::{LakewardError, Result};
use crate::iac::IacEngine;
use crate::workspace::{LockInfo, WorkspaceClient};

/// Name of the local cache directory under the bundle root.
pub const CACHE_DIR_NAME: &str = ".lakeward";

/// All state of one CLI invocation against a bundle.
pub struct Bundle {
    /// Bundle root directory (holds the root config file).
    pub root: PathBuf,
    /// Target requested on the command line, if any.
    pub target: Option<String>,
    /// The dynamic configuration tree.
    pub tree: Value,
    /// Typed projection of the tree; refreshed after tree mutations.
    pub config: BundleConfig,
    /// Configuration files the tree was loaded from.
    pub config_files: Vec<PathBuf>,
    /// `--var NAME=value` overrides.
    pub var_overrides: IndexMap<String, String>,
    /// Version of this binary, stamped into deployment state.
    pub cli_version: String,
    /// Bypass the deployment lock (`--force-lock`).
    pub force_lock: bool,
    /// Skip interactive confirmation (`--auto-approve`).
    pub auto_approve: bool,
    /// The held deployment lock, between acquire and release.
    pub lock: Option<LockInfo>,
    workspace: Option<Arc<dyn WorkspaceClient>>,
    iac: Option<Arc<dyn IacEngine>>,
}

impl Bundle {
    /// Creates a bundle rooted at `root` with its capabilities attached.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        workspace: Arc<dyn WorkspaceClient>,
        iac: Arc<dyn IacEngine>,
    ) -> Self {
        Self {
            root: root.into(),
            target: None,
            tree: Value::empty_map(),
            config: BundleConfig::default(),
            config_files: Vec::new(),
            var_overrides: IndexMap::new(),
            cli_version: env!("CARGO_PKG_VERSION").to_string(),
            force_lock: false,
            auto_approve: false,
            lock: None,
            workspace: Some(workspace),
            iac: Some(iac),
        }
    }

    /// The workspace client.
    ///
    /// # Errors
    ///
    /// Returns an internal error when no client is attached.
    pub fn workspace(&self) -> Result<Arc<dyn WorkspaceClient>> {
        self.workspace
            .clone()
            .ok_or_else(|| LakewardError::internal("no workspace client attached"))
    }

    /// The IaC engine handle.
    ///
    /// # Errors
    ///
    /// Returns an internal error when no engine is attached.
    pub fn iac(&self) -> Result<Arc<dyn IacEngine>> {
        self.iac
            .clone()
            .ok_or_else(|| LakewardError::internal("no IaC engine attached"))
    }

    /// The selected target name, after target selection has run.
    #[must_use]
    pub fn selected_target(&self) -> &str {
        self.config
            .bundle
            .target
            .as_deref()
            .unwrap_or("default")
    }

    /// Local cache directory of the bundle.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(CACHE_DIR_NAME)
    }

    /// Per-target cache directory.
    #[must_use]
    pub fn target_cache_dir(&self) -> PathBuf {
        self.cache_dir().join(self.selected_target())
    }

    /// Working directory of the IaC engine for the selected target.
    #[must_use]
    pub fn engine_workdir(&self) -> PathBuf {
        self.target_cache_dir().join("engine")
    }

    /// Directory holding file-sync snapshots for the selected target.
    #[must_use]
    pub fn snapshot_dir(&self) -> PathBuf {
        self.target_cache_dir().join("sync-snapshots")
    }

    /// Local copy of the deployment state document.
    #[must_use]
    pub fn deployment_state_file(&self) -> PathBuf {
        self.target_cache_dir().join("deployment.json")
    }

    /// Remote state directory of the bundle.
    ///
    /// # Errors
    ///
    /// Fails when `workspace.state_path` has not been derived yet.
    pub fn state_path(&self) -> Result<&str> {
        self.config
            .workspace
            .state_path
            .as_deref()
            .ok_or_else(|| LakewardError::internal("workspace.state_path is not set"))
    }

    /// Re-projects the dynamic tree onto the typed config.
    ///
    /// # Errors
    ///
    /// Fails when the tree does not match the schema.
    pub fn refresh_typed(&mut self) -> Result<()> {
        self.config = to_typed(&self.tree)?;
        Ok(())
    }

    /// Writes the typed config back into the dynamic tree, preserving
    /// source locations for unchanged paths.
    ///
    /// # Errors
    ///
    /// Fails when the typed config cannot be serialized.
    pub fn commit_typed(&mut self) -> Result<()> {
        self.tree = from_typed(&self.config, &self.tree)?;
        Ok(())
    }

    /// A bundle with no capabilities, for unit tests of tree mutators.
    #[cfg(test)]
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            root: PathBuf::from("."),
            target: None,
            tree: Value::empty_map(),
            config: BundleConfig::default(),
            config_files: Vec::new(),
            var_overrides: IndexMap::new(),
            cli_version: String::from("0.0.0-test"),
            force_lock: false,
            auto_approve: false,
            lock: None,
            workspace: None,
            iac: None,
        }
    }

    /// Attaches a workspace client, replacing any existing one.
    #[cfg(test)]
    pub fn set_workspace(&mut self, workspace: Arc<dyn WorkspaceClient>) {
        self.workspace = Some(workspace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynvalue::Path;

    #[test]
    fn test_cache_layout_follows_target() {
        let mut bundle = Bundle::for_tests();
        assert!(bundle.target_cache_dir().ends_with(".lakeward/default"));

        bundle.config.bundle.target = Some(String::from("prod"));
        assert!(bundle.engine_workdir().ends_with(".lakeward/prod/engine"));
        assert!(bundle
            .deployment_state_file()
            .ends_with(".lakeward/prod/deployment.json"));
    }

    #[test]
    fn test_typed_roundtrip() {
        let mut bundle = Bundle::for_tests();
        bundle
            .tree
            .set_at(
                &Path::parse("bundle.name").expect("path"),
                Value::from("etl"),
            )
            .expect("set");

        bundle.refresh_typed().expect("project");
        assert_eq!(bundle.config.bundle.name, "etl");

        bundle.config.bundle.name = String::from("etl-renamed");
        bundle.commit_typed().expect("commit");
        assert_eq!(
            bundle
                .tree
                .get_str_path("bundle.name")
                .and_then(Value::as_str),
            Some("etl-renamed")
        );
    }

    #[test]
    fn test_missing_capabilities_error() {
        let bundle = Bundle::for_tests();
        assert!(bundle.workspace().is_err());
        assert!(bundle.iac().is_err());
        assert!(bundle.state_path().is_err());
    }
}
