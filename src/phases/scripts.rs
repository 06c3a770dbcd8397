//! Lifecycle hook scripts.
//!
//! A bundle may declare shell hooks under `experimental.scripts`, keyed by
//! hook name. Each hook runs through `sh -c` in the bundle root; a nonzero
//! exit fails the phase.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::bundle::Bundle;
use crate::error::{ConfigError, LakewardError, Result};
use crate::mutator::{Diagnostic, Diagnostics, Mutator};

/// Runs the script of one lifecycle hook, when configured.
pub struct RunScript {
    hook: &'static str,
}

impl RunScript {
    /// A mutator for the named hook.
    #[must_use]
    pub const fn new(hook: &'static str) -> Self {
        Self { hook }
    }
}

#[async_trait]
impl Mutator for RunScript {
    fn name(&self) -> &'static str {
        self.hook
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let Some(command) = bundle.config.experimental.scripts.get(self.hook).cloned() else {
            debug!(hook = self.hook, "no script configured");
            return Diagnostics::new();
        };
        match run_hook(self.hook, &command, &bundle.root).await {
            Ok(output) if !output.trim().is_empty() => Diagnostics::single(
                Diagnostic::info(format!("script '{}' succeeded", self.hook)).with_detail(output),
            ),
            Ok(_) => Diagnostics::new(),
            Err(err) => Diagnostics::from_error(err),
        }
    }
}

/// Runs one hook command through `sh -c` in `workdir`.
///
/// # Errors
///
/// Fails when the shell cannot be started or the command exits nonzero.
pub async fn run_hook(hook: &str, command: &str, workdir: &Path) -> Result<String> {
    info!(hook, command, "running script");
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(workdir)
        .output()
        .await
        .map_err(|e| {
            LakewardError::Config(ConfigError::ScriptFailed {
                hook: hook.to_string(),
                code: e.raw_os_error().unwrap_or(-1),
            })
        })?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(LakewardError::Config(ConfigError::ScriptFailed {
            hook: hook.to_string(),
            code: output.status.code().unwrap_or(-1),
        }));
    }
    Ok(format!("{stdout}{stderr}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutator::apply;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unconfigured_hook_is_noop() {
        let mut bundle = Bundle::for_tests();
        let diags = apply(&mut bundle, &RunScript::new("predeploy")).await;
        assert!(diags.is_empty());
    }

    #[tokio::test]
    async fn test_hook_runs_in_bundle_root() {
        let dir = TempDir::new().expect("tempdir");
        let mut bundle = Bundle::for_tests();
        bundle.root = dir.path().to_path_buf();
        bundle
            .config
            .experimental
            .scripts
            .insert(String::from("prebuild"), String::from("touch built.marker"));

        let diags = apply(&mut bundle, &RunScript::new("prebuild")).await;
        assert!(!diags.has_error());
        assert!(dir.path().join("built.marker").is_file());
    }

    #[tokio::test]
    async fn test_failing_hook_reports_exit_code() {
        let dir = TempDir::new().expect("tempdir");
        let mut bundle = Bundle::for_tests();
        bundle.root = dir.path().to_path_buf();
        bundle
            .config
            .experimental
            .scripts
            .insert(String::from("postdeploy"), String::from("exit 7"));

        let diags = apply(&mut bundle, &RunScript::new("postdeploy")).await;
        assert!(diags.has_error());
        assert!(diags
            .first_error()
            .expect("error")
            .summary
            .contains("postdeploy"));
    }
}
