//! IaC engine driven through its command-line binary.

use std::path::Path;
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{IacError, LakewardError, Result};

use super::IacEngine;

/// Runs the engine binary as a subprocess in the working directory.
#[derive(Debug, Clone)]
pub struct ShellEngine {
    /// Engine binary name or path.
    binary: String,
}

impl ShellEngine {
    /// Creates an engine handle for `binary`.
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, workdir: &Path, args: &[&str]) -> Result<Output> {
        debug!(binary = %self.binary, ?args, "running IaC engine");
        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(workdir)
            .output()
            .await
            .map_err(|e| {
                LakewardError::Iac(IacError::operation(
                    args.first().copied().unwrap_or("run"),
                    format!("failed to start '{}': {e}", self.binary),
                ))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LakewardError::Iac(IacError::operation(
                args.first().copied().unwrap_or("run"),
                stderr.trim().to_string(),
            )));
        }
        Ok(output)
    }
}

#[async_trait]
impl IacEngine for ShellEngine {
    async fn init(&self, workdir: &Path) -> Result<()> {
        self.run(workdir, &["init", "-input=false", "-no-color"]).await?;
        Ok(())
    }

    async fn plan(&self, workdir: &Path) -> Result<String> {
        let output = self
            .run(workdir, &["plan", "-input=false", "-no-color"])
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn apply(&self, workdir: &Path) -> Result<()> {
        info!("applying IaC configuration");
        self.run(
            workdir,
            &["apply", "-input=false", "-auto-approve", "-no-color"],
        )
        .await?;
        Ok(())
    }

    async fn destroy(&self, workdir: &Path) -> Result<()> {
        info!("destroying IaC-managed resources");
        self.run(
            workdir,
            &["destroy", "-input=false", "-auto-approve", "-no-color"],
        )
        .await?;
        Ok(())
    }
}
