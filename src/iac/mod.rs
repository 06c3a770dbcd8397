//! Infrastructure-as-code engine capability.
//!
//! Resource creation and teardown is delegated to an external IaC engine.
//! The engine is modeled as a capability ([`IacEngine`]) operating on a
//! working directory that holds a rendered configuration
//! ([`render::render_config`]) and the engine's native state document. The
//! crate never interprets that document beyond the `serial` and `lineage`
//! fields used for staleness detection.

pub mod render;
mod shell;
mod state;

pub use render::{render_config, write_config, CONFIG_FILE_NAME};
pub use shell::ShellEngine;
pub use state::{pull_iac_state, push_iac_state, IacState, REMOTE_STATE_FILE, STATE_FILE_NAME};

use std::path::Path;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::Result;

/// The external IaC engine.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IacEngine: Send + Sync {
    /// Prepares the working directory (provider/plugin setup).
    async fn init(&self, workdir: &Path) -> Result<()>;

    /// Computes a change plan and returns its human-readable summary.
    async fn plan(&self, workdir: &Path) -> Result<String>;

    /// Applies the rendered configuration.
    async fn apply(&self, workdir: &Path) -> Result<()>;

    /// Destroys everything the state tracks.
    async fn destroy(&self, workdir: &Path) -> Result<()>;
}
