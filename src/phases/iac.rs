//! IaC engine steps of the deploy and destroy phases.
//!
//! Each step wraps one engine or state operation as a mutator so the phase
//! sequences can order them: state is pulled before the engine runs, and
//! pushed only after an apply succeeded.

use async_trait::async_trait;
use tracing::info;

use crate::bundle::Bundle;
use crate::error::Result;
use crate::iac::{pull_iac_state, push_iac_state, write_config};
use crate::mutator::{Diagnostic, Diagnostics, Mutator};
use crate::workspace::{with_retries, DEFAULT_ATTEMPTS};

/// Pulls the remote IaC state into the engine workdir.
pub struct PullIacState;

#[async_trait]
impl Mutator for PullIacState {
    fn name(&self) -> &'static str {
        "PullIacState"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        into_diags(pull(bundle).await)
    }
}

async fn pull(bundle: &Bundle) -> Result<()> {
    let state_path = bundle.state_path()?.to_string();
    let workspace = bundle.workspace()?;
    let workdir = bundle.engine_workdir();
    with_retries("IaC state pull", DEFAULT_ATTEMPTS, || {
        pull_iac_state(workspace.as_ref(), &state_path, &workdir)
    })
    .await
}

/// Pushes the local IaC state to the remote state area.
pub struct PushIacState;

#[async_trait]
impl Mutator for PushIacState {
    fn name(&self) -> &'static str {
        "PushIacState"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        into_diags(push(bundle).await)
    }
}

async fn push(bundle: &Bundle) -> Result<()> {
    let state_path = bundle.state_path()?.to_string();
    let workspace = bundle.workspace()?;
    let workdir = bundle.engine_workdir();
    with_retries("IaC state push", DEFAULT_ATTEMPTS, || {
        push_iac_state(workspace.as_ref(), &state_path, &workdir)
    })
    .await
}

/// Renders the resource configuration into the engine workdir.
pub struct RenderIacConfig;

#[async_trait]
impl Mutator for RenderIacConfig {
    fn name(&self) -> &'static str {
        "RenderIacConfig"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        if let Err(err) = bundle.refresh_typed() {
            return Diagnostics::from_error(err);
        }
        match write_config(&bundle.config, &bundle.engine_workdir()).await {
            Ok(file) => {
                info!(file = %file.display(), "engine configuration rendered");
                Diagnostics::new()
            }
            Err(err) => Diagnostics::from_error(err),
        }
    }
}

/// Initializes the engine and applies the rendered configuration.
pub struct ApplyIac;

#[async_trait]
impl Mutator for ApplyIac {
    fn name(&self) -> &'static str {
        "ApplyIac"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let engine = match bundle.iac() {
            Ok(engine) => engine,
            Err(err) => return Diagnostics::from_error(err),
        };
        let workdir = bundle.engine_workdir();
        if let Err(err) = engine.init(&workdir).await {
            return Diagnostics::from_error(err);
        }
        match engine.apply(&workdir).await {
            Ok(()) => Diagnostics::new(),
            Err(err) => Diagnostics::from_error(err),
        }
    }
}

/// Initializes the engine and destroys everything it manages.
pub struct DestroyIac;

#[async_trait]
impl Mutator for DestroyIac {
    fn name(&self) -> &'static str {
        "DestroyIac"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let engine = match bundle.iac() {
            Ok(engine) => engine,
            Err(err) => return Diagnostics::from_error(err),
        };
        let workdir = bundle.engine_workdir();
        if let Err(err) = engine.init(&workdir).await {
            return Diagnostics::from_error(err);
        }
        match engine.destroy(&workdir).await {
            Ok(()) => Diagnostics::single(Diagnostic::info("managed resources destroyed")),
            Err(err) => Diagnostics::from_error(err),
        }
    }
}

fn into_diags(result: Result<()>) -> Diagnostics {
    match result {
        Ok(()) => Diagnostics::new(),
        Err(err) => Diagnostics::from_error(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::User;
    use crate::iac::{IacState, STATE_FILE_NAME};
    use crate::mutator::apply;
    use crate::workspace::FsWorkspace;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_state_roundtrip_through_mutators() {
        let dir = TempDir::new().expect("tempdir");
        let mut bundle = Bundle::for_tests();
        bundle.root = dir.path().join("src-tree");
        bundle.config.workspace.state_path = Some(String::from("/bundles/etl/state"));
        bundle.set_workspace(Arc::new(FsWorkspace::new(
            dir.path().join("remote"),
            User {
                user_name: String::from("dev@example.com"),
                display_name: None,
            },
        )));

        let workdir = bundle.engine_workdir();
        tokio::fs::create_dir_all(&workdir).await.expect("mkdir");
        let state = IacState {
            serial: 3,
            lineage: String::from("abc"),
        };
        tokio::fs::write(
            workdir.join(STATE_FILE_NAME),
            serde_json::to_vec(&state).expect("json"),
        )
        .await
        .expect("write");

        assert!(!apply(&mut bundle, &PushIacState).await.has_error());

        tokio::fs::remove_file(workdir.join(STATE_FILE_NAME))
            .await
            .expect("remove");
        assert!(!apply(&mut bundle, &PullIacState).await.has_error());

        let pulled = tokio::fs::read(workdir.join(STATE_FILE_NAME))
            .await
            .expect("read");
        let pulled: IacState = serde_json::from_slice(&pulled).expect("json");
        assert_eq!(pulled.serial, 3);
    }

    #[tokio::test]
    async fn test_render_writes_engine_config() {
        let dir = TempDir::new().expect("tempdir");
        let mut bundle = Bundle::for_tests();
        bundle.root = dir.path().to_path_buf();
        bundle.config.resources.jobs.insert(
            String::from("nightly"),
            crate::config::resources::Job {
                name: String::from("nightly"),
                ..crate::config::resources::Job::default()
            },
        );
        bundle.commit_typed().expect("commit");

        let diags = apply(&mut bundle, &RenderIacConfig).await;
        assert!(!diags.has_error());
        let rendered = tokio::fs::read_to_string(bundle.engine_workdir().join("main.tf.json"))
            .await
            .expect("read");
        assert!(rendered.contains("\"job\""));
        assert!(rendered.contains("\"nightly\""));
    }
}
