//! The active-runs guard.
//!
//! With `bundle.deployment.fail_on_active_runs` set, a deploy refuses to
//! overwrite jobs with active runs or pipelines with an update in flight.
//! Pipelines in a terminal or absent state are safe to replace.

use async_trait::async_trait;
use futures::future::{self, FutureExt};
use tracing::debug;

use crate::bundle::Bundle;
use crate::error::{LakewardError, PolicyError, Result};
use crate::mutator::{Diagnostics, Mutator};
use crate::workspace::{with_retries, DEFAULT_ATTEMPTS};

/// Fails the deploy when a declared job or pipeline is currently running.
pub struct CheckActiveRuns;

#[async_trait]
impl Mutator for CheckActiveRuns {
    fn name(&self) -> &'static str {
        "CheckActiveRuns"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        if !bundle.config.bundle.deployment.fail_on_active_runs {
            debug!("active-runs guard disabled");
            return Diagnostics::new();
        }
        match check(bundle).await {
            Ok(()) => Diagnostics::new(),
            Err(err) => Diagnostics::from_error(err),
        }
    }
}

async fn check(bundle: &Bundle) -> Result<()> {
    let workspace = bundle.workspace()?;

    // All resources are queried concurrently; the first trip or transport
    // failure wins.
    let job_checks = bundle.config.resources.jobs.keys().map(|key| {
        let workspace = workspace.clone();
        async move {
            let running = with_retries("job run check", DEFAULT_ATTEMPTS, || {
                workspace.job_has_active_runs(key)
            })
            .await?;
            if running {
                return Err(LakewardError::Policy(PolicyError::ResourceRunning {
                    resource_type: String::from("job"),
                    name: key.clone(),
                }));
            }
            Ok(())
        }
        .boxed()
    });
    let pipeline_checks = bundle.config.resources.pipelines.keys().map(|key| {
        let workspace = workspace.clone();
        async move {
            let state = with_retries("pipeline state check", DEFAULT_ATTEMPTS, || {
                workspace.pipeline_state(key)
            })
            .await?;
            if !state.is_safe_to_deploy() {
                return Err(LakewardError::Policy(PolicyError::ResourceRunning {
                    resource_type: String::from("pipeline"),
                    name: key.clone(),
                }));
            }
            Ok(())
        }
        .boxed()
    });

    future::try_join_all(job_checks.chain(pipeline_checks)).await?;
    Ok(())
}
