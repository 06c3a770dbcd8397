//! Deployment mode transforms.
//!
//! `development` turns a target into a per-user sandbox: prefixed resource
//! names, paused triggers, relaxed locking. `production` goes the other way
//! and validates that the deployment is reproducible and runs as an explicit
//! identity.

use async_trait::async_trait;

use crate::bundle::Bundle;
use crate::config::resources::PauseStatus;
use crate::config::{Mode, User};
use crate::error::{LakewardError, PolicyError};
use crate::mutator::{Diagnostic, Diagnostics, Mutator};

/// Concurrent-run ceiling applied to jobs in development mode.
const DEV_CONCURRENT_RUNS: i64 = 4;

/// Applies the selected target's mode transform.
pub struct ProcessTargetMode;

#[async_trait]
impl Mutator for ProcessTargetMode {
    fn name(&self) -> &'static str {
        "ProcessTargetMode"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        if let Err(err) = bundle.refresh_typed() {
            return Diagnostics::from_error(err);
        }
        let diags = match bundle.config.bundle.mode {
            Some(Mode::Development) => apply_development(bundle),
            Some(Mode::Production) => apply_production(bundle),
            None => Diagnostics::new(),
        };
        if diags.has_error() {
            return diags;
        }
        if let Err(err) = bundle.commit_typed() {
            return Diagnostics::from_error(err);
        }
        diags
    }
}

fn current_user(bundle: &Bundle) -> Option<&User> {
    bundle.config.workspace.current_user.as_ref()
}

fn apply_development(bundle: &mut Bundle) -> Diagnostics {
    let Some(user) = current_user(bundle) else {
        return Diagnostics::single(Diagnostic::error(
            "development mode requires an authenticated user",
        ));
    };
    let short_name = user.short_name().to_string();

    // Workspace paths must be user-scoped; a shared path in dev mode is
    // almost certainly a misconfigured target.
    if let Some(root_path) = &bundle.config.workspace.root_path {
        if !root_path.contains(&short_name) {
            return Diagnostics::from_error(LakewardError::Policy(PolicyError::ModeViolation {
                message: format!(
                    "development mode requires workspace.root_path to contain '{short_name}', got '{root_path}'"
                ),
            }));
        }
    }

    let prefix = format!("[dev {short_name}] ");
    let resources = &mut bundle.config.resources;
    for job in resources.jobs.values_mut() {
        job.name = format!("{prefix}{}", job.name);
        job.tags
            .entry(String::from("dev"))
            .or_insert_with(|| short_name.clone());
        job.max_concurrent_runs.get_or_insert(DEV_CONCURRENT_RUNS);
        if let Some(schedule) = &mut job.schedule {
            schedule.pause_status.get_or_insert(PauseStatus::Paused);
        }
        if let Some(trigger) = &mut job.trigger {
            trigger.pause_status.get_or_insert(PauseStatus::Paused);
        }
        if let Some(continuous) = &mut job.continuous {
            continuous.pause_status.get_or_insert(PauseStatus::Paused);
        }
    }
    for pipeline in resources.pipelines.values_mut() {
        pipeline.name = format!("{prefix}{}", pipeline.name);
        pipeline.development = true;
    }
    for experiment in resources.experiments.values_mut() {
        experiment.name = format!("{prefix}{}", experiment.name);
    }
    for model in resources.models.values_mut() {
        model.name = format!("{prefix}{}", model.name);
    }
    for dashboard in resources.dashboards.values_mut() {
        dashboard.display_name = format!("{prefix}{}", dashboard.display_name);
    }

    // Single-user sandboxes do not need cross-machine locking.
    let lock = &mut bundle.config.bundle.deployment.lock;
    lock.enabled.get_or_insert(false);

    Diagnostics::new()
}

fn apply_production(bundle: &mut Bundle) -> Diagnostics {
    let mut diags = Diagnostics::new();

    for (key, pipeline) in &bundle.config.resources.pipelines {
        if pipeline.development {
            return Diagnostics::from_error(LakewardError::Policy(PolicyError::ModeViolation {
                message: format!(
                    "pipeline '{key}' has development: true, which production mode forbids"
                ),
            }));
        }
    }

    if bundle.config.bundle.git.inferred {
        diags.push(Diagnostic::warning(
            "git branch was inferred from the local repository; set bundle.git.branch explicitly for production",
        ));
    }

    let is_service_principal = current_user(bundle).is_some_and(User::is_service_principal);
    let bundle_run_as = bundle
        .config
        .run_as
        .as_ref()
        .is_some_and(crate::config::RunAs::is_set);
    let all_jobs_covered = bundle
        .config
        .resources
        .jobs
        .values()
        .all(|job| job.run_as.as_ref().is_some_and(crate::config::RunAs::is_set));
    if !is_service_principal && !bundle_run_as && !all_jobs_covered {
        return Diagnostics::from_error(LakewardError::Policy(PolicyError::ModeViolation {
            message: String::from(
                "production mode requires run_as (or a service principal identity)",
            ),
        }));
    }

    diags
}
