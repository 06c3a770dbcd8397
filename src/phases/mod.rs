//! Phase sequences.
//!
//! A phase is an ordered list of mutators. The orderings here carry the
//! correctness rules of the whole engine: interpolation runs after paths
//! are translated, the lock is the last step of initialization, and state
//! pushes strictly follow a successful apply.

mod destroy;
mod guard;
mod iac;
mod load;
mod lock;
pub mod scripts;

pub use destroy::{ClearCaches, ConfirmDestroy, DeleteRemoteFiles};
pub use guard::CheckActiveRuns;
pub use iac::{ApplyIac, DestroyIac, PullIacState, PushIacState, RenderIacConfig};
pub use load::LoadFiles;
pub use lock::{AcquireLock, ReleaseLock};
pub use scripts::RunScript;

use crate::artifact::{BuildArtifacts, PrepareArtifacts, UploadArtifacts};
use crate::deploystate::{PullDeploymentState, PushDeploymentState};
use crate::mutator::Mutator;
use crate::sync::SyncFiles;
use crate::transform::{
    DefaultWorkspacePaths, InitVariables, InterpolateScoped, LoadGitDetails, MergeKeyedSequences,
    MergeTarget, PopulateCurrentUser, ProcessTargetMode, ResolveLookups, RewriteEnvironments,
    SelectTarget, SetRunAs, TranslatePaths, ValidateSingleOrigin, ValidateUniqueResourceKeys,
};

/// Interpolation scopes resolved during initialization. The `artifacts`
/// scope stays literal until uploads assign remote paths.
const INIT_SCOPES: &[&str] = &["bundle", "workspace", "var"];

/// Scopes resolved after artifact upload.
const ARTIFACT_SCOPES: &[&str] = &["artifacts"];

/// Reads configuration from disk and selects the target.
#[must_use]
pub fn load_phase() -> Vec<Box<dyn Mutator>> {
    vec![
        Box::new(LoadFiles),
        Box::new(RewriteEnvironments),
        Box::new(InitVariables),
        Box::new(SelectTarget),
        Box::new(LoadGitDetails),
        Box::new(ValidateSingleOrigin),
    ]
}

/// Folds the target in, resolves references and validates the result.
///
/// `acquire_lock` is off for read-only commands (validate, summary, sync)
/// so they never contend with a running deploy.
#[must_use]
pub fn initialize_phase(acquire_lock: bool) -> Vec<Box<dyn Mutator>> {
    let mut phase: Vec<Box<dyn Mutator>> = vec![
        Box::new(MergeTarget),
        Box::new(PopulateCurrentUser),
        Box::new(DefaultWorkspacePaths),
        Box::new(TranslatePaths),
        Box::new(InterpolateScoped::new(INIT_SCOPES)),
        Box::new(ResolveLookups),
        Box::new(ProcessTargetMode),
        Box::new(ValidateUniqueResourceKeys),
        Box::new(SetRunAs),
        Box::new(MergeKeyedSequences),
        Box::new(RunScript::new("postinit")),
    ];
    if acquire_lock {
        phase.push(Box::new(AcquireLock));
    }
    phase
}

/// Builds and uploads artifacts.
#[must_use]
pub fn build_phase() -> Vec<Box<dyn Mutator>> {
    vec![
        Box::new(RunScript::new("prebuild")),
        Box::new(PrepareArtifacts),
        Box::new(BuildArtifacts),
        Box::new(UploadArtifacts),
        Box::new(InterpolateScoped::new(ARTIFACT_SCOPES)),
        Box::new(RunScript::new("postbuild")),
    ]
}

/// Syncs files, applies the engine and records the deployment.
#[must_use]
pub fn deploy_phase() -> Vec<Box<dyn Mutator>> {
    vec![
        Box::new(RunScript::new("predeploy")),
        Box::new(PullDeploymentState),
        Box::new(CheckActiveRuns),
        Box::new(PullIacState),
        Box::new(RenderIacConfig),
        Box::new(SyncFiles),
        Box::new(ApplyIac),
        Box::new(PushIacState),
        Box::new(PushDeploymentState),
        Box::new(ReleaseLock),
        Box::new(RunScript::new("postdeploy")),
    ]
}

/// Tears everything down: resources, remote files, local caches.
#[must_use]
pub fn destroy_phase() -> Vec<Box<dyn Mutator>> {
    vec![
        Box::new(ConfirmDestroy),
        Box::new(PullDeploymentState),
        Box::new(PullIacState),
        Box::new(DestroyIac),
        Box::new(DeleteRemoteFiles),
        Box::new(ClearCaches),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(phase: &[Box<dyn Mutator>]) -> Vec<&'static str> {
        phase.iter().map(|m| m.name()).collect()
    }

    #[test]
    fn test_lock_is_last_in_initialize() {
        let phase = initialize_phase(true);
        assert_eq!(names(&phase).last(), Some(&"AcquireLock"));
        let phase = initialize_phase(false);
        assert!(!names(&phase).contains(&"AcquireLock"));
    }

    #[test]
    fn test_deploy_pushes_state_only_after_apply() {
        let phase = deploy_phase();
        let names = names(&phase);
        let apply = names.iter().position(|n| *n == "ApplyIac").expect("apply");
        let iac_push = names
            .iter()
            .position(|n| *n == "PushIacState")
            .expect("iac push");
        let deploy_push = names
            .iter()
            .position(|n| *n == "PushDeploymentState")
            .expect("deploy push");
        assert!(apply < iac_push);
        assert!(iac_push < deploy_push);
    }

    #[test]
    fn test_sync_happens_before_apply() {
        let names = names(&deploy_phase());
        let sync = names.iter().position(|n| *n == "SyncFiles").expect("sync");
        let apply = names.iter().position(|n| *n == "ApplyIac").expect("apply");
        assert!(sync < apply);
    }

    #[test]
    fn test_destroy_confirms_first() {
        let names = names(&destroy_phase());
        assert_eq!(names.first(), Some(&"ConfirmDestroy"));
    }
}
