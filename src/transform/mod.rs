//! Configuration transform mutators.
//!
//! Each submodule contributes mutators to the load and initialize phases;
//! the phase sequences in [`crate::phases`] decide the order.

mod defaults;
mod git;
mod interpolate;
mod keyed;
mod mode;
mod paths;
mod run_as;
mod target;
mod validate;
mod variables;

pub use defaults::{DefaultWorkspacePaths, PopulateCurrentUser};
pub use git::LoadGitDetails;
pub use interpolate::InterpolateScoped;
pub use keyed::MergeKeyedSequences;
pub use mode::ProcessTargetMode;
pub use paths::TranslatePaths;
pub use run_as::SetRunAs;
pub use target::{MergeTarget, RewriteEnvironments, SelectTarget};
pub use validate::{ValidateSingleOrigin, ValidateUniqueResourceKeys};
pub use variables::{InitVariables, ResolveLookups, ENV_VAR_PREFIX};
