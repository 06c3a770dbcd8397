//! Run-as identity propagation.

use async_trait::async_trait;

use crate::bundle::Bundle;
use crate::mutator::{Diagnostics, Mutator};

/// Copies the bundle-level `run_as` identity onto every job that does not
/// declare its own.
pub struct SetRunAs;

#[async_trait]
impl Mutator for SetRunAs {
    fn name(&self) -> &'static str {
        "SetRunAs"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        if let Err(err) = bundle.refresh_typed() {
            return Diagnostics::from_error(err);
        }
        let Some(run_as) = bundle.config.run_as.clone() else {
            return Diagnostics::new();
        };
        if !run_as.is_set() {
            return Diagnostics::new();
        }
        for job in bundle.config.resources.jobs.values_mut() {
            if !job.run_as.as_ref().is_some_and(crate::config::RunAs::is_set) {
                job.run_as = Some(run_as.clone());
            }
        }
        if let Err(err) = bundle.commit_typed() {
            return Diagnostics::from_error(err);
        }
        Diagnostics::new()
    }
}
